pub mod handoff;
pub mod shutdown;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::thread;

use crate::capture::producer;
use crate::capture::source::IqSource;
use crate::spectrum::consumer::SpectrumConsumer;
use handoff::{HandoffChannel, HandoffStats};
use shutdown::{ShutdownCoordinator, ShutdownReason};

/// State shared by the capture thread, the spectrum thread and the signal
/// handler for the duration of one run.
pub struct PipelineContext {
    pub channel: Arc<HandoffChannel>,
    pub shutdown: ShutdownCoordinator,
}

impl PipelineContext {
    pub fn new(fft_len: usize) -> Self {
        let channel = Arc::new(HandoffChannel::new(fft_len));
        Self {
            shutdown: ShutdownCoordinator::new(channel.clone()),
            channel,
        }
    }

    pub fn fft_len(&self) -> usize {
        self.channel.fft_len()
    }
}

/// Outcome of a finished run.
#[derive(Clone, Copy, Debug)]
pub struct PipelineReport {
    pub reason: ShutdownReason,
    pub stats: HandoffStats,
    pub spectra: u64,
}

/// Triggers shutdown if the owning worker unwinds, so the other worker is
/// never left running on its own.
struct ShutdownOnPanic<'a> {
    ctx: &'a PipelineContext,
    reason: ShutdownReason,
}

impl Drop for ShutdownOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("{} worker panicked", thread::current().name().unwrap_or("pipeline"));
            self.ctx.shutdown.trigger(self.reason);
        }
    }
}

/// Start the capture and spectrum workers, wait for shutdown and join both.
///
/// The calling thread touches no shared state besides the coordinator's
/// final bookkeeping.
pub fn run(
    ctx: Arc<PipelineContext>,
    mut source: Box<dyn IqSource>,
    mut consumer: SpectrumConsumer,
) -> Result<PipelineReport> {
    ctx.shutdown.attach_canceller(source.cancel_handle());

    let spectrum_thread = thread::Builder::new()
        .name("spectrum".into())
        .spawn({
            let ctx = ctx.clone();
            move || {
                let _guard = ShutdownOnPanic {
                    ctx: &ctx,
                    reason: ShutdownReason::OutputFailed,
                };
                if let Err(err) = consumer.run(&ctx) {
                    log::error!("spectrum output failed: {}", err);
                    ctx.shutdown.trigger(ShutdownReason::OutputFailed);
                }
                consumer.emitted()
            }
        })
        .context("Failed to spawn spectrum thread")?;

    let capture_thread = thread::Builder::new().name("capture".into()).spawn({
        let ctx = ctx.clone();
        move || {
            let _guard = ShutdownOnPanic {
                ctx: &ctx,
                reason: ShutdownReason::SourceFailed,
            };
            match producer::run(&ctx, source.as_mut()) {
                Ok(()) => {
                    if !ctx.shutdown.is_requested() {
                        ctx.shutdown.trigger(ShutdownReason::SourceExhausted);
                    }
                }
                Err(err) => {
                    log::error!("capture failed: {}", err);
                    ctx.shutdown.trigger(ShutdownReason::SourceFailed);
                }
            }
        }
    });

    let capture_thread = match capture_thread {
        Ok(handle) => handle,
        Err(err) => {
            ctx.shutdown.trigger(ShutdownReason::SourceFailed);
            let _ = spectrum_thread.join();
            return Err(err).context("Failed to spawn capture thread");
        }
    };

    let capture_result = capture_thread.join();
    // The producer is gone; make sure the consumer cannot wait forever.
    ctx.shutdown.wake_consumer();
    let spectrum_result = spectrum_thread.join();
    ctx.shutdown.mark_stopped();
    log::debug!("pipeline {:?}", ctx.shutdown.state());

    if capture_result.is_err() {
        return Err(anyhow!("capture thread panicked"));
    }
    let spectra = spectrum_result.map_err(|_| anyhow!("spectrum thread panicked"))?;
    let reason = ctx
        .shutdown
        .reason()
        .context("pipeline stopped without a shutdown reason")?;

    Ok(PipelineReport {
        reason,
        stats: ctx.channel.stats(),
        spectra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::{CancelFlag, CancelHandle, ReplaySource};
    use crate::error::{SinkError, SourceError};
    use crate::pipeline::shutdown::PipelineState;
    use crate::spectrum::analysis::{SpectrumAnalyzer, SpectrumResult};
    use crate::spectrum::sink::{MemorySink, SpectrumSink};
    use std::io::Cursor;
    use std::sync::{mpsc, Condvar, Mutex};
    use std::time::{Duration, Instant};

    fn consumer(fft_len: usize, sink: impl SpectrumSink + 'static) -> SpectrumConsumer {
        SpectrumConsumer::new(SpectrumAnalyzer::new(fft_len), Box::new(sink))
    }

    /// Blocks inside `read_async` until cancelled, like a driver with no data.
    #[derive(Default)]
    struct Gate {
        cancelled: Mutex<bool>,
        cv: Condvar,
    }

    impl CancelHandle for Gate {
        fn cancel(&self) {
            *self.cancelled.lock().unwrap() = true;
            self.cv.notify_all();
        }
    }

    struct BlockingSource(Arc<Gate>);

    impl IqSource for BlockingSource {
        fn describe(&self) -> String {
            "blocking test source".into()
        }
        fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
            self.0.clone()
        }
        fn read_async(&mut self, _: &mut dyn FnMut(&[u8])) -> Result<(), SourceError> {
            let mut cancelled = self.0.cancelled.lock().unwrap();
            while !*cancelled {
                cancelled = self.0.cv.wait(cancelled).unwrap();
            }
            Ok(())
        }
    }

    /// Delivers until cancelled, optionally failing after a number of deliveries.
    struct EndlessSource {
        cancel: Arc<CancelFlag>,
        fail_after: Option<usize>,
    }

    impl IqSource for EndlessSource {
        fn describe(&self) -> String {
            "endless test source".into()
        }
        fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
            self.cancel.clone()
        }
        fn read_async(&mut self, on_samples: &mut dyn FnMut(&[u8])) -> Result<(), SourceError> {
            let mut deliveries = 0;
            while !self.cancel.is_cancelled() {
                if self.fail_after == Some(deliveries) {
                    return Err(SourceError::device("transfer error"));
                }
                on_samples(&[127; 256]);
                deliveries += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    #[test]
    fn replay_runs_to_completion_and_delivers_last_block() {
        let fft_len = 64;
        let bytes: Vec<u8> = (0..fft_len * 2 * 10 + 50).map(|i| (i % 251) as u8).collect();
        let source = ReplaySource::new(Cursor::new(bytes), "mem".into(), 100);
        let sink = MemorySink::default();

        let ctx = Arc::new(PipelineContext::new(fft_len));
        let report = run(ctx.clone(), Box::new(source), consumer(fft_len, sink.clone())).unwrap();

        assert_eq!(report.reason, ShutdownReason::SourceExhausted);
        assert_eq!(report.stats.published, 10);
        assert_eq!(report.stats.published, report.stats.taken + report.stats.coalesced);
        assert_eq!(ctx.shutdown.state(), PipelineState::Stopped);

        let seqs = sink.seqs();
        assert_eq!(seqs.len() as u64, report.spectra);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seqs.last(), Some(&9));
    }

    #[test]
    fn signal_unblocks_producer_waiting_in_driver() {
        let ctx = Arc::new(PipelineContext::new(32));
        let source = BlockingSource(Arc::new(Gate::default()));

        let (tx, rx) = mpsc::channel();
        {
            let ctx = ctx.clone();
            std::thread::spawn(move || {
                let report = run(ctx, Box::new(source), consumer(32, MemorySink::default()));
                let _ = tx.send(report);
            });
        }

        std::thread::sleep(Duration::from_millis(100));
        let start = Instant::now();
        assert!(ctx.shutdown.trigger(ShutdownReason::Signal));

        let report = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(report.reason, ShutdownReason::Signal);
        assert_eq!(report.spectra, 0);
    }

    #[test]
    fn driver_error_is_fatal() {
        let ctx = Arc::new(PipelineContext::new(64));
        let source = EndlessSource {
            cancel: Arc::new(CancelFlag::default()),
            fail_after: Some(3),
        };

        let report = run(ctx, Box::new(source), consumer(64, MemorySink::default())).unwrap();
        assert_eq!(report.reason, ShutdownReason::SourceFailed);
        assert!(report.reason.is_failure());
    }

    #[test]
    fn output_failure_cancels_capture() {
        struct FailingSink;
        impl SpectrumSink for FailingSink {
            fn emit(&mut self, _: &SpectrumResult) -> Result<(), SinkError> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into())
            }
        }

        let ctx = Arc::new(PipelineContext::new(64));
        let source = EndlessSource {
            cancel: Arc::new(CancelFlag::default()),
            fail_after: None,
        };

        let report = run(ctx, Box::new(source), consumer(64, FailingSink)).unwrap();
        assert_eq!(report.reason, ShutdownReason::OutputFailed);
        assert_eq!(report.spectra, 0);
    }
}
