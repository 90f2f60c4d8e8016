use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::SourceError;

/// Upper bound on how long a cancelled replay keeps waiting for its reader.
const CANCEL_POLL: Duration = Duration::from_millis(50);
/// Deliveries read ahead of the callback.
const READ_AHEAD: usize = 2;

/// Unblocks a source's read loop from any thread.
pub trait CancelHandle: Send + Sync {
    fn cancel(&self);
}

/// Push-style delivery of raw unsigned 8-bit interleaved I/Q bytes.
pub trait IqSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Handle that makes an in-flight or future `read_async` return.
    fn cancel_handle(&self) -> Arc<dyn CancelHandle>;

    /// Deliver buffers to `on_samples` on the calling thread until cancelled,
    /// the stream ends, or the driver fails. Cancellation and end of stream
    /// both return `Ok(())`.
    fn read_async(&mut self, on_samples: &mut dyn FnMut(&[u8])) -> Result<(), SourceError>;
}

/// Cancellation flag for sources whose read loop polls between deliveries.
/// Waits in [`wait_timeout`](Self::wait_timeout) end as soon as it is set.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

impl CancelHandle for CancelFlag {
    fn cancel(&self) {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }
}

/// Replays a raw cu8 capture (the `rtl_sdr` dump format) through the same
/// callback interface as the hardware.
///
/// Reads happen on a helper thread so that a reader stuck in `read` (an idle
/// pipe on stdin) cannot hold the capture thread past cancellation.
pub struct ReplaySource<R> {
    /// Moved to the reader thread by the first `read_async`.
    reader: Option<R>,
    label: String,
    buf_len: usize,
    /// Pace deliveries at this many complex samples per second.
    realtime_rate: Option<u32>,
    cancel: Arc<CancelFlag>,
}

impl ReplaySource<BufReader<File>> {
    pub fn from_file(path: &Path, buf_len: usize) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(
            BufReader::with_capacity(1024 * 1024, file),
            path.display().to_string(),
            buf_len,
        ))
    }
}

impl ReplaySource<io::Stdin> {
    pub fn from_stdin(buf_len: usize) -> Self {
        Self::new(io::stdin(), "stdin".to_string(), buf_len)
    }
}

/// Fill `buf` as far as the reader allows. Returns 0 only at end of stream.
fn read_delivery<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read deliveries on a detached thread. The channel disconnects at end of
/// stream; the thread exits on the first failed send after the receiver is gone.
fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    buf_len: usize,
) -> io::Result<Receiver<io::Result<Vec<u8>>>> {
    let (tx, rx) = bounded(READ_AHEAD);
    thread::Builder::new()
        .name("replay-reader".into())
        .spawn(move || loop {
            let mut buf = vec![0u8; buf_len];
            match read_delivery(&mut reader, &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    if tx.send(Ok(buf)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        })?;
    Ok(rx)
}

impl<R: Read + Send + 'static> ReplaySource<R> {
    pub fn new(reader: R, label: String, buf_len: usize) -> Self {
        Self {
            reader: Some(reader),
            label,
            buf_len: buf_len.max(1),
            realtime_rate: None,
            cancel: Arc::new(CancelFlag::default()),
        }
    }

    /// Pace deliveries at `sample_rate`; 0 disables pacing.
    pub fn with_realtime(mut self, sample_rate: u32) -> Self {
        self.realtime_rate = Some(sample_rate).filter(|&r| r > 0);
        self
    }
}

impl<R: Read + Send + 'static> IqSource for ReplaySource<R> {
    fn describe(&self) -> String {
        match self.realtime_rate {
            Some(rate) => format!("replay of {} at {} S/s", self.label, rate),
            None => format!("replay of {}", self.label),
        }
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        self.cancel.clone()
    }

    fn read_async(&mut self, on_samples: &mut dyn FnMut(&[u8])) -> Result<(), SourceError> {
        let Some(reader) = self.reader.take() else {
            log::debug!("replay of {} already consumed", self.label);
            return Ok(());
        };
        let deliveries = spawn_reader(reader, self.buf_len)?;
        let started = Instant::now();
        let mut delivered_samples: u64 = 0;

        while !self.cancel.is_cancelled() {
            let buf = match deliveries.recv_timeout(CANCEL_POLL) {
                Ok(delivery) => delivery?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("end of capture: {}", self.label);
                    return Ok(());
                }
            };

            if let Some(rate) = self.realtime_rate {
                delivered_samples += (buf.len() / 2) as u64;
                let due = Duration::from_secs_f64(delivered_samples as f64 / rate as f64);
                if let Some(wait) = due.checked_sub(started.elapsed()) {
                    if self.cancel.wait_timeout(wait) {
                        break;
                    }
                }
            }

            on_samples(&buf);
        }

        log::debug!("replay of {} cancelled", self.label);
        Ok(())
    }
}
