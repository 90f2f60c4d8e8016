use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::source::CancelHandle;
use crate::pipeline::handoff::HandoffChannel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Why the pipeline left `Running`. Only the first trigger is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Termination signal from the user or the OS.
    Signal,
    /// A replayed capture reached end of stream.
    SourceExhausted,
    /// The driver reported a read failure.
    SourceFailed,
    /// The spectrum output stage could not write.
    OutputFailed,
}

impl ShutdownReason {
    pub fn is_failure(self) -> bool {
        matches!(self, ShutdownReason::SourceFailed | ShutdownReason::OutputFailed)
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownReason::Signal => "user cancel",
            ShutdownReason::SourceExhausted => "end of input",
            ShutdownReason::SourceFailed => "source failure",
            ShutdownReason::OutputFailed => "output failure",
        };
        f.write_str(text)
    }
}

struct Lifecycle {
    state: PipelineState,
    reason: Option<ShutdownReason>,
}

/// Owns the monotonic shutdown flag and the two wakers that make it prompt:
/// the driver's cancel handle and the handoff channel.
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    canceller: Mutex<Option<Arc<dyn CancelHandle>>>,
    channel: Arc<HandoffChannel>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ShutdownCoordinator {
    pub fn new(channel: Arc<HandoffChannel>) -> Self {
        Self {
            requested: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                state: PipelineState::Running,
                reason: None,
            }),
            canceller: Mutex::new(None),
            channel,
        }
    }

    /// Register the driver's cancel handle. Cancels right away if shutdown
    /// was requested before the source was attached.
    pub fn attach_canceller(&self, handle: Arc<dyn CancelHandle>) {
        *lock(&self.canceller) = Some(handle.clone());
        if self.is_requested() {
            handle.cancel();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// `Running -> ShuttingDown`. Returns `true` for the first caller only;
    /// later triggers are ignored.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.requested.swap(true, Ordering::AcqRel) {
            log::debug!("shutdown already in progress, ignoring {}", reason);
            return false;
        }

        {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.state = PipelineState::ShuttingDown;
            lifecycle.reason = Some(reason);
        }
        log::info!("shutting down: {}", reason);

        let canceller = lock(&self.canceller).clone();
        if let Some(handle) = canceller {
            handle.cancel();
        }
        self.channel.close();
        true
    }

    /// Wake the consumer even when nothing is pending. Called again after the
    /// producer has been joined.
    pub fn wake_consumer(&self) {
        self.channel.close();
    }

    /// `ShuttingDown -> Stopped`, once both workers are joined.
    pub fn mark_stopped(&self) {
        lock(&self.lifecycle).state = PipelineState::Stopped;
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.lifecycle).state
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        lock(&self.lifecycle).reason
    }
}
