use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

/// Cooperative cancellation shared between an owner and one background job.
///
/// Cancelling sets a flag and disconnects an internal channel, so a job
/// blocked on [`CancellationToken::signal`] or sleeping in
/// [`CancellationToken::wait_timeout`] wakes immediately.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    // Never sends; dropping it is the wake-up.
    sender: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Channel that becomes ready (disconnected) once cancelled; for `select!`.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.receiver
    }

    /// Sleeps for up to `timeout`; returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let _ = self.inner.receiver.recv_timeout(timeout);
        self.is_cancelled()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
