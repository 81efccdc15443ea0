//! Cooperative cancellation for in-flight requests.
//!
//! An `AbortController` owns the cancellation state and hands out cheap
//! `AbortSignal` clones. Aborting is one-way: once a signal reports aborted
//! it stays aborted. Dropping the controller without aborting leaves every
//! signal pending forever.

use tokio::sync::watch;

#[derive(Debug)]
pub struct AbortController {
    sender: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Abort every request observing a signal from this controller.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of an `AbortController`.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the controller aborts.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|aborted| *aborted).await.is_err() {
            // Controller dropped without aborting.
            std::future::pending::<()>().await;
        }
    }
}
