use tokio::sync::mpsc;
use tracing::{debug, warn};

type UiCallback = Box<dyn FnOnce() + Send + 'static>;

/// Create a connected dispatcher/loop pair.
///
/// The [`UiLoop`] is owned by the single thread that is allowed to touch UI
/// objects; every [`UiDispatcher`] clone can hand it work from any thread.
pub fn channel() -> (UiDispatcher, UiLoop) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UiDispatcher { sender }, UiLoop { receiver })
}

/// Sending half: marshals closures onto the UI loop
#[derive(Debug, Clone)]
pub struct UiDispatcher {
    sender: mpsc::UnboundedSender<UiCallback>,
}

impl UiDispatcher {
    /// Queue `callback` for the UI loop. Returns false if the loop is gone, in
    /// which case the callback is dropped without running.
    pub fn dispatch<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(callback)).is_err() {
            warn!("UI loop closed, dropping callback");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half: runs marshaled callbacks one at a time on its owner's thread
pub struct UiLoop {
    receiver: mpsc::UnboundedReceiver<UiCallback>,
}

impl UiLoop {
    /// Run every callback queued so far without waiting for more.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Wait for the next callback and run it. Returns false once every
    /// dispatcher has been dropped.
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Run callbacks until every dispatcher has been dropped.
    pub async fn run(mut self) {
        let mut ran = 0u64;
        while self.run_next().await {
            ran += 1;
        }
        debug!("UI loop finished after {} callbacks", ran);
    }
}
