//! The designated callback context.
//!
//! Every caller callback runs on one serial job loop, one job at a time and
//! in submission order, so callbacks may touch UI-owned state without extra
//! locking. Network work happens elsewhere; only completion hand-off comes
//! through here.

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle used to submit jobs to the serial loop.
#[derive(Clone)]
pub struct CallbackContext {
    sender: mpsc::UnboundedSender<Job>,
}

/// The receiving half. Drive it with [`CallbackLoop::run`] on the thread
/// that owns UI state.
pub struct CallbackLoop {
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl CallbackContext {
    pub fn new() -> (CallbackContext, CallbackLoop) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (CallbackContext { sender }, CallbackLoop { receiver })
    }

    /// Creates a context whose loop runs as a Tokio task.
    pub fn spawn() -> (CallbackContext, JoinHandle<()>) {
        let (context, callback_loop) = Self::new();
        let handle = tokio::spawn(callback_loop.run());
        (context, handle)
    }

    /// Queues `job`. Returns false if the loop has shut down.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(job)).is_ok()
    }
}

impl CallbackLoop {
    /// Runs queued jobs until every [`CallbackContext`] is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            job();
        }
        debug!("Callback loop finished");
    }
}
