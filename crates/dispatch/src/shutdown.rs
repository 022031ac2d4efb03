//! Broadcast shutdown signal observed by every long-running loop.

use tokio::sync::watch;

/// Fires the shutdown signal. Dropping it counts as firing.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Cloneable view of the shutdown signal. Observing it does not consume it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    pub async fn wait(&mut self) {
        // Err means the trigger is gone, which is a shutdown as well.
        let _ = self.0.wait_for(|stop| *stop).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }
}
