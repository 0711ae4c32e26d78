use std::sync::Arc;
use tokio::sync::watch;

/// Single-fire readiness signal. Once released it stays open.
#[derive(Clone)]
pub struct StartGate {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Opens the gate. Returns `true` only for the call that actually opened it.
    pub fn release(&self) -> bool {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_open(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }
}
