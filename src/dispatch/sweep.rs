use super::SyncDispatcher;
use crate::core::{Result, SyncError};
use crate::store::ServiceScope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Background worker that periodically re-attempts failed synchronizations.
pub struct RetrySweepWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl RetrySweepWorker {
    pub fn spawn(
        dispatcher: Arc<SyncDispatcher>,
        scope: Arc<dyn ServiceScope>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        info!(interval_secs = interval.as_secs(), "retry sweep worker started");

        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = sleep(interval) => {
                        let services = scope.open_scope();
                        let results = dispatcher.retry_failed_synchronizations(&services).await;
                        let recovered = results.iter().filter(|r| r.success).count();
                        debug!(attempted = results.len(), recovered, "retry sweep finished");
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Signals the worker to stop and waits for the current sweep to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| SyncError::Store(format!("retry sweep worker join: {}", err)))?;
        }
        info!("retry sweep worker stopped");
        Ok(())
    }
}

impl Drop for RetrySweepWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
