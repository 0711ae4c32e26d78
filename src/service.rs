//! Long-running sync service: wires the store, ledger, WMS client, dispatcher,
//! processor and scheduler together and owns their lifetime.

use crate::config::AppConfig;
use crate::core::{Result, SyncError};
use crate::dispatch::{RetrySweepWorker, SyncDispatcher};
use crate::ledger::{SyncLedger, SyncResult};
use crate::processor::{FileProcessor, RecordHandler, WatcherReport};
use crate::scheduler::{
    Clock, HttpHealthCheck, ReadinessCheck, Scheduler, StartGate, SystemClock, WmsPingCheck,
    run_readiness_probe,
};
use crate::store::{RecordStore, ServiceScope, StoreScope};
use crate::wms::{HttpWmsClient, WmsClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct SyncService {
    config: AppConfig,
    store: Arc<RecordStore>,
    ledger: Arc<SyncLedger>,
    wms: Arc<dyn WmsClient>,
    dispatcher: Arc<SyncDispatcher>,
    scope: Arc<dyn ServiceScope>,
    processor: Arc<FileProcessor>,
    gate: StartGate,
}

impl SyncService {
    /// Opens persistent state under `Storage.DataDirectory` and connects to the WMS API.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let wms = Arc::new(HttpWmsClient::new(&config.wms_api)?);
        Self::with_wms(config, wms).await
    }

    pub async fn with_wms(config: AppConfig, wms: Arc<dyn WmsClient>) -> Result<Self> {
        let storage = &config.storage;
        let store = Arc::new(
            RecordStore::open(
                &storage.data_directory,
                storage.durability_mode(),
                storage.snapshot_every_ops,
            )
            .await?,
        );
        let ledger = Arc::new(
            SyncLedger::open(
                &storage.data_directory,
                storage.durability_mode(),
                storage.snapshot_every_ops,
            )
            .await?,
        );

        let dispatcher = Arc::new(SyncDispatcher::new(wms.clone(), ledger.clone()));
        let scope: Arc<dyn ServiceScope> = Arc::new(StoreScope::new(store.clone()));
        let processor = Arc::new(FileProcessor::new(
            &config.file_processing,
            scope.clone(),
            RecordHandler::new(dispatcher.clone()),
        ));

        Ok(Self {
            config,
            store,
            ledger,
            wms,
            dispatcher,
            scope,
            processor,
            gate: StartGate::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<SyncLedger> {
        &self.ledger
    }

    pub fn dispatcher(&self) -> &Arc<SyncDispatcher> {
        &self.dispatcher
    }

    pub fn processor(&self) -> &Arc<FileProcessor> {
        &self.processor
    }

    /// Opens the start gate without waiting for the readiness probe.
    pub fn start_processing(&self) -> bool {
        self.gate.release()
    }

    /// Runs the readiness probe, the scheduler and (when configured) the retry sweep
    /// until `cancel` fires, then flushes persistent state.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let probe = {
            let check = self.readiness_check()?;
            let gate = self.gate.clone();
            let interval = self.config.api_settings.probe_interval();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_readiness_probe(check.as_ref(), &gate, interval, &cancel).await
            })
        };

        let sweep = self
            .config
            .file_processing
            .retry_sweep_interval()
            .map(|interval| {
                RetrySweepWorker::spawn(self.dispatcher.clone(), self.scope.clone(), interval)
            });

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let scheduler = Scheduler::new(
            &self.config.file_processing,
            self.processor.clone(),
            clock,
            self.gate.clone(),
        );
        scheduler.run(cancel).await;

        probe.abort();
        if let Some(sweep) = sweep {
            sweep.stop().await?;
        }
        self.checkpoint().await?;
        info!("sync service stopped");
        Ok(())
    }

    /// Runs every watcher, or only `watcher`, once.
    pub async fn process_once(
        &self,
        watcher: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<WatcherReport>> {
        let reports = match watcher {
            Some(name) => {
                let watcher = self
                    .config
                    .watcher(name)
                    .ok_or_else(|| SyncError::not_found("watcher", name))?;
                vec![self.processor.process_watcher(watcher, cancel).await?]
            }
            None => self.processor.process_all(cancel).await,
        };
        self.checkpoint().await?;
        Ok(reports)
    }

    pub async fn retry_failed(&self) -> Result<Vec<SyncResult>> {
        let services = self.scope.open_scope();
        let results = self
            .dispatcher
            .retry_failed_synchronizations(&services)
            .await;
        self.checkpoint().await?;
        Ok(results)
    }

    /// Snapshots the store and the ledger and compacts their journals.
    pub async fn checkpoint(&self) -> Result<()> {
        self.store.checkpoint().await?;
        self.ledger.checkpoint().await
    }

    fn readiness_check(&self) -> Result<Box<dyn ReadinessCheck>> {
        match self.config.api_settings.health_url() {
            Some(url) => {
                let timeout = Duration::from_secs(self.config.wms_api.timeout_seconds.max(1));
                Ok(Box::new(HttpHealthCheck::new(url, timeout)?))
            }
            None => {
                warn!("ApiSettings.BaseUrl not configured, probing the WMS ping endpoint");
                Ok(Box::new(WmsPingCheck(self.wms.clone())))
            }
        }
    }
}
