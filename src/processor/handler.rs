use crate::core::{Lookup, Result};
use crate::dispatch::{SyncDispatcher, SyncMode};
use crate::model::DomainRecord;
use crate::store::{DomainServices, Managed};
use std::sync::Arc;
use tracing::warn;

/// What one record did to the store and the WMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied { mode: SyncMode, synced: bool },
    /// Rejected by validation or a write conflict; nothing was written.
    Skipped,
}

/// Upserts one parsed record by natural key, then synchronizes it.
#[derive(Clone)]
pub struct RecordHandler {
    dispatcher: Arc<SyncDispatcher>,
}

impl RecordHandler {
    pub fn new(dispatcher: Arc<SyncDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Returns an error only for failures worth retrying the whole file for.
    pub async fn handle(
        &self,
        services: &DomainServices,
        record: DomainRecord,
    ) -> Result<RecordOutcome> {
        let kind = record.kind();
        let id = record.entity_id();
        let upserted = match record {
            DomainRecord::Customer(r) => upsert(services, r).await,
            DomainRecord::Product(r) => upsert(services, r).await,
            DomainRecord::PurchaseOrder(r) => upsert(services, r).await,
            DomainRecord::SalesOrder(r) => upsert(services, r).await,
        };

        let (stored, mode) = match upserted {
            Ok(applied) => applied,
            Err(err) if !err.is_transient() => {
                warn!(kind = %kind, id = %id, error = %err, "record skipped");
                return Ok(RecordOutcome::Skipped);
            }
            Err(err) => return Err(err),
        };

        let result = self.dispatcher.synchronize(services, &stored, mode).await;
        Ok(RecordOutcome::Applied {
            mode,
            synced: result.success,
        })
    }
}

async fn upsert<T: Managed>(
    services: &DomainServices,
    record: T,
) -> Result<(DomainRecord, SyncMode)> {
    let service = services.of::<T>();
    match service.find(&record.key()).await? {
        Lookup::Found(_) => Ok((service.update(&record).await?.into_domain(), SyncMode::Updated)),
        Lookup::NotFound => Ok((service.create(&record).await?.into_domain(), SyncMode::Created)),
    }
}
