//! Sync dispatcher: pushes persisted records to the WMS and records every outcome in
//! the [`SyncLedger`].
//!
//! None of the synchronize operations return an error for a failed push. A WMS
//! rejection or transport failure becomes a failed [`SyncResult`] that is written to
//! the ledger and returned to the caller.

pub mod sweep;

use crate::core::{EntityKind, Lookup, Result, SyncError};
use crate::ledger::{SyncLedger, SyncResult, SyncStatus};
use crate::model::{Customer, DomainRecord, OrderLine, Product, Record};
use crate::store::{DomainServices, Managed};
use crate::wms::{OrderStatus, WmsClient};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use sweep::RetrySweepWorker;

/// Whether the record was just created or updated in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Created,
    Updated,
}

pub struct SyncDispatcher {
    wms: Arc<dyn WmsClient>,
    ledger: Arc<SyncLedger>,
}

impl SyncDispatcher {
    pub fn new(wms: Arc<dyn WmsClient>, ledger: Arc<SyncLedger>) -> Self {
        Self { wms, ledger }
    }

    pub fn ledger(&self) -> &Arc<SyncLedger> {
        &self.ledger
    }

    /// Synchronizes one record. Orders first push their customer and every referenced
    /// product that exists; missing references are skipped.
    pub async fn synchronize(
        &self,
        services: &DomainServices,
        record: &DomainRecord,
        mode: SyncMode,
    ) -> SyncResult {
        match record {
            DomainRecord::PurchaseOrder(order) => {
                self.push_dependencies(services, record, order.customer_id, &order.lines)
                    .await;
            }
            DomainRecord::SalesOrder(order) => {
                self.push_dependencies(services, record, order.customer_id, &order.lines)
                    .await;
            }
            DomainRecord::Customer(_) | DomainRecord::Product(_) => {}
        }
        self.push(record, mode).await
    }

    /// Synchronizes the records with the given keys. A key that does not resolve
    /// yields a failed result for that key only; such results are not recorded.
    pub async fn synchronize_batch<T: Managed>(
        &self,
        services: &DomainServices,
        keys: &[T::Key],
    ) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = match services.of::<T>().find(key).await {
                Ok(Lookup::Found(record)) => {
                    self.synchronize(services, &record.into_domain(), SyncMode::Created)
                        .await
                }
                Ok(Lookup::NotFound) => {
                    warn!(kind = %T::KIND, id = %key, "batch sync: record not found");
                    let message = SyncError::not_found(T::KIND, key).to_string();
                    SyncResult::failed(T::KIND, key.to_string(), message)
                }
                Err(err) => {
                    warn!(kind = %T::KIND, id = %key, error = %err, "batch sync: lookup failed");
                    SyncResult::failed(T::KIND, key.to_string(), err.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    /// Re-attempts every entity whose status is `Failed`, oldest first.
    pub async fn retry_failed_synchronizations(&self, services: &DomainServices) -> Vec<SyncResult> {
        let failed = self.ledger.get_failed_synchronizations().await;
        info!(count = failed.len(), "retrying failed synchronizations");

        let mut results = Vec::with_capacity(failed.len());
        for status in failed {
            let kind = status.entity_kind;
            let id = status.entity_id;
            match services.resolve(kind, &id).await {
                Ok(Lookup::Found(record)) => {
                    results.push(self.synchronize(services, &record, SyncMode::Created).await);
                }
                Ok(Lookup::NotFound) => {
                    warn!(kind = %kind, id = %id, "failed entity no longer exists, skipping retry");
                }
                Err(err) => {
                    warn!(kind = %kind, id = %id, error = %err, "unable to resolve failed entity, skipping retry");
                }
            }
        }
        results
    }

    /// Current status, or a fresh `Pending` status when the entity has never been seen.
    pub async fn get_sync_status(&self, kind: EntityKind, id: &str) -> SyncStatus {
        self.ledger
            .get_sync_status(kind, id)
            .await
            .unwrap_or_else(|| SyncStatus::pending(kind, id))
    }

    /// Pushes a status change for an order and records the outcome.
    pub async fn update_order_status(
        &self,
        kind: EntityKind,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<SyncResult> {
        let call = match kind {
            EntityKind::PurchaseOrder => {
                self.wms.update_purchase_order_status(order_id, status).await
            }
            EntityKind::SalesOrder => self.wms.update_sales_order_status(order_id, status).await,
            other => {
                return Err(SyncError::Validation(format!(
                    "{other} has no order status"
                )));
            }
        };
        let result = outcome(kind, &order_id.to_string(), call);
        self.record(&result).await;
        Ok(result)
    }

    async fn push_dependencies(
        &self,
        services: &DomainServices,
        order: &DomainRecord,
        customer_id: i32,
        lines: &[OrderLine],
    ) {
        match services.of::<Customer>().find(&customer_id).await {
            Ok(Lookup::Found(customer)) => {
                self.push(&customer.into_domain(), SyncMode::Created).await;
            }
            Ok(Lookup::NotFound) => warn!(
                order = %order.entity_id(),
                customer = customer_id,
                "order customer not found, skipping its sync"
            ),
            Err(err) => warn!(
                order = %order.entity_id(),
                customer = customer_id,
                error = %err,
                "unable to load order customer"
            ),
        }

        let mut seen: Vec<&str> = Vec::new();
        for line in lines {
            let code = line.product_code.as_str();
            if seen.contains(&code) {
                continue;
            }
            seen.push(code);
            match services.of::<Product>().find(&line.product_code).await {
                Ok(Lookup::Found(product)) => {
                    self.push(&product.into_domain(), SyncMode::Created).await;
                }
                Ok(Lookup::NotFound) => warn!(
                    order = %order.entity_id(),
                    product = code,
                    "order product not found, skipping its sync"
                ),
                Err(err) => warn!(
                    order = %order.entity_id(),
                    product = code,
                    error = %err,
                    "unable to load order product"
                ),
            }
        }
    }

    async fn push(&self, record: &DomainRecord, mode: SyncMode) -> SyncResult {
        let kind = record.kind();
        let id = record.entity_id();

        if let Err(err) = self.ledger.mark_pending(kind, &id).await {
            error!(kind = %kind, id = %id, error = %err, "unable to mark entity pending");
        }

        let call = match (record, mode) {
            (DomainRecord::Customer(c), SyncMode::Created) => self.wms.send_customer(c).await,
            (DomainRecord::Customer(c), SyncMode::Updated) => self.wms.update_customer(c).await,
            (DomainRecord::Product(p), SyncMode::Created) => self.wms.send_product(p).await,
            (DomainRecord::Product(p), SyncMode::Updated) => self.wms.update_product(p).await,
            (DomainRecord::PurchaseOrder(o), _) => self.wms.send_purchase_order(o).await,
            (DomainRecord::SalesOrder(o), _) => self.wms.send_sales_order(o).await,
        };

        let result = outcome(kind, &id, call);
        self.record(&result).await;
        result
    }

    async fn record(&self, result: &SyncResult) {
        if result.success {
            debug!(kind = %result.entity_kind, id = %result.entity_id, "synchronized");
        } else {
            warn!(
                kind = %result.entity_kind,
                id = %result.entity_id,
                error = result.error_message.as_deref().unwrap_or(""),
                "synchronization failed"
            );
        }
        if let Err(err) = self.ledger.record_sync_result(result).await {
            error!(
                kind = %result.entity_kind,
                id = %result.entity_id,
                error = %err,
                "unable to record sync result"
            );
        }
    }
}

fn outcome(kind: EntityKind, id: &str, call: Result<bool>) -> SyncResult {
    match call {
        Ok(true) => SyncResult::succeeded(kind, id),
        Ok(false) => SyncResult::failed(kind, id, format!("WMS rejected {kind} '{id}'")),
        Err(err) => SyncResult::failed(kind, id, err.to_string()),
    }
}

#[cfg(test)]
mod tests;
