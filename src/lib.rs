// ============================================================================
// WMS File Sync Library
// ============================================================================

pub mod core;
pub mod config;
pub mod model;
pub mod parser;
pub mod journal;
pub mod store;
pub mod wms;
pub mod ledger;
pub mod dispatch;
pub mod processor;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use core::{EntityKind, Lookup, Result, SyncError};
pub use config::{AppConfig, FileProcessingConfig, WatcherConfig};
pub use model::{Customer, DomainRecord, OrderLine, Product, PurchaseOrder, Record, SalesOrder};
pub use wms::{HttpWmsClient, OrderStatus, WmsClient};

// ============================================================================
// Pipeline
// ============================================================================

pub use dispatch::{RetrySweepWorker, SyncDispatcher, SyncMode};
pub use ledger::{SyncLedger, SyncResult, SyncState, SyncStatistics, SyncStatus};
pub use processor::{FileProcessor, RecordHandler, WatcherReport, WatcherRunner};
pub use scheduler::{Clock, ManualClock, Scheduler, StartGate, SystemClock};
pub use service::SyncService;
pub use store::{DomainServices, RecordService, RecordStore, ServiceScope, StoreScope};
