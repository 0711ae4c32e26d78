use super::*;
use crate::ledger::SyncState;
use crate::model::{PurchaseOrder, SalesOrder};
use crate::store::{RecordStore, ServiceScope, StoreScope};
use crate::test_support::{RecordingWms, Reply};
use chrono::Utc;

struct Fixture {
    wms: Arc<RecordingWms>,
    ledger: Arc<SyncLedger>,
    dispatcher: SyncDispatcher,
    services: DomainServices,
}

fn fixture(wms: RecordingWms) -> Fixture {
    let wms = Arc::new(wms);
    let ledger = Arc::new(SyncLedger::in_memory());
    let dispatcher = SyncDispatcher::new(wms.clone(), ledger.clone());
    let services = StoreScope::new(Arc::new(RecordStore::in_memory())).open_scope();
    Fixture {
        wms,
        ledger,
        dispatcher,
        services,
    }
}

fn customer(id: i32) -> Customer {
    Customer {
        customer_id: id,
        name: format!("Customer {id}"),
        address: "Main St".into(),
    }
}

fn product(code: &str) -> Product {
    Product {
        product_code: code.into(),
        title: format!("Product {code}"),
        description: String::new(),
        dimensions: "1x1x1".into(),
    }
}

fn purchase_order(id: i32, customer_id: i32, codes: &[&str]) -> PurchaseOrder {
    PurchaseOrder {
        order_id: id,
        processing_date: Utc::now(),
        customer_id,
        lines: codes
            .iter()
            .map(|code| OrderLine {
                product_code: code.to_string(),
                quantity: 1,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_created_and_updated_use_different_calls() {
    let f = fixture(RecordingWms::new());
    let record = customer(7).into_domain();
    f.dispatcher
        .synchronize(&f.services, &record, SyncMode::Created)
        .await;
    f.dispatcher
        .synchronize(&f.services, &record, SyncMode::Updated)
        .await;
    assert_eq!(f.wms.ops(), vec!["send_customer", "update_customer"]);
    assert_eq!(
        f.ledger.get_sync_history(EntityKind::Customer, "7").await.len(),
        2
    );
}

#[tokio::test]
async fn test_wms_error_becomes_failed_result() {
    let f = fixture(RecordingWms::script([Reply::Fail("connection refused".into())]));
    let result = f
        .dispatcher
        .synchronize(&f.services, &product("P-1").into_domain(), SyncMode::Created)
        .await;
    assert!(!result.success);
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));

    let status = f.dispatcher.get_sync_status(EntityKind::Product, "P-1").await;
    assert_eq!(status.status, SyncState::Failed);
    assert_eq!(status.retry_count, 1);
}

#[tokio::test]
async fn test_rejection_is_recorded_as_failure() {
    let f = fixture(RecordingWms::script([Reply::Reject]));
    let result = f
        .dispatcher
        .synchronize(&f.services, &customer(1).into_domain(), SyncMode::Created)
        .await;
    assert!(!result.success);
    assert_eq!(f.ledger.get_failed_synchronizations().await.len(), 1);
}

#[tokio::test]
async fn test_order_syncs_customer_and_existing_products_first() {
    let f = fixture(RecordingWms::new());
    f.services.customers.create(&customer(7)).await.unwrap();
    f.services.products.create(&product("P-1")).await.unwrap();

    let order = purchase_order(40, 7, &["P-1", "P-404", "P-1"]);
    let result = f
        .dispatcher
        .synchronize(&f.services, &order.into_domain(), SyncMode::Created)
        .await;

    assert!(result.success);
    assert_eq!(
        f.wms.ops(),
        vec!["send_customer", "send_product", "send_purchase_order"]
    );
    let status = f.dispatcher.get_sync_status(EntityKind::Product, "P-404").await;
    assert_eq!(status.status, SyncState::Pending);
    assert_eq!(status.last_sync_date, None);
}

#[tokio::test]
async fn test_batch_not_found_is_returned_but_not_recorded() {
    let f = fixture(RecordingWms::new());
    f.services.customers.create(&customer(1)).await.unwrap();

    let results = f
        .dispatcher
        .synchronize_batch::<Customer>(&f.services, &[1, 2])
        .await;
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(f.ledger.get_sync_status(EntityKind::Customer, "2").await.is_none());
    assert_eq!(f.ledger.get_sync_statistics().await.total, 1);
}

#[tokio::test]
async fn test_retry_sweep_resynchronizes_failed_entities() {
    let f = fixture(RecordingWms::script([Reply::Reject, Reply::Reject]));
    f.services.customers.create(&customer(1)).await.unwrap();
    f.services.customers.create(&customer(2)).await.unwrap();
    f.dispatcher
        .synchronize_batch::<Customer>(&f.services, &[1, 2])
        .await;
    // An entity that failed but has since disappeared from the store.
    f.ledger
        .record_sync_result(&SyncResult::failed(EntityKind::Customer, "99", "x"))
        .await
        .unwrap();
    assert_eq!(f.ledger.get_failed_synchronizations().await.len(), 3);

    let results = f.dispatcher.retry_failed_synchronizations(&f.services).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    let failed = f.ledger.get_failed_synchronizations().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].entity_id, "99");
}

#[tokio::test]
async fn test_unknown_status_is_synthetic_pending() {
    let f = fixture(RecordingWms::new());
    let status = f.dispatcher.get_sync_status(EntityKind::SalesOrder, "3").await;
    assert_eq!(status.status, SyncState::Pending);
    assert_eq!(status.retry_count, 0);
    assert!(f.ledger.get_sync_status(EntityKind::SalesOrder, "3").await.is_none());
}

#[tokio::test]
async fn test_update_order_status() {
    let f = fixture(RecordingWms::new());
    let result = f
        .dispatcher
        .update_order_status(EntityKind::SalesOrder, 12, OrderStatus::Shipped)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(f.wms.ops(), vec!["update_sales_order_status"]);

    let err = f
        .dispatcher
        .update_order_status(EntityKind::Product, 12, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn test_sales_order_push() {
    let f = fixture(RecordingWms::new());
    let order = SalesOrder {
        order_id: 5,
        processing_date: Utc::now(),
        customer_id: 1,
        shipment_address: "Dock".into(),
        lines: vec![],
    };
    let result = f
        .dispatcher
        .synchronize(&f.services, &order.into_domain(), SyncMode::Updated)
        .await;
    assert!(result.success);
    assert_eq!(f.wms.ops(), vec!["send_sales_order"]);
}
