#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use wms_file_sync::config::{AppConfig, StorageSettings};
use wms_file_sync::{
    Customer, FileProcessingConfig, OrderStatus, Product, PurchaseOrder, Result, SalesOrder,
    SyncError, WatcherConfig, WmsClient,
};

/// In-process WMS: records call names, fails every call while offline.
pub struct FakeWms {
    calls: Mutex<Vec<String>>,
    online: AtomicBool,
}

impl FakeWms {
    pub fn online() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        let wms = Self::online();
        wms.set_online(false);
        wms
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, name: String) -> Result<bool> {
        self.calls.lock().unwrap().push(name);
        if self.online.load(Ordering::SeqCst) {
            Ok(true)
        } else {
            Err(SyncError::Wms("connection refused".into()))
        }
    }
}

#[async_trait]
impl WmsClient for FakeWms {
    async fn send_customer(&self, customer: &Customer) -> Result<bool> {
        self.call(format!("send_customer:{}", customer.customer_id))
    }

    async fn update_customer(&self, customer: &Customer) -> Result<bool> {
        self.call(format!("update_customer:{}", customer.customer_id))
    }

    async fn send_product(&self, product: &Product) -> Result<bool> {
        self.call(format!("send_product:{}", product.product_code))
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        self.call(format!("update_product:{}", product.product_code))
    }

    async fn send_purchase_order(&self, order: &PurchaseOrder) -> Result<bool> {
        self.call(format!("send_purchase_order:{}", order.order_id))
    }

    async fn update_purchase_order_status(&self, order_id: i32, status: OrderStatus) -> Result<bool> {
        self.call(format!("update_purchase_order_status:{order_id}:{status}"))
    }

    async fn send_sales_order(&self, order: &SalesOrder) -> Result<bool> {
        self.call(format!("send_sales_order:{}", order.order_id))
    }

    async fn update_sales_order_status(&self, order_id: i32, status: OrderStatus) -> Result<bool> {
        self.call(format!("update_sales_order_status:{order_id}:{status}"))
    }

    async fn ping(&self) -> Result<bool> {
        Ok(self.online.load(Ordering::SeqCst))
    }

    async fn version(&self) -> Result<String> {
        Ok("fake".into())
    }
}

/// Configuration with one watcher per entity kind under `root/in/<kind>`, archiving
/// into `root/archive/<kind>` and keeping state in `root/data`.
pub fn config(root: &Path) -> AppConfig {
    let watchers = [
        ("customers", wms_file_sync::EntityKind::Customer),
        ("products", wms_file_sync::EntityKind::Product),
        ("purchase-orders", wms_file_sync::EntityKind::PurchaseOrder),
        ("sales-orders", wms_file_sync::EntityKind::SalesOrder),
    ]
    .into_iter()
    .map(|(name, kind)| {
        WatcherConfig::new(name, root.join("in").join(name), kind)
            .archive_to(root.join("archive").join(name))
            .max_retry_attempts(1)
    })
    .collect();

    AppConfig {
        file_processing: FileProcessingConfig {
            file_watchers: watchers,
            retry_base_delay_millis: 1,
            ..FileProcessingConfig::default()
        },
        storage: StorageSettings {
            data_directory: root.join("data"),
            ..StorageSettings::default()
        },
        ..AppConfig::default()
    }
}

pub fn drop_file(root: &Path, watcher: &str, name: &str, xml: &str) {
    let dir = root.join("in").join(watcher);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), xml).unwrap();
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub const CUSTOMERS: &str = r#"<Customers>
  <Customer><CustomerID>7</CustomerID><Name>Acme</Name><Address>1 Main St</Address></Customer>
  <Customer><CustomerID>8</CustomerID><Name>Globex</Name><Address>2 Side St</Address></Customer>
</Customers>"#;

pub const PRODUCTS: &str = r#"<Products>
  <Product><ProductCode>P-1</ProductCode><Title>Widget</Title><Dimensions>1x1x1</Dimensions></Product>
</Products>"#;

pub const PURCHASE_ORDERS: &str = r#"<PurchaseOrders>
  <PurchaseOrder>
    <OrderID>40</OrderID>
    <ProcessingDate>2024-05-01T08:30:00Z</ProcessingDate>
    <CustomerID>7</CustomerID>
    <OrderDetails>
      <OrderDetail><ProductCode>P-1</ProductCode><Quantity>3</Quantity></OrderDetail>
    </OrderDetails>
  </PurchaseOrder>
</PurchaseOrders>"#;
