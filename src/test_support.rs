//! In-crate fakes shared by unit tests.

use crate::core::{EntityKind, Result, SyncError};
use crate::model::{Customer, Product, PurchaseOrder, SalesOrder};
use crate::wms::{OrderStatus, WmsClient};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WmsCall {
    pub op: &'static str,
    pub kind: Option<EntityKind>,
    pub id: String,
}

/// Scripted response for the next WMS call.
#[derive(Debug, Clone)]
pub enum Reply {
    Accept,
    Reject,
    Fail(String),
}

/// Records every call and answers from a script, accepting once the script is empty.
#[derive(Default)]
pub struct RecordingWms {
    calls: Mutex<Vec<WmsCall>>,
    script: Mutex<VecDeque<Reply>>,
}

impl RecordingWms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(replies: impl IntoIterator<Item = Reply>) -> Self {
        let wms = Self::default();
        wms.script.lock().unwrap().extend(replies);
        wms
    }

    pub fn calls(&self) -> Vec<WmsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    fn answer(&self, op: &'static str, kind: Option<EntityKind>, id: String) -> Result<bool> {
        self.calls.lock().unwrap().push(WmsCall { op, kind, id });
        match self.script.lock().unwrap().pop_front().unwrap_or(Reply::Accept) {
            Reply::Accept => Ok(true),
            Reply::Reject => Ok(false),
            Reply::Fail(message) => Err(SyncError::Wms(message)),
        }
    }
}

#[async_trait]
impl WmsClient for RecordingWms {
    async fn send_customer(&self, customer: &Customer) -> Result<bool> {
        self.answer("send_customer", Some(EntityKind::Customer), customer.customer_id.to_string())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<bool> {
        self.answer("update_customer", Some(EntityKind::Customer), customer.customer_id.to_string())
    }

    async fn send_product(&self, product: &Product) -> Result<bool> {
        self.answer("send_product", Some(EntityKind::Product), product.product_code.clone())
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        self.answer("update_product", Some(EntityKind::Product), product.product_code.clone())
    }

    async fn send_purchase_order(&self, order: &PurchaseOrder) -> Result<bool> {
        self.answer(
            "send_purchase_order",
            Some(EntityKind::PurchaseOrder),
            order.order_id.to_string(),
        )
    }

    async fn update_purchase_order_status(&self, order_id: i32, _: OrderStatus) -> Result<bool> {
        self.answer(
            "update_purchase_order_status",
            Some(EntityKind::PurchaseOrder),
            order_id.to_string(),
        )
    }

    async fn send_sales_order(&self, order: &SalesOrder) -> Result<bool> {
        self.answer(
            "send_sales_order",
            Some(EntityKind::SalesOrder),
            order.order_id.to_string(),
        )
    }

    async fn update_sales_order_status(&self, order_id: i32, _: OrderStatus) -> Result<bool> {
        self.answer(
            "update_sales_order_status",
            Some(EntityKind::SalesOrder),
            order_id.to_string(),
        )
    }

    async fn ping(&self) -> Result<bool> {
        self.answer("ping", None, String::new())
    }

    async fn version(&self) -> Result<String> {
        Ok("test".to_string())
    }
}
