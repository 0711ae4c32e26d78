//! Outbound interface to the warehouse management system.

pub mod http;

use crate::core::Result;
use crate::model::{Customer, Product, PurchaseOrder, SalesOrder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use http::HttpWmsClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    OnHold,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "New",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::OnHold => "OnHold",
        };
        f.write_str(name)
    }
}

impl FromStr for OrderStatus {
    type Err = crate::core::SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "new" => Ok(Self::New),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "onhold" => Ok(Self::OnHold),
            _ => Err(crate::core::SyncError::Parse(format!(
                "unknown order status '{s}'"
            ))),
        }
    }
}

/// Client for the WMS API.
///
/// `Ok(false)` means the WMS answered and rejected the request; `Err` means the call
/// itself failed (connection, timeout, undecodable response).
#[async_trait]
pub trait WmsClient: Send + Sync {
    async fn send_customer(&self, customer: &Customer) -> Result<bool>;
    async fn update_customer(&self, customer: &Customer) -> Result<bool>;
    async fn send_product(&self, product: &Product) -> Result<bool>;
    async fn update_product(&self, product: &Product) -> Result<bool>;
    async fn send_purchase_order(&self, order: &PurchaseOrder) -> Result<bool>;
    async fn update_purchase_order_status(&self, order_id: i32, status: OrderStatus)
        -> Result<bool>;
    async fn send_sales_order(&self, order: &SalesOrder) -> Result<bool>;
    async fn update_sales_order_status(&self, order_id: i32, status: OrderStatus) -> Result<bool>;
    async fn ping(&self) -> Result<bool>;
    async fn version(&self) -> Result<String>;
}
