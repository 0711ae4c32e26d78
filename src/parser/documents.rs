use crate::core::{Result, SyncError};
use crate::model::{Customer, OrderLine, Product, PurchaseOrder, SalesOrder};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A file layout: the expected root element and how its children map to records.
pub(crate) trait XmlDocument: DeserializeOwned {
    const ROOT: &'static str;
    type Item;

    fn into_items(self) -> Result<Vec<Self::Item>>;
}

/// Accepts RFC 3339, a zone-less ISO timestamp (taken as UTC) or a bare date.
pub(crate) fn parse_processing_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(SyncError::Parse(format!("invalid ProcessingDate '{raw}'")))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomersXml {
    #[serde(rename = "Customer", default)]
    customers: Vec<CustomerXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CustomerXml {
    #[serde(rename = "CustomerID")]
    customer_id: i32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
}

impl XmlDocument for CustomersXml {
    const ROOT: &'static str = "Customers";
    type Item = Customer;

    fn into_items(self) -> Result<Vec<Customer>> {
        Ok(self
            .customers
            .into_iter()
            .map(|c| Customer {
                customer_id: c.customer_id,
                name: c.name,
                address: c.address,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsXml {
    #[serde(rename = "Product", default)]
    products: Vec<ProductXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProductXml {
    product_code: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    dimensions: String,
}

impl XmlDocument for ProductsXml {
    const ROOT: &'static str = "Products";
    type Item = Product;

    fn into_items(self) -> Result<Vec<Product>> {
        Ok(self
            .products
            .into_iter()
            .map(|p| Product {
                product_code: p.product_code,
                title: p.title,
                description: p.description,
                dimensions: p.dimensions,
            })
            .collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct OrderDetailsXml {
    #[serde(rename = "OrderDetail", default)]
    details: Vec<OrderDetailXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OrderDetailXml {
    product_code: String,
    quantity: i32,
}

impl OrderDetailsXml {
    fn into_lines(self) -> Vec<OrderLine> {
        self.details
            .into_iter()
            .map(|d| OrderLine {
                product_code: d.product_code,
                quantity: d.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PurchaseOrdersXml {
    #[serde(rename = "PurchaseOrder", default)]
    orders: Vec<PurchaseOrderXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PurchaseOrderXml {
    #[serde(rename = "OrderID")]
    order_id: i32,
    processing_date: String,
    #[serde(rename = "CustomerID")]
    customer_id: i32,
    #[serde(default)]
    order_details: OrderDetailsXml,
}

impl XmlDocument for PurchaseOrdersXml {
    const ROOT: &'static str = "PurchaseOrders";
    type Item = PurchaseOrder;

    fn into_items(self) -> Result<Vec<PurchaseOrder>> {
        self.orders
            .into_iter()
            .map(|o| {
                Ok(PurchaseOrder {
                    order_id: o.order_id,
                    processing_date: parse_processing_date(&o.processing_date)?,
                    customer_id: o.customer_id,
                    lines: o.order_details.into_lines(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SalesOrdersXml {
    #[serde(rename = "SalesOrder", default)]
    orders: Vec<SalesOrderXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SalesOrderXml {
    #[serde(rename = "OrderID")]
    order_id: i32,
    processing_date: String,
    #[serde(rename = "CustomerID")]
    customer_id: i32,
    #[serde(default)]
    shipment_address: String,
    #[serde(default)]
    order_details: OrderDetailsXml,
}

impl XmlDocument for SalesOrdersXml {
    const ROOT: &'static str = "SalesOrders";
    type Item = SalesOrder;

    fn into_items(self) -> Result<Vec<SalesOrder>> {
        self.orders
            .into_iter()
            .map(|o| {
                Ok(SalesOrder {
                    order_id: o.order_id,
                    processing_date: parse_processing_date(&o.processing_date)?,
                    customer_id: o.customer_id,
                    shipment_address: o.shipment_address,
                    lines: o.order_details.into_lines(),
                })
            })
            .collect()
    }
}
