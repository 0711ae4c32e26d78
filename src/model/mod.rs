//! Domain records produced by the parser and persisted by the store.
//!
//! Each record carries a natural key (numeric id or product code); the store and the
//! sync ledger address records by `(EntityKind, key)`.

use crate::core::{EntityKind, Result, SyncError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A record referenced by another record (an order's customer or line products).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: EntityKind,
    pub id: String,
}

impl Reference {
    pub fn new(kind: EntityKind, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

pub trait Record: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    const KIND: EntityKind;

    fn key(&self) -> Self::Key;

    /// Parses a key from the string form used by the ledger and the store.
    fn parse_key(id: &str) -> Result<Self::Key>;

    /// Field-level business rules. Cross-record rules live in the store services.
    fn validate(&self) -> Result<()>;

    /// Records that must exist for this one to be meaningful downstream.
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn into_domain(self) -> DomainRecord;

    fn entity_id(&self) -> String {
        self.key().to_string()
    }
}

fn parse_numeric_key(kind: EntityKind, id: &str) -> Result<i32> {
    id.trim()
        .parse::<i32>()
        .map_err(|_| SyncError::Parse(format!("invalid {kind} id '{id}'")))
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::Validation(format!("{what} is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    #[serde(rename = "CustomerID")]
    pub customer_id: i32,
    pub name: String,
    pub address: String,
}

impl Record for Customer {
    type Key = i32;

    const KIND: EntityKind = EntityKind::Customer;

    fn key(&self) -> i32 {
        self.customer_id
    }

    fn parse_key(id: &str) -> Result<i32> {
        parse_numeric_key(Self::KIND, id)
    }

    fn validate(&self) -> Result<()> {
        require(&self.name, "Customer name")?;
        require(&self.address, "Customer address")
    }

    fn into_domain(self) -> DomainRecord {
        DomainRecord::Customer(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub product_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimensions: String,
}

impl Record for Product {
    type Key = String;

    const KIND: EntityKind = EntityKind::Product;

    fn key(&self) -> String {
        self.product_code.clone()
    }

    fn parse_key(id: &str) -> Result<String> {
        let code = id.trim();
        if code.is_empty() {
            return Err(SyncError::Parse("empty product code".to_string()));
        }
        Ok(code.to_string())
    }

    fn validate(&self) -> Result<()> {
        require(&self.product_code, "Product code")?;
        require(&self.title, "Product title")
    }

    fn into_domain(self) -> DomainRecord {
        DomainRecord::Product(self)
    }
}

/// One order line: a product code and a strictly positive quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderLine {
    pub product_code: String,
    pub quantity: i32,
}

fn validate_lines(kind: EntityKind, order_id: i32, lines: &[OrderLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(SyncError::Validation(format!(
            "{kind} {order_id} must have at least one line"
        )));
    }
    for line in lines {
        require(&line.product_code, "Order line product code")?;
        if line.quantity <= 0 {
            return Err(SyncError::Validation(format!(
                "{kind} {order_id}: quantity for '{}' must be greater than zero",
                line.product_code
            )));
        }
    }
    Ok(())
}

fn order_references(customer_id: i32, lines: &[OrderLine]) -> Vec<Reference> {
    let mut refs = vec![Reference::new(EntityKind::Customer, customer_id)];
    for line in lines {
        let reference = Reference::new(EntityKind::Product, &line.product_code);
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }
    refs
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PurchaseOrder {
    #[serde(rename = "OrderID")]
    pub order_id: i32,
    pub processing_date: DateTime<Utc>,
    #[serde(rename = "CustomerID")]
    pub customer_id: i32,
    #[serde(rename = "Items")]
    pub lines: Vec<OrderLine>,
}

impl Record for PurchaseOrder {
    type Key = i32;

    const KIND: EntityKind = EntityKind::PurchaseOrder;

    fn key(&self) -> i32 {
        self.order_id
    }

    fn parse_key(id: &str) -> Result<i32> {
        parse_numeric_key(Self::KIND, id)
    }

    fn validate(&self) -> Result<()> {
        validate_lines(Self::KIND, self.order_id, &self.lines)
    }

    fn references(&self) -> Vec<Reference> {
        order_references(self.customer_id, &self.lines)
    }

    fn into_domain(self) -> DomainRecord {
        DomainRecord::PurchaseOrder(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalesOrder {
    #[serde(rename = "OrderID")]
    pub order_id: i32,
    pub processing_date: DateTime<Utc>,
    #[serde(rename = "CustomerID")]
    pub customer_id: i32,
    #[serde(default)]
    pub shipment_address: String,
    #[serde(rename = "Items")]
    pub lines: Vec<OrderLine>,
}

impl Record for SalesOrder {
    type Key = i32;

    const KIND: EntityKind = EntityKind::SalesOrder;

    fn key(&self) -> i32 {
        self.order_id
    }

    fn parse_key(id: &str) -> Result<i32> {
        parse_numeric_key(Self::KIND, id)
    }

    fn validate(&self) -> Result<()> {
        validate_lines(Self::KIND, self.order_id, &self.lines)
    }

    fn references(&self) -> Vec<Reference> {
        order_references(self.customer_id, &self.lines)
    }

    fn into_domain(self) -> DomainRecord {
        DomainRecord::SalesOrder(self)
    }
}

/// Any record, for code paths that dispatch on the entity kind at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainRecord {
    Customer(Customer),
    Product(Product),
    PurchaseOrder(PurchaseOrder),
    SalesOrder(SalesOrder),
}

impl DomainRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Customer(_) => EntityKind::Customer,
            Self::Product(_) => EntityKind::Product,
            Self::PurchaseOrder(_) => EntityKind::PurchaseOrder,
            Self::SalesOrder(_) => EntityKind::SalesOrder,
        }
    }

    pub fn entity_id(&self) -> String {
        match self {
            Self::Customer(c) => c.entity_id(),
            Self::Product(p) => p.entity_id(),
            Self::PurchaseOrder(o) => o.entity_id(),
            Self::SalesOrder(o) => o.entity_id(),
        }
    }
}
