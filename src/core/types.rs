use super::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four record families that flow from files into the WMS.
///
/// Serialized with the same names the configuration file uses for `FileType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Customer,
    Product,
    PurchaseOrder,
    SalesOrder,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Customer,
        EntityKind::Product,
        EntityKind::PurchaseOrder,
        EntityKind::SalesOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Product => "Product",
            Self::PurchaseOrder => "PurchaseOrder",
            Self::SalesOrder => "SalesOrder",
        }
    }

    /// Orders depend on customers and products being present in the WMS first.
    pub fn is_order(&self) -> bool {
        matches!(self, Self::PurchaseOrder | Self::SalesOrder)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "customer" | "customers" => Ok(Self::Customer),
            "product" | "products" => Ok(Self::Product),
            "purchaseorder" | "purchaseorders" => Ok(Self::PurchaseOrder),
            "salesorder" | "salesorders" => Ok(Self::SalesOrder),
            _ => Err(SyncError::Parse(format!("unknown entity kind '{s}'"))),
        }
    }
}

/// Outcome of a lookup by natural key.
///
/// The error branch lives in the surrounding `Result`, so "not found" is never
/// confused with an I/O or parsing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::NotFound,
        }
    }
}
