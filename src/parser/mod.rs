//! XML file parsing.
//!
//! A file holds exactly one entity kind under a fixed root element. Malformed input is
//! a data-quality problem, not a pipeline failure: every entry point returns a
//! [`ParseOutcome`] and logs a warning instead of returning an error.

mod documents;

use crate::core::{EntityKind, Result, SyncError};
use crate::model::{Customer, DomainRecord, Product, PurchaseOrder, SalesOrder};
use documents::{CustomersXml, ProductsXml, PurchaseOrdersXml, SalesOrdersXml, XmlDocument};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(Vec<T>),
    /// The document was well formed but had no child records.
    Empty,
    /// The document could not be read as the expected layout.
    Invalid { reason: String },
}

impl<T> ParseOutcome<T> {
    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Parsed(records) => records,
            Self::Empty | Self::Invalid { .. } => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Parsed(records) => records.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ParseOutcome<U> {
        match self {
            Self::Parsed(records) => ParseOutcome::Parsed(records.into_iter().map(f).collect()),
            Self::Empty => ParseOutcome::Empty,
            Self::Invalid { reason } => ParseOutcome::Invalid { reason },
        }
    }
}

pub fn parse_customers(xml: &str) -> ParseOutcome<Customer> {
    parse_document::<CustomersXml>(xml)
}

pub fn parse_products(xml: &str) -> ParseOutcome<Product> {
    parse_document::<ProductsXml>(xml)
}

pub fn parse_purchase_orders(xml: &str) -> ParseOutcome<PurchaseOrder> {
    parse_document::<PurchaseOrdersXml>(xml)
}

pub fn parse_sales_orders(xml: &str) -> ParseOutcome<SalesOrder> {
    parse_document::<SalesOrdersXml>(xml)
}

/// Parses a file of the given kind into kind-erased records.
pub fn parse_file(kind: EntityKind, xml: &str) -> ParseOutcome<DomainRecord> {
    match kind {
        EntityKind::Customer => parse_customers(xml).map(DomainRecord::Customer),
        EntityKind::Product => parse_products(xml).map(DomainRecord::Product),
        EntityKind::PurchaseOrder => parse_purchase_orders(xml).map(DomainRecord::PurchaseOrder),
        EntityKind::SalesOrder => parse_sales_orders(xml).map(DomainRecord::SalesOrder),
    }
}

fn parse_document<D: XmlDocument>(xml: &str) -> ParseOutcome<D::Item> {
    match try_parse_document::<D>(xml) {
        Ok(items) if items.is_empty() => {
            warn!(root = D::ROOT, "XML document contains no records");
            ParseOutcome::Empty
        }
        Ok(items) => ParseOutcome::Parsed(items),
        Err(err) => {
            warn!(root = D::ROOT, error = %err, "unable to parse XML document");
            ParseOutcome::Invalid {
                reason: err.to_string(),
            }
        }
    }
}

fn try_parse_document<D: XmlDocument>(xml: &str) -> Result<Vec<D::Item>> {
    let root = root_element(xml)?;
    if root != D::ROOT {
        return Err(SyncError::Parse(format!(
            "expected root element <{}>, found <{}>",
            D::ROOT,
            root
        )));
    }
    let document: D = quick_xml::de::from_str(xml)
        .map_err(|err| SyncError::Parse(format!("XML parse error: {err}")))?;
    document.into_items()
}

fn root_element(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = e.local_name();
                return Ok(String::from_utf8_lossy(name.as_ref()).into_owned());
            }
            Ok(Event::Eof) => {
                return Err(SyncError::Parse("document has no root element".to_string()));
            }
            Err(e) => {
                return Err(SyncError::Parse(format!(
                    "XML parse error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const CUSTOMERS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Customers>
  <Customer>
    <CustomerID>7</CustomerID>
    <Name>Acme &amp; Sons</Name>
    <Address>1 Industrial Way</Address>
  </Customer>
  <Customer>
    <CustomerID>8</CustomerID>
    <Name>Globex</Name>
    <Address>2 Main St</Address>
  </Customer>
</Customers>"#;

    const SALES_ORDERS: &str = r#"<SalesOrders>
  <SalesOrder>
    <OrderID>501</OrderID>
    <ProcessingDate>2024-05-01T08:30:00</ProcessingDate>
    <CustomerID>7</CustomerID>
    <ShipmentAddress>Dock 4</ShipmentAddress>
    <OrderDetails>
      <OrderDetail><ProductCode>P-1</ProductCode><Quantity>2</Quantity></OrderDetail>
      <OrderDetail><ProductCode>P-2</ProductCode><Quantity>5</Quantity></OrderDetail>
    </OrderDetails>
  </SalesOrder>
</SalesOrders>"#;

    #[test]
    fn test_parse_customers() {
        let customers = parse_customers(CUSTOMERS).into_records();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].customer_id, 7);
        assert_eq!(customers[0].name, "Acme & Sons");
        assert_eq!(customers[1].address, "2 Main St");
    }

    #[test]
    fn test_parse_sales_order_with_lines() {
        let orders = parse_sales_orders(SALES_ORDERS).into_records();
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.order_id, 501);
        assert_eq!(order.shipment_address, "Dock 4");
        assert_eq!(
            order.processing_date,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
        );
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[1].product_code, "P-2");
        assert_eq!(order.lines[1].quantity, 5);
    }

    #[test]
    fn test_parse_purchase_order_without_details() {
        let xml = r#"<PurchaseOrders><PurchaseOrder>
            <OrderID>1</OrderID><ProcessingDate>2024-01-02</ProcessingDate><CustomerID>3</CustomerID>
        </PurchaseOrder></PurchaseOrders>"#;
        let orders = parse_purchase_orders(xml).into_records();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].lines.is_empty());
    }

    #[test]
    fn test_malformed_document_is_invalid() {
        let outcome = parse_customers("<Customers><Customer><CustomerID>7</Customer>");
        assert!(outcome.is_invalid());
        assert!(outcome.into_records().is_empty());
    }

    #[test]
    fn test_wrong_root_is_invalid() {
        let outcome = parse_products(CUSTOMERS);
        assert!(outcome.is_invalid());
    }

    #[test]
    fn test_empty_root_is_empty() {
        assert_eq!(parse_customers("<Customers/>"), ParseOutcome::Empty);
        assert_eq!(parse_customers("<Customers></Customers>"), ParseOutcome::Empty);
        assert!(parse_customers("").is_invalid());
    }

    #[test]
    fn test_bad_date_is_invalid() {
        let xml = r#"<PurchaseOrders><PurchaseOrder>
            <OrderID>1</OrderID><ProcessingDate>yesterday</ProcessingDate><CustomerID>3</CustomerID>
        </PurchaseOrder></PurchaseOrders>"#;
        assert!(parse_purchase_orders(xml).is_invalid());
    }

    #[test]
    fn test_parse_file_dispatches_on_kind() {
        let records = parse_file(EntityKind::Customer, CUSTOMERS).into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), EntityKind::Customer);
        assert_eq!(records[0].entity_id(), "7");
    }
}
