use super::{RecordStore, Session};
use crate::core::{EntityKind, Lookup, Result, SyncError};
use crate::model::{Customer, DomainRecord, Product, PurchaseOrder, Record, SalesOrder};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Per-kind persistence operations used by the pipeline.
#[async_trait]
pub trait RecordService<T: Record>: Send + Sync {
    async fn find(&self, key: &T::Key) -> Result<Lookup<T>>;

    /// Fails with `Conflict` if a record with the same key exists.
    async fn create(&self, record: &T) -> Result<T>;

    /// Fails with `NotFound` if no record with the key exists.
    async fn update(&self, record: &T) -> Result<T>;
}

/// The four services of one unit of work.
#[derive(Clone)]
pub struct DomainServices {
    pub customers: Arc<dyn RecordService<Customer>>,
    pub products: Arc<dyn RecordService<Product>>,
    pub purchase_orders: Arc<dyn RecordService<PurchaseOrder>>,
    pub sales_orders: Arc<dyn RecordService<SalesOrder>>,
}

/// Records that have a service in [`DomainServices`].
pub trait Managed: Record {
    fn service(services: &DomainServices) -> &Arc<dyn RecordService<Self>>;
}

impl Managed for Customer {
    fn service(services: &DomainServices) -> &Arc<dyn RecordService<Self>> {
        &services.customers
    }
}

impl Managed for Product {
    fn service(services: &DomainServices) -> &Arc<dyn RecordService<Self>> {
        &services.products
    }
}

impl Managed for PurchaseOrder {
    fn service(services: &DomainServices) -> &Arc<dyn RecordService<Self>> {
        &services.purchase_orders
    }
}

impl Managed for SalesOrder {
    fn service(services: &DomainServices) -> &Arc<dyn RecordService<Self>> {
        &services.sales_orders
    }
}

impl DomainServices {
    pub fn of<T: Managed>(&self) -> &Arc<dyn RecordService<T>> {
        T::service(self)
    }

    /// Looks up the current record for a ledger `(kind, id)` pair.
    pub async fn resolve(&self, kind: EntityKind, id: &str) -> Result<Lookup<DomainRecord>> {
        match kind {
            EntityKind::Customer => self.resolve_as::<Customer>(id).await,
            EntityKind::Product => self.resolve_as::<Product>(id).await,
            EntityKind::PurchaseOrder => self.resolve_as::<PurchaseOrder>(id).await,
            EntityKind::SalesOrder => self.resolve_as::<SalesOrder>(id).await,
        }
    }

    async fn resolve_as<T: Managed>(&self, id: &str) -> Result<Lookup<DomainRecord>> {
        let key = T::parse_key(id)?;
        Ok(self.of::<T>().find(&key).await?.map(T::into_domain))
    }
}

/// Hands out a fresh [`DomainServices`] for each unit of work.
pub trait ServiceScope: Send + Sync {
    fn open_scope(&self) -> DomainServices;
}

pub struct StoreScope {
    store: Arc<RecordStore>,
}

impl StoreScope {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

impl ServiceScope for StoreScope {
    fn open_scope(&self) -> DomainServices {
        let session = Arc::new(Session::new(self.store.clone()));
        DomainServices {
            customers: Arc::new(StoreService::<Customer>::new(session.clone())),
            products: Arc::new(StoreService::<Product>::new(session.clone())),
            purchase_orders: Arc::new(StoreService::<PurchaseOrder>::new(session.clone())),
            sales_orders: Arc::new(StoreService::<SalesOrder>::new(session)),
        }
    }
}

/// [`RecordService`] backed by a store [`Session`], with business validation.
pub struct StoreService<T> {
    session: Arc<Session>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> StoreService<T> {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            _record: PhantomData,
        }
    }

    async fn check(&self, record: &T) -> Result<()> {
        record.validate()?;
        for reference in record.references() {
            if self.session.exists(reference.kind, &reference.id).await {
                continue;
            }
            match reference.kind {
                // A missing product is skipped later when the order is synchronized.
                EntityKind::Product => warn!(
                    kind = %T::KIND,
                    id = %record.key(),
                    product = %reference.id,
                    "record references an unknown product"
                ),
                kind => {
                    return Err(SyncError::Validation(format!(
                        "{} '{}' references unknown {} '{}'",
                        T::KIND,
                        record.key(),
                        kind,
                        reference.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Record> RecordService<T> for StoreService<T> {
    async fn find(&self, key: &T::Key) -> Result<Lookup<T>> {
        Ok(self.session.load::<T>(key).await?.into())
    }

    async fn create(&self, record: &T) -> Result<T> {
        self.check(record).await?;
        self.session.insert(record).await
    }

    async fn update(&self, record: &T) -> Result<T> {
        self.check(record).await?;
        self.session.replace(record).await
    }
}
