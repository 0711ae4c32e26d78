use super::{OrderStatus, WmsClient};
use crate::config::WmsApiSettings;
use crate::core::{Result, SyncError};
use crate::model::{Customer, Product, PurchaseOrder, SalesOrder};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusBody {
    status: OrderStatus,
}

/// JSON-over-HTTP [`WmsClient`].
#[derive(Clone)]
pub struct HttpWmsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpWmsClient {
    pub fn new(settings: &WmsApiSettings) -> Result<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(SyncError::Config("WmsApi.BaseUrl is not configured".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1)))
            .build()
            .map_err(|err| SyncError::Config(format!("build WMS HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header(API_KEY_HEADER, &self.api_key)
        }
    }

    async fn execute(&self, label: &str, builder: RequestBuilder) -> Result<bool> {
        let response = builder
            .send()
            .await
            .map_err(|err| SyncError::Wms(format!("{label}: {err}")))?;
        let status = response.status();
        if status.is_success() {
            debug!(call = label, status = status.as_u16(), "WMS call succeeded");
            Ok(true)
        } else {
            warn!(call = label, status = status.as_u16(), "WMS rejected call");
            Ok(false)
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, label: &str, path: &str, body: &B) -> Result<bool> {
        self.execute(label, self.request(Method::POST, path).json(body))
            .await
    }

    async fn put<B: Serialize + ?Sized>(&self, label: &str, path: &str, body: &B) -> Result<bool> {
        self.execute(label, self.request(Method::PUT, path).json(body))
            .await
    }
}

#[async_trait]
impl WmsClient for HttpWmsClient {
    async fn send_customer(&self, customer: &Customer) -> Result<bool> {
        self.post("send_customer", "api/customers", customer).await
    }

    async fn update_customer(&self, customer: &Customer) -> Result<bool> {
        let path = format!("api/customers/{}", customer.customer_id);
        self.put("update_customer", &path, customer).await
    }

    async fn send_product(&self, product: &Product) -> Result<bool> {
        self.post("send_product", "api/products", product).await
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        let path = format!("api/products/{}", product.product_code);
        self.put("update_product", &path, product).await
    }

    async fn send_purchase_order(&self, order: &PurchaseOrder) -> Result<bool> {
        self.post("send_purchase_order", "api/purchaseorders", order)
            .await
    }

    async fn update_purchase_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<bool> {
        let path = format!("api/purchaseorders/{order_id}/status");
        self.put("update_purchase_order_status", &path, &StatusBody { status })
            .await
    }

    async fn send_sales_order(&self, order: &SalesOrder) -> Result<bool> {
        self.post("send_sales_order", "api/salesorders", order).await
    }

    async fn update_sales_order_status(&self, order_id: i32, status: OrderStatus) -> Result<bool> {
        let path = format!("api/salesorders/{order_id}/status");
        self.put("update_sales_order_status", &path, &StatusBody { status })
            .await
    }

    async fn ping(&self) -> Result<bool> {
        self.execute("ping", self.request(Method::GET, "api/system/ping"))
            .await
    }

    async fn version(&self) -> Result<String> {
        let response = self
            .request(Method::GET, "api/system/version")
            .send()
            .await
            .map_err(|err| SyncError::Wms(format!("version: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Wms(format!(
                "version: unexpected status {}",
                status.as_u16()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|err| SyncError::Wms(format!("version: {err}")))?;
        // The endpoint answers either a JSON string or plain text.
        Ok(serde_json::from_str::<String>(&text).unwrap_or(text))
    }
}
