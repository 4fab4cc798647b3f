use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Hosted gateway API base URL
const GATEWAY_BASE_URL: &str = "https://api.razorpay.com/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Order creation payload in the gateway's format. Amounts are in minor
/// currency units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayOrder {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: OrderNotes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderNotes {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway rejected order with status {status}")]
    Rejected { status: u16, body: Value },

    #[error("Gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    /// Best-effort human readable reason: the gateway's error description,
    /// else its raw body, else the transport error.
    pub fn details(&self) -> String {
        match self {
            GatewayError::Rejected { body, .. } => body
                .pointer("/error/description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| match body {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            GatewayError::Transport(e) => e.to_string(),
        }
    }
}

/// Hosted payment gateway that creates orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the gateway's order object unchanged.
    async fn create_order(&self, order: &GatewayOrder) -> Result<Value, GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_order(&self, order: &GatewayOrder) -> Result<Value, GatewayError> {
        (**self).create_order(order).await
    }
}

pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: GATEWAY_BASE_URL.to_string(),
            key_id,
            key_secret,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, order: &GatewayOrder) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(order)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(receipt = %order.receipt, "Gateway order created");
        Ok(body)
    }
}
