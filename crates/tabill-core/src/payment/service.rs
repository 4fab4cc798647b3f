use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::api::ApiClient;
use crate::models::{CustomerInfo, OrderRequest};

use super::gateway::{GatewayError, GatewayOrder, OrderNotes, PaymentGateway};

pub const MISSING_PARAMETERS: &str = "Missing required parameters: amount, currency, or userId";

const CREATE_FAILED: &str = "Failed to create order";

/// Where customer display info comes from.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_info(&self, uid: &str) -> Result<CustomerInfo>;
}

#[async_trait]
impl CustomerDirectory for ApiClient {
    async fn customer_info(&self, uid: &str) -> Result<CustomerInfo> {
        self.fetch_customer_info(uid).await
    }
}

#[async_trait]
impl<T: CustomerDirectory + ?Sized> CustomerDirectory for Arc<T> {
    async fn customer_info(&self, uid: &str) -> Result<CustomerInfo> {
        (**self).customer_info(uid).await
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{}", MISSING_PARAMETERS)]
    MissingParameters,

    #[error("Customer lookup failed: {0:#}")]
    CustomerLookup(anyhow::Error),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl PaymentError {
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::MissingParameters => 400,
            PaymentError::CustomerLookup(_) | PaymentError::Gateway(_) => 500,
        }
    }

    /// JSON error body returned to the caller.
    pub fn body(&self) -> Value {
        match self {
            PaymentError::MissingParameters => json!({ "error": MISSING_PARAMETERS }),
            PaymentError::CustomerLookup(e) => json!({
                "error": CREATE_FAILED,
                "details": format!("{:#}", e),
            }),
            PaymentError::Gateway(e) => json!({
                "error": CREATE_FAILED,
                "details": e.details(),
            }),
        }
    }
}

pub struct PaymentService<D, G> {
    directory: D,
    gateway: G,
}

impl<D: CustomerDirectory, G: PaymentGateway> PaymentService<D, G> {
    pub fn new(directory: D, gateway: G) -> Self {
        Self { directory, gateway }
    }

    pub async fn create_order(&self, request: OrderRequest) -> Result<Value, PaymentError> {
        let (amount, currency, user_id) = match request {
            OrderRequest {
                amount: Some(amount),
                currency: Some(currency),
                user_id: Some(user_id),
            } if amount.is_finite() && amount > 0.0 && !currency.is_empty() && !user_id.is_empty() => {
                (amount, currency, user_id)
            }
            _ => return Err(PaymentError::MissingParameters),
        };

        let customer = self.directory.customer_info(&user_id).await.map_err(|e| {
            error!(user_id = %user_id, error = %e, "Customer lookup failed");
            PaymentError::CustomerLookup(e)
        })?;

        let order = GatewayOrder {
            amount: to_minor_units(amount),
            currency,
            receipt: format!("receipt_{}", Utc::now().timestamp_millis()),
            notes: OrderNotes {
                user_id,
                name: customer.name.unwrap_or_default(),
                email: customer.email.unwrap_or_default(),
                phone: customer.phone.unwrap_or_default(),
            },
        };

        let created = self.gateway.create_order(&order).await.map_err(|e| {
            error!(receipt = %order.receipt, error = %e, details = %e.details(), "Order creation failed");
            PaymentError::from(e)
        })?;
        info!(receipt = %order.receipt, amount = order.amount, currency = %order.currency, "Order created");
        Ok(created)
    }
}

fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
