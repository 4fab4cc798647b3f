//! Subscription payment orders.
//!
//! `PaymentService::create_order` validates the request, looks up the
//! customer's display info, and forwards order creation to the hosted
//! payment gateway. There is no retry or idempotency handling here; the
//! gateway's order object is returned as is.

pub mod gateway;
pub mod service;

pub use gateway::{GatewayError, GatewayOrder, OrderNotes, PaymentGateway, RazorpayGateway};
pub use service::{CustomerDirectory, PaymentError, PaymentService, MISSING_PARAMETERS};
