//! Paystack-style payment gateway adapters.

mod client;
mod mock_gateway;
mod wire;

pub use client::{PaystackConfig, PaystackGateway, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use mock_gateway::{GatewayCall, MockPaymentGateway};
