//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/billing/payments/initiate` - Start a hosted checkout
//! - `GET /api/billing/payments/:reference/confirm` - Verify and settle a payment
//! - `POST /api/billing/subscriptions/trial` - Start a trial
//! - `POST /api/billing/subscriptions/upgrade` - Move to a higher tier
//! - `POST /api/billing/subscriptions/downgrade` - Move to a lower tier
//! - `POST /api/billing/subscriptions/cancel` - Cancel now or at period end
//! - `GET /api/billing/subscriptions/current` - Current subscription
//! - `GET /api/billing/invoices` - Settled payments, newest first
//! - `POST /api/billing/admin/sweep` - Run the expiry sweep once
//! - `POST /api/webhooks/paystack` - Gateway webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState, BillingPorts, HttpPolicy};
pub use routes::{billing_router, billing_routes, webhook_routes};
