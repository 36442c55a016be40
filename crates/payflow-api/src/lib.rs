//! HTTP surface for the billing pipeline
//!
//! Hosts both logical services' endpoints: subscription lifecycle and
//! usage metering, the signed payment-webhook ingestion endpoint, and
//! the payment service's internal processing endpoint.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{router, serve};
pub use state::AppState;
