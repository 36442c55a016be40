//! Concrete queue handlers
//!
//! One handler per job kind, split by owning service:
//! - payment side: subscription-update delivery, refund initiation
//! - subscription side: payment initiation (HTTP call to the payment
//!   service), usage sync
//!
//! Handlers are pure over `(envelope) -> HandlerOutcome`; the worker
//! skeleton owns locking, retry, and dead-lettering.

pub mod payment;
pub mod subscription;
pub mod usage;

pub use payment::{RefundInitiationHandler, SubscriptionUpdateHandler};
pub use subscription::PaymentInitiationHandler;
pub use usage::UsageSyncHandler;
