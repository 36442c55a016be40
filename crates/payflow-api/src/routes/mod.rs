//! Route handlers

pub mod health;
pub mod payments;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;
