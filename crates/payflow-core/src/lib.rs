pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod payment;
pub mod repository;
pub mod services;
pub mod webhook;
pub mod workers;

// Re-export commonly used types
pub use cache::{MeterDecision, RedisPool, UsageCounter};
pub use config::Config;
pub use error::{Error, Result};
pub use jobs::{
    HandlerOutcome, JobEnvelope, JobHandler, JobQueue, QueuePolicy, Worker,
};
pub use models::{
    BillingCycle, PaymentAction, PaymentEventPayload, PaymentOutcome, Plan, Subscription,
    SubscriptionStatus, Transaction, TransactionStatus,
};
pub use payment::{MockGateway, PaymentGateway};
pub use repository::create_pool;
pub use services::{
    AuthService, PaymentService, SubscriptionService, UsageService, WebhookService,
};
pub use webhook::{WebhookClient, WebhookError};

/// Current version of payflow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
