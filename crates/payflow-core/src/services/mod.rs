//! Business services
//!
//! Services orchestrate repositories, the queue substrate, and the
//! gateway. They hold no database transaction across a network call: a
//! gateway or webhook round-trip always happens between commits.

pub mod auth_service;
pub mod payment_service;
pub mod subscription_service;
pub mod usage_service;
pub mod webhook_service;

pub use auth_service::{AuthService, ServiceClaims};
pub use payment_service::{PaymentRequest, PaymentResponse, PaymentService};
pub use subscription_service::{
    CreateSubscriptionRequest, CreateTrialRequest, SubscriptionService,
};
pub use usage_service::{first_of_next_month, UsageCheckResponse, UsageService};
pub use webhook_service::{decide_transition, Transition, WebhookResponse, WebhookService};
