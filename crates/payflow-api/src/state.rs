//! Shared application state

use payflow_core::cache::{RedisPool, UsageCounter};
use payflow_core::config::Config;
use payflow_core::jobs::{JobQueue, QUEUE_USAGE_SYNC};
use payflow_core::payment::MockGateway;
use payflow_core::repository::{
    create_pool, PostgresInboxRepository, PostgresPlanRepository,
    PostgresSubscriptionRepository, PostgresTransactionRepository, PostgresUsageRepository,
    PostgresUserRepository, PostgresWebhookDeliveryRepository,
};
use payflow_core::services::{
    AuthService, PaymentService, SubscriptionService, UsageService, WebhookService,
};
use payflow_core::webhook::WebhookClient;
use std::sync::Arc;

/// Process-wide services, constructed once at startup and cloned into
/// request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub subscriptions: Arc<SubscriptionService>,
    pub webhooks: Arc<WebhookService>,
    pub usage: Arc<UsageService>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    /// Wire up pools, repositories, and services from configuration.
    pub async fn build(config: Config) -> payflow_core::Result<Self> {
        let db = create_pool(&config.database.url, config.database.pool_size).await?;
        let redis = RedisPool::connect(config.redis.clone()).await?;

        let users = Arc::new(PostgresUserRepository::new(db.clone()));
        let plans = Arc::new(PostgresPlanRepository::new(db.clone()));
        let subscription_repo = Arc::new(PostgresSubscriptionRepository::new(db.clone()));
        let transactions = Arc::new(PostgresTransactionRepository::new(db.clone()));
        let usage_repo = Arc::new(PostgresUsageRepository::new(db.clone()));
        let inbox = Arc::new(PostgresInboxRepository::new(db.clone()));
        let deliveries = Arc::new(PostgresWebhookDeliveryRepository::new(db));

        let auth = AuthService::new(
            config.server.jwt_secret.clone(),
            config.server.token_expire_minutes,
        );

        let subscriptions = Arc::new(SubscriptionService::new(
            users,
            plans.clone(),
            subscription_repo.clone(),
            redis.clone(),
        ));

        let webhooks = Arc::new(WebhookService::new(
            subscription_repo.clone(),
            plans.clone(),
            inbox,
        ));

        let usage = Arc::new(UsageService::new(
            subscription_repo,
            plans,
            usage_repo,
            UsageCounter::new(redis.clone()),
            JobQueue::new(redis.clone(), QUEUE_USAGE_SYNC),
        ));

        let webhook_client = WebhookClient::new(
            config.webhook.subscription_service_url.clone(),
            config.webhook.outbound_signing_secret.clone(),
            config.webhook.timeout_seconds,
            config.webhook.max_retries,
        )?;

        let payments = Arc::new(PaymentService::new(
            transactions,
            deliveries,
            Arc::new(MockGateway::new(config.gateway.clone())),
            webhook_client,
            redis,
        ));

        Ok(Self {
            config: Arc::new(config),
            auth,
            subscriptions,
            webhooks,
            usage,
            payments,
        })
    }
}
