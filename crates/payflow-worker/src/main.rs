//! Worker process
//!
//! Hosts the queue worker loops, the delayed-queue pump, and the
//! visibility sweeper for one or both service roles. Shutdown is
//! propagated through a watch channel: workers finish their in-flight
//! handler, and anything that outlives the grace period is recovered by
//! the sweeper once its lock expires.

use clap::{Parser, ValueEnum};
use payflow_core::cache::{RedisPool, UsageCounter};
use payflow_core::jobs::{
    payment_queues, policy_for, subscription_queues, DelayedQueuePump, IdempotencyLock,
    JobLogger, JobQueue, VisibilitySweeper, Worker, QUEUE_PAYMENT_INITIATION, QUEUE_PLAN_CHANGE,
    QUEUE_REFUND_INITIATION, QUEUE_SUBSCRIPTION_UPDATE, QUEUE_TRIAL_PAYMENT, QUEUE_USAGE_SYNC,
};
use payflow_core::payment::MockGateway;
use payflow_core::repository::{
    create_pool, PostgresJobLogRepository, PostgresPlanRepository,
    PostgresSubscriptionRepository, PostgresTransactionRepository, PostgresUsageRepository,
    PostgresWebhookDeliveryRepository,
};
use payflow_core::services::{AuthService, PaymentService, UsageService};
use payflow_core::webhook::WebhookClient;
use payflow_core::workers::{
    PaymentInitiationHandler, RefundInitiationHandler, SubscriptionUpdateHandler,
    UsageSyncHandler,
};
use payflow_core::Config;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// Subscription-side queues only
    Subscription,
    /// Payment-side queues only
    Payment,
    /// Both roles in one process
    All,
}

#[derive(Parser)]
#[command(name = "payflow-worker", about = "Queue worker process for payflow")]
struct Args {
    /// Configuration file path
    #[arg(long, env = "PAYFLOW_CONFIG")]
    config: Option<String>,

    /// Which service's queues to work
    #[arg(long, value_enum, default_value_t = Role::All)]
    role: Role,
}

fn spawn_worker(worker: Worker, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let worker = Arc::new(worker);
    tokio::spawn(async move { worker.run(shutdown).await })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let db = create_pool(&config.database.url, config.database.pool_size).await?;
    let redis = RedisPool::connect(config.redis.clone()).await?;
    let job_logs = Arc::new(PostgresJobLogRepository::new(db.clone()));

    let idle_sleep = std::time::Duration::from_millis(config.worker.idle_sleep_ms);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut monitored: Vec<&'static str> = Vec::new();

    if matches!(args.role, Role::Subscription | Role::All) {
        let logger = JobLogger::new("subscription", job_logs.clone());
        let auth = AuthService::new(
            config.server.jwt_secret.clone(),
            config.server.token_expire_minutes,
        );

        let initiation: Arc<dyn payflow_core::JobHandler> = Arc::new(PaymentInitiationHandler::new(
            config.webhook.payment_service_url.clone(),
            auth,
            config.webhook.timeout_seconds,
        )?);

        for queue_name in [QUEUE_PAYMENT_INITIATION, QUEUE_TRIAL_PAYMENT, QUEUE_PLAN_CHANGE] {
            let worker = Worker::new(
                JobQueue::new(redis.clone(), queue_name),
                policy_for(queue_name),
                IdempotencyLock::new(redis.clone()),
                logger.clone(),
            )
            .with_fallback(initiation.clone())
            .with_idle_sleep(idle_sleep);
            tasks.push(spawn_worker(worker, shutdown_rx.clone()));
        }

        let subscriptions = Arc::new(PostgresSubscriptionRepository::new(db.clone()));
        let plans = Arc::new(PostgresPlanRepository::new(db.clone()));
        let usage_repo = Arc::new(PostgresUsageRepository::new(db.clone()));
        let usage = Arc::new(UsageService::new(
            subscriptions,
            plans,
            usage_repo,
            UsageCounter::new(redis.clone()),
            JobQueue::new(redis.clone(), QUEUE_USAGE_SYNC),
        ));

        let usage_worker = Worker::new(
            JobQueue::new(redis.clone(), QUEUE_USAGE_SYNC),
            policy_for(QUEUE_USAGE_SYNC),
            IdempotencyLock::new(redis.clone()),
            logger,
        )
        .with_fallback(Arc::new(UsageSyncHandler::new(usage)))
        .with_idle_sleep(idle_sleep);
        tasks.push(spawn_worker(usage_worker, shutdown_rx.clone()));

        let pump = DelayedQueuePump::new(
            redis.clone(),
            subscription_queues(),
            std::time::Duration::from_secs(config.worker.pump_interval_seconds),
        );
        let pump_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { pump.run(pump_rx).await }));

        let sweeper = VisibilitySweeper::new(
            redis.clone(),
            subscription_queues(),
            std::time::Duration::from_secs(config.worker.sweep_interval_seconds),
        );
        let sweeper_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { sweeper.run(sweeper_rx).await }));

        monitored.extend(subscription_queues());
    }

    if matches!(args.role, Role::Payment | Role::All) {
        let logger = JobLogger::new("payment", job_logs);
        let deliveries = Arc::new(PostgresWebhookDeliveryRepository::new(db.clone()));
        let transactions = Arc::new(PostgresTransactionRepository::new(db.clone()));

        let webhook_client = WebhookClient::new(
            config.webhook.subscription_service_url.clone(),
            config.webhook.outbound_signing_secret.clone(),
            config.webhook.timeout_seconds,
            config.webhook.max_retries,
        )?;

        let payments = Arc::new(PaymentService::new(
            transactions,
            deliveries.clone(),
            Arc::new(MockGateway::new(config.gateway.clone())),
            webhook_client.clone(),
            redis.clone(),
        ));

        let update_worker = Worker::new(
            JobQueue::new(redis.clone(), QUEUE_SUBSCRIPTION_UPDATE),
            policy_for(QUEUE_SUBSCRIPTION_UPDATE),
            IdempotencyLock::new(redis.clone()),
            logger.clone(),
        )
        .with_fallback(Arc::new(SubscriptionUpdateHandler::new(
            webhook_client,
            Some(deliveries),
        )))
        .with_idle_sleep(idle_sleep);
        tasks.push(spawn_worker(update_worker, shutdown_rx.clone()));

        let refund_worker = Worker::new(
            JobQueue::new(redis.clone(), QUEUE_REFUND_INITIATION),
            policy_for(QUEUE_REFUND_INITIATION),
            IdempotencyLock::new(redis.clone()),
            logger,
        )
        .with_fallback(Arc::new(RefundInitiationHandler::new(payments)))
        .with_idle_sleep(idle_sleep);
        tasks.push(spawn_worker(refund_worker, shutdown_rx.clone()));

        let pump = DelayedQueuePump::new(
            redis.clone(),
            payment_queues(),
            std::time::Duration::from_secs(config.worker.pump_interval_seconds),
        );
        let pump_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { pump.run(pump_rx).await }));

        let sweeper = VisibilitySweeper::new(
            redis.clone(),
            payment_queues(),
            std::time::Duration::from_secs(config.worker.sweep_interval_seconds),
        );
        let sweeper_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { sweeper.run(sweeper_rx).await }));

        monitored.extend(payment_queues());
    }

    // Periodic queue-depth report.
    {
        let redis = redis.clone();
        let mut health_rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            while !*health_rx.borrow() {
                for name in &monitored {
                    let queue = JobQueue::new(redis.clone(), *name);
                    if let (Ok(active), Ok(delayed), Ok(failed)) = (
                        queue.len_active().await,
                        queue.len_delayed().await,
                        queue.len_failed().await,
                    ) {
                        if active > 1000 {
                            warn!("Queue depth high: queue={}, depth={}", name, active);
                        }
                        info!(
                            "Queue depth: queue={}, active={}, delayed={}, failed={}",
                            name, active, delayed, failed
                        );
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(60)) => {}
                    _ = health_rx.changed() => {}
                }
            }
        }));
    }

    info!("Worker process started: role={:?}", args.role);

    wait_for_shutdown_signal().await;
    info!("Shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        let _ = task.await;
    }

    info!("Worker process stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
