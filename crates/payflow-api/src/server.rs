//! Router assembly and server loop

use crate::routes::{health, payments, subscriptions, usage, webhooks};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Subscription service
        .route("/v1/subscriptions", post(subscriptions::create_subscription))
        .route(
            "/v1/subscriptions/trial",
            post(subscriptions::create_trial_subscription),
        )
        .route("/v1/subscriptions/:id", get(subscriptions::get_subscription))
        .route(
            "/v1/subscriptions/user/:user_id",
            get(subscriptions::list_user_subscriptions),
        )
        .route(
            "/v1/subscriptions/:id/change-plan",
            post(subscriptions::change_plan),
        )
        .route(
            "/v1/subscriptions/:id/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route("/v1/usage/use", post(usage::use_feature))
        .route("/v1/usage/:user_id", get(usage::get_user_usage))
        .route(
            "/v1/webhooks/payment",
            post(webhooks::receive_payment_webhook),
        )
        .route(
            "/v1/webhooks/payment/:event_id/status",
            get(webhooks::webhook_status),
        )
        // Payment service
        .route(
            "/v1/payments/internal/process",
            post(payments::process_internal_payment),
        )
        .route("/v1/payments/:id", get(payments::get_transaction))
        .route(
            "/v1/payments/subscription/:id",
            get(payments::list_subscription_transactions),
        )
        .route("/v1/payments/:id/refund", post(payments::refund_transaction))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, host: &str, port: u16) -> payflow_core::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
