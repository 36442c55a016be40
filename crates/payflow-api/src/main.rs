use payflow_api::{serve, AppState};
use payflow_core::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> payflow_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::build(config).await?;
    serve(state, &host, port).await
}
