use conference_portal::{config, db, payment, routes, state, storage};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conference_portal=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    storage::ensure_dirs(&config.upload_folder)?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(pool.as_ref()).await?;

    let blobs = Arc::new(storage::LocalBlobStore::new(
        config.upload_folder.clone(),
        config.public_base_url.clone(),
    ));
    let gateway = Arc::new(payment::HttpGatewayClient::new(&config.gateway.base_url)?);
    let state = Arc::new(state::AppState::new(
        config.clone(),
        state::Stores::postgres(pool),
        blobs,
        gateway,
    ));

    spawn_reconciliation(state.clone());

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(
        gateway_env = %config.gateway.env,
        "Conference portal listening on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically fails checkouts that were abandoned before any callback.
fn spawn_reconciliation(state: Arc<state::AppState>) {
    let max_age = state.config.payment_expiry;
    let mut interval = tokio::time::interval(state.config.reconcile_interval);

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            match state.payments.expire_stale(max_age).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "Expired abandoned payments"),
                Err(e) => tracing::warn!(error = %e, "Payment reconciliation failed"),
            }
        }
    });
}
