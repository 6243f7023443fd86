use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upay::CounterStore;
use upay_gateway::{
    config::GatewayConfig, metrics::register_metrics, routes, state::open_counter_store,
    state::AppState,
};

/// Body limit for notification posts.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env().expect("Failed to load configuration");
    let port = config.port;

    tracing::info!("Starting upay-gateway on port {}", port);
    tracing::info!("Processor API: {}", config.api_base);
    tracing::info!("Identity header: {}", config.client_ip_header);

    let store = open_counter_store(&config.counter_backend)
        .expect("Failed to open rate limit counter store");
    match store {
        Some(ref store) => {
            tracing::info!(
                "Rate limit: {} orders per {}s per client ({} store)",
                config.rate_limit.max_attempts,
                config.rate_limit.window.as_secs(),
                store.backend()
            );
            spawn_counter_purge(store.clone(), config.rate_limit.window);
        }
        None => tracing::warn!("Rate limit: disabled"),
    }

    register_metrics();

    let state = AppState::new(config, store).expect("Failed to initialize gateway");
    let state_data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state_data.clone())
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .wrap(Logger::default())
            .configure(routes::configure)
            .default_service(web::to(routes::health::hello))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

/// Periodically drop expired counters so idle clients don't accumulate.
fn spawn_counter_purge(store: Arc<dyn CounterStore>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {n} expired rate limit counters"),
                Err(e) => tracing::warn!("Failed to purge rate limit counters: {e}"),
            }
        }
    });
}
