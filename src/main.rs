//! Discovery Aggregator: binary entrypoint.
//! Boots the Axum HTTP server with the discovery engine, metrics and permissive CORS.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use discovery_aggregator::api::{self, AppState};
use discovery_aggregator::metrics::Metrics;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("discovery_aggregator=info,warn"));

    // A subscriber may already be installed by the runtime.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let state = AppState::from_env()?;
    let router = match Metrics::init() {
        Ok(m) => api::router_with_metrics(state, &m),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder unavailable; /metrics disabled");
            api::router(state)
        }
    };

    Ok(router.into())
}
