mod api;
mod downloader;
mod error;
mod geolocation;
mod integrations;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use api::AppState;
use integrations::evse::{start_evse_poller, EvseConfig, EvseCoordinator};
use integrations::warnings::{start_warnings_poller, WarningsConfig};
use integrations::weather_locations::{start_weather_locations_poller, WeatherLocationsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stuga=debug")),
        )
        .init();

    tracing::info!("Starting stuga v{}", env!("CARGO_PKG_VERSION"));

    let state_machine = state::StateMachine::new(4096);
    let app_state = Arc::new(AppState {
        state_machine,
        evse: EvseCoordinator::new(),
    });

    // SMHI warnings poller, with an optional stride override for dense polygons
    let mut warnings_config = WarningsConfig::default();
    if let Some(stride) = std::env::var("STUGA_WARNING_STRIDE")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        warnings_config.sample_stride = stride;
    }
    start_warnings_poller(app_state.clone(), warnings_config);

    // SMHI city forecasts poller
    start_weather_locations_poller(app_state.clone(), WeatherLocationsConfig::default());

    // EVSE poller, only when a charger host is configured
    match std::env::var("STUGA_EVSE_HOST") {
        Ok(host) if !host.is_empty() => {
            start_evse_poller(app_state.clone(), EvseConfig::new(host));
        }
        _ => tracing::info!("STUGA_EVSE_HOST not set — EVSE integration disabled"),
    }

    let app = api::router(app_state.clone());

    let port: u16 = std::env::var("STUGA_HTTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8126);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
