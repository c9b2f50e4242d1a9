// tour planner api

use anyhow::{anyhow, Context};
use axum::Router;
use shuttle_axum::ShuttleAxum;
use shuttle_runtime::SecretStore;
use tracing::info;

mod agent;
mod api;
mod config;
mod conversation;
mod error;
mod extractor;
mod models;
mod planner;
mod session;
mod weather;

use agent::{initialize_openai_client, RigAgent};
use api::{build_router, spawn_session_sweeper, AppState};
use config::{Settings, SECRET_KEYS};
use session::TripPlanner;
use weather::WeatherApiClient;

// shuttle entry point
#[shuttle_runtime::main]
async fn axum(#[shuttle_runtime::Secrets] secret_store: SecretStore) -> ShuttleAxum {
    info!("Starting Tour Planner API v1.0");

    configure_api_keys(&secret_store);

    if let Err(e) = validate_required_configuration() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(anyhow!("Cannot start service without required configuration: {}", e).into());
    }
    info!("All required configuration validated");

    let router = build_app(Settings::from_env())?;
    Ok(router.into())
}

// load secrets into env vars
fn configure_api_keys(secret_store: &SecretStore) {
    for key in SECRET_KEYS {
        if let Some(value) = secret_store.get(key) {
            std::env::set_var(key, value);
            info!("{} configured from secrets", key);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_err() {
        tracing::warn!("OPENAI_API_KEY not found in secrets - agent calls will fail");
    }
    if std::env::var("WEATHER_API_KEY").is_err() {
        tracing::warn!("WEATHER_API_KEY not found in secrets - live weather disabled");
    }
}

// check required env vars at startup
fn validate_required_configuration() -> Result<(), String> {
    if std::env::var("OPENAI_API_KEY").is_err() {
        return Err("Missing required configuration: OPENAI_API_KEY. \
             Please set it in Secrets.toml"
            .to_string());
    }

    Ok(())
}

// wire collaborators into the router
fn build_app(settings: Settings) -> anyhow::Result<Router> {
    let client = initialize_openai_client().map_err(|e| anyhow!(e))?;
    let validator = RigAgent::validator(&client, &settings.model, settings.agent_timeout);
    let planner = RigAgent::planner(&client, &settings.model, settings.agent_timeout);
    info!("Agents initialized with model {}", settings.model);

    let weather = WeatherApiClient::new(
        &settings.weather_api_url,
        settings.weather_api_key.as_deref().unwrap_or_default(),
        settings.http_timeout,
    )
    .context("Failed to build weather client")?;

    let trip_planner = TripPlanner::new(weather, validator, planner, settings.planner);
    let state = AppState::new(trip_planner, settings.session_idle);
    spawn_session_sweeper(state.clone());
    info!("Idle sessions expire after {}s", settings.session_idle.as_secs());
    Ok(build_router(state))
}
