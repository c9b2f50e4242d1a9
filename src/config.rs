// runtime settings read from env

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::session::{PlannerSettings, DEFAULT_BUS_TOUR_URL, DEFAULT_DESTINATION, DEFAULT_GREETING};
use crate::weather::{MockScenario, WeatherMode};

pub const DEFAULT_WEATHER_API_URL: &str = "http://api.weatherapi.com/v1";

// secrets copied from the shuttle store into the environment at start-up
pub const SECRET_KEYS: [&str; 12] = [
    "OPENAI_API_KEY",
    "WEATHER_API_KEY",
    "WEATHER_API_URL",
    "API_TIMEOUT_SECONDS",
    "AGENT_TIMEOUT_SECONDS",
    "PLANNER_MODEL",
    "DEFAULT_DESTINATION",
    "WELCOME_MESSAGE",
    "BUS_TOUR_URL",
    "WEATHER_MODE",
    "PLANNER_TODAY",
    "SESSION_IDLE_SECONDS",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub agent_timeout: Duration,
    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub http_timeout: Duration,
    pub session_idle: Duration,
    pub planner: PlannerSettings,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let seconds = |key: &str, fallback: u64| {
            Duration::from_secs(get(key).and_then(|s| s.parse::<u64>().ok()).unwrap_or(fallback))
        };

        let weather_api_key = get("WEATHER_API_KEY");
        let weather_mode = resolve_weather_mode(get("WEATHER_MODE").as_deref(), weather_api_key.is_some());
        info!(?weather_mode, "Default weather mode resolved");

        Self {
            model: get("PLANNER_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            agent_timeout: seconds("AGENT_TIMEOUT_SECONDS", 120),
            weather_api_url: get("WEATHER_API_URL").unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
            weather_api_key,
            http_timeout: seconds("API_TIMEOUT_SECONDS", 30),
            session_idle: seconds("SESSION_IDLE_SECONDS", 1800),
            planner: PlannerSettings {
                default_destination: get("DEFAULT_DESTINATION")
                    .unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
                greeting: Some(get("WELCOME_MESSAGE").unwrap_or_else(|| DEFAULT_GREETING.to_string())),
                bus_tour_url: get("BUS_TOUR_URL").unwrap_or_else(|| DEFAULT_BUS_TOUR_URL.to_string()),
                weather_mode,
                today: get("PLANNER_TODAY").and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            },
        }
    }
}

// live weather needs a key; anything else is a mock scenario name
fn resolve_weather_mode(requested: Option<&str>, has_api_key: bool) -> WeatherMode {
    let sunny = WeatherMode::Mock {
        scenario: MockScenario::SunnyDay,
    };

    match requested {
        None if has_api_key => WeatherMode::Live,
        None => sunny,
        Some(mode) if mode.eq_ignore_ascii_case("live") => {
            if has_api_key {
                WeatherMode::Live
            } else {
                warn!("WEATHER_MODE is live but WEATHER_API_KEY is missing - using mock weather");
                sunny
            }
        }
        Some(name) => match name.parse::<MockScenario>() {
            Ok(scenario) => WeatherMode::Mock { scenario },
            Err(e) => {
                warn!("{} - using sunny_day", e);
                sunny
            }
        },
    }
}
