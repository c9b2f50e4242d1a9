// weather lookups and the briefing handed to the planner

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub condition: String,
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    pub fn representative_date(self) -> NaiveDate {
        let (y, m, d) = match self {
            Season::Spring => (2025, 3, 15),
            Season::Summer => (2024, 6, 15),
            Season::Fall => (2024, 9, 15),
            Season::Winter => (2024, 12, 15),
        };
        NaiveDate::from_ymd_opt(y, m, d).expect("seasonal dates are valid")
    }

    // seasonal stand-ins used when the session runs on mock weather
    fn mock_scenario(self) -> MockScenario {
        match self {
            Season::Spring | Season::Summer => MockScenario::SunnyDay,
            Season::Fall => MockScenario::RainyDay,
            Season::Winter => MockScenario::SnowyDay,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MockScenario {
    SunnyDay,
    RainyDay,
    SnowyDay,
    Storm,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown mock weather scenario: {0}")]
pub struct UnknownScenario(String);

impl FromStr for MockScenario {
    type Err = UnknownScenario;

    // "Rainy Day" and "rainy_day" name the same scenario
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "sunny_day" => Ok(MockScenario::SunnyDay),
            "rainy_day" => Ok(MockScenario::RainyDay),
            "snowy_day" => Ok(MockScenario::SnowyDay),
            "storm" => Ok(MockScenario::Storm),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

impl TryFrom<String> for MockScenario {
    type Error = UnknownScenario;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WeatherMode {
    Live,
    Mock {
        #[serde(default = "default_scenario", deserialize_with = "deserialize_scenario")]
        scenario: MockScenario,
    },
}

fn default_scenario() -> MockScenario {
    MockScenario::SunnyDay
}

fn deserialize_scenario<'de, D>(deserializer: D) -> Result<MockScenario, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    MockScenario::try_from(raw).map_err(serde::de::Error::custom)
}

pub fn mock_weather(_location: &str, scenario: MockScenario) -> WeatherSnapshot {
    let (temperature, condition, icon) = match scenario {
        MockScenario::SunnyDay => (28.0, "Sunny", "//cdn.weatherapi.com/weather/64x64/day/113.png"),
        MockScenario::RainyDay => (18.0, "Moderate rain", "//cdn.weatherapi.com/weather/64x64/day/302.png"),
        MockScenario::SnowyDay => (-2.0, "Light snow", "//cdn.weatherapi.com/weather/64x64/day/326.png"),
        MockScenario::Storm => (22.0, "Thunderstorm", "//cdn.weatherapi.com/weather/64x64/day/200.png"),
    };
    WeatherSnapshot {
        temperature,
        condition: condition.to_string(),
        icon: icon.to_string(),
    }
}

// `None` marks a lookup that could not be completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherBriefing {
    pub current: Option<WeatherSnapshot>,
    pub seasonal: BTreeMap<Season, Option<WeatherSnapshot>>,
}

impl WeatherBriefing {
    pub fn season(&self, season: Season) -> Option<&WeatherSnapshot> {
        self.seasonal.get(&season).and_then(Option::as_ref)
    }

    pub fn unavailable_seasons(&self) -> Vec<Season> {
        Season::ALL
            .into_iter()
            .filter(|season| self.season(*season).is_none())
            .collect()
    }
}

impl fmt::Display for WeatherBriefing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(now) => writeln!(
                f,
                "Current Weather: Temperature: {}°C, Condition: {}",
                now.temperature, now.condition
            )?,
            None => writeln!(f, "Current Weather: unavailable")?,
        }
        writeln!(f, "Seasonal Weather:")?;
        for season in Season::ALL {
            match self.season(season) {
                Some(snapshot) => writeln!(
                    f,
                    "{}: Temperature: {}°C, Condition: {}",
                    season, snapshot.temperature, snapshot.condition
                )?,
                None => writeln!(f, "{}: unavailable", season)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Weather API Error: {0}")]
pub struct WeatherError(String);

pub trait WeatherProvider: Send + Sync {
    fn current(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<WeatherSnapshot, WeatherError>> + Send;

    fn seasonal(
        &self,
        location: &str,
        season: Season,
    ) -> impl Future<Output = Result<WeatherSnapshot, WeatherError>> + Send;
}

// assemble a briefing best-effort: failed live lookups become absent slots
pub async fn build_briefing<W: WeatherProvider>(
    provider: &W,
    destination: &str,
    mode: WeatherMode,
) -> WeatherBriefing {
    match mode {
        WeatherMode::Mock { scenario } => {
            debug!(?scenario, "Building mock weather briefing for {}", destination);
            WeatherBriefing {
                current: Some(mock_weather(destination, scenario)),
                seasonal: Season::ALL
                    .into_iter()
                    .map(|season| (season, Some(mock_weather(destination, season.mock_scenario()))))
                    .collect(),
            }
        }
        WeatherMode::Live => {
            info!("Fetching live weather for {}", destination);
            let current = match provider.current(destination).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Current weather unavailable for {}: {}", destination, e);
                    None
                }
            };

            let mut seasonal = BTreeMap::new();
            for season in Season::ALL {
                let snapshot = match provider.seasonal(destination, season).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        warn!("{} weather unavailable for {}: {}", season, destination, e);
                        None
                    }
                };
                seasonal.insert(season, snapshot);
            }

            let briefing = WeatherBriefing { current, seasonal };
            let missing = briefing.unavailable_seasons();
            if !missing.is_empty() {
                warn!(?missing, "Seasonal weather incomplete for {}", destination);
            }
            briefing
        }
    }
}

// wire shapes of the weather api
#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temp_c: f64,
    condition: ApiCondition,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: CurrentBlock,
}

#[derive(Debug, Deserialize)]
struct DayBlock {
    avgtemp_c: f64,
    condition: ApiCondition,
}

#[derive(Debug, Deserialize)]
struct ForecastDay {
    day: DayBlock,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    forecast: Forecast,
}

#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, WeatherError> {
        Ok(Self {
            client: create_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl WeatherProvider for WeatherApiClient {
    async fn current(&self, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/current.json", self.base_url);
        let query = [("key", self.api_key.as_str()), ("q", location)];
        let response = make_api_request(&self.client, &url, &query).await?;
        let body = parse_api_response::<CurrentResponse>(response).await?;

        Ok(WeatherSnapshot {
            temperature: body.current.temp_c,
            condition: body.current.condition.text,
            icon: body.current.condition.icon,
        })
    }

    async fn seasonal(&self, location: &str, season: Season) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/history.json", self.base_url);
        let date = season.representative_date().format("%Y-%m-%d").to_string();
        let query = [("key", self.api_key.as_str()), ("q", location), ("dt", date.as_str())];
        let response = make_api_request(&self.client, &url, &query).await?;
        let body = parse_api_response::<HistoryResponse>(response).await?;

        let day = body
            .forecast
            .forecastday
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError(format!("No history data for {}", date)))?
            .day;

        Ok(WeatherSnapshot {
            temperature: day.avgtemp_c,
            condition: day.condition.text,
            icon: day.condition.icon,
        })
    }
}

// helper functions
fn create_http_client(timeout: Duration) -> Result<Client, WeatherError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WeatherError(format!("Failed to create HTTP client: {}", e)))
}

async fn make_api_request(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<reqwest::Response, WeatherError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| WeatherError(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(WeatherError(format!(
            "API returned error status: {}",
            response.status()
        )));
    }

    Ok(response)
}

async fn parse_api_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, WeatherError> {
    response
        .json()
        .await
        .map_err(|e| WeatherError(format!("Failed to parse JSON response: {}", e)))
}
