//! SMHI point-forecast integration for a fixed set of notable cities.
//!
//! For each city in the embedded reference list, fetches the point forecast
//! (pmp3g model, no API key required), reads the first timestep, and
//! publishes one map point summarizing current temperature and a coarse
//! weather category.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::api::AppState;
use crate::downloader::Downloader;
use crate::error::AdapterError;
use crate::geolocation::{replace_published, GeolocationEvent};

/// Static reference list of cities, `{"cities": [{"city","lat","lng"}, …]}`.
const NOTABLE_CITIES_JSON: &str = include_str!("notable_cities.json");

const TEMPERATURE_PARAMETER: &str = "t";
const CONDITION_PARAMETER: &str = "Wsymb2";
const CELSIUS: &str = "°C";

/// Configuration for the weather-locations integration.
pub struct WeatherLocationsConfig {
    /// Polling interval in seconds (default: 1800 = 30 minutes).
    pub poll_interval_secs: u64,
}

impl Default for WeatherLocationsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1800,
        }
    }
}

/// A named coordinate from the reference list.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

// The reference list stores coordinates as strings; accept numbers too.
#[derive(Debug, Deserialize)]
struct CityFile {
    cities: Vec<RawCity>,
}

#[derive(Debug, Deserialize)]
struct RawCity {
    city: String,
    lat: serde_json::Value,
    lng: serde_json::Value,
}

fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the embedded city list. Entries with unusable coordinates are
/// skipped.
pub fn notable_cities() -> Result<Vec<City>, AdapterError> {
    let file: CityFile = serde_json::from_str(NOTABLE_CITIES_JSON)?;
    Ok(file
        .cities
        .into_iter()
        .filter_map(|raw| {
            let latitude = coerce_f64(&raw.lat)?;
            let longitude = coerce_f64(&raw.lng)?;
            Some(City {
                name: raw.city,
                latitude,
                longitude,
            })
        })
        .collect())
}

// ── Forecast JSON structures ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<ForecastTimeStep>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastTimeStep {
    #[serde(default)]
    pub parameters: Vec<ForecastParameter>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParameter {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

pub fn forecast_url(latitude: f64, longitude: f64) -> String {
    format!(
        "https://opendata-download-metfcst.smhi.se/api/category/pmp3g/version/2/geotype/point/lon/{}/lat/{}/data.json",
        longitude, latitude
    )
}

/// First value of the named parameter in a timestep.
fn parameter_value(step: &ForecastTimeStep, name: &str) -> Result<f64, AdapterError> {
    step.parameters
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.values.first().copied())
        .ok_or_else(|| AdapterError::MissingParameter(name.to_string()))
}

// ── Condition mapping ───────────────────────────────────────────

/// Coarse display category for an SMHI `Wsymb2` condition code.
///
/// The provider defines codes 1–27 (1 clear sky … 27 heavy snowfall); codes
/// outside that range map to `Unknown` rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherCategory {
    Clear,
    Cloudy,
    Rainy,
    Snowy,
    Unknown,
}

impl WeatherCategory {
    pub fn from_code(code: i64) -> Self {
        match code {
            1..=3 => Self::Clear,
            4..=7 => Self::Cloudy,
            8..=11 | 18..=21 => Self::Rainy,
            12..=17 | 22..=27 => Self::Snowy,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
            Self::Snowy => "snowy",
            Self::Unknown => "unknown",
        }
    }

    /// Map icon per category; unknown conditions get no map icon.
    pub fn icon_url(self) -> &'static str {
        match self {
            Self::Clear => "https://opendata.smhi.se/weather-icons/sun.png",
            Self::Cloudy => "https://opendata.smhi.se/weather-icons/cloud.png",
            Self::Rainy => "https://opendata.smhi.se/weather-icons/rain.png",
            Self::Snowy => "https://opendata.smhi.se/weather-icons/snowflake.png",
            Self::Unknown => "",
        }
    }
}

// ── Transform ───────────────────────────────────────────────────

/// Build one summary point for a city from its forecast payload.
///
/// Uses only the first timestep. A missing timestep or parameter is a
/// recoverable per-city error; the caller logs and skips the city.
pub fn entity_for_city(
    city: &City,
    forecast: &ForecastResponse,
) -> Result<GeolocationEvent, AdapterError> {
    let step = forecast
        .time_series
        .first()
        .ok_or_else(|| AdapterError::MissingParameter("timeSeries".to_string()))?;

    // Truncate toward zero for display: 5.4 renders as "5 °C".
    let temperature = parameter_value(step, TEMPERATURE_PARAMETER)?.trunc() as i64;
    let condition_code = parameter_value(step, CONDITION_PARAMETER)?.trunc() as i64;
    let category = WeatherCategory::from_code(condition_code);

    let name = format!(
        "{} - Temperature: {} {}, {}",
        city.name,
        temperature,
        CELSIUS,
        category.label()
    );

    Ok(GeolocationEvent::new(
        name,
        city.latitude,
        city.longitude,
        category.icon_url(),
        "mdi:cloud-outline",
        "weather",
    ))
}

// ── Poller ──────────────────────────────────────────────────────

/// Spawn a background task that periodically fetches a forecast per city and
/// replaces the previously published weather points wholesale.
///
/// Each city degrades independently: a fetch or parse failure for one city
/// drops that city from this cycle's set and leaves the rest intact.
pub fn start_weather_locations_poller(app: Arc<AppState>, config: WeatherLocationsConfig) {
    tokio::spawn(async move {
        let cities = match notable_cities() {
            Ok(cities) => cities,
            Err(e) => {
                tracing::error!("Notable-cities list failed to parse: {}", e);
                return;
            }
        };

        let downloader = Downloader::new();
        let mut published: Vec<String> = Vec::new();

        loop {
            let mut entities = Vec::with_capacity(cities.len());

            for city in &cities {
                match fetch_city_entity(&downloader, city).await {
                    Ok(entity) => entities.push(entity),
                    Err(e) => {
                        tracing::warn!(city = %city.name, "Skipping city this cycle: {}", e);
                    }
                }
            }

            tracing::debug!(points = entities.len(), "Publishing weather points");
            published = replace_published(&app.state_machine, &published, &entities);

            tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
        }
    });
}

async fn fetch_city_entity(
    downloader: &Downloader,
    city: &City,
) -> Result<GeolocationEvent, AdapterError> {
    let url = forecast_url(city.latitude, city.longitude);
    let payload = downloader.download_json(&url).await?;
    let forecast = ForecastResponse::deserialize(&payload)?;
    entity_for_city(city, &forecast)
}
