use crate::api::http::send_json;
use crate::engine::cache::Snapshot;
use crate::error::FetchError;
use reqwest::Client;
use serde::Deserialize;

pub const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";
const PROVIDER: &str = "openweather";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Conditions {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub pressure: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sky {
    pub main: String,
    #[serde(default)]
    pub description: String,
}

/// Current conditions in metric units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherSnapshot {
    pub name: String,
    pub main: Conditions,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub weather: Vec<Sky>,
}

impl WeatherSnapshot {
    pub fn summary(&self) -> &str {
        self.weather.first().map_or("", |sky| sky.description.as_str())
    }
}

impl Snapshot for WeatherSnapshot {
    fn primary_value(&self) -> Option<f64> {
        Some(self.main.temp)
    }

    fn label(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }
}

pub async fn fetch_weather(
    client: &Client,
    base: &str,
    api_key: Option<&str>,
    city: &str,
) -> Result<WeatherSnapshot, FetchError> {
    let api_key = api_key.ok_or(FetchError::MissingKey(API_KEY_VAR))?;
    let request = client
        .get(format!("{}/weather", base.trim_end_matches('/')))
        .query(&[("q", city), ("units", "metric"), ("appid", api_key)]);
    send_json(request, PROVIDER).await
}
