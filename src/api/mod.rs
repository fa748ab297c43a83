pub mod coincap;
pub mod coingecko;
pub mod http;
pub mod newsdata;
pub mod openweather;

use crate::api::coingecko::rest::{fetch_coin, CoinSnapshot, COINGECKO_API_URL};
use crate::api::newsdata::rest::{fetch_news, NewsBundle, NEWSDATA_API_URL};
use crate::api::openweather::rest::{fetch_weather, WeatherSnapshot, OPENWEATHER_API_URL};
use crate::config::Config;
use crate::error::{DashboardError, FetchError};
use log::debug;
use reqwest::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Coin(String),
    City(String),
    News,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Coin(String, Result<CoinSnapshot, FetchError>),
    City(String, Result<WeatherSnapshot, FetchError>),
    News(Result<NewsBundle, FetchError>),
}

/// REST clients for every snapshot source, sharing one HTTP connection pool.
#[derive(Clone)]
pub struct Providers {
    client: Client,
    openweather_api_key: Option<String>,
    newsdata_api_key: Option<String>,
}

impl Providers {
    pub fn new(config: &Config) -> Result<Self, DashboardError> {
        Ok(Self {
            client: http::build_client()?,
            openweather_api_key: config.openweather_api_key.clone(),
            newsdata_api_key: config.newsdata_api_key.clone(),
        })
    }

    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        debug!("Fetching {:?}", request);
        match request {
            FetchRequest::Coin(id) => {
                let result = fetch_coin(&self.client, COINGECKO_API_URL, &id).await;
                FetchOutcome::Coin(id, result)
            }
            FetchRequest::City(city) => {
                let result = fetch_weather(
                    &self.client,
                    OPENWEATHER_API_URL,
                    self.openweather_api_key.as_deref(),
                    &city,
                )
                .await;
                FetchOutcome::City(city, result)
            }
            FetchRequest::News => {
                let result = fetch_news(&self.client, NEWSDATA_API_URL, self.newsdata_api_key.as_deref()).await;
                FetchOutcome::News(result)
            }
        }
    }
}
