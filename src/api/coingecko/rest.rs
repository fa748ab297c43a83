use crate::api::http::send_json;
use crate::engine::cache::Snapshot;
use crate::error::FetchError;
use reqwest::Client;
use serde::Deserialize;

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const PROVIDER: &str = "coingecko";

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct UsdValue {
    #[serde(default)]
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub current_price: UsdValue,
    #[serde(default)]
    pub market_cap: UsdValue,
    #[serde(default)]
    pub total_volume: UsdValue,
    #[serde(default)]
    pub high_24h: UsdValue,
    #[serde(default)]
    pub low_24h: UsdValue,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoinSnapshot {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market_data: MarketData,
}

impl Snapshot for CoinSnapshot {
    fn primary_value(&self) -> Option<f64> {
        self.market_data.current_price.usd
    }

    fn set_primary_value(&mut self, value: f64) {
        self.market_data.current_price.usd = Some(value);
    }

    fn label(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }
}

pub fn coin_url(base: &str, id: &str) -> String {
    format!(
        "{}/coins/{}?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=false",
        base.trim_end_matches('/'),
        id
    )
}

pub async fn fetch_coin(client: &Client, base: &str, id: &str) -> Result<CoinSnapshot, FetchError> {
    send_json(client.get(coin_url(base, id)), PROVIDER).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "id": "bitcoin",
        "symbol": "btc",
        "name": "Bitcoin",
        "market_data": {
            "current_price": { "usd": 61000.0, "eur": 56000.0 },
            "market_cap": { "usd": 1200000000000 },
            "total_volume": { "usd": 31000000000 },
            "high_24h": { "usd": 61500 },
            "low_24h": { "usd": 59100 },
            "price_change_percentage_24h": 1.42
        },
        "description": { "en": "ignored" }
    }"#;

    #[test]
    fn decodes_market_data() {
        let coin: CoinSnapshot = serde_json::from_str(BODY).unwrap();
        assert_eq!(coin.symbol, "btc");
        assert_eq!(coin.primary_value(), Some(61_000.0));
        assert_eq!(coin.market_data.market_cap.usd, Some(1.2e12));
        assert_eq!(coin.market_data.price_change_percentage_24h, Some(1.42));
        assert_eq!(coin.label().as_deref(), Some("Bitcoin"));
    }

    #[test]
    fn missing_market_data_is_tolerated() {
        let coin: CoinSnapshot = serde_json::from_str(r#"{"id":"dogecoin"}"#).unwrap();
        assert_eq!(coin.primary_value(), None);
        assert_eq!(coin.label(), None);
    }

    #[test]
    fn live_price_replaces_only_current_price() {
        let mut coin: CoinSnapshot = serde_json::from_str(BODY).unwrap();
        let before = coin.market_data.clone();
        coin.set_primary_value(62_000.0);

        assert_eq!(coin.market_data.current_price.usd, Some(62_000.0));
        assert_eq!(coin.market_data.high_24h, before.high_24h);
        assert_eq!(coin.market_data.market_cap, before.market_cap);
    }

    #[test]
    fn url_requests_market_data_only() {
        assert_eq!(
            coin_url(COINGECKO_API_URL, "ethereum"),
            "https://api.coingecko.com/api/v3/coins/ethereum?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=false"
        );
    }
}
