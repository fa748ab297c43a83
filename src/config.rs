use crate::api::coincap::backoff::ReconnectPolicy;
use crate::api::coincap::ws::{FeedConfig, COINCAP_WS_URL};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_COINS: &str = "bitcoin,ethereum,cardano";
const DEFAULT_CITIES: &str = "New York,London,Tokyo";

#[derive(Debug, Clone)]
pub struct Config {
    pub coins: Vec<String>,
    pub cities: Vec<String>,
    pub openweather_api_key: Option<String>,
    pub newsdata_api_key: Option<String>,
    pub refresh_interval: Duration,
    pub cache_max_age: Duration,
    pub feed_url: String,
    pub reconnect: ReconnectPolicy,
    pub notification_cap: usize,
    pub movement_pct: f64,
    pub log_file: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReconnectPolicy::default();
        Self {
            coins: list(&var("COINS").unwrap_or_else(|| DEFAULT_COINS.to_string()), true),
            cities: list(&var("CITIES").unwrap_or_else(|| DEFAULT_CITIES.to_string()), false),
            openweather_api_key: var("OPENWEATHER_API_KEY").filter(|k| !k.trim().is_empty()),
            newsdata_api_key: var("NEWSDATA_API_KEY").filter(|k| !k.trim().is_empty()),
            refresh_interval: Duration::from_secs(parsed::<u64, _>(&var, "REFRESH_SECS").unwrap_or(300).max(1)),
            cache_max_age: Duration::from_secs(parsed(&var, "CACHE_MAX_AGE_SECS").unwrap_or(300)),
            feed_url: var("FEED_URL").unwrap_or_else(|| COINCAP_WS_URL.to_string()),
            reconnect: ReconnectPolicy {
                base_delay: parsed(&var, "RECONNECT_BASE_MS").map(Duration::from_millis).unwrap_or(defaults.base_delay),
                cap_attempt: parsed(&var, "RECONNECT_CAP_ATTEMPT").unwrap_or(defaults.cap_attempt),
                max_attempts: parsed(&var, "RECONNECT_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
                long_interval: parsed(&var, "RECONNECT_LONG_MS").map(Duration::from_millis).unwrap_or(defaults.long_interval),
            },
            notification_cap: parsed::<usize, _>(&var, "NOTIFICATION_CAP").unwrap_or(100).max(1),
            movement_pct: parsed::<f64, _>(&var, "MOVEMENT_ALERT_PCT")
                .filter(|pct| pct.is_finite() && *pct >= 0.0)
                .unwrap_or(0.5),
            log_file: var("LOG_FILE").unwrap_or_else(|| "cryptoweather.log".to_string()),
        }
    }

    pub fn feed(&self) -> FeedConfig {
        FeedConfig {
            base_url: self.feed_url.clone(),
            assets: self.coins.clone(),
            reconnect: self.reconnect,
        }
    }
}

/// Values that do not parse as `T`, including out-of-range numbers, count as unset.
fn parsed<T, F>(var: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(name).and_then(|v| v.trim().parse::<T>().ok())
}

/// Comma separated list; coin ids are lowercased since both APIs key on them.
fn list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| if lowercase { item.to_lowercase() } else { item.to_string() })
        .collect()
}
