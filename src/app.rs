use crate::api::coincap::ws::{ConnectionState, PriceTick};
use crate::api::coingecko::rest::CoinSnapshot;
use crate::api::newsdata::rest::{NewsBundle, NEWS_KEY};
use crate::api::openweather::rest::WeatherSnapshot;
use crate::api::{FetchOutcome, FetchRequest};
use crate::config::Config;
use crate::engine::alerts::{parse_threshold, AlertBook, AlertId, Direction, SubjectKind};
use crate::engine::cache::{system_clock, CacheEntry, Clock, Snapshot, SnapshotCache};
use crate::engine::merge::AlertEngine;
use crate::engine::notifications::{NotificationId, NotificationQueue};
use crate::error::{AlertError, FetchError};
use crate::preferences::Preferences;
use log::{info, warn};
use std::time::Duration;

/// Dashboard state. Owned by the event loop; every mutation runs to
/// completion before the loop polls again.
pub struct App {
    coin_ids: Vec<String>,
    city_names: Vec<String>,
    coins: SnapshotCache<String, CoinSnapshot>,
    cities: SnapshotCache<String, WeatherSnapshot>,
    news: SnapshotCache<String, NewsBundle>,
    engine: AlertEngine,
    preferences: Preferences,
    connection: ConnectionState,
    max_age: Duration,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &Config, clock: Clock) -> Self {
        Self {
            coin_ids: config.coins.clone(),
            city_names: config.cities.clone(),
            coins: SnapshotCache::with_clock(clock.clone()),
            cities: SnapshotCache::with_clock(clock.clone()),
            news: SnapshotCache::with_clock(clock.clone()),
            engine: AlertEngine::with_clock(config.notification_cap, config.movement_pct, clock),
            preferences: Preferences::new(config.refresh_interval),
            connection: ConnectionState::Disconnected,
            max_age: config.cache_max_age,
        }
    }

    /// Keys that need a REST fetch now, each already marked in flight.
    /// Fresh keys are skipped unless `force`; in-flight keys are always skipped.
    pub fn plan_refresh(&mut self, force: bool) -> Vec<FetchRequest> {
        let mut requests = Vec::new();
        for id in &self.coin_ids {
            if plan_key(&mut self.coins, id, self.max_age, force) {
                requests.push(FetchRequest::Coin(id.clone()));
            }
        }
        for city in &self.city_names {
            if plan_key(&mut self.cities, city, self.max_age, force) {
                requests.push(FetchRequest::City(city.clone()));
            }
        }
        if plan_key(&mut self.news, NEWS_KEY, self.max_age, force) {
            requests.push(FetchRequest::News);
        }
        requests
    }

    /// Records a fetch result. Returns the number of notifications emitted.
    pub fn apply_fetch(&mut self, outcome: FetchOutcome) -> usize {
        match outcome {
            FetchOutcome::Coin(id, Ok(coin)) => {
                self.coins.complete_fetch(id.clone(), coin);
                self.engine.on_snapshot(&self.coins, &id, SubjectKind::Coin)
            }
            FetchOutcome::Coin(id, Err(e)) => {
                record_failure(&mut self.coins, id, &e);
                0
            }
            FetchOutcome::City(city, Ok(weather)) => {
                self.cities.complete_fetch(city.clone(), weather);
                self.engine.on_snapshot(&self.cities, &city, SubjectKind::City)
            }
            FetchOutcome::City(city, Err(e)) => {
                record_failure(&mut self.cities, city, &e);
                0
            }
            FetchOutcome::News(Ok(bundle)) => {
                self.news.complete_fetch(NEWS_KEY.to_string(), bundle);
                0
            }
            FetchOutcome::News(Err(e)) => {
                record_failure(&mut self.news, NEWS_KEY.to_string(), &e);
                0
            }
        }
    }

    pub fn on_tick(&mut self, tick: &PriceTick) -> usize {
        self.engine.on_tick(&mut self.coins, tick)
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            info!("Price feed {}", state.as_str());
        }
        self.connection = state;
    }

    pub fn create_alert(
        &mut self,
        subject: &str,
        kind: SubjectKind,
        input: &str,
        direction: Direction,
    ) -> Result<AlertId, AlertError> {
        let threshold = parse_threshold(input)?;
        match kind {
            SubjectKind::Coin => self.engine.add_rule(&self.coins, subject, kind, threshold, direction),
            SubjectKind::City => self.engine.add_rule(&self.cities, subject, kind, threshold, direction),
        }
    }

    pub fn remove_alert(&mut self, id: AlertId) -> bool {
        self.engine.remove_rule(id)
    }

    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.engine.dismiss(id)
    }

    pub fn clear_notifications(&mut self) {
        self.engine.clear_notifications();
    }

    pub fn toggle_favorite_coin(&mut self, id: &str) -> bool {
        self.preferences.toggle_coin(id)
    }

    pub fn toggle_favorite_city(&mut self, city: &str) -> bool {
        self.preferences.toggle_city(city)
    }

    /// Coin ids in display order, favorites first.
    pub fn coin_order(&self) -> Vec<String> {
        self.preferences.order_coins(&self.coin_ids)
    }

    pub fn city_order(&self) -> Vec<String> {
        self.preferences.order_cities(&self.city_names)
    }

    pub fn coin(&self, id: &str) -> CacheEntry<String, CoinSnapshot> {
        self.coins.get(&id.to_string())
    }

    pub fn city(&self, name: &str) -> CacheEntry<String, WeatherSnapshot> {
        self.cities.get(&name.to_string())
    }

    pub fn news(&self) -> CacheEntry<String, NewsBundle> {
        self.news.get(&NEWS_KEY.to_string())
    }

    /// Entries whose last fetch failed, stale or cleared.
    pub fn failing_entries(&self) -> usize {
        fn failing<V: Snapshot>(cache: &SnapshotCache<String, V>) -> usize {
            cache.entries().filter(|entry| entry.error_message.is_some()).count()
        }
        failing(&self.coins) + failing(&self.cities) + failing(&self.news)
    }

    pub fn alerts(&self) -> &AlertBook {
        self.engine.alerts()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        self.engine.notifications()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }
}

fn plan_key<V: Snapshot>(cache: &mut SnapshotCache<String, V>, key: &str, max_age: Duration, force: bool) -> bool {
    let key = key.to_string();
    if !force && cache.is_fresh(&key, max_age) {
        return false;
    }
    cache.begin_fetch(key)
}

fn record_failure<V: Snapshot>(cache: &mut SnapshotCache<String, V>, key: String, error: &FetchError) {
    warn!("Fetch failed for {}: {}", key, error);
    cache.fail_fetch(key, error.to_string(), error.keeps_stale());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::coingecko::rest::{MarketData, UsdValue};
    use crate::engine::cache::tests::{advance, manual_clock};
    use crate::engine::cache::CacheStatus;
    use crate::engine::notifications::NotificationSource;

    fn config() -> Config {
        Config::from_lookup(|name| match name {
            "COINS" => Some("bitcoin,ethereum".to_string()),
            "CITIES" => Some("London".to_string()),
            "MOVEMENT_ALERT_PCT" => Some("0".to_string()),
            _ => None,
        })
    }

    fn coin(id: &str, price: f64) -> CoinSnapshot {
        CoinSnapshot {
            id: id.into(),
            symbol: id[..3].into(),
            name: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
            market_data: MarketData {
                current_price: UsdValue { usd: Some(price) },
                ..MarketData::default()
            },
        }
    }

    fn london(temp: f64) -> WeatherSnapshot {
        serde_json::from_value(serde_json::json!({
            "name": "London",
            "main": { "temp": temp, "feels_like": temp, "humidity": 70, "pressure": 1010 },
            "wind": { "speed": 3.0 },
            "weather": [{ "main": "Clouds", "description": "overcast clouds" }]
        }))
        .unwrap()
    }

    fn tick(symbol: &str, price: f64) -> PriceTick {
        PriceTick {
            symbol: symbol.into(),
            price,
        }
    }

    #[test]
    fn plan_skips_in_flight_and_fresh_keys() {
        let (clock, now) = manual_clock();
        let mut app = App::with_clock(&config(), clock);

        assert_eq!(
            app.plan_refresh(false),
            vec![
                FetchRequest::Coin("bitcoin".into()),
                FetchRequest::Coin("ethereum".into()),
                FetchRequest::City("London".into()),
                FetchRequest::News,
            ]
        );
        assert!(app.plan_refresh(false).is_empty());
        assert!(app.plan_refresh(true).is_empty());

        app.apply_fetch(FetchOutcome::Coin("bitcoin".into(), Ok(coin("bitcoin", 60_000.0))));
        assert!(app.plan_refresh(false).is_empty());

        advance(&now, 301);
        assert_eq!(app.plan_refresh(false), vec![FetchRequest::Coin("bitcoin".into())]);
    }

    #[test]
    fn force_refetches_fresh_keys() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::News(Ok(NewsBundle::default())));

        assert_eq!(app.plan_refresh(true), vec![FetchRequest::News]);
    }

    #[test]
    fn rate_limit_keeps_stale_price() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::Coin("bitcoin".into(), Ok(coin("bitcoin", 60_000.0))));

        app.plan_refresh(true);
        app.apply_fetch(FetchOutcome::Coin(
            "bitcoin".into(),
            Err(FetchError::RateLimited { provider: "coingecko" }),
        ));

        let entry = app.coin("bitcoin");
        assert_eq!(entry.status, CacheStatus::Ready);
        assert_eq!(entry.value.and_then(|c| c.market_data.current_price.usd), Some(60_000.0));
        assert_eq!(
            entry.error_message.as_deref(),
            Some("coingecko rate limit hit, showing cached data")
        );
        assert!(!entry.in_flight);
    }

    #[test]
    fn not_found_clears_city() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::City("London".into(), Ok(london(12.0))));
        app.plan_refresh(true);
        app.apply_fetch(FetchOutcome::City(
            "London".into(),
            Err(FetchError::Status {
                provider: "openweather",
                status: 404,
            }),
        ));

        let entry = app.city("London");
        assert_eq!(entry.status, CacheStatus::Error);
        assert!(entry.value.is_none());
        assert_eq!(app.failing_entries(), 1);
    }

    #[test]
    fn failing_entries_counts_stale_and_cleared() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::Coin("bitcoin".into(), Ok(coin("bitcoin", 60_000.0))));
        assert_eq!(app.failing_entries(), 0);

        app.apply_fetch(FetchOutcome::Coin(
            "ethereum".into(),
            Err(FetchError::Network("timed out".into())),
        ));
        app.apply_fetch(FetchOutcome::News(Err(FetchError::MissingKey("NEWSDATA_API_KEY"))));
        assert_eq!(app.failing_entries(), 2);

        app.apply_fetch(FetchOutcome::Coin(
            "bitcoin".into(),
            Err(FetchError::RateLimited { provider: "coingecko" }),
        ));
        assert_eq!(app.coin("bitcoin").status, CacheStatus::Ready);
        assert_eq!(app.failing_entries(), 3);

        app.apply_fetch(FetchOutcome::Coin("ethereum".into(), Ok(coin("ethereum", 3_000.0))));
        assert_eq!(app.failing_entries(), 2);
    }

    #[test]
    fn ticks_trigger_coin_alerts() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::Coin("bitcoin".into(), Ok(coin("bitcoin", 60_000.0))));
        let id = app
            .create_alert("bitcoin", SubjectKind::Coin, " 61000 ", Direction::Above)
            .unwrap();

        assert_eq!(app.on_tick(&tick("bitcoin", 60_500.0)), 0);
        assert_eq!(app.on_tick(&tick("bitcoin", 61_200.0)), 1);
        assert_eq!(app.on_tick(&tick("bitcoin", 62_000.0)), 0);

        let event = app.notifications().newest().unwrap();
        assert_eq!(event.source, NotificationSource::Alert(id));
        assert_eq!(event.message, "Bitcoin price is above $61,000.00! Current price: $61,200.00");
        let event_id = event.id;
        assert!(app.dismiss(event_id));
        assert!(!app.dismiss(event_id));
        assert!(app.notifications().is_empty());
    }

    #[test]
    fn city_alert_fires_on_refresh() {
        let mut app = App::new(&config());
        app.plan_refresh(false);
        app.apply_fetch(FetchOutcome::City("London".into(), Ok(london(12.0))));
        app.create_alert("London", SubjectKind::City, "10", Direction::Below)
            .unwrap();
        assert!(app.notifications().is_empty());

        app.plan_refresh(true);
        assert_eq!(app.apply_fetch(FetchOutcome::City("London".into(), Ok(london(9.5)))), 1);
        assert_eq!(
            app.notifications().newest().unwrap().message,
            "London temperature is below 10.0°C! Current temperature: 9.5°C"
        );
    }

    #[test]
    fn invalid_alert_input_is_rejected() {
        let mut app = App::new(&config());
        assert_eq!(
            app.create_alert("bitcoin", SubjectKind::Coin, "abc", Direction::Above),
            Err(AlertError::NotANumber("abc".into()))
        );
        assert_eq!(
            app.create_alert("bitcoin", SubjectKind::Coin, "0", Direction::Above),
            Err(AlertError::OutOfRange(0.0))
        );
        assert!(app.alerts().is_empty());
    }

    #[test]
    fn removed_alert_is_gone() {
        let mut app = App::new(&config());
        let id = app
            .create_alert("ethereum", SubjectKind::Coin, "5000", Direction::Above)
            .unwrap();
        assert!(app.remove_alert(id));
        assert!(app.alerts().is_empty());
    }

    #[test]
    fn favorites_reorder_rows() {
        let mut app = App::new(&config());
        assert!(app.toggle_favorite_coin("ethereum"));
        assert_eq!(app.coin_order(), vec!["ethereum", "bitcoin"]);
        assert!(app.toggle_favorite_city("London"));
        assert_eq!(app.city_order(), vec!["London"]);
    }

    #[test]
    fn connection_state_is_tracked() {
        let mut app = App::new(&config());
        app.set_connection(ConnectionState::Connected);
        assert_eq!(app.connection(), ConnectionState::Connected);
    }
}
