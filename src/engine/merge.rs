use crate::api::coincap::ws::PriceTick;
use crate::engine::alerts::{AlertBook, AlertId, AlertRule, Direction, SubjectKind};
use crate::engine::cache::{system_clock, Clock, Snapshot, SnapshotCache};
use crate::engine::notifications::{NotificationEvent, NotificationId, NotificationQueue, NotificationSource};
use crate::error::AlertError;
use crate::format::format_usd;
use log::{debug, info};
use std::collections::HashMap;

/// Remembers the last observed price per coin and reports moves of at least
/// `threshold_pct` percent between two observations.
#[derive(Debug, Clone)]
pub struct MovementTracker {
    threshold_pct: f64,
    previous: HashMap<String, f64>,
}

impl MovementTracker {
    pub fn new(threshold_pct: f64) -> Self {
        Self {
            threshold_pct,
            previous: HashMap::new(),
        }
    }

    pub fn observe(&mut self, symbol: &str, price: f64) -> Option<f64> {
        let previous = self.previous.insert(symbol.to_string(), price)?;
        if self.threshold_pct <= 0.0 || previous <= 0.0 {
            return None;
        }
        let change_pct = (price - previous) / previous * 100.0;
        (change_pct.abs() >= self.threshold_pct).then_some(change_pct)
    }
}

/// Merges live ticks into cached snapshots and turns threshold crossings into
/// notifications.
pub struct AlertEngine {
    alerts: AlertBook,
    notifications: NotificationQueue,
    movement: MovementTracker,
    clock: Clock,
}

impl AlertEngine {
    pub fn new(notification_cap: usize, movement_pct: f64) -> Self {
        Self::with_clock(notification_cap, movement_pct, system_clock())
    }

    pub fn with_clock(notification_cap: usize, movement_pct: f64, clock: Clock) -> Self {
        Self {
            alerts: AlertBook::new(),
            notifications: NotificationQueue::new(notification_cap),
            movement: MovementTracker::new(movement_pct),
            clock,
        }
    }

    pub fn alerts(&self) -> &AlertBook {
        &self.alerts
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Applies one tick. Ticks for keys without a `Ready` snapshot are dropped.
    /// Returns the number of notifications emitted.
    pub fn on_tick<V: Snapshot>(&mut self, cache: &mut SnapshotCache<String, V>, tick: &PriceTick) -> usize {
        if !cache.apply_live_value(&tick.symbol, tick.price) {
            debug!("Dropping tick for {}: no cached baseline", tick.symbol);
            return 0;
        }
        let label = label_for(cache, &tick.symbol);
        self.observe(&tick.symbol, SubjectKind::Coin, &label, tick.price)
    }

    /// Re-evaluates `key` after its REST snapshot changed.
    pub fn on_snapshot<V: Snapshot>(&mut self, cache: &SnapshotCache<String, V>, key: &str, kind: SubjectKind) -> usize {
        let key = key.to_string();
        let value = match cache.value(&key).and_then(Snapshot::primary_value) {
            Some(value) => value,
            None => return 0,
        };
        let label = label_for(cache, &key);
        self.observe(&key, kind, &label, value)
    }

    /// Adds a rule and evaluates it at once against the cached value, so a
    /// rule that is already satisfied fires immediately.
    pub fn add_rule<V: Snapshot>(
        &mut self,
        cache: &SnapshotCache<String, V>,
        subject: &str,
        kind: SubjectKind,
        threshold: f64,
        direction: Direction,
    ) -> Result<AlertId, AlertError> {
        let rule = AlertRule::new(subject, kind, threshold, direction, (self.clock)())?;
        let id = self.alerts.add(rule);
        info!("Alert {} set: {} {} {}", id, subject, direction.as_str(), threshold);

        let key = subject.to_string();
        if let Some(value) = cache.value(&key).and_then(Snapshot::primary_value) {
            let label = label_for(cache, &key);
            self.evaluate(subject, kind, &label, value);
        }
        Ok(id)
    }

    pub fn remove_rule(&mut self, id: AlertId) -> bool {
        self.alerts.remove(id).is_some()
    }

    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.notifications.dismiss(id)
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    /// Fires every pending rule on `subject` that `value` crosses.
    pub fn evaluate(&mut self, subject: &str, kind: SubjectKind, label: &str, value: f64) -> usize {
        let now = (self.clock)();
        let mut emitted = 0;
        for rule in self.alerts.trigger(subject, kind, value) {
            let message = threshold_message(&rule, kind, label, value);
            info!("Alert {} triggered: {}", rule.id, message);
            if self
                .notifications
                .push(NotificationEvent::new(message, NotificationSource::Alert(rule.id), now))
            {
                emitted += 1;
            }
        }
        emitted
    }

    fn observe(&mut self, subject: &str, kind: SubjectKind, label: &str, value: f64) -> usize {
        let mut emitted = 0;
        if kind == SubjectKind::Coin {
            if let Some(change_pct) = self.movement.observe(subject, value) {
                let direction = if change_pct > 0.0 { "increased" } else { "decreased" };
                let message = format!(
                    "{} price has {} by {:.2}%",
                    subject.to_uppercase(),
                    direction,
                    change_pct.abs()
                );
                let source = NotificationSource::Movement {
                    symbol: subject.to_string(),
                    change_pct,
                };
                self.notifications
                    .push(NotificationEvent::new(message, source, (self.clock)()));
                emitted += 1;
            }
        }
        emitted + self.evaluate(subject, kind, label, value)
    }
}

fn label_for<V: Snapshot>(cache: &SnapshotCache<String, V>, key: &String) -> String {
    cache
        .value(key)
        .and_then(Snapshot::label)
        .unwrap_or_else(|| key.clone())
}

fn threshold_message(rule: &AlertRule, kind: SubjectKind, label: &str, value: f64) -> String {
    match kind {
        SubjectKind::Coin => format!(
            "{} price is {} {}! Current price: {}",
            label,
            rule.direction.as_str(),
            format_usd(rule.threshold),
            format_usd(value)
        ),
        SubjectKind::City => format!(
            "{} temperature is {} {:.1}°C! Current temperature: {:.1}°C",
            label,
            rule.direction.as_str(),
            rule.threshold,
            value
        ),
    }
}
