use crate::error::AlertError;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertId(Uuid);

impl AlertId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Inclusive comparison: a value equal to the threshold crosses it.
    pub fn is_crossed(self, value: f64, threshold: f64) -> bool {
        match self {
            Direction::Above => value >= threshold,
            Direction::Below => value <= threshold,
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Coin,
    City,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub id: AlertId,
    pub subject_key: String,
    pub subject_kind: SubjectKind,
    pub threshold: f64,
    pub direction: Direction,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn new(
        subject_key: impl Into<String>,
        subject_kind: SubjectKind,
        threshold: f64,
        direction: Direction,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AlertError> {
        validate_threshold(threshold)?;
        Ok(Self {
            id: AlertId::generate(),
            subject_key: subject_key.into(),
            subject_kind,
            threshold,
            direction,
            triggered: false,
            created_at,
        })
    }

    pub fn is_crossed_by(&self, value: f64) -> bool {
        self.direction.is_crossed(value, self.threshold)
    }
}

/// Parses user input for an alert price.
pub fn parse_threshold(input: &str) -> Result<f64, AlertError> {
    let trimmed = input.trim();
    let threshold = trimmed
        .parse::<f64>()
        .map_err(|_| AlertError::NotANumber(trimmed.to_string()))?;
    validate_threshold(threshold)?;
    Ok(threshold)
}

fn validate_threshold(threshold: f64) -> Result<(), AlertError> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(AlertError::OutOfRange(threshold))
    }
}

/// The session's alert rules, in creation order.
#[derive(Debug, Clone, Default)]
pub struct AlertBook {
    rules: Vec<AlertRule>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: AlertRule) -> AlertId {
        let id = rule.id;
        self.rules.push(rule);
        id
    }

    pub fn remove(&mut self, id: AlertId) -> Option<AlertRule> {
        let index = self.rules.iter().position(|rule| rule.id == id)?;
        Some(self.rules.remove(index))
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Flips every pending rule on `subject` of `kind` that `value` crosses and
    /// returns copies of the rules that just fired. A triggered rule never fires again.
    pub fn trigger(&mut self, subject: &str, kind: SubjectKind, value: f64) -> Vec<AlertRule> {
        let mut fired = Vec::new();
        for rule in self
            .rules
            .iter_mut()
            .filter(|rule| !rule.triggered && rule.subject_kind == kind && rule.subject_key == subject)
        {
            if rule.is_crossed_by(value) {
                rule.triggered = true;
                fired.push(rule.clone());
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(subject: &str, threshold: f64, direction: Direction) -> AlertRule {
        AlertRule::new(subject, SubjectKind::Coin, threshold, direction, Utc::now()).unwrap()
    }

    #[test]
    fn above_boundary_is_inclusive() {
        let above = rule("bitcoin", 100.0, Direction::Above);
        assert!(!above.is_crossed_by(99.999));
        assert!(above.is_crossed_by(100.0));
        assert!(above.is_crossed_by(100.5));
    }

    #[test]
    fn below_boundary_is_inclusive() {
        let below = rule("bitcoin", 100.0, Direction::Below);
        assert!(below.is_crossed_by(100.0));
        assert!(below.is_crossed_by(42.0));
        assert!(!below.is_crossed_by(100.001));
    }

    #[test]
    fn threshold_input_is_validated() {
        assert_eq!(parse_threshold(" 65000.5 "), Ok(65_000.5));
        assert_eq!(parse_threshold("abc"), Err(AlertError::NotANumber("abc".into())));
        assert_eq!(parse_threshold(""), Err(AlertError::NotANumber(String::new())));
        assert_eq!(parse_threshold("0"), Err(AlertError::OutOfRange(0.0)));
        assert_eq!(parse_threshold("-5"), Err(AlertError::OutOfRange(-5.0)));
        assert!(matches!(parse_threshold("inf"), Err(AlertError::OutOfRange(_))));
        assert!(matches!(parse_threshold("NaN"), Err(AlertError::OutOfRange(_))));
    }

    #[test]
    fn rule_constructor_rejects_bad_threshold() {
        let result = AlertRule::new("bitcoin", SubjectKind::Coin, f64::NAN, Direction::Above, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn rule_fires_once_per_lifetime() {
        let mut book = AlertBook::new();
        let id = book.add(rule("bitcoin", 100.0, Direction::Above));

        assert!(book.trigger("bitcoin", SubjectKind::Coin, 99.0).is_empty());
        let fired = book.trigger("bitcoin", SubjectKind::Coin, 101.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);

        for price in [102.0, 50.0, 150.0] {
            assert!(book.trigger("bitcoin", SubjectKind::Coin, price).is_empty());
            assert!(book.get(id).unwrap().triggered);
        }
    }

    #[test]
    fn only_matching_subject_is_evaluated() {
        let mut book = AlertBook::new();
        book.add(rule("bitcoin", 100.0, Direction::Above));
        let eth = book.add(rule("ethereum", 100.0, Direction::Above));

        let fired = book.trigger("ethereum", SubjectKind::Coin, 200.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, eth);
        assert!(!book.rules()[0].triggered);
    }

    #[test]
    fn coin_and_city_with_same_key_are_separate() {
        let mut book = AlertBook::new();
        let coin = book.add(rule("london", 10.0, Direction::Above));
        let city = book.add(
            AlertRule::new("london", SubjectKind::City, 10.0, Direction::Above, Utc::now()).unwrap(),
        );

        let fired = book.trigger("london", SubjectKind::City, 12.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, city);
        assert!(!book.get(coin).unwrap().triggered);
    }

    #[test]
    fn removed_rule_can_be_recreated() {
        let mut book = AlertBook::new();
        let id = book.add(rule("bitcoin", 100.0, Direction::Above));
        book.trigger("bitcoin", SubjectKind::Coin, 100.0);

        assert!(book.remove(id).is_some());
        assert!(book.remove(id).is_none());
        assert!(book.is_empty());

        book.add(rule("bitcoin", 100.0, Direction::Above));
        assert_eq!(book.trigger("bitcoin", SubjectKind::Coin, 100.0).len(), 1);
        assert_eq!(book.len(), 1);
    }
}
