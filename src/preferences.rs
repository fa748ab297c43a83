use std::time::Duration;

/// Favorites and refresh cadence. Lives for the session only.
#[derive(Debug, Clone)]
pub struct Preferences {
    favorite_coins: Vec<String>,
    favorite_cities: Vec<String>,
    pub refresh_interval: Duration,
}

impl Preferences {
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            favorite_coins: Vec::new(),
            favorite_cities: Vec::new(),
            refresh_interval,
        }
    }

    /// Returns whether `id` is a favorite afterwards.
    pub fn toggle_coin(&mut self, id: &str) -> bool {
        toggle(&mut self.favorite_coins, id)
    }

    pub fn toggle_city(&mut self, city: &str) -> bool {
        toggle(&mut self.favorite_cities, city)
    }

    pub fn is_favorite_coin(&self, id: &str) -> bool {
        self.favorite_coins.iter().any(|fav| fav == id)
    }

    pub fn is_favorite_city(&self, city: &str) -> bool {
        self.favorite_cities.iter().any(|fav| fav == city)
    }

    pub fn order_coins(&self, coins: &[String]) -> Vec<String> {
        favorites_first(coins, |id| self.is_favorite_coin(id))
    }

    pub fn order_cities(&self, cities: &[String]) -> Vec<String> {
        favorites_first(cities, |city| self.is_favorite_city(city))
    }
}

fn toggle(favorites: &mut Vec<String>, item: &str) -> bool {
    if let Some(pos) = favorites.iter().position(|fav| fav == item) {
        favorites.remove(pos);
        false
    } else {
        favorites.push(item.to_string());
        true
    }
}

fn favorites_first<F: Fn(&str) -> bool>(items: &[String], is_favorite: F) -> Vec<String> {
    let (mut ordered, rest): (Vec<String>, Vec<String>) =
        items.iter().cloned().partition(|item| is_favorite(item));
    ordered.extend(rest);
    ordered
}
