use crate::api::http::send_json;
use crate::engine::cache::Snapshot;
use crate::error::FetchError;
use reqwest::Client;
use serde::Deserialize;

pub const NEWSDATA_API_URL: &str = "https://newsdata.io/api/1";
pub const API_KEY_VAR: &str = "NEWSDATA_API_KEY";
pub const NEWS_KEY: &str = "crypto";
const PROVIDER: &str = "newsdata";
const MAX_ARTICLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<Article>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsBundle {
    pub articles: Vec<Article>,
}

impl Snapshot for NewsBundle {}

impl From<NewsResponse> for NewsBundle {
    fn from(resp: NewsResponse) -> Self {
        let mut articles = resp.results;
        articles.truncate(MAX_ARTICLES);
        Self { articles }
    }
}

pub async fn fetch_news(client: &Client, base: &str, api_key: Option<&str>) -> Result<NewsBundle, FetchError> {
    let api_key = api_key.ok_or(FetchError::MissingKey(API_KEY_VAR))?;
    let size = MAX_ARTICLES.to_string();
    let request = client
        .get(format!("{}/news", base.trim_end_matches('/')))
        .query(&[
            ("apikey", api_key),
            ("q", "cryptocurrency"),
            ("language", "en"),
            ("size", size.as_str()),
        ]);
    let resp: NewsResponse = send_json(request, PROVIDER).await?;
    Ok(resp.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(n: usize) -> String {
        format!(
            r#"{{"title":"Headline {n}","link":"https://example.com/{n}","source_id":"wire","pubDate":"2024-05-01 10:0{n}:00","description":null}}"#
        )
    }

    #[test]
    fn keeps_first_five_results() {
        let results: Vec<String> = (0..7).map(article).collect();
        let body = format!(r#"{{"status":"success","results":[{}]}}"#, results.join(","));
        let resp: NewsResponse = serde_json::from_str(&body).unwrap();
        let bundle = NewsBundle::from(resp);

        assert_eq!(bundle.articles.len(), 5);
        assert_eq!(bundle.articles[0].title, "Headline 0");
        assert_eq!(bundle.articles[4].pub_date, "2024-05-01 10:04:00");
        assert_eq!(bundle.articles[0].description, None);
    }

    #[test]
    fn empty_results_are_an_empty_bundle() {
        let resp: NewsResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(NewsBundle::from(resp).articles.is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let result = fetch_news(&Client::new(), NEWSDATA_API_URL, None).await;
        assert_eq!(result, Err(FetchError::MissingKey(API_KEY_VAR)));
    }
}
