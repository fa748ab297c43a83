use crate::error::FetchError;
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Sends `request` and decodes a JSON body, classifying every failure.
/// Request URLs are never logged since some carry API keys.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    provider: &'static str,
) -> Result<T, FetchError> {
    let resp = request
        .send()
        .await
        .map_err(|e| FetchError::Network(e.without_url().to_string()))?;

    if let Some(err) = classify_status(provider, resp.status()) {
        debug!("{} answered {}", provider, resp.status());
        return Err(err);
    }

    resp.json::<T>().await.map_err(classify_body_error)
}

fn classify_body_error(err: reqwest::Error) -> FetchError {
    let err = err.without_url();
    if err.is_decode() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

pub fn classify_status(provider: &'static str, status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(FetchError::RateLimited { provider })
    } else {
        Some(FetchError::Status {
            provider,
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers a single HTTP request with `status` and `body`.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn json_body_is_decoded() {
        let url = serve_once("200 OK", r#"{"id":"bitcoin"}"#).await;
        let client = build_client().unwrap();
        let body: Value = send_json(client.get(url), "coingecko").await.unwrap();
        assert_eq!(body["id"], "bitcoin");
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let url = serve_once("200 OK", "not json!").await;
        let client = build_client().unwrap();
        let result = send_json::<Value>(client.get(url), "coingecko").await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn rate_limit_response_is_classified() {
        let url = serve_once("429 Too Many Requests", "{}").await;
        let client = build_client().unwrap();
        let result = send_json::<Value>(client.get(url), "newsdata").await;
        assert_eq!(result, Err(FetchError::RateLimited { provider: "newsdata" }));
    }

    #[test]
    fn success_is_not_an_error() {
        assert_eq!(classify_status("coingecko", StatusCode::OK), None);
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        let err = classify_status("coingecko", StatusCode::TOO_MANY_REQUESTS).unwrap();
        assert_eq!(err, FetchError::RateLimited { provider: "coingecko" });
        assert!(err.keeps_stale());
    }

    #[test]
    fn other_statuses_carry_the_code() {
        let err = classify_status("openweather", StatusCode::NOT_FOUND).unwrap();
        assert_eq!(
            err,
            FetchError::Status {
                provider: "openweather",
                status: 404
            }
        );
        assert!(!err.keeps_stale());
        assert!(classify_status("newsdata", StatusCode::BAD_GATEWAY)
            .unwrap()
            .keeps_stale());
    }
}
