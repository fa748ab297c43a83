use crate::api::coincap::backoff::{Backoff, ReconnectPolicy};
use crate::error::DashboardError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const COINCAP_WS_URL: &str = "wss://ws.coincap.io";

const TICK_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "OFFLINE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "LIVE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    /// Fixed at connect time; the venue has no subscribe protocol.
    pub assets: Vec<String>,
    pub reconnect: ReconnectPolicy,
}

impl FeedConfig {
    pub fn url(&self) -> String {
        format!(
            "{}/prices?assets={}",
            self.base_url.trim_end_matches('/'),
            self.assets.join(",")
        )
    }
}

/// Parses a `{ "<symbol>": "<price>", ... }` frame. Entries whose price is
/// not a positive finite number are dropped; the rest are kept.
pub fn parse_frame(text: &str) -> Result<Vec<PriceTick>, serde_json::Error> {
    let frame: Map<String, Value> = serde_json::from_str(text)?;
    Ok(frame
        .into_iter()
        .filter_map(|(symbol, raw)| parse_price(&raw).map(|price| PriceTick { symbol, price }))
        .collect())
}

fn parse_price(raw: &Value) -> Option<f64> {
    let price = match raw {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}

struct Session {
    shutdown: watch::Sender<bool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Long-lived connection to the CoinCap price stream.
///
/// `connect` starts a background session that reconnects on its own after any
/// close or error; `disconnect` stops it for good until the next `connect`.
pub struct FeedClient {
    config: FeedConfig,
    ticks: broadcast::Sender<PriceTick>,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    intentional_stop: bool,
    session: Option<Session>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        let (ticks, _) = broadcast::channel(TICK_BUFFER);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            ticks,
            state: Arc::new(state),
            attempts: Arc::new(AtomicU32::new(0)),
            intentional_stop: false,
            session: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceTick> {
        self.ticks.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_intentionally_stopped(&self) -> bool {
        self.intentional_stop
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| !session.task.is_finished())
    }

    /// Starts a session. A session waiting out its reconnect delay retries
    /// at once with the attempt counter reset. Ignored while connecting or
    /// connected.
    pub fn connect(&mut self) {
        if self.is_active() {
            if self.connection_state() == ConnectionState::Disconnected {
                info!("Price feed reconnecting now");
                self.intentional_stop = false;
                self.attempts.store(0, Ordering::SeqCst);
                if let Some(session) = &self.session {
                    session.wake.notify_one();
                }
            } else {
                debug!("Price feed already active, ignoring connect");
            }
            return;
        }
        self.intentional_stop = false;
        self.attempts = Arc::new(AtomicU32::new(0));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let context = SessionContext {
            url: self.config.url(),
            policy: self.config.reconnect,
            ticks: self.ticks.clone(),
            state: self.state.clone(),
            attempts: self.attempts.clone(),
            shutdown: shutdown_rx,
            wake: wake.clone(),
        };
        let task = tokio::spawn(context.run());
        self.session = Some(Session { shutdown, wake, task });
    }

    /// Closes the socket, cancels any pending reconnect and suppresses further
    /// reconnection until `connect` is called again.
    pub fn disconnect(&mut self) {
        self.intentional_stop = true;
        if let Some(session) = self.session.take() {
            // Err only means the session task already ended.
            let _ = session.shutdown.send(true);
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!("Price feed disconnected");
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
    Failed(DashboardError),
}

struct SessionContext {
    url: String,
    policy: ReconnectPolicy,
    ticks: broadcast::Sender<PriceTick>,
    state: Arc<watch::Sender<ConnectionState>>,
    attempts: Arc<AtomicU32>,
    shutdown: watch::Receiver<bool>,
    wake: Arc<Notify>,
}

impl SessionContext {
    async fn run(mut self) {
        let mut backoff = Backoff::new(self.policy);
        loop {
            self.publish(ConnectionState::Connecting);
            info!("Connecting to price feed: {}", self.url);

            let connected = tokio::select! {
                _ = self.shutdown.changed() => return,
                result = connect_async(self.url.as_str()) => result,
            };
            match connected {
                Ok((stream, _)) => {
                    info!("Price feed connected");
                    backoff.reset();
                    self.attempts.store(0, Ordering::SeqCst);
                    self.publish(ConnectionState::Connected);
                    match self.pump(stream).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::Closed => info!("Price feed closed by server"),
                        SessionEnd::Failed(e) => warn!("Price feed error: {}", e),
                    }
                }
                Err(e) => warn!("Price feed connection failed: {}", e),
            }

            if *self.shutdown.borrow() {
                return;
            }
            self.publish(ConnectionState::Disconnected);

            if backoff.is_exhausted() {
                warn!(
                    "Max reconnection attempts reached, retrying every {}ms",
                    self.policy.long_interval.as_millis()
                );
            }
            let delay = backoff.next_delay();
            self.attempts.store(backoff.attempts(), Ordering::SeqCst);
            info!(
                "Reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                backoff.attempts(),
                self.policy.max_attempts
            );
            tokio::select! {
                _ = self.shutdown.changed() => return,
                _ = self.wake.notified() => backoff.reset(),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Close frame not sent: {}", e);
                    }
                    return SessionEnd::Shutdown;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.forward(&text),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Failed(e.into()),
                },
            }
        }
    }

    fn forward(&self, text: &str) {
        match parse_frame(text) {
            Ok(ticks) => {
                for tick in ticks {
                    debug!("{}: {}", tick.symbol, tick.price);
                    // No receiver is fine: ticks are never queued.
                    let _ = self.ticks.send(tick);
                }
            }
            Err(e) => warn!("Failed to parse price frame: {}", e),
        }
    }

    /// State writes are skipped once `disconnect` has taken over the state.
    fn publish(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *self.shutdown.borrow() || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
