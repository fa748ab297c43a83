mod api;
mod app;
mod config;
mod engine;
mod error;
mod format;
mod preferences;
mod ui;

use api::coincap::ws::FeedClient;
use api::Providers;
use app::App;
use config::Config;
use env_logger::Builder;
use error::DashboardError;
use log::{error, info, LevelFilter};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use ui::dashboard::Dashboard;

fn init_logging(config: &Config) -> Result<(), DashboardError> {
    // The dashboard owns the terminal, so logs go to a file.
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("cryptoweather", LevelFilter::Debug);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .write_style(env_logger::WriteStyle::Never)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env();
    init_logging(&config)?;

    info!(
        "Starting CryptoWeather: {} coins, {} cities",
        config.coins.len(),
        config.cities.len()
    );

    let providers = Providers::new(&config)?;

    let mut feed = FeedClient::new(config.feed());
    let ticks = feed.subscribe();
    let connection = feed.state();
    feed.connect();

    let mut dashboard = Dashboard::new(App::new(&config), providers);
    let result = dashboard.run(ticks, connection).await;

    feed.disconnect();
    if let Err(e) = &result {
        error!("Dashboard error: {}", e);
    }

    info!("Shutdown complete");
    result
}
