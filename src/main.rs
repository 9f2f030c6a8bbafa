use clap::Parser;
use skyboard_core::{AppError, Config};
use skyboard_server::{AppState, RecaptchaVerifier};
use skyboard_weather::{OpenWeatherProvider, WeatherAggregator, WeatherCache};
use std::path::PathBuf;
use std::sync::Arc;

/// Weather aggregation and caching gateway
#[derive(Debug, Parser)]
#[command(name = "skyboard", version, about)]
struct Args {
    /// Config file (defaults to <config dir>/skyboard/config.toml)
    #[arg(short, long, env = "SKYBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    // Initialize core
    skyboard_core::init()?;

    run(args)
        .await
        .inspect_err(|e| tracing::error!("{} ({})", e.user_message(), e))
}

async fn run(args: Args) -> Result<(), AppError> {
    let (config, _) = Config::load_validated(args.config.as_deref())?;
    let bind_addr = args.bind.unwrap_or_else(|| config.server.bind_addr.clone());

    let cache = match config.cache.sweep_interval() {
        Some(sweep) => WeatherCache::create(config.cache.ttl(), sweep),
        None => Arc::new(WeatherCache::new(config.cache.ttl())),
    };

    let provider = OpenWeatherProvider::from_config(&config.openweather)?;
    let aggregator = Arc::new(
        WeatherAggregator::new(Arc::new(provider), cache.clone())
            .with_update_interval(config.subscriptions.interval()),
    );
    let recaptcha = RecaptchaVerifier::new(&config.recaptcha, config.openweather.timeout())?;

    tracing::info!(
        "Skyboard started (cache ttl {:?}, update interval {:?}, reCAPTCHA {})",
        config.cache.ttl(),
        config.subscriptions.interval(),
        if recaptcha.is_enabled() { "enabled" } else { "bypassed" }
    );

    let state = AppState::new(aggregator, recaptcha);
    let served = skyboard_server::serve(&bind_addr, state, shutdown_signal()).await;

    // Graceful shutdown
    cache.dispose();
    tracing::info!("Skyboard stopped");

    served.map_err(AppError::from)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received, shutting down");
}
