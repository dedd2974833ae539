use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use survey_bot::bot::SurveyBot;
use survey_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use survey_bot::config::BotConfig;
use survey_bot::dispatcher::Dispatcher;
use survey_bot::error::{BackendLoadError, ConfigError};
use survey_bot::llm::{BackendCatalog, BackendRegistry, ModelParams};
use survey_bot::status::{self, StatusRouteState};
use survey_bot::survey::StepRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = BotConfig::from_env()?;
    let _log_guard = init_tracing(&config);

    eprintln!("📋 Survey Bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Survey data ─────────────────────────────────────────────────────
    let steps = Arc::new(StepRegistry::load(&config.steps_path)?);
    let params = ModelParams::load(&config.model_params_path);
    eprintln!("   Steps: {}", config.steps_path.display());

    // ── Backends ────────────────────────────────────────────────────────
    let catalog = BackendCatalog::from_config(&config, &params);
    let known = catalog.names().join(", ");
    let registry = BackendRegistry::from_catalog(
        catalog,
        &config.default_backend,
        config.backend_load_timeout,
    )
    .await
    .map_err(|e| match e {
        BackendLoadError::UnknownBackend { name } => {
            anyhow::Error::from(ConfigError::UnknownDefaultBackend {
                name,
                known: known.clone(),
            })
        }
        other => anyhow::Error::from(other).context("Failed to load the default backend"),
    })?;
    eprintln!("   Backend: {} (available: {known})", config.default_backend);

    let dispatcher = Arc::new(
        Dispatcher::new(Arc::clone(&steps), Arc::new(registry)).configured(&config),
    );
    if let Some(path) = dispatcher.results().path() {
        eprintln!("   Results: {}", path.display());
    }

    // ── Status server ───────────────────────────────────────────────────
    if let Some(port) = config.status_port {
        let state = StatusRouteState {
            dispatcher: Arc::clone(&dispatcher),
        };
        tokio::spawn(async move {
            if let Err(e) = status::serve(port, state).await {
                tracing::error!(port, "Status server failed: {e}");
            }
        });
        eprintln!("   Status: http://0.0.0.0:{port}/api/status");
    }

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    channels.add(Arc::new(CliChannel::new()));

    if let Some(token) = config.telegram_token.clone() {
        let allowed_users = config.telegram_allowed_users.clone();
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed_users.join(", ")
            }
        );
        channels.add(Arc::new(TelegramChannel::new(token, allowed_users)));
    }
    channels.health_check_all().await;
    eprintln!("   Channels: {}\n", channels.names().join(", "));

    SurveyBot::new(dispatcher, channels)
        .run()
        .await
        .context("Survey bot stopped with an error")?;

    Ok(())
}

/// Console logging filtered by `RUST_LOG`, plus daily log files when a log
/// directory is configured. The returned guard flushes the file writer.
fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "survey-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}
