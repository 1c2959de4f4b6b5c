//! scanorc CLI entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use scanorc::adapters::in_memory::InMemoryRepository;
use scanorc::adapters::sqlite::{initialize_default_database, SqliteRepository};
use scanorc::cli::commands::{dependency, monitor, orchestration, resource, run, AppContext};
use scanorc::cli::types::{Cli, Commands};
use scanorc::domain::models::{EngineConfig, LoggingConfig};
use scanorc::domain::ports::Repository;
use scanorc::infrastructure::config::ConfigLoader;
use scanorc::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;

    let _logger = LoggerImpl::init(&log_config_from(&config.logging))
        .context("failed to initialize logging")?;

    let repository: Arc<dyn Repository> = if cli.in_memory {
        Arc::new(InMemoryRepository::new())
    } else {
        let pool = initialize_default_database()
            .await
            .context("failed to initialize the scanorc database")?;
        Arc::new(SqliteRepository::new(pool))
    };

    let ctx = AppContext::new(repository, config, cli.json);

    match cli.command {
        Commands::Orchestration(cmd) => orchestration::execute(&ctx, cmd).await,
        Commands::Resource(cmd) => resource::execute(&ctx, cmd).await,
        Commands::Monitor(cmd) => monitor::execute(&ctx, cmd).await,
        Commands::Dependency(cmd) => dependency::execute(&ctx, cmd).await,
        Commands::Run { max_concurrent, once } => run::execute(&ctx, max_concurrent, once).await,
    }
}

/// `domain::models::LoggingConfig` only carries the handful of knobs an
/// `EngineConfig` needs to validate; the infrastructure layer's `LogConfig`
/// additionally controls file rotation and stdout emission, which the
/// engine config has no opinion on, so those always take their defaults.
fn log_config_from(logging: &LoggingConfig) -> LogConfig {
    let format = if logging.format.eq_ignore_ascii_case("pretty") {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    };

    LogConfig {
        level: logging.level.clone(),
        format,
        retention_days: i64::from(logging.retention_days),
        ..LogConfig::default()
    }
}
