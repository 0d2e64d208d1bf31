/*!
 * Logging Module
 * Subscriber setup (console + rolling files) and HTTP request logging
 */
pub mod config;
pub mod middleware;

pub use config::LogConfig;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Install the global subscriber.
///
/// The returned guards flush the background writers when dropped and must be
/// held until the process exits.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(&config.dir) {
        eprintln!("cannot create log directory {}: {}", config.dir.display(), e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.dir, "app.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());
    let mut guards = vec![file_guard, console_guard];

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.is_production() {
        let (error_writer, error_guard) = non_blocking(rolling::daily(&config.dir, "error.log"));
        guards.push(error_guard);

        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        registry
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .try_init()
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        registry.with(file_layer).with(console_layer).try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }

    tracing::info!(
        environment = %config.environment,
        level = %config.level,
        dir = %config.dir.display(),
        "logging initialized"
    );
    guards
}
