use std::fs;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};
use crate::config::LoggingConfig;
use crate::error::PeerError;

static INIT: Once = Once::new();

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber: console output, plus daily rotated JSON
/// files when a log directory is configured. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<(), PeerError> {
    if let Some(dir) = &config.dir {
        fs::create_dir_all(dir)?;
    }

    let mut result = Ok(());
    INIT.call_once(|| {
        let console = fmt::Layer::new()
            .with_target(true)
            .with_ansi(true)
            .with_filter(filter(&config.level));

        let file = match &config.dir {
            Some(dir) => {
                match tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::DAILY)
                    .filename_prefix("asg-peers")
                    .filename_suffix("log")
                    .build(dir)
                {
                    Ok(appender) => Some(
                        fmt::Layer::new()
                            .json()
                            .with_writer(appender)
                            .with_file(true)
                            .with_line_number(true)
                            .with_thread_ids(true)
                            .with_target(true)
                            .with_ansi(false)
                            .with_filter(filter(&config.level)),
                    ),
                    Err(e) => {
                        result = Err(PeerError::Config(format!("Failed to create log file appender: {}", e)));
                        return;
                    }
                }
            }
            None => None,
        };

        let subscriber = tracing_subscriber::registry().with(console).with(file);
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            result = Err(PeerError::Config(format!("Failed to set tracing subscriber: {}", e)));
        }
    });
    result
}
