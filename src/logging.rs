//! Tracing subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::LoggingSection;

const LOG_FILE_PREFIX: &str = "cockpit.log";

/// Install the global subscriber.
///
/// Logs go to stderr so command output on stdout stays clean. When a log
/// directory is configured, a daily-rolled file is written as well; the
/// returned guard must be held until exit so buffered lines are flushed.
/// Calling this twice is harmless: the second call installs nothing.
pub fn init_logging(verbose: bool, config: &LoggingSection) -> Option<WorkerGuard> {
    let (json_layer, text_layer) = if config.json {
        (
            Some(fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
        )
    };

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => guard,
        Err(_) => None,
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` picks the default level.
fn build_env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,cockpit=debug")
        } else {
            EnvFilter::new("warn,cockpit=info")
        }
    })
}
