use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::config::Config;

/// Installs the global subscriber. The returned guard flushes the file writer
/// when dropped, so keep it alive until the process exits.
pub fn setup(config: &Config) -> Option<WorkerGuard> {
    // Stdout is reserved for command output.
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.log_to_file {
        // Logs to <log_dir>/windisplay.log.YYYY-MM-DD
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "windisplay.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false);
        (Some(file_layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
