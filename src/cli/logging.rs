use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "DISKCLEAN_LOG";

fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "diskclean=debug" } else { "diskclean=info" };
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid {}='{}': {}", LOG_ENV, directive, e);
            EnvFilter::new(default)
        }),
        Err(_) => EnvFilter::new(default),
    }
}

/// Install stderr logging plus a daily rolling file under `log_dir`.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process. When the log directory cannot be created only
/// the stderr layer is installed.
pub fn init_logger(log_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Logging to stderr only, cannot create {}: {}", log_dir.display(), e);
        let _ = tracing_subscriber::registry()
            .with(filter(verbose))
            .with(stderr_layer)
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "diskclean.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(stderr_layer)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();

    Some(guard)
}
