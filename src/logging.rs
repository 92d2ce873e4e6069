use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of the transaction lifecycle events (begin / commit / rollback)
const STORE_TARGET: &str = "simple_bank::store";

/// Install the global subscriber: a rolling file layer plus, in text mode,
/// an ANSI stdout layer. `RUST_LOG` overrides the configured directives.
///
/// Keep the returned guard alive for the life of the process, dropping it
/// flushes the file writer.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directives = filter_directives(&config.log_level, config.store_log_level.as_deref());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let registry = tracing_subscriber::registry().with(filter);

    // JSON keeps the target so store events can be filtered downstream;
    // text output is for humans and hides it.
    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    tracing::debug!(directives = %directives, "Logging initialized");
    guard
}

/// Base level, an optional level for the store layer, and sqlx held at
/// warn (it logs every statement at info) unless the base level names it.
fn filter_directives(log_level: &str, store_log_level: Option<&str>) -> String {
    let mut directives = vec![log_level.to_string()];
    if let Some(level) = store_log_level {
        directives.push(format!("{}={}", STORE_TARGET, level));
    }
    if !log_level.contains("sqlx") {
        directives.push("sqlx=warn".to_string());
    }
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_quieted_by_default() {
        assert_eq!(filter_directives("info", None), "info,sqlx=warn");
        assert_eq!(filter_directives("debug,sqlx=info", None), "debug,sqlx=info");
    }

    #[test]
    fn test_store_level_directive() {
        assert_eq!(
            filter_directives("info", Some("debug")),
            "info,simple_bank::store=debug,sqlx=warn"
        );
        assert!(EnvFilter::try_new(filter_directives("warn", Some("trace"))).is_ok());
    }
}
