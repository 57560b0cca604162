use coinledger::adapters::{HttpOrderGateway, PaperOrderGateway};
use coinledger::config::{AppConfig, LoggingConfig};
use coinledger::error::{LedgerError, Result};
use coinledger::exchange::OrderGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn create_order_gateway(config: &AppConfig) -> Result<Arc<dyn OrderGateway>> {
    if config.dry_run.enabled {
        info!("Running in DRY RUN mode - orders are paper-filled");
        return Ok(Arc::new(PaperOrderGateway::new()));
    }

    let order_url = config.execution.order_url.as_deref().ok_or_else(|| {
        LedgerError::Validation("execution.order_url is required for live orders".to_string())
    })?;
    warn!(order_url, "LIVE order gateway enabled");
    Ok(Arc::new(HttpOrderGateway::new(
        order_url,
        Duration::from_millis(config.execution.request_timeout_ms),
    )?))
}

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},coinledger=debug,sqlx=warn", logging.level))
    });

    // Prefer COINLEDGER_LOG_DIR, fall back to LOG_DIR, then ./logs
    let log_dir = std::env::var("COINLEDGER_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "logs".to_string());

    // `tracing_appender::rolling::daily` panics if it cannot create the first
    // file, so writability is checked up front.
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".coinledger_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "coinledger.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let (json_layer, text_layer) = if logging.json {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/coinledger.log", log_dir);
    }
}
