//! Logging demonstration
//!
//! Shows the logging formats and structured fields used across the player
//! crates.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{debug, error, info, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some(_) => LogFormat::Pretty,
        None => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_target(true);

    if let Some(filter) = args.get(2).cloned() {
        config = config.with_filter(filter);
    }

    init_logging(config).expect("Failed to initialize logging");

    info!(format = ?format, "Logging initialized");

    demo_log_levels();
    demo_structured_logging();
    demo_spans().await;

    info!("Demo complete");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("This is a TRACE level log");
    debug!("This is a DEBUG level log");
    info!("This is an INFO level log");
    warn!("This is a WARN level log");
    error!("This is an ERROR level log");
}

fn demo_structured_logging() {
    let span = span!(Level::INFO, "structured_logging");
    let _enter = span.enter();

    info!("Simple message without fields");

    info!(
        track_id = "12345",
        title = "Song Title",
        duration_secs = 245.0,
        "Track information"
    );

    info!(
        queue_len = 42,
        current_index = 7,
        shuffle = true,
        "Queue state"
    );
}

async fn demo_spans() {
    let span = span!(Level::INFO, "queue_replacement", title = "Favorites");
    let _enter = span.enter();

    info!("Replacing the active queue");

    {
        let inner_span = span!(Level::DEBUG, "fetch_page");
        let _inner = inner_span.enter();

        debug!(start_index = 0, count = 50, "Fetched queue page");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    {
        let inner_span = span!(Level::DEBUG, "resolve_source");
        let _inner = inner_span.enter();

        debug!(track_id = "12345", delivery = "segmented", "Resolved source");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    info!(track_count = 50, "Queue replaced");
}
