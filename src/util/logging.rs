//! `tracing` subscriber setup for test binaries using fixturebox
//!
//! Fixture lifecycle events are emitted under the `fixturebox` target:
//! `debug` for every build/start/teardown step, `info` when a fixture is ready
//! or removed, `warn` for discarded errors and leaked fixtures.
//!
//! # Example
//!
//! ```no_run
//! use fixturebox::util::logging;
//!
//! // Reads FIXTUREBOX_LOG_LEVEL / FIXTUREBOX_LOG_JSON, honours RUST_LOG
//! logging::init_from_env();
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Directives applied when `RUST_LOG` is unset, to quieten the client's HTTP stack
const QUIET_DIRECTIVES: [&str; 3] = ["hyper=warn", "hyper_util=warn", "bollard=info"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for the `fixturebox` target
    pub level: Level,

    /// Emit JSON lines instead of human-readable output
    pub use_json: bool,

    pub include_target: bool,

    /// Include file and line number
    pub include_location: bool,

    /// Write to the test harness's captured output instead of stderr
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            test_writer: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with locations, for CI log collectors
    pub fn ci() -> Self {
        Self {
            level: Level::DEBUG,
            use_json: true,
            include_target: true,
            include_location: true,
            test_writer: false,
        }
    }
}

/// Parses a log level, case-insensitively, defaulting to INFO
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("fixturebox={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for quiet in QUIET_DIRECTIVES {
            if let Ok(directive) = quiet.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Installs the global subscriber; later calls are no-ops
///
/// Uses `try_init` so a subscriber installed by the test harness or another
/// crate is left in place.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        let result = if config.use_json {
            let layer = fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            if config.test_writer {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.with_test_writer())
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.with_writer(std::io::stderr))
                    .try_init()
            }
        } else {
            let layer = fmt::layer()
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            if config.test_writer {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.with_test_writer())
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.with_writer(std::io::stderr))
                    .try_init()
            }
        };

        if let Err(e) = result {
            eprintln!("fixturebox logging not installed: {}", e);
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `FIXTUREBOX_LOG_LEVEL` and `FIXTUREBOX_LOG_JSON`
pub fn init_from_env() {
    let level = env::var("FIXTUREBOX_LOG_LEVEL")
        .map(|v| parse_level(&v))
        .unwrap_or(Level::INFO);

    let use_json = env::var("FIXTUREBOX_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}
