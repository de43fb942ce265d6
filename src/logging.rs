// Logging layer for flexpool.
//
// Built on the `tracing` ecosystem. The pool itself only emits events;
// embedders that already install a subscriber can ignore this module
// entirely.

use std::fs::{File, OpenOptions};
use std::io;
use std::sync::{Arc, Once};

use tracing::{Level, Subscriber};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry};

/// Configuration for the flexpool logging layer.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard so a process-wide subscriber is installed once.
static INIT: Once = Once::new();

/// Initialize the logging layer with the given configuration.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = build_subscriber(&config, None);
        set_global_subscriber(subscriber);
    });
}

fn build_subscriber(
    config: &LogConfig,
    file: Option<Arc<File>>,
) -> Box<dyn Subscriber + Send + Sync> {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            if let Ok(directive) = filter.parse() {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    let console_layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    match (config.json_format, file) {
        (true, _) => Box::new(
            Registry::default()
                .with(env_filter)
                .with(fmt::layer().json().flatten_event(true)),
        ),
        (false, Some(file)) => {
            // ANSI colors never go into files; file output always carries
            // location and thread information.
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_thread_ids(true);
            Box::new(
                Registry::default()
                    .with(env_filter)
                    .with(console_layer)
                    .with(file_layer),
            )
        }
        (false, None) if config.show_time => Box::new(
            Registry::default()
                .with(env_filter)
                .with(console_layer.with_timer(fmt::time::uptime())),
        ),
        (false, None) => Box::new(
            Registry::default()
                .with(env_filter)
                .with(console_layer.without_time()),
        ),
    }
}

fn set_global_subscriber(subscriber: Box<dyn Subscriber + Send + Sync>) {
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Initialize default logging.
///
/// This sets up a reasonable default configuration that works well for
/// most cases.
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development environments.
///
/// Shows detailed logs with colors and location information.
pub fn init_development() {
    let config = LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("flexpool=debug,flexpool::pool=trace".to_string()),
    };
    init(config);
}

/// Initialize logging optimized for production environments.
///
/// Uses JSON format and omits file/line information.
pub fn init_production() {
    let config = LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    };
    init(config);
}

/// Initialize logging for testing.
///
/// Only shows warnings and errors by default to keep test output clean.
pub fn init_test() {
    let config = LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    };
    init(config);
}

/// Open an append-mode writer for `init_with_file`.
pub fn file_writer(path: &str) -> io::Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

/// Initialize logging with both console and file output.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    let file = file_writer(log_file)?;
    INIT.call_once(|| {
        let subscriber = build_subscriber(&config, Some(file));
        set_global_subscriber(subscriber);
    });
    Ok(())
}
