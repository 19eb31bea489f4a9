//! Logging infrastructure - structured tracing for allocator slow paths
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels via `EnvFilter`
//! - Zero-cost when disabled
//! - Console or file output, human-readable or JSON
//!
//! Lock-free fast paths never log. Block carving, oversized allocations and
//! pool lifecycle events are reported at `debug`/`trace`.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the background file writer running until [`shutdown`]
static FILE_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

type BoxedLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Write to this file instead of stdout
    pub log_path: Option<PathBuf>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // SLABPOOL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("SLABPOOL_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        // SLABPOOL_LOG_FILE: path to log file
        if let Ok(path) = std::env::var("SLABPOOL_LOG_FILE") {
            config.log_path = Some(PathBuf::from(path));
        }

        config.json_format = std::env::var("SLABPOOL_LOG_JSON").is_ok();
        config.show_spans = std::env::var("SLABPOOL_LOG_SPANS").is_ok();

        config
    }

    /// Minimal logging for benchmarks
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Verbose logging, including every block carve
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; later calls are no-ops. If
/// another subscriber is already installed globally it is left in place.
/// A log file that cannot be opened falls back to stdout with a warning.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("slabpool={}", config.level.as_str().to_lowercase()))
        });

        let mut fallback = None;
        let writer = match &config.log_path {
            Some(path) => file_writer(path).unwrap_or_else(|error| {
                fallback = Some((path.clone(), error));
                BoxMakeWriter::new(io::stdout)
            }),
            None => BoxMakeWriter::new(io::stdout),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer(&config, writer))
            .try_init()
            .ok(); // Another subscriber may already own the global slot

        if let Some((path, error)) = fallback {
            tracing::warn!(
                target: "slabpool::logging",
                path = %path.display(),
                %error,
                "cannot open log file, logging to stdout"
            );
        }
    });
}

/// Flush and close the log file, if one is open
///
/// Events logged to the file afterwards are discarded.
pub fn shutdown() {
    drop(FILE_GUARD.lock().take());
}

fn fmt_layer(config: &LogConfig, writer: BoxMakeWriter) -> BoxedLayer {
    let span_events = if config.show_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events)
        .with_target(true)
        .with_thread_ids(cfg!(debug_assertions));

    if config.json_format {
        Box::new(layer.json())
    } else {
        Box::new(layer.compact())
    }
}

fn file_writer(path: &Path) -> io::Result<BoxMakeWriter> {
    let file = open_log_file(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    *FILE_GUARD.lock() = Some(guard);
    Ok(BoxMakeWriter::new(writer))
}

/// Open `path` for appending, creating it and its parent directories
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(directory) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(directory)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Allocator events
// ============================================================================

/// Log a registry build
pub fn log_registry_init(granularity: usize, class_count: usize, block_size: usize) {
    tracing::debug!(
        target: "slabpool::registry",
        event = "registry_init",
        granularity,
        class_count,
        block_size,
        max_pooled = granularity * class_count,
        "size-class registry initialized"
    );
}

/// Log a new block carved for a pool
#[inline]
pub fn log_block_carved(slot_size: usize, block_size: usize, blocks: usize) {
    tracing::trace!(
        target: "slabpool::pool",
        event = "block_carved",
        slot_size,
        block_size,
        blocks,
        "carved new block"
    );
}

/// Log an oversized request served by the system allocator
#[inline]
pub fn log_large_allocation(size: usize, ptr: *const u8) {
    tracing::trace!(
        target: "slabpool::registry",
        event = "large_allocation",
        size_bytes = size,
        address = ?ptr,
        "oversized allocation"
    );
}

/// Log release of an oversized allocation
#[inline]
pub fn log_large_deallocation(size: usize, ptr: *const u8) {
    tracing::trace!(
        target: "slabpool::registry",
        event = "large_deallocation",
        size_bytes = size,
        address = ?ptr,
        "oversized deallocation"
    );
}

/// Log pool teardown
pub fn log_pool_teardown(slot_size: usize, blocks: usize) {
    tracing::debug!(
        target: "slabpool::pool",
        event = "pool_teardown",
        slot_size,
        blocks,
        "releasing pool blocks"
    );
}
