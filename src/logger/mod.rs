//! Structured logging system for the alert hub
//!
//! This module provides a small, tagged logging API on top of the `log`
//! facade:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via --debug-<module> flags
//! - Colored console output through a `fern` dispatcher
//!
//! ## Usage
//!
//! ```rust
//! use alerthub::logger::{self, LogTag};
//!
//! logger::warning(LogTag::Connection, "Outbound queue full, dropping message");
//! logger::info(LogTag::Bridge, "Consuming queue 'alerts'");
//! logger::debug(LogTag::Hub, "Registered connection 7"); // Only if --debug-hub
//! ```
//!
//! ## Initialization
//!
//! Call once at startup, after arguments are parsed:
//! ```rust,no_run
//! alerthub::logger::init();
//! ```
//!
//! Libraries embedding the hub may skip `init()` and install their own
//! `log` implementation; records carry the tag key as their target.

mod core;
mod format;
mod levels;
mod tags;

pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger system
///
/// Installs the console dispatcher as the global `log` logger. Calling it
/// twice is harmless; the second call reports to stderr and keeps the
/// first logger.
pub fn init() {
    if let Err(e) = format::build_dispatch().apply() {
        eprintln!("Logger already initialized: {}", e);
    }
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
///
/// Warnings are shown by default (unless --quiet is used).
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (detailed diagnostics)
///
/// Debug logs are ONLY shown when --debug-<module> flag is provided.
///
/// # Example
/// ```rust
/// use alerthub::logger::{self, LogTag};
///
/// // Only shown with --debug-hub flag
/// logger::debug(LogTag::Hub, "rekeyed 2 connections");
/// ```
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (very detailed tracing)
///
/// Verbose logs are ONLY shown when --verbose flag is provided.
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Whether debug output is enabled for a tag
///
/// Lets callers skip building expensive debug messages.
pub fn is_debug_enabled(tag: LogTag) -> bool {
    core::should_log(&tag, LogLevel::Debug)
}
