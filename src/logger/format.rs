//! Log formatting and output with ANSI colors
//!
//! Handles:
//! - Colorized console output with tag and level formatting
//! - Routing of third-party crate records (warnings and errors only)
//! - Broken pipe handling for piped commands

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use log::LevelFilter;
use std::io::{stdout, ErrorKind, Write};

/// Log format widths for alignment
const TAG_WIDTH: usize = 10;
const LOG_TYPE_WIDTH: usize = 8;

/// Build the fern dispatcher used by `logger::init`
///
/// Tagged records were already filtered by `core::should_log`, so they pass
/// at any level. Records from other crates are limited to warnings.
pub fn build_dispatch() -> fern::Dispatch {
    fern::Dispatch::new()
        .level(LevelFilter::Trace)
        .filter(|meta| {
            LogTag::from_target(meta.target()).is_some() || meta.level() <= log::Level::Warn
        })
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(
                    record.target(),
                    LogLevel::from_log_level(record.level()),
                    &message.to_string()
                )
            ))
        })
        .chain(fern::Output::call(|record| {
            print_stdout_safe(&record.args().to_string());
        }))
}

/// Format one console line: `time [TAG] [LEVEL] message`
pub fn format_line(target: &str, level: LogLevel, message: &str) -> String {
    let time = Local::now().format("%H:%M:%S").to_string().dimmed();
    let tag = match LogTag::from_target(target) {
        Some(tag) => format_tag(&tag),
        None => format!("{:<width$}", target, width = TAG_WIDTH).white(),
    };
    format!("{} [{}] [{}] {}", time, tag, format_log_type(level), message)
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Config => label.bright_white().bold(),
        LogTag::Hub => label.bright_cyan().bold(),
        LogTag::Connection => label.cyan(),
        LogTag::Alerts => label.bright_magenta().bold(),
        LogTag::Bridge => label.bright_green().bold(),
        LogTag::Listener => label.bright_blue().bold(),
        LogTag::Webserver => label.bright_purple().bold(),
    }
}

/// Format log type with appropriate color
fn format_log_type(level: LogLevel) -> ColoredString {
    let label = format!("{:<width$}", level.as_str(), width = LOG_TYPE_WIDTH);
    match level {
        LogLevel::Error => label.bright_red().bold(),
        LogLevel::Warning => label.bright_yellow().bold(),
        LogLevel::Info => label.white().bold(),
        LogLevel::Debug => label.purple(),
        LogLevel::Verbose => label.dimmed(),
    }
}

/// Print to stdout but ignore broken pipe errors
fn print_stdout_safe(message: &str) {
    if let Err(e) = writeln!(stdout(), "{}", message) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        let _ = writeln!(std::io::stderr(), "Logger stdout error: {}", e);
    }
    if let Err(e) = stdout().flush() {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_contains_parts() {
        colored::control::set_override(false);
        let line = format_line("bridge", LogLevel::Warning, "consumer stopped");
        assert!(line.contains("[BRIDGE"));
        assert!(line.contains("[WARNING"));
        assert!(line.ends_with("consumer stopped"));
    }

    #[test]
    fn test_format_line_foreign_target() {
        colored::control::set_override(false);
        let line = format_line("hyper", LogLevel::Error, "boom");
        assert!(line.contains("[hyper"));
    }
}
