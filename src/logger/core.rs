//! Core logging implementation with automatic filtering
//!
//! Decides whether a message is shown, then hands it to the `log` facade
//! with the tag as target. Output formatting lives in `format.rs`.

use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;

/// Check if debug logs are enabled for a specific tag
pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    match tag {
        LogTag::System => arguments::is_debug_system_enabled(),
        LogTag::Config => arguments::is_debug_config_enabled(),
        LogTag::Hub => arguments::is_debug_hub_enabled(),
        LogTag::Connection => arguments::is_debug_connection_enabled(),
        LogTag::Alerts => arguments::is_debug_alerts_enabled(),
        LogTag::Bridge => arguments::is_debug_bridge_enabled(),
        LogTag::Listener => arguments::is_debug_listener_enabled(),
        LogTag::Webserver => arguments::is_debug_webserver_enabled(),
    }
}

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. --quiet hides everything below Warning
/// 3. Debug level requires --debug-<module> flag for that tag (or --verbose)
/// 4. Verbose level requires --verbose
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    if arguments::is_quiet_enabled() && level > LogLevel::Warning {
        return false;
    }

    match level {
        LogLevel::Debug => arguments::is_verbose_enabled() || is_debug_enabled_for_tag(tag),
        LogLevel::Verbose => arguments::is_verbose_enabled(),
        _ => true,
    }
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    log::log!(target: tag.to_debug_key(), level.to_log_level(), "{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filtering() {
        // No arguments parsed in unit tests: defaults apply
        assert!(should_log(&LogTag::Hub, LogLevel::Error));
        assert!(should_log(&LogTag::Hub, LogLevel::Warning));
        assert!(should_log(&LogTag::Hub, LogLevel::Info));
        assert!(!should_log(&LogTag::Hub, LogLevel::Debug));
        assert!(!should_log(&LogTag::Bridge, LogLevel::Verbose));
    }
}
