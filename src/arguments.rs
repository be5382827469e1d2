//! Centralized argument handling for the alert hub
//!
//! Parses the command line once at startup and exposes per-module debug
//! flag checks to the rest of the crate. Code that runs without parsed
//! arguments (tests, embedding applications) sees the defaults.

use clap::Parser;
use once_cell::sync::OnceCell;

use crate::config::CONFIG_FILE_PATH;

/// Command-line arguments
#[derive(Debug, Clone, Parser)]
#[command(name = "alerthub", version, about = "Real-time alert delivery hub")]
pub struct Arguments {
    /// Path to the TOML configuration file
    #[arg(long, default_value = CONFIG_FILE_PATH)]
    pub config: String,

    /// Show verbose logs for every module
    #[arg(long)]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(long)]
    pub quiet: bool,

    #[arg(long = "debug-system")]
    pub debug_system: bool,

    #[arg(long = "debug-config")]
    pub debug_config: bool,

    #[arg(long = "debug-hub")]
    pub debug_hub: bool,

    #[arg(long = "debug-connection")]
    pub debug_connection: bool,

    #[arg(long = "debug-alerts")]
    pub debug_alerts: bool,

    #[arg(long = "debug-bridge")]
    pub debug_bridge: bool,

    #[arg(long = "debug-listener")]
    pub debug_listener: bool,

    #[arg(long = "debug-webserver")]
    pub debug_webserver: bool,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config: CONFIG_FILE_PATH.to_string(),
            verbose: false,
            quiet: false,
            debug_system: false,
            debug_config: false,
            debug_hub: false,
            debug_connection: false,
            debug_alerts: false,
            debug_bridge: false,
            debug_listener: false,
            debug_webserver: false,
        }
    }
}

/// Parsed arguments, set once by the binary
static ARGUMENTS: OnceCell<Arguments> = OnceCell::new();

/// Parse `std::env::args` and store the result globally
///
/// Subsequent calls return the already stored arguments.
pub fn init_from_env() -> &'static Arguments {
    ARGUMENTS.get_or_init(Arguments::parse)
}

/// Store an explicit argument set (used by tests and embedders)
///
/// Returns false if arguments were already initialized.
pub fn set_arguments(args: Arguments) -> bool {
    ARGUMENTS.set(args).is_ok()
}

/// Run a closure against the current arguments (defaults if never initialized)
pub fn with_arguments<F, R>(f: F) -> R
where
    F: FnOnce(&Arguments) -> R,
{
    match ARGUMENTS.get() {
        Some(args) => f(args),
        None => f(&Arguments::default()),
    }
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

pub fn is_verbose_enabled() -> bool {
    with_arguments(|args| args.verbose)
}

pub fn is_quiet_enabled() -> bool {
    with_arguments(|args| args.quiet)
}

pub fn is_debug_system_enabled() -> bool {
    with_arguments(|args| args.debug_system)
}

pub fn is_debug_config_enabled() -> bool {
    with_arguments(|args| args.debug_config)
}

/// Registry debug mode
pub fn is_debug_hub_enabled() -> bool {
    with_arguments(|args| args.debug_hub)
}

/// Per-connection pump debug mode
pub fn is_debug_connection_enabled() -> bool {
    with_arguments(|args| args.debug_connection)
}

pub fn is_debug_alerts_enabled() -> bool {
    with_arguments(|args| args.debug_alerts)
}

/// Queue bridge debug mode
pub fn is_debug_bridge_enabled() -> bool {
    with_arguments(|args| args.debug_bridge)
}

pub fn is_debug_listener_enabled() -> bool {
    with_arguments(|args| args.debug_listener)
}

pub fn is_debug_webserver_enabled() -> bool {
    with_arguments(|args| args.debug_webserver)
}

/// Names of the debug modes that are switched on, for the startup banner
pub fn enabled_debug_modes() -> Vec<&'static str> {
    with_arguments(|args| {
        [
            (args.debug_system, "system"),
            (args.debug_config, "config"),
            (args.debug_hub, "hub"),
            (args.debug_connection, "connection"),
            (args.debug_alerts, "alerts"),
            (args.debug_bridge, "bridge"),
            (args.debug_listener, "listener"),
            (args.debug_webserver, "webserver"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debug_flags() {
        let args = Arguments::parse_from([
            "alerthub",
            "--config",
            "custom.toml",
            "--debug-hub",
            "--debug-bridge",
        ]);

        assert_eq!(args.config, "custom.toml");
        assert!(args.debug_hub);
        assert!(args.debug_bridge);
        assert!(!args.debug_webserver);
        assert!(!args.verbose);
    }

    #[test]
    fn test_default_config_path() {
        let args = Arguments::parse_from(["alerthub"]);
        assert_eq!(args.config, CONFIG_FILE_PATH);
    }
}
