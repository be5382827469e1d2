//! Log tags identifying the subsystem a message comes from
//!
//! Each tag doubles as the `log` target, so external loggers can filter
//! on the same names that the `--debug-<tag>` flags use.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Hub,
    Connection,
    Alerts,
    Bridge,
    Listener,
    Webserver,
}

impl LogTag {
    pub const ALL: [LogTag; 8] = [
        LogTag::System,
        LogTag::Config,
        LogTag::Hub,
        LogTag::Connection,
        LogTag::Alerts,
        LogTag::Bridge,
        LogTag::Listener,
        LogTag::Webserver,
    ];

    /// Lowercase key used for `--debug-<key>` flags and as the `log` target
    pub fn to_debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Config => "config",
            LogTag::Hub => "hub",
            LogTag::Connection => "connection",
            LogTag::Alerts => "alerts",
            LogTag::Bridge => "bridge",
            LogTag::Listener => "listener",
            LogTag::Webserver => "webserver",
        }
    }

    /// Uppercase label shown in console output
    pub fn to_plain_string(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Hub => "HUB",
            LogTag::Connection => "CONN",
            LogTag::Alerts => "ALERTS",
            LogTag::Bridge => "BRIDGE",
            LogTag::Listener => "LISTENER",
            LogTag::Webserver => "WEBSERVER",
        }
    }

    /// Reverse lookup from a `log` target
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.to_debug_key() == target)
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
