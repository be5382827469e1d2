//! Configuration system for the alert hub
//!
//! - `macros`: the `config_struct!` macro (struct + defaults in one place)
//! - `schemas`: every configuration section with its defaults and validation
//! - `utils`: loading from TOML, global access helpers

#[macro_use]
pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{Config, MembershipConfig, QueueConfig, WebSocketConfig, WebserverConfig};
pub use utils::{
    get_config_clone, init_config, is_config_initialized, load_config, load_config_from_path,
    read_config_file, with_config, CONFIG_FILE_PATH,
};
