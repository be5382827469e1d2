pub mod alerts;
pub mod arguments;
pub mod config;
pub mod errors; // Typed errors for collaborator and startup failures
pub mod hub;
pub mod logger;
pub mod webserver;
