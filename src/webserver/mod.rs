mod server;

pub mod middleware;
pub mod routes;
pub mod state;
pub mod utils;

// Public API for starting the webserver
pub use middleware::VerifiedIdentity;
pub use server::{bind, build_app, serve};
pub use state::AppState;
