//! Axum webserver implementation
//!
//! Server lifecycle: bind, serve until the shutdown token fires, then stop
//! accepting and let live connections drain through their own pumps.
use axum::{
    http::{HeaderValue, Method},
    middleware, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    errors::{AlertError, AlertResult},
    logger::{self, LogTag},
    webserver::{middleware::trusted_identity_header, routes, state::AppState},
};

/// Bind the configured address
pub async fn bind(state: &AppState) -> AlertResult<TcpListener> {
    let addr: SocketAddr = state
        .config
        .bind_address()
        .parse()
        .map_err(|e| AlertError::Configuration(format!("Invalid bind address: {}", e)))?;

    TcpListener::bind(&addr).await.map_err(|e| {
        let message = match e.kind() {
            std::io::ErrorKind::AddrInUse => format!(
                "Failed to bind to {}: Address already in use\n\
                 \n\
                 Another process is listening on this port. Stop it or change\n\
                 [webserver] port in the config file.",
                addr
            ),
            std::io::ErrorKind::PermissionDenied => format!(
                "Failed to bind to {}: Permission denied\n\
                 \n\
                 Port {} requires elevated privileges on this system.\n\
                 Consider using a port above 1024 or running with appropriate permissions.",
                addr,
                addr.port()
            ),
            _ => format!("Failed to bind to {}: {}", addr, e),
        };
        AlertError::Server(message)
    })
}

/// Serve on `listener` until the state's shutdown token is cancelled
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> AlertResult<()> {
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    if let Ok(addr) = listener.local_addr() {
        logger::info(
            LogTag::Webserver,
            &format!("Webserver listening on http://{}", addr),
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            logger::debug(
                LogTag::Webserver,
                "Received shutdown signal, stopping webserver...",
            );
        })
        .await
        .map_err(|e| AlertError::Server(format!("Server error: {}", e)))?;

    logger::info(LogTag::Webserver, "Webserver stopped gracefully");
    Ok(())
}

/// Build the Axum application with all routes and middleware
pub fn build_app(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET]);

    routes::create_router(Arc::clone(&state))
        .layer(middleware::from_fn_with_state(state, trusted_identity_header))
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertHub, StaticRoleDirectory};
    use crate::config::{WebSocketConfig, WebserverConfig};
    use crate::hub::Hub;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn state(trust_header: bool) -> Arc<AppState> {
        let hub = Hub::new();
        let alerts = Arc::new(AlertHub::new(hub, StaticRoleDirectory::new()));
        let mut config = WebserverConfig::default();
        config.trust_identity_header = trust_header;
        Arc::new(AppState::new(
            alerts,
            config,
            &WebSocketConfig::default(),
            CancellationToken::new(),
        ))
    }

    fn upgrade_request(origin: Option<&str>, identity: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ws");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        if let Some(identity) = identity {
            builder = builder.header("X-Identity-Id", identity);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_unlisted_origin_is_forbidden() {
        let app = build_app(state(true));
        let response = app
            .oneshot(upgrade_request(Some("http://evil.example"), Some("u1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_origin_is_forbidden() {
        let app = build_app(state(true));
        let response = app.oneshot(upgrade_request(None, Some("u1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_identity_required() {
        let app = build_app(state(false));
        let response = app
            .oneshot(upgrade_request(Some("http://localhost:3000"), Some("u1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trusted_header_reaches_upgrade() {
        let app = build_app(state(true));
        let response = app
            .oneshot(upgrade_request(Some("http://localhost:3000"), Some("u1")))
            .await
            .unwrap();
        // Plain GET without upgrade headers fails at the handshake, not at auth
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_stats_routes() {
        let app = build_app(state(false));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/ws/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/ws/stats/keys/role:admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
