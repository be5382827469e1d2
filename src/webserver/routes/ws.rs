//! WebSocket upgrade endpoint
//!
//! Checks the handshake `Origin` against the configured allow-list and
//! requires a verified identity before upgrading. Each upgraded socket gets
//! one `Connection`: registered through the alert adapter, outbound pump on
//! its own task, inbound pump on the upgrade task until the socket ends.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use futures::StreamExt;

use crate::{
    hub::Connection,
    logger::{self, LogTag},
    webserver::{middleware::VerifiedIdentity, state::AppState, utils::error_response},
};

pub fn routes(path: &str) -> Router<Arc<AppState>> {
    Router::new().route(path, get(ws_upgrade_handler))
}

/// Upgrade handler
///
/// 403 for a missing or unlisted origin, 401 without a verified identity.
pub async fn ws_upgrade_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<VerifiedIdentity>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !origin.map_or(false, |origin| state.config.is_origin_allowed(origin)) {
        logger::warning(
            LogTag::Webserver,
            &format!("Rejected WebSocket upgrade from origin {:?}", origin),
        );
        return error_response(
            StatusCode::FORBIDDEN,
            "ORIGIN_NOT_ALLOWED",
            "Origin is not allowed to open a WebSocket",
            origin,
        );
    }

    let Some(Extension(VerifiedIdentity(identity))) = identity else {
        logger::debug(
            LogTag::Webserver,
            "Rejected WebSocket upgrade without verified identity",
        );
        return error_response(
            StatusCode::UNAUTHORIZED,
            "IDENTITY_REQUIRED",
            "A verified identity is required",
            None,
        );
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_message_bytes = state.settings.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| serve_connection(socket, state, identity))
}

/// Run one upgraded socket until it ends
async fn serve_connection(socket: WebSocket, state: Arc<AppState>, identity: String) {
    let (connection, queue) = Connection::new(identity.clone(), state.settings.clone());

    if let Err(e) = state.alerts.register_connection(&connection, &identity).await {
        logger::warning(
            LogTag::Webserver,
            &format!("Closing WebSocket for '{}': {}", identity, e),
        );
        connection.abandon();
        let mut socket = socket;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "membership lookup failed".into(),
            })))
            .await;
        return;
    }

    connection.activate();
    logger::debug(
        LogTag::Webserver,
        &format!(
            "WebSocket connection {} opened for '{}' (active={})",
            connection.id(),
            identity,
            state.hub().active_connection_count()
        ),
    );

    let (sink, stream) = socket.split();
    let cancel = state.shutdown.child_token();

    let outbound = tokio::spawn({
        let connection = Arc::clone(&connection);
        let cancel = cancel.clone();
        async move { connection.outbound_pump(queue, sink, cancel).await }
    });

    connection.inbound_pump(state.hub(), stream, cancel).await;

    if let Err(e) = outbound.await {
        logger::error(
            LogTag::Webserver,
            &format!("Outbound pump of connection {} failed: {}", connection.id(), e),
        );
    }

    logger::debug(
        LogTag::Webserver,
        &format!(
            "WebSocket connection {} closed (state={:?}, sent={}, dropped={})",
            connection.id(),
            connection.state(),
            connection.metrics().messages_sent,
            connection.metrics().messages_dropped
        ),
    );
}
