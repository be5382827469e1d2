//! Webserver middleware
//!
//! The upgrade route needs a verified identity attached to the request by
//! the authentication layer in front of this server. For local development
//! `trust_identity_header` lets a plain request header stand in for it.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{
    logger::{self, LogTag},
    webserver::state::AppState,
};

/// Identity verified by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity(pub String);

/// Development-only identity middleware
///
/// When `trust_identity_header` is enabled and no identity is attached yet,
/// the value of the configured header becomes the verified identity.
/// Otherwise the request passes through untouched.
pub async fn trusted_identity_header(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.trust_identity_header
        || request.extensions().get::<VerifiedIdentity>().is_some()
    {
        return next.run(request).await;
    }

    let identity = request
        .headers()
        .get(state.config.identity_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    if let Some(identity) = identity {
        logger::verbose(
            LogTag::Webserver,
            &format!(
                "Trusting {} header for {}: '{}'",
                state.config.identity_header,
                request.uri().path(),
                identity
            ),
        );
        request.extensions_mut().insert(VerifiedIdentity(identity));
    }

    next.run(request).await
}
