//! Inbound auth gate
//!
//! Rejects peer calls that do not carry the fleet's shared secret in the
//! `X-NODE-ASG-AUTH` header. Without a configured secret every request
//! passes through untouched.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tracing::warn;
use crate::peer::AUTH_HEADER;

#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    secret: Option<Arc<str>>,
}

impl AuthGate {
    /// An empty secret leaves the gate open.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    pub fn allows(&self, presented: Option<&HeaderValue>) -> bool {
        match &self.secret {
            None => true,
            Some(secret) => presented.map_or(false, |value| value.as_bytes() == secret.as_bytes()),
        }
    }
}

pub async fn auth_gate(State(gate): State<AuthGate>, request: Request, next: Next) -> Response {
    if gate.allows(request.headers().get(AUTH_HEADER)) {
        return next.run(request).await;
    }

    warn!("Rejected {} {}: missing or wrong {}", request.method(), request.uri(), AUTH_HEADER);
    (
        StatusCode::FORBIDDEN,
        [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")],
    )
        .into_response()
}

/// Put every route of `router` behind the auth gate.
pub fn protect<S>(router: Router<S>, secret: Option<String>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(AuthGate::new(secret), auth_gate))
}
