use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};
use crate::error::PeerError;
use crate::fleet::PeerInstance;
use super::fanout::PeerOutcome;
use super::transport::{HttpTransport, OutboundRequest, ResponseMeta, TransportError};

/// Header carrying the shared secret between fleet members
pub const AUTH_HEADER: &str = "x-node-asg-auth";

/// How peers are addressed and authenticated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSettings {
    pub use_ssl: bool,
    pub port: Option<u16>,
    pub use_public_ip: bool,
    pub secret: Option<String>,
}

impl RequestSettings {
    /// `scheme://address[:port]` for `peer`.
    pub fn base_url(&self, peer: &PeerInstance) -> Result<String, PeerError> {
        let address = peer
            .address(self.use_public_ip)
            .ok_or_else(|| PeerError::MissingAddress {
                peer: peer.instance_id.clone(),
            })?;
        let scheme = if self.use_ssl { "https" } else { "http" };
        Ok(match self.port {
            Some(port) => format!("{}://{}:{}", scheme, address, port),
            None => format!("{}://{}", scheme, address),
        })
    }
}

/// Caller side of one peer request; the base address is filled in per peer
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// `None` leaves the choice to the executor
    pub strict_tls: Option<bool>,
}

impl RequestOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            strict_tls: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn strict_tls(mut self, strict: bool) -> Self {
        self.strict_tls = Some(strict);
        self
    }
}

/// Issues single requests against resolved peers
#[derive(Clone)]
pub struct PeerExecutor {
    transport: Arc<dyn HttpTransport>,
    settings: RequestSettings,
}

impl PeerExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: RequestSettings) -> Self {
        Self { transport, settings }
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Turn caller options into the request actually sent to `peer`.
    pub fn prepare(&self, mut options: RequestOptions, peer: &PeerInstance) -> Result<OutboundRequest, PeerError> {
        if let Some(secret) = self.settings.secret.as_deref().filter(|s| !s.is_empty()) {
            if !options.headers.contains_key(AUTH_HEADER) {
                let value = HeaderValue::from_str(secret)
                    .map_err(|e| PeerError::not_issued(&peer.instance_id, format!("invalid secret header: {}", e)))?;
                options.headers.insert(AUTH_HEADER, value);
            }
        }

        let base = self.settings.base_url(peer)?;
        let url = if options.path.is_empty() || options.path.starts_with('/') {
            format!("{}{}", base, options.path)
        } else {
            format!("{}/{}", base, options.path)
        };

        Ok(OutboundRequest {
            method: options.method,
            url,
            headers: options.headers,
            body: options.body,
            strict_tls: options.strict_tls.unwrap_or(!self.settings.use_ssl),
        })
    }

    pub async fn execute(&self, options: RequestOptions, peer: &PeerInstance) -> PeerOutcome<ResponseMeta, String> {
        let request = match self.prepare(options, peer) {
            Ok(request) => request,
            Err(e) => return PeerOutcome::failed(e),
        };
        debug!("{} {} ({})", request.method, request.url, peer);

        let sent = AssertUnwindSafe(self.transport.send(request)).catch_unwind().await;
        match sent {
            Ok(Ok(response)) => PeerOutcome::new(Some(response.meta), Some(response.body), None),
            Ok(Err(TransportError::Body { meta, message })) => {
                PeerOutcome::new(Some(meta), None, Some(PeerError::peer_request(&peer.instance_id, message)))
            }
            Ok(Err(TransportError::NotIssued(message))) => {
                PeerOutcome::failed(PeerError::not_issued(&peer.instance_id, message))
            }
            Ok(Err(TransportError::Failed(message))) => {
                PeerOutcome::failed(PeerError::peer_request(&peer.instance_id, message))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Transport panicked while requesting {}: {}", peer, message);
                PeerOutcome::failed(PeerError::not_issued(&peer.instance_id, message))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "transport panicked".to_string()
    }
}
