use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// A fully addressed request, ready to go on the wire
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Verify the peer's certificate chain
    pub strict_tls: bool,
}

/// Status line and headers of a peer response
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub meta: ResponseMeta,
    pub body: String,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request never left the process
    #[error("{0}")]
    NotIssued(String),

    #[error("{0}")]
    Failed(String),

    /// Headers arrived but the body could not be read
    #[error("failed to read body: {message}")]
    Body { meta: ResponseMeta, message: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport. Keeps one client that verifies certificates and
/// one that does not, chosen per request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    strict: reqwest::Client,
    relaxed: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::build(None)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let client = |relaxed: bool| {
            let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(relaxed);
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            builder
                .build()
                .map_err(|e| TransportError::NotIssued(format!("Failed to create HTTP client: {}", e)))
        };

        Ok(Self {
            strict: client(false)?,
            relaxed: client(true)?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError> {
        let client = if request.strict_tls { &self.strict } else { &self.relaxed };

        let mut builder = client.request(request.method, &request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let built = builder
            .build()
            .map_err(|e| TransportError::NotIssued(e.to_string()))?;

        let response = client
            .execute(built)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let meta = ResponseMeta {
            status: response.status(),
            headers: response.headers().clone(),
        };
        match response.text().await {
            Ok(body) => Ok(HttpResponse { meta, body }),
            Err(e) => Err(TransportError::Body {
                meta,
                message: e.to_string(),
            }),
        }
    }
}
