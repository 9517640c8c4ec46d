use asg_peers::{
    config::FleetConfig,
    error::PeerError,
    fleet::{FleetResolver, GroupStrategy, MembershipCache},
    peer::{
        FanOut, HttpResponse, HttpTransport, OutboundRequest, PeerExecutor, PeerOutcome,
        RequestOptions, RequestSettings, ResponseMeta, TransportError,
    },
    provider::{InMemoryProvider, LifecycleState},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{header::HeaderMap, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers per host; unknown hosts fail at the transport level.
#[derive(Default)]
struct ScriptedTransport {
    statuses: HashMap<String, StatusCode>,
    urls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    fn with(mut self, host: &str, status: StatusCode) -> Self {
        self.statuses.insert(host.to_string(), status);
        self
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.urls.lock().push(request.url.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let host = request
            .url
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        match self.statuses.get(&host) {
            Some(status) => Ok(HttpResponse {
                meta: ResponseMeta {
                    status: *status,
                    headers: HeaderMap::new(),
                },
                body: format!("from {}", host),
            }),
            None => Err(TransportError::Failed("connection refused".to_string())),
        }
    }
}

/// Group web = [self, a, b(pending), c, d]; a=10.0.0.2, b=10.0.0.3, c=10.0.0.4, d=10.0.0.5
fn provider() -> Arc<InMemoryProvider> {
    Arc::new(
        InMemoryProvider::new()
            .with_self_id("i-self")
            .with_group("web", &["i-self", "i-a", "i-b", "i-c", "i-d"])
            .with_instance("i-self", LifecycleState::Running)
            .with_instance("i-a", LifecycleState::Running)
            .with_instance("i-b", LifecycleState::Pending)
            .with_instance("i-c", LifecycleState::Running)
            .with_instance("i-d", LifecycleState::Running),
    )
}

fn fan_out(provider: Arc<InMemoryProvider>, transport: Arc<ScriptedTransport>) -> FanOut {
    let resolver = Arc::new(FleetResolver::new(provider, GroupStrategy::BySelfId));
    let cache = Arc::new(MembershipCache::new(resolver, Duration::from_secs(120)));
    FanOut::new(cache, PeerExecutor::new(transport, RequestSettings::default()))
}

fn all_ok() -> ScriptedTransport {
    ScriptedTransport::default()
        .with("10.0.0.2", StatusCode::OK)
        .with("10.0.0.4", StatusCode::OK)
        .with("10.0.0.5", StatusCode::OK)
}

#[tokio::test]
async fn test_each_series_visits_every_peer_in_order() {
    let transport = Arc::new(all_ok());
    let fan_out = fan_out(provider(), transport.clone());

    let results = fan_out.request_each_series(RequestOptions::get("/ping")).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.metadata.len(), 3);
    assert_eq!(results.bodies.len(), 3);
    assert!(!results.stopped_early);
    assert_eq!(
        transport.urls(),
        vec!["http://10.0.0.2/ping", "http://10.0.0.4/ping", "http://10.0.0.5/ping"]
    );
    assert_eq!(results.bodies[1].as_deref(), Some("from 10.0.0.4"));
}

#[tokio::test]
async fn test_requests_never_overlap() {
    let transport = Arc::new(all_ok());
    let fan_out = fan_out(provider(), transport.clone());

    fan_out.request_each_series(RequestOptions::get("/")).await.unwrap();
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_on_first_outcome() {
    let transport = Arc::new(all_ok());
    let fan_out = fan_out(provider(), transport.clone());

    let results = fan_out
        .request_until(RequestOptions::get("/"), |_, _| true)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results.metadata.len(), 1);
    assert_eq!(results.bodies.len(), 1);
    assert!(results.stopped_early);
    assert_eq!(transport.urls().len(), 1);
}

#[tokio::test]
async fn test_stop_when_status_matches() {
    let transport = Arc::new(
        ScriptedTransport::default()
            .with("10.0.0.2", StatusCode::SERVICE_UNAVAILABLE)
            .with("10.0.0.4", StatusCode::OK)
            .with("10.0.0.5", StatusCode::OK),
    );
    let fan_out = fan_out(provider(), transport.clone());

    let results = fan_out
        .request_until(RequestOptions::get("/leader"), |meta, _| {
            meta.map_or(false, |m| m.status == StatusCode::OK)
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results.peers[1].instance_id, "i-c");
    assert_eq!(transport.urls().len(), 2);
}

#[tokio::test]
async fn test_peer_failure_does_not_abort() {
    // 10.0.0.4 is unknown to the transport and fails
    let transport = Arc::new(
        ScriptedTransport::default()
            .with("10.0.0.2", StatusCode::OK)
            .with("10.0.0.5", StatusCode::OK),
    );
    let fan_out = fan_out(provider(), transport.clone());

    let results = fan_out.request_each_series(RequestOptions::get("/")).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.metadata[1].is_none());
    assert!(results.bodies[1].is_none());
    assert!(matches!(results.errors[1], Some(PeerError::PeerRequest { ref peer, .. }) if peer == "i-c"));
    assert!(results.errors[2].is_none());
    assert_eq!(transport.urls().len(), 3);
}

#[tokio::test]
async fn test_empty_fleet_succeeds_for_any_predicate() {
    let provider = Arc::new(
        InMemoryProvider::new()
            .with_self_id("i-self")
            .with_group("web", &["i-self"]),
    );
    let transport = Arc::new(all_ok());
    let fan_out = fan_out(provider, transport.clone());

    let results = fan_out
        .request_until(RequestOptions::get("/"), |_, _| true)
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(results.metadata.is_empty());
    assert!(results.bodies.is_empty());
    assert!(transport.urls().is_empty());
}

#[tokio::test]
async fn test_cache_failure_contacts_no_peer() {
    let provider = provider();
    provider.fail(InMemoryProvider::DESCRIBE_GROUPS, "access denied");
    let transport = Arc::new(all_ok());
    let fan_out = fan_out(provider, transport.clone());

    let result = fan_out.request_each_series(RequestOptions::get("/")).await;
    assert!(matches!(result, Err(PeerError::Provider { operation: "describe_groups", .. })));
    assert!(transport.urls().is_empty());
}

#[tokio::test]
async fn test_fan_out_reuses_cached_membership() {
    let provider = provider();
    let fan_out = fan_out(provider.clone(), Arc::new(all_ok()));

    fan_out.request_each_series(RequestOptions::get("/")).await.unwrap();
    fan_out.request_each_series(RequestOptions::get("/")).await.unwrap();
    assert_eq!(provider.describe_groups_calls(), 1);
}

#[tokio::test]
async fn test_generic_fan_out_with_custom_action() {
    let fan_out = fan_out(provider(), Arc::new(all_ok()));

    let results = fan_out
        .fan_out(
            |peer| async move {
                if peer.instance_id == "i-c" {
                    PeerOutcome::failed(PeerError::peer_request(peer.instance_id, "skipped"))
                } else {
                    PeerOutcome::success(peer.instance_id.len(), peer.instance_id)
                }
            },
            |_, body: Option<&String>| body.map_or(false, |b| b == "i-d"),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.metadata, vec![Some(3), None, Some(3)]);
    assert!(!results.stopped_early);
}

#[tokio::test]
async fn test_each_series_collects_results() {
    let fan_out = fan_out(provider(), Arc::new(all_ok()));

    let results = fan_out
        .each_series(|peer| async move {
            if peer.instance_id == "i-a" {
                Err(PeerError::peer_request(peer.instance_id, "busy"))
            } else {
                Ok(peer.private_ip.unwrap_or_default())
            }
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_err());
    assert_eq!(results[1].as_deref().ok(), Some("10.0.0.4"));
    assert_eq!(results[2].as_deref().ok(), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_from_config_wires_settings() {
    let config = FleetConfig {
        max_cache_age_ms: 5_000,
        use_ssl: true,
        port: Some(8443),
        secret: Some(String::new()),
        group_name: Some("web".to_string()),
        instance_id: Some("i-self".to_string()),
        ..FleetConfig::default()
    };
    let provider = provider();
    let fan_out = FanOut::from_config(&config, provider.clone(), Arc::new(all_ok()));

    assert_eq!(fan_out.cache().max_age(), Duration::from_millis(5_000));
    let settings = fan_out.executor().settings();
    assert!(settings.use_ssl);
    assert_eq!(settings.port, Some(8443));
    assert!(settings.secret.is_none());

    let snapshot = fan_out.cache().get().await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(provider.instance_id_calls(), 0);
}
