use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};
use crate::config::FleetConfig;
use crate::error::{PeerError, Result};
use crate::fleet::{FleetResolver, MembershipCache, PeerInstance};
use crate::provider::FleetProvider;
use super::executor::{PeerExecutor, RequestOptions};
use super::transport::{HttpTransport, ResponseMeta};

/// Whatever one peer action produced. Any part may be missing.
#[derive(Debug)]
pub struct PeerOutcome<M, B> {
    pub metadata: Option<M>,
    pub body: Option<B>,
    pub error: Option<PeerError>,
}

impl<M, B> PeerOutcome<M, B> {
    pub fn new(metadata: Option<M>, body: Option<B>, error: Option<PeerError>) -> Self {
        Self { metadata, body, error }
    }

    pub fn success(metadata: M, body: B) -> Self {
        Self::new(Some(metadata), Some(body), None)
    }

    pub fn failed(error: PeerError) -> Self {
        Self::new(None, None, Some(error))
    }
}

/// What the loop driver does after recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Outcomes of one fan-out, index-aligned with the visited peers
#[derive(Debug)]
pub struct FanOutResults<M, B> {
    pub peers: Vec<PeerInstance>,
    pub metadata: Vec<Option<M>>,
    pub bodies: Vec<Option<B>>,
    pub errors: Vec<Option<PeerError>>,
    /// The stop predicate ended the walk before the last peer
    pub stopped_early: bool,
}

impl<M, B> FanOutResults<M, B> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            metadata: Vec::with_capacity(capacity),
            bodies: Vec::with_capacity(capacity),
            errors: Vec::with_capacity(capacity),
            stopped_early: false,
        }
    }

    fn record<P>(&mut self, peer: PeerInstance, outcome: PeerOutcome<M, B>, stop: &mut P) -> Step
    where
        P: FnMut(Option<&M>, Option<&B>) -> bool,
    {
        let step = if stop(outcome.metadata.as_ref(), outcome.body.as_ref()) {
            Step::Stop
        } else {
            Step::Continue
        };
        self.peers.push(peer);
        self.metadata.push(outcome.metadata);
        self.bodies.push(outcome.body);
        self.errors.push(outcome.error);
        step
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Walks the cached peer list one peer at a time
#[derive(Clone)]
pub struct FanOut {
    cache: Arc<MembershipCache>,
    executor: PeerExecutor,
}

impl FanOut {
    pub fn new(cache: Arc<MembershipCache>, executor: PeerExecutor) -> Self {
        Self { cache, executor }
    }

    /// Wire the resolver, cache and executor up from configuration.
    pub fn from_config(
        config: &FleetConfig,
        provider: Arc<dyn FleetProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let mut resolver = FleetResolver::new(provider, config.group_strategy());
        if let Some(id) = &config.instance_id {
            resolver = resolver.with_self_id(id.clone());
        }
        let cache = MembershipCache::new(Arc::new(resolver), config.max_cache_age());
        let executor = PeerExecutor::new(transport, config.request_settings());
        Self::new(Arc::new(cache), executor)
    }

    pub fn cache(&self) -> &Arc<MembershipCache> {
        &self.cache
    }

    pub fn executor(&self) -> &PeerExecutor {
        &self.executor
    }

    /// Run `action` against each peer in cache order, stopping after the
    /// first outcome for which `stop` holds. Per-peer errors are recorded and
    /// logged; only a failed membership lookup fails the whole call.
    pub async fn fan_out<M, B, A, Fut, P>(&self, mut action: A, mut stop: P) -> Result<FanOutResults<M, B>>
    where
        A: FnMut(PeerInstance) -> Fut,
        Fut: Future<Output = PeerOutcome<M, B>>,
        P: FnMut(Option<&M>, Option<&B>) -> bool,
    {
        let snapshot = self.cache.get().await?;
        let mut results = FanOutResults::with_capacity(snapshot.len());

        for peer in snapshot.peers.iter() {
            let outcome = action(peer.clone()).await;
            if let Some(e) = &outcome.error {
                error!("Request to peer {} failed: {}", peer, e);
            }

            if results.record(peer.clone(), outcome, &mut stop) == Step::Stop {
                debug!("Stop condition met at peer {}", peer);
                results.stopped_early = results.len() < snapshot.len();
                break;
            }
        }

        info!("Fan-out visited {} of {} peers", results.len(), snapshot.len());
        Ok(results)
    }

    /// Run `action` against every peer, collecting each result in order.
    pub async fn each_series<T, A, Fut>(&self, mut action: A) -> Result<Vec<Result<T>>>
    where
        A: FnMut(PeerInstance) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let results = self
            .fan_out(
                |peer| {
                    let fut = action(peer);
                    async move {
                        match fut.await {
                            Ok(value) => PeerOutcome::new(Some(value), Some(()), None),
                            Err(e) => PeerOutcome::failed(e),
                        }
                    }
                },
                |_, _| false,
            )
            .await?;

        Ok(results
            .metadata
            .into_iter()
            .zip(results.errors)
            .map(|(value, error)| match (value, error) {
                (Some(value), None) => Ok(value),
                (_, Some(e)) => Err(e),
                (None, None) => Err(PeerError::Server("peer action produced nothing".to_string())),
            })
            .collect())
    }

    /// Send `options` to each peer until `stop` holds for a response.
    pub async fn request_until<P>(&self, options: RequestOptions, stop: P) -> Result<FanOutResults<ResponseMeta, String>>
    where
        P: FnMut(Option<&ResponseMeta>, Option<&String>) -> bool,
    {
        let executor = &self.executor;
        self.fan_out(
            |peer| {
                let options = options.clone();
                async move { executor.execute(options, &peer).await }
            },
            stop,
        )
        .await
    }

    /// Send `options` to every peer.
    pub async fn request_each_series(&self, options: RequestOptions) -> Result<FanOutResults<ResponseMeta, String>> {
        self.request_until(options, |_, _| false).await
    }
}
