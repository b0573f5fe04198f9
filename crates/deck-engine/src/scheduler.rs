//! Probe scheduler: latency measurement with dedup and bounded fan-out.
//!
//! The scheduler is the only writer to the [`DelayCache`]. It issues
//! probes through the [`ControlPlane`] seam, normalizes every failure
//! (connect error, HTTP error, timeout) to [`Delay::FAILED`], and
//! deduplicates overlapping requests for the same `(proxy, context)`
//! key: a second caller joins the in-flight probe instead of issuing a
//! duplicate request. The dedup map holds a [`Shared`] future per key
//! that every joiner awaits; the entry is removed when the probe
//! settles.
//!
//! Ordinary network failures never surface as errors from this module;
//! [`EngineError`] is returned only for caller bugs (bad timeout, empty
//! batch).

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::debug;

use deck_core::{ControlPlane, Delay, DelayKey, EngineError, ProxyGroup};

use crate::config::{EngineConfig, MAX_TIMEOUT_MS};
use crate::delay::DelayCache;

type InflightProbe = Shared<BoxFuture<'static, Delay>>;

/// Coordinates latency probes against the control plane.
///
/// Cheap to clone; all state lives behind an `Arc`.
#[derive(Clone)]
pub struct ProbeScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<DelayCache>,
    control: Arc<dyn ControlPlane>,
    /// One shared future per in-flight `(proxy, context)` probe.
    inflight: DashMap<DelayKey, InflightProbe>,
    /// Effective test URL per context, resolved by the head-state layer.
    urls: DashMap<String, String>,
    limiter: Arc<Semaphore>,
    concurrency: usize,
    default_url: String,
}

impl ProbeScheduler {
    pub fn new(
        cache: Arc<DelayCache>,
        control: Arc<dyn ControlPlane>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                control,
                inflight: DashMap::new(),
                urls: DashMap::new(),
                limiter: Arc::new(Semaphore::new(config.probe_concurrency)),
                concurrency: config.probe_concurrency,
                default_url: config.default_test_url.clone(),
            }),
        }
    }

    /// Probe one proxy under `context`, recording the result in the
    /// cache before resolving.
    ///
    /// Resolves with the measured delay, or [`Delay::FAILED`] on any
    /// network failure or timeout. Errs only on an invalid timeout.
    ///
    /// If a probe for the same key is already in flight, this call joins
    /// it (the in-flight probe's timeout applies) and no second request
    /// is issued.
    pub async fn check_delay(
        &self,
        proxy: &str,
        context: &str,
        timeout_ms: u64,
    ) -> Result<Delay, EngineError> {
        validate_timeout(timeout_ms)?;
        Ok(self.join_probe(DelayKey::new(proxy, context), timeout_ms).await)
    }

    /// Probe many proxies under one context, at most
    /// `probe_concurrency` in flight at a time.
    ///
    /// Resolves only after every member probe has settled; individual
    /// failures are recorded as [`Delay::FAILED`] and never
    /// short-circuit the batch.
    pub async fn check_list_delay(
        &self,
        proxies: &[String],
        context: &str,
        timeout_ms: u64,
    ) -> Result<(), EngineError> {
        if proxies.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        validate_timeout(timeout_ms)?;

        stream::iter(proxies)
            .for_each_concurrent(self.inner.concurrency, |proxy| {
                let key = DelayKey::new(proxy.clone(), context);
                async move {
                    self.join_probe(key, timeout_ms).await;
                }
            })
            .await;
        Ok(())
    }

    /// "Check all" for one group.
    ///
    /// Provider-backed members are not probed individually: one
    /// aggregate health check is issued per distinct provider, and its
    /// result is never written to the per-proxy cache. Inline members go
    /// through [`check_list_delay`], concurrently with the control
    /// plane's batch group endpoint; whichever answers arrive are
    /// recorded, last write wins.
    ///
    /// [`check_list_delay`]: ProbeScheduler::check_list_delay
    pub async fn check_group(
        &self,
        group: &ProxyGroup,
        timeout_ms: u64,
    ) -> Result<(), EngineError> {
        validate_timeout(timeout_ms)?;

        let mut providers: Vec<&str> = Vec::new();
        let mut inline: Vec<String> = Vec::new();
        for member in &group.all {
            match &member.provider {
                Some(p) => {
                    if !providers.contains(&p.as_str()) {
                        providers.push(p);
                    }
                }
                None => inline.push(member.name.clone()),
            }
        }

        let health = futures::future::join_all(providers.iter().map(|provider| async move {
            if let Err(err) = self.inner.control.probe_provider_health(provider).await {
                debug!(provider, error = %err, "provider health check failed");
            }
        }));

        let batch = async {
            let url = self.url_of(&group.name);
            match self
                .inner
                .control
                .probe_group_delay(&group.name, &url, timeout_ms)
                .await
            {
                Ok(delays) => {
                    for (name, ms) in delays {
                        self.inner
                            .cache
                            .record(&name, &group.name, Delay::from_millis(ms));
                    }
                }
                Err(err) => {
                    debug!(group = %group.name, error = %err, "batch group probe failed");
                }
            }
        };

        let singles = async {
            if !inline.is_empty() {
                // Timeout already validated; EmptyBatch excluded above.
                let _ = self.check_list_delay(&inline, &group.name, timeout_ms).await;
            }
        };

        tokio::join!(health, batch, singles);
        Ok(())
    }

    /// Store the effective test URL for a context. An empty URL resets
    /// the context to the configured default.
    pub fn set_url(&self, context: &str, url: &str) {
        if url.is_empty() {
            self.inner.urls.remove(context);
        } else {
            self.inner.urls.insert(context.to_string(), url.to_string());
        }
    }

    /// Effective test URL for a context, falling back to the default.
    pub fn url_of(&self, context: &str) -> String {
        self.inner
            .urls
            .get(context)
            .map(|u| u.clone())
            .unwrap_or_else(|| self.inner.default_url.clone())
    }

    /// Number of probes currently in flight (joined callers count once).
    pub fn inflight_len(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Join the in-flight probe for `key`, starting one if none exists.
    async fn join_probe(&self, key: DelayKey, timeout_ms: u64) -> Delay {
        let probe = match self.inner.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let probe = Inner::probe(Arc::clone(&self.inner), key, timeout_ms)
                    .boxed()
                    .shared();
                vacant.insert(probe.clone());
                probe
            }
        };
        probe.await
    }
}

impl Inner {
    /// The single physical probe for a key. Runs under the concurrency
    /// cap, records the normalized result, then retires its dedup entry.
    async fn probe(inner: Arc<Inner>, key: DelayKey, timeout_ms: u64) -> Delay {
        let _permit = inner
            .limiter
            .clone()
            .acquire_owned()
            .await
            .expect("probe semaphore is never closed");

        let url = inner
            .urls
            .get(&key.context)
            .map(|u| u.clone())
            .unwrap_or_else(|| inner.default_url.clone());

        let request = inner.control.probe_delay(&key.proxy, &url, timeout_ms);
        let delay = match tokio::time::timeout(Duration::from_millis(timeout_ms), request).await {
            Ok(Ok(ms)) => Delay::from_millis(ms),
            Ok(Err(err)) => {
                debug!(key = %key, error = %err, "probe failed");
                Delay::FAILED
            }
            Err(_) => {
                debug!(key = %key, timeout_ms, "probe timed out");
                Delay::FAILED
            }
        };

        // Record before retiring the dedup entry: a caller that resolves
        // must read its own value back from the cache.
        inner.cache.record(&key.proxy, &key.context, delay);
        inner.inflight.remove(&key);
        delay
    }
}

fn validate_timeout(timeout_ms: u64) -> Result<(), EngineError> {
    if timeout_ms == 0 || timeout_ms > MAX_TIMEOUT_MS {
        return Err(EngineError::InvalidTimeout(timeout_ms));
    }
    Ok(())
}
