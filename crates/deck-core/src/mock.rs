//! Mock control plane for testing.
//!
//! Provides an in-memory [`ControlPlane`] with scripted probe outcomes,
//! so scheduler and engine logic can be tested without a running proxy
//! core.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deck_core::{ControlPlane, MockControlPlane};
//!
//! let mock = MockControlPlane::new();
//! mock.script_delay("HK-01", 120);
//! mock.script_failure("DE-02");
//!
//! let ms = mock.probe_delay("HK-01", "http://test", 5000).await.unwrap();
//! assert_eq!(ms, 120);
//! assert_eq!(mock.probe_calls("HK-01"), 1);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::control::ControlPlane;
use crate::error::ControlPlaneError;
use crate::model::Topology;

/// Scripted outcome for a single proxy's probe.
#[derive(Debug, Clone)]
enum ProbeScript {
    Delay(u32),
    Fail,
}

/// A mock control plane with scripted responses and call accounting.
#[derive(Default)]
pub struct MockControlPlane {
    topology: Mutex<Topology>,
    scripts: DashMap<String, ProbeScript>,
    group_scripts: DashMap<String, HashMap<String, u32>>,
    probe_counts: DashMap<String, usize>,
    health_counts: DashMap<String, usize>,
    selections: Mutex<Vec<(String, String)>>,
    /// Artificial latency applied to every probe call, for exercising
    /// in-flight windows in dedup tests.
    latency: Mutex<Duration>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful probe for `proxy`.
    pub fn script_delay(&self, proxy: impl Into<String>, ms: u32) {
        self.scripts.insert(proxy.into(), ProbeScript::Delay(ms));
    }

    /// Script a failing probe for `proxy`.
    pub fn script_failure(&self, proxy: impl Into<String>) {
        self.scripts.insert(proxy.into(), ProbeScript::Fail);
    }

    /// Script the batch group-delay endpoint for `group`.
    pub fn script_group_delays(&self, group: impl Into<String>, delays: HashMap<String, u32>) {
        self.group_scripts.insert(group.into(), delays);
    }

    /// Replace the topology returned by [`ControlPlane::fetch_topology`].
    pub fn set_topology(&self, topology: Topology) {
        *self.topology.lock().expect("topology lock") = topology;
    }

    /// Delay every probe call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("latency lock") = latency;
    }

    /// How many individual probes have been issued for `proxy`.
    pub fn probe_calls(&self, proxy: &str) -> usize {
        self.probe_counts.get(proxy).map(|c| *c).unwrap_or(0)
    }

    /// How many health checks have been issued for `provider`.
    pub fn health_calls(&self, provider: &str) -> usize {
        self.health_counts.get(provider).map(|c| *c).unwrap_or(0)
    }

    /// Selections committed so far, in order, as `(group, proxy)` pairs.
    pub fn selections(&self) -> Vec<(String, String)> {
        self.selections.lock().expect("selections lock").clone()
    }

    fn pause(&self) -> Duration {
        *self.latency.lock().expect("latency lock")
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn fetch_topology(&self) -> Result<Topology, ControlPlaneError> {
        Ok(self.topology.lock().expect("topology lock").clone())
    }

    async fn probe_delay(
        &self,
        proxy: &str,
        _url: &str,
        _timeout_ms: u64,
    ) -> Result<u32, ControlPlaneError> {
        *self.probe_counts.entry(proxy.to_string()).or_insert(0) += 1;

        let pause = self.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        match self.scripts.get(proxy).map(|s| s.clone()) {
            Some(ProbeScript::Delay(ms)) => Ok(ms),
            Some(ProbeScript::Fail) => {
                Err(ControlPlaneError::Connect(format!("{proxy}: scripted failure")))
            }
            None => Err(ControlPlaneError::NotFound(proxy.to_string())),
        }
    }

    async fn probe_group_delay(
        &self,
        group: &str,
        _url: &str,
        _timeout_ms: u64,
    ) -> Result<HashMap<String, u32>, ControlPlaneError> {
        let pause = self.pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        self.group_scripts
            .get(group)
            .map(|d| d.clone())
            .ok_or_else(|| ControlPlaneError::NotFound(group.to_string()))
    }

    async fn probe_provider_health(&self, provider: &str) -> Result<(), ControlPlaneError> {
        *self.health_counts.entry(provider.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn select_proxy(&self, group: &str, proxy: &str) -> Result<(), ControlPlaneError> {
        self.selections
            .lock()
            .expect("selections lock")
            .push((group.to_string(), proxy.to_string()));
        Ok(())
    }
}
