//! The control-plane seam.
//!
//! The engine never talks HTTP itself; everything it needs from the
//! proxy core's REST control plane goes through [`ControlPlane`]. The
//! real implementation lives with the host application; tests use
//! [`crate::mock::MockControlPlane`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ControlPlaneError;
use crate::model::Topology;

/// Abstraction over the proxy core's REST control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch a fresh topology snapshot (groups, proxies, providers).
    async fn fetch_topology(&self) -> Result<Topology, ControlPlaneError>;

    /// Measure the latency of a single proxy via the core's url-test
    /// endpoint. Returns the measured milliseconds.
    async fn probe_delay(
        &self,
        proxy: &str,
        url: &str,
        timeout_ms: u64,
    ) -> Result<u32, ControlPlaneError>;

    /// The core's batch url-test endpoint: probe every member of a group
    /// in one call, returning measured milliseconds per member name.
    async fn probe_group_delay(
        &self,
        group: &str,
        url: &str,
        timeout_ms: u64,
    ) -> Result<HashMap<String, u32>, ControlPlaneError>;

    /// Trigger a provider-level aggregate health check. Providers report
    /// aggregate health through the next topology snapshot, not
    /// per-member milliseconds.
    async fn probe_provider_health(&self, provider: &str) -> Result<(), ControlPlaneError>;

    /// Commit a manual selection on a group.
    async fn select_proxy(&self, group: &str, proxy: &str) -> Result<(), ControlPlaneError>;
}
