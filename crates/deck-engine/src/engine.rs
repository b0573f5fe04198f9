//! Engine facade: owns the topology snapshot and wires the parts.
//!
//! The [`Engine`] holds the session-scoped singletons (delay cache,
//! probe scheduler, head-state store) and the current [`Topology`]
//! snapshot, which it swaps wholesale on every refresh. UI layers talk
//! to this type; the components underneath stay independently testable.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use deck_core::{ControlPlane, Delay, EngineError, ProxyGroup, Topology};

use crate::config::EngineConfig;
use crate::delay::DelayCache;
use crate::head_state::{HeadState, HeadStatePatch, HeadStateStore};
use crate::render::{build_render_list, RenderOptions, RenderRow};
use crate::scheduler::ProbeScheduler;

pub struct Engine {
    cache: Arc<DelayCache>,
    scheduler: ProbeScheduler,
    heads: HeadStateStore,
    control: Arc<dyn ControlPlane>,
    topology: RwLock<Arc<Topology>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(control: Arc<dyn ControlPlane>, config: EngineConfig) -> Self {
        let cache = Arc::new(DelayCache::new());
        let scheduler = ProbeScheduler::new(Arc::clone(&cache), Arc::clone(&control), &config);
        Self {
            cache,
            scheduler,
            heads: HeadStateStore::new(),
            control,
            topology: RwLock::new(Arc::new(Topology::default())),
            config,
        }
    }

    /// The delay cache, for row-level `get`/`set_listener`/
    /// `remove_listener` subscriptions.
    pub fn cache(&self) -> &Arc<DelayCache> {
        &self.cache
    }

    /// The probe scheduler, for direct `check_delay` calls.
    pub fn scheduler(&self) -> &ProbeScheduler {
        &self.scheduler
    }

    /// Last known delay for a proxy under a context.
    pub fn get_delay(&self, proxy: &str, context: &str) -> Delay {
        self.cache.get(proxy, context)
    }

    /// The current topology snapshot.
    pub async fn topology(&self) -> Arc<Topology> {
        Arc::clone(&*self.topology.read().await)
    }

    /// Fetch a fresh snapshot from the control plane and swap it in
    /// atomically. Also re-resolves each group's effective test URL into
    /// the scheduler, since group-declared URLs may have changed.
    pub async fn refresh_topology(&self) -> Result<Arc<Topology>, EngineError> {
        let fresh = Arc::new(self.control.fetch_topology().await?);
        debug!(
            groups = fresh.groups.len(),
            providers = fresh.providers.len(),
            mode = %fresh.mode,
            "topology refreshed"
        );

        for group in fresh.groups.iter().chain(fresh.global.as_ref()) {
            self.sync_group_url(group);
        }

        *self.topology.write().await = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Flatten the current snapshot with the current head state.
    pub async fn render_list(&self) -> Vec<RenderRow> {
        let topology = self.topology().await;
        let options = RenderOptions {
            columns: self.config.columns,
        };
        build_render_list(&topology, &self.heads, &self.cache, &options)
    }

    /// Head state for a group, created on first access.
    pub fn head_state(&self, group: &str) -> HeadState {
        self.heads.get(group)
    }

    /// Shallow-merge a head-state patch, then push the group's effective
    /// test URL into the scheduler (override → group URL → default).
    pub async fn update_head_state(&self, group: &str, patch: HeadStatePatch) -> HeadState {
        let state = self.heads.update(group, patch);

        let topology = self.topology().await;
        if let Some(group) = topology.group(group) {
            self.sync_group_url(group);
        } else if !state.test_url.is_empty() {
            // Group not in the snapshot (yet); honor the override anyway.
            self.scheduler.set_url(group, &state.test_url);
        }
        state
    }

    /// "Check all" for a named group in the current snapshot.
    pub async fn check_group_delay(
        &self,
        group: &str,
        timeout_ms: Option<u64>,
    ) -> Result<(), EngineError> {
        let topology = self.topology().await;
        let group = topology
            .group(group)
            .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))?;
        let timeout = timeout_ms.unwrap_or(self.config.default_timeout_ms);
        self.scheduler.check_group(group, timeout).await
    }

    /// Commit a manual selection, then refresh the topology so the
    /// group's `now` catches up. Until the refresh lands, the flattener
    /// simply renders the old snapshot; a transient mismatch is fine.
    pub async fn select_proxy(&self, group: &str, proxy: &str) -> Result<(), EngineError> {
        {
            let topology = self.topology().await;
            let group = topology
                .group(group)
                .ok_or_else(|| EngineError::UnknownGroup(group.to_string()))?;
            if !group.kind.is_selectable() {
                return Err(EngineError::NotSelectable(group.name.clone()));
            }
        }

        self.control.select_proxy(group, proxy).await?;
        debug!(group, proxy, "selection committed");
        self.refresh_topology().await?;
        Ok(())
    }

    /// Resolve a group's effective test URL and store it with the
    /// scheduler: head-state override first, then the group-declared
    /// URL, then the configured default.
    fn sync_group_url(&self, group: &ProxyGroup) {
        let head = self.heads.get(&group.name);
        let url = if !head.test_url.is_empty() {
            head.test_url
        } else if let Some(url) = &group.test_url {
            url.clone()
        } else {
            // Empty resets the context to the default URL.
            String::new()
        };
        self.scheduler.set_url(&group.name, &url);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use deck_core::{MockControlPlane, ProxyKind, ProxyMode, ProxyRef};

    use crate::config::DEFAULT_TEST_URL;
    use crate::head_state::SortKind;

    use super::*;

    fn group(name: &str, kind: ProxyKind, members: &[&str]) -> ProxyGroup {
        ProxyGroup {
            name: name.into(),
            kind,
            now: members.first().map(|m| m.to_string()),
            hidden: false,
            test_url: None,
            all: members.iter().map(|m| ProxyRef::inline(*m)).collect(),
        }
    }

    fn topology(groups: Vec<ProxyGroup>) -> Topology {
        Topology {
            mode: ProxyMode::Rule,
            global: None,
            groups,
            proxies: HashMap::new(),
            providers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_select_rejects_non_selectable_groups() {
        let mock = Arc::new(MockControlPlane::new());
        mock.set_topology(topology(vec![group(
            "Balance",
            ProxyKind::LoadBalance,
            &["A"],
        )]));
        let engine = Engine::new(mock.clone(), EngineConfig::default());
        engine.refresh_topology().await.unwrap();

        assert!(matches!(
            engine.select_proxy("Balance", "A").await,
            Err(EngineError::NotSelectable(_))
        ));
        assert!(mock.selections().is_empty());

        assert!(matches!(
            engine.select_proxy("nope", "A").await,
            Err(EngineError::UnknownGroup(_))
        ));
    }

    #[tokio::test]
    async fn test_select_commits_and_refreshes() {
        let mock = Arc::new(MockControlPlane::new());
        mock.set_topology(topology(vec![group(
            "Manual",
            ProxyKind::Selector,
            &["A", "B"],
        )]));
        let engine = Engine::new(mock.clone(), EngineConfig::default());
        engine.refresh_topology().await.unwrap();

        // Script the post-selection snapshot the core would report.
        let mut updated = group("Manual", ProxyKind::Selector, &["A", "B"]);
        updated.now = Some("B".into());
        mock.set_topology(topology(vec![updated]));

        engine.select_proxy("Manual", "B").await.unwrap();
        assert_eq!(mock.selections(), vec![("Manual".into(), "B".into())]);

        let snapshot = engine.topology().await;
        assert_eq!(snapshot.group("Manual").unwrap().now.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_head_state_patch_syncs_test_url() {
        let mock = Arc::new(MockControlPlane::new());
        let mut g = group("Auto", ProxyKind::UrlTest, &["A"]);
        g.test_url = Some("http://group.example/204".into());
        mock.set_topology(topology(vec![g]));
        let engine = Engine::new(mock, EngineConfig::default());
        engine.refresh_topology().await.unwrap();

        // Group-declared URL wins over the default after refresh.
        assert_eq!(engine.scheduler().url_of("Auto"), "http://group.example/204");

        // A head-state override beats the group URL.
        engine
            .update_head_state(
                "Auto",
                HeadStatePatch::default().test_url("http://me.example/204"),
            )
            .await;
        assert_eq!(engine.scheduler().url_of("Auto"), "http://me.example/204");

        // Clearing the override falls back to the group URL.
        engine
            .update_head_state("Auto", HeadStatePatch::default().test_url(""))
            .await;
        assert_eq!(engine.scheduler().url_of("Auto"), "http://group.example/204");
    }

    #[tokio::test]
    async fn test_head_state_patch_without_group_keeps_state() {
        let mock = Arc::new(MockControlPlane::new());
        let engine = Engine::new(mock, EngineConfig::default());

        let state = engine
            .update_head_state("G1", HeadStatePatch::default().sort(SortKind::Name))
            .await;
        assert_eq!(state.sort, SortKind::Name);
        assert_eq!(engine.scheduler().url_of("G1"), DEFAULT_TEST_URL);
    }

    #[tokio::test]
    async fn test_check_group_delay_requires_known_group() {
        let mock = Arc::new(MockControlPlane::new());
        let engine = Engine::new(mock, EngineConfig::default());
        assert!(matches!(
            engine.check_group_delay("missing", None).await,
            Err(EngineError::UnknownGroup(_))
        ));
    }
}
