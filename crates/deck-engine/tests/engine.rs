//! End-to-end tests for the deck engine.
//!
//! These drive the whole engine — topology refresh, render-list
//! building, group delay checks, and per-row subscriptions — against a
//! scripted mock control plane.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deck_core::{
    MockControlPlane, ProxyGroup, ProxyKind, ProxyMode, ProxyNode, ProxyProvider, ProxyRef,
    Topology,
};
use deck_engine::{Delay, DelayCache};
use deck_engine::{Engine, EngineConfig, HeadStatePatch, RenderRow, SortKind};

// Test helpers

fn node(name: &str) -> ProxyNode {
    ProxyNode {
        name: name.into(),
        kind: ProxyKind::Shadowsocks,
        provider: None,
        now: None,
        udp: true,
        history: Vec::new(),
    }
}

fn fixture_topology() -> Topology {
    // Two visible groups plus a hidden one. "Auto" mixes inline and
    // provider-backed members.
    let auto = ProxyGroup {
        name: "Auto".into(),
        kind: ProxyKind::UrlTest,
        now: Some("HK-01".into()),
        hidden: false,
        test_url: None,
        all: vec![
            ProxyRef::inline("HK-01"),
            ProxyRef::inline("SG-01"),
            ProxyRef::provided("US-99", "airport"),
        ],
    };
    let manual = ProxyGroup {
        name: "Manual".into(),
        kind: ProxyKind::Selector,
        now: Some("HK-01".into()),
        hidden: false,
        test_url: None,
        all: vec![ProxyRef::inline("HK-01"), ProxyRef::inline("DE-01")],
    };
    let hidden = ProxyGroup {
        name: "Internal".into(),
        kind: ProxyKind::Selector,
        now: None,
        hidden: true,
        test_url: None,
        all: vec![ProxyRef::inline("HK-01")],
    };

    let proxies = ["HK-01", "SG-01", "DE-01"]
        .into_iter()
        .map(|n| (n.to_string(), node(n)))
        .collect();
    let providers = HashMap::from([(
        "airport".to_string(),
        ProxyProvider {
            name: "airport".into(),
            vehicle_type: "HTTP".into(),
            proxies: vec![node("US-99")],
            updated_at: None,
        },
    )]);

    Topology {
        mode: ProxyMode::Rule,
        global: None,
        groups: vec![auto, manual, hidden],
        proxies,
        providers,
    }
}

fn engine_with(mock: &Arc<MockControlPlane>) -> Engine {
    mock.set_topology(fixture_topology());
    let control: Arc<dyn deck_core::ControlPlane> = mock.clone() as Arc<dyn deck_core::ControlPlane>;
    Engine::new(control, EngineConfig::default())
}

fn keys(rows: &[RenderRow]) -> Vec<String> {
    rows.iter().map(|r| r.key()).collect()
}

#[tokio::test]
async fn test_refresh_then_render_walks_visible_groups() {
    let mock = Arc::new(MockControlPlane::new());
    let engine = engine_with(&mock);
    engine.refresh_topology().await.unwrap();

    let rows = engine.render_list().await;
    let keys = keys(&rows);
    assert_eq!(
        keys,
        vec![
            "g::Auto",
            "Auto::HK-01",
            "Auto::SG-01",
            "Auto::US-99@airport",
            "g::Manual",
            "Manual::HK-01",
            "Manual::DE-01",
        ]
    );

    // Rebuilding from unchanged inputs keeps keys identical.
    assert_eq!(keys, self::keys(&engine.render_list().await));
}

#[tokio::test]
async fn test_check_group_then_delay_sorted_render() {
    let mock = Arc::new(MockControlPlane::new());
    mock.script_delay("HK-01", 120);
    mock.script_delay("SG-01", 45);
    let engine = engine_with(&mock);
    engine.refresh_topology().await.unwrap();

    engine.check_group_delay("Auto", Some(5000)).await.unwrap();

    // One aggregate health check for the provider, no individual probe.
    assert_eq!(mock.health_calls("airport"), 1);
    assert_eq!(mock.probe_calls("US-99"), 0);
    assert_eq!(engine.get_delay("US-99", "Auto"), Delay::UNTESTED);

    engine
        .update_head_state("Auto", HeadStatePatch::default().sort(SortKind::Delay))
        .await;
    let rows = engine.render_list().await;

    // SG-01 (45ms) before HK-01 (120ms); the untested provider member
    // sorts last.
    assert_eq!(
        keys(&rows)[..4],
        [
            "g::Auto".to_string(),
            "Auto::SG-01".to_string(),
            "Auto::HK-01".to_string(),
            "Auto::US-99@airport".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_row_subscription_gets_pushed_results() {
    let mock = Arc::new(MockControlPlane::new());
    mock.script_delay("HK-01", 77);
    let engine = engine_with(&mock);
    engine.refresh_topology().await.unwrap();

    let pushes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pushes);
    engine.cache().set_listener("HK-01", "Manual", move |delay| {
        assert_eq!(delay, Delay::from_millis(77));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine
        .scheduler()
        .check_delay("HK-01", "Manual", 5000)
        .await
        .unwrap();
    assert_eq!(pushes.load(Ordering::SeqCst), 1);

    // Unmounting the row stops delivery but not the cache writes.
    engine.cache().remove_listener("HK-01", "Manual");
    engine
        .scheduler()
        .check_delay("HK-01", "Manual", 5000)
        .await
        .unwrap();
    assert_eq!(pushes.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get_delay("HK-01", "Manual"), Delay::from_millis(77));
}

#[tokio::test]
async fn test_rapid_recheck_joins_inflight_probes() {
    let mock = Arc::new(MockControlPlane::new());
    mock.script_delay("HK-01", 60);
    mock.script_delay("SG-01", 80);
    mock.set_latency(Duration::from_millis(40));
    let engine = engine_with(&mock);
    engine.refresh_topology().await.unwrap();

    // A user hammering "check all" twice while probes are in flight.
    let (a, b) = tokio::join!(
        engine.check_group_delay("Auto", Some(5000)),
        engine.check_group_delay("Auto", Some(5000)),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(mock.probe_calls("HK-01"), 1);
    assert_eq!(mock.probe_calls("SG-01"), 1);
    assert_eq!(engine.get_delay("HK-01", "Auto"), Delay::from_millis(60));
}

#[tokio::test]
async fn test_unscripted_probes_degrade_to_failed_sentinel() {
    let mock = Arc::new(MockControlPlane::new());
    // Only HK-01 is reachable; the rest error out.
    mock.script_delay("HK-01", 60);
    let engine = engine_with(&mock);
    engine.refresh_topology().await.unwrap();

    engine.check_group_delay("Manual", None).await.unwrap();

    assert_eq!(engine.get_delay("HK-01", "Manual"), Delay::from_millis(60));
    assert_eq!(engine.get_delay("DE-01", "Manual"), Delay::FAILED);
}

#[tokio::test]
async fn test_topology_decoded_from_control_plane_json() {
    // The snapshot shape as the REST control plane reports it.
    let topology: Topology = serde_json::from_str(
        r#"{
            "mode": "rule",
            "groups": [{
                "name": "Auto",
                "type": "URLTest",
                "now": "HK-01",
                "all": [
                    {"name": "HK-01"},
                    {"name": "US-99", "provider": "airport"}
                ]
            }],
            "proxies": {
                "HK-01": {"name": "HK-01", "type": "Shadowsocks", "udp": true}
            },
            "providers": {
                "airport": {
                    "name": "airport",
                    "vehicleType": "HTTP",
                    "proxies": [{"name": "US-99", "type": "Trojan"}]
                }
            }
        }"#,
    )
    .unwrap();

    let mock = Arc::new(MockControlPlane::new());
    mock.set_topology(topology);
    let engine = Engine::new(mock, EngineConfig::default());
    engine.refresh_topology().await.unwrap();

    let rows = engine.render_list().await;
    assert_eq!(keys(&rows), vec!["g::Auto", "Auto::HK-01", "Auto::US-99@airport"]);
}

#[tokio::test]
async fn test_delay_cache_is_shared_across_consumers() {
    // Two independent readers of one cache observe the same writes,
    // mirroring many mounted rows sharing the session singleton.
    let cache = Arc::new(DelayCache::new());
    let reader = Arc::clone(&cache);

    cache.record("p", "g", Delay::from_millis(5));
    let handle = tokio::spawn(async move { reader.get("p", "g") });
    assert_eq!(handle.await.unwrap(), Delay::from_millis(5));
}
