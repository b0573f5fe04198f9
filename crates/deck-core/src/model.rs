//! Data model for the proxy topology snapshot and delay records.
//!
//! Everything here is plain data. A [`Topology`] is a read-only snapshot
//! of the proxy core's groups, proxies, and providers, decoded from the
//! control plane's JSON and always replaced wholesale (behind an `Arc`)
//! rather than mutated field-by-field, so readers never observe a torn
//! state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The proxy core's routing mode.
///
/// Unknown modes reported by the core decode as [`ProxyMode::Rule`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Only the synthetic GLOBAL group is navigable.
    #[display("global")]
    Global,
    /// Traffic bypasses the core entirely; nothing to render.
    #[display("direct")]
    Direct,
    /// Legacy script mode, rendered like rule mode.
    #[display("script")]
    Script,
    /// Rule-based routing, the normal mode.
    #[default]
    #[serde(other)]
    #[display("rule")]
    Rule,
}

/// Proxy or group type tag as reported by the core.
///
/// The catch-all [`ProxyKind::Other`] keeps decoding total: a core that
/// reports a type we have never heard of must not fail the whole
/// topology refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProxyKind {
    Selector,
    UrlTest,
    Fallback,
    LoadBalance,
    Relay,
    Direct,
    Reject,
    Shadowsocks,
    Vmess,
    Trojan,
    Socks5,
    Http,
    Wireguard,
    Other(String),
}

impl ProxyKind {
    /// Whether this kind is one of the five independently navigable group
    /// classes. Groups of any other kind are traversed only as members.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            ProxyKind::Selector
                | ProxyKind::UrlTest
                | ProxyKind::Fallback
                | ProxyKind::LoadBalance
                | ProxyKind::Relay
        )
    }

    /// Whether a user may commit a selection on a group of this kind.
    pub fn is_selectable(&self) -> bool {
        matches!(
            self,
            ProxyKind::Selector | ProxyKind::UrlTest | ProxyKind::Fallback
        )
    }
}

impl From<String> for ProxyKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Selector" => ProxyKind::Selector,
            "URLTest" => ProxyKind::UrlTest,
            "Fallback" => ProxyKind::Fallback,
            "LoadBalance" => ProxyKind::LoadBalance,
            "Relay" => ProxyKind::Relay,
            "Direct" => ProxyKind::Direct,
            "Reject" => ProxyKind::Reject,
            "Shadowsocks" => ProxyKind::Shadowsocks,
            "Vmess" => ProxyKind::Vmess,
            "Trojan" => ProxyKind::Trojan,
            "Socks5" => ProxyKind::Socks5,
            "Http" => ProxyKind::Http,
            "WireGuard" => ProxyKind::Wireguard,
            _ => ProxyKind::Other(s),
        }
    }
}

impl From<ProxyKind> for String {
    fn from(kind: ProxyKind) -> Self {
        match kind {
            ProxyKind::Selector => "Selector".into(),
            ProxyKind::UrlTest => "URLTest".into(),
            ProxyKind::Fallback => "Fallback".into(),
            ProxyKind::LoadBalance => "LoadBalance".into(),
            ProxyKind::Relay => "Relay".into(),
            ProxyKind::Direct => "Direct".into(),
            ProxyKind::Reject => "Reject".into(),
            ProxyKind::Shadowsocks => "Shadowsocks".into(),
            ProxyKind::Vmess => "Vmess".into(),
            ProxyKind::Trojan => "Trojan".into(),
            ProxyKind::Socks5 => "Socks5".into(),
            ProxyKind::Http => "Http".into(),
            ProxyKind::Wireguard => "WireGuard".into(),
            ProxyKind::Other(s) => s,
        }
    }
}

/// One entry of the core's own url-test history for a proxy.
///
/// Retained for display only; the engine's delay cache is the
/// authoritative source for latencies it measured itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayHistoryEntry {
    pub time: DateTime<Utc>,
    pub delay: u32,
}

/// A single proxy endpoint (or nested group, when it appears as a member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    /// Set when this node was expanded out of a provider's member list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Currently active member, for nodes that are themselves groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
    #[serde(default)]
    pub udp: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<DelayHistoryEntry>,
}

impl ProxyNode {
    /// A bare node with only a name, used when a member reference cannot
    /// be resolved against the snapshot.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProxyKind::Other(String::new()),
            provider: None,
            now: None,
            udp: false,
            history: Vec::new(),
        }
    }
}

/// Reference to a group member: an inline proxy by name, or a
/// provider-backed proxy (`provider` set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ProxyRef {
    pub fn inline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
        }
    }

    pub fn provided(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: Some(provider.into()),
        }
    }
}

/// A named, typed collection of proxies with a selection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    /// Currently active member name. May transiently disagree with a
    /// just-committed selection until the next snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Group-declared latency test URL, if any.
    #[serde(default, alias = "testUrl", skip_serializing_if = "Option::is_none")]
    pub test_url: Option<String>,
    pub all: Vec<ProxyRef>,
}

/// An externally-sourced proxy list referenced by name from groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyProvider {
    pub name: String,
    #[serde(default, alias = "vehicleType")]
    pub vehicle_type: String,
    #[serde(default)]
    pub proxies: Vec<ProxyNode>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of the whole proxy topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub mode: ProxyMode,
    /// The synthetic GLOBAL group, present when the core runs in global
    /// mode (and usually in rule mode too, hidden).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<ProxyGroup>,
    #[serde(default)]
    pub groups: Vec<ProxyGroup>,
    /// All inline proxies by name, groups included.
    #[serde(default)]
    pub proxies: HashMap<String, ProxyNode>,
    #[serde(default)]
    pub providers: HashMap<String, ProxyProvider>,
}

impl Topology {
    /// Look up a visible group by name, checking GLOBAL as well.
    pub fn group(&self, name: &str) -> Option<&ProxyGroup> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .or_else(|| self.global.as_ref().filter(|g| g.name == name))
    }
}

/// Cache key for a delay measurement: the proxy name plus the group
/// ("test context") it is being evaluated under. The same proxy can have
/// different delays in different groups because groups may use different
/// test URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{context}::{proxy}")]
pub struct DelayKey {
    pub proxy: String,
    pub context: String,
}

impl DelayKey {
    pub fn new(proxy: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            context: context.into(),
        }
    }
}

/// A measured latency, or one of two sentinels.
///
/// `UNTESTED` (-1) means no probe has ever settled for the key;
/// `FAILED` (1_000_000) means the last probe errored or timed out. The
/// failure sentinel is a fixed large constant rather than `timeout + n`
/// so it is recognizable regardless of which timeout produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delay(i32);

impl Delay {
    /// No probe has ever settled for this key.
    pub const UNTESTED: Delay = Delay(-1);
    /// The last probe errored or timed out.
    pub const FAILED: Delay = Delay(1_000_000);

    /// A successful measurement. Values at or above the failure sentinel
    /// are clamped just below it so a (pathological) measurement can
    /// never masquerade as a failure.
    pub fn from_millis(ms: u32) -> Self {
        let capped = ms.min(Self::FAILED.0 as u32 - 1);
        Delay(capped as i32)
    }

    pub fn millis(self) -> i32 {
        self.0
    }

    pub fn is_untested(self) -> bool {
        self == Self::UNTESTED
    }

    pub fn is_failed(self) -> bool {
        self == Self::FAILED
    }

    /// A real, successful measurement.
    pub fn is_measured(self) -> bool {
        self.0 >= 0 && !self.is_failed()
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::UNTESTED
    }
}

impl std::fmt::Display for Delay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_untested() {
            write!(f, "-")
        } else if self.is_failed() {
            write!(f, "fail")
        } else {
            write!(f, "{}ms", self.0)
        }
    }
}

/// A cached measurement with the time its probe settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRecord {
    pub delay: Delay,
    pub checked_at: DateTime<Utc>,
}

impl DelayRecord {
    pub fn now(delay: Delay) -> Self {
        Self {
            delay,
            checked_at: Utc::now(),
        }
    }
}
