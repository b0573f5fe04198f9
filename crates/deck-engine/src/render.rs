//! Topology flattener: builds the virtualized list's row sequence.
//!
//! [`build_render_list`] is a pure, synchronous transformation from
//! `(topology snapshot, per-group head state, delay cache)` to one flat,
//! keyed [`RenderRow`] sequence. It is recomputed wholesale on any input
//! change; there is deliberately no incremental patching, because the
//! topology snapshot is itself replaced wholesale on refresh.
//!
//! Row keys are stable across rebuilds for unchanged `(group, proxy)`
//! identity, which is what the virtualization layer's diffing relies on.

use serde::Serialize;

use deck_core::{Delay, ProxyGroup, ProxyMode, ProxyNode, Topology};

use crate::delay::DelayCache;
use crate::head_state::{HeadState, HeadStateStore, SortKind};

/// Layout options for the flattener.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Number of proxies per [`RenderRow::Column`]; 1 emits plain
    /// [`RenderRow::Item`] rows.
    pub columns: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { columns: 1 }
    }
}

/// Group facts carried by a header row, enough for the head bar to
/// render without another topology lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMeta {
    pub name: String,
    pub kind: deck_core::ProxyKind,
    pub now: Option<String>,
    pub test_url: Option<String>,
    pub member_count: usize,
}

impl GroupMeta {
    fn of(group: &ProxyGroup) -> Self {
        Self {
            name: group.name.clone(),
            kind: group.kind.clone(),
            now: group.now.clone(),
            test_url: group.test_url.clone(),
            member_count: group.all.len(),
        }
    }
}

/// One flattened, keyed unit of the virtualized list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderRow {
    /// Group header with its head-bar controls state.
    GroupHead { group: GroupMeta, head: HeadState },
    /// One proxy in list layout.
    Item { group: String, proxy: ProxyNode },
    /// One grid row of up to `columns` proxies.
    Column {
        group: String,
        index: usize,
        proxies: Vec<ProxyNode>,
    },
    /// Placeholder for a provider-backed member whose provider is not
    /// resolvable in this snapshot. Emitting a skeleton instead of
    /// omitting the member keeps the row count stable for the
    /// virtualizer.
    ProviderSkeleton {
        group: String,
        provider: String,
        proxy: String,
    },
    /// An open group whose members were all filtered out.
    Empty { group: String },
}

impl RenderRow {
    /// Globally unique, stable key: group name + proxy identity + row
    /// kind. Provider-sourced members carry an `@provider` suffix so a
    /// name that appears both inline and via a provider stays unique.
    pub fn key(&self) -> String {
        match self {
            RenderRow::GroupHead { group, .. } => format!("g::{}", group.name),
            RenderRow::Item { group, proxy } => match &proxy.provider {
                Some(p) => format!("{group}::{}@{p}", proxy.name),
                None => format!("{group}::{}", proxy.name),
            },
            RenderRow::Column { group, index, .. } => format!("{group}::col{index}"),
            RenderRow::ProviderSkeleton {
                group,
                provider,
                proxy,
            } => format!("{group}::{proxy}@{provider}#pending"),
            RenderRow::Empty { group } => format!("{group}::empty"),
        }
    }

    /// Name of the group this row belongs to.
    pub fn group_name(&self) -> &str {
        match self {
            RenderRow::GroupHead { group, .. } => &group.name,
            RenderRow::Item { group, .. }
            | RenderRow::Column { group, .. }
            | RenderRow::ProviderSkeleton { group, .. }
            | RenderRow::Empty { group } => group,
        }
    }
}

/// A group member after provider resolution.
enum Member {
    Node(ProxyNode),
    /// Provider reference that could not be resolved in this snapshot.
    Unresolved { provider: String, name: String },
}

impl Member {
    fn name(&self) -> &str {
        match self {
            Member::Node(node) => &node.name,
            Member::Unresolved { name, .. } => name,
        }
    }
}

/// Flatten the topology into the render list.
///
/// Mode selects the walk: rule/script walk `topology.groups`, global
/// walks only the GLOBAL group, direct yields nothing. Hidden groups and
/// groups outside the selectable-kind allow-list are skipped.
pub fn build_render_list(
    topology: &Topology,
    heads: &HeadStateStore,
    cache: &DelayCache,
    options: &RenderOptions,
) -> Vec<RenderRow> {
    let mut rows = Vec::new();
    match topology.mode {
        ProxyMode::Direct => {}
        ProxyMode::Global => {
            if let Some(global) = &topology.global {
                push_group(&mut rows, topology, global, heads, cache, options);
            }
        }
        ProxyMode::Rule | ProxyMode::Script => {
            for group in &topology.groups {
                push_group(&mut rows, topology, group, heads, cache, options);
            }
        }
    }
    rows
}

fn push_group(
    rows: &mut Vec<RenderRow>,
    topology: &Topology,
    group: &ProxyGroup,
    heads: &HeadStateStore,
    cache: &DelayCache,
    options: &RenderOptions,
) {
    if group.hidden || !group.kind.is_group() {
        return;
    }

    let head = heads.get(&group.name);
    rows.push(RenderRow::GroupHead {
        group: GroupMeta::of(group),
        head: head.clone(),
    });
    if !head.open {
        return;
    }

    let mut members = resolve_members(topology, group);

    if !head.filter_text.is_empty() {
        let needle = head.filter_text.to_lowercase();
        members.retain(|m| m.name().to_lowercase().contains(&needle));
    }

    sort_members(&mut members, head.sort, cache, &group.name);

    let before = rows.len();
    if options.columns > 1 {
        emit_grid(rows, &group.name, members, options.columns);
    } else {
        emit_list(rows, &group.name, members);
    }
    if rows.len() == before {
        rows.push(RenderRow::Empty {
            group: group.name.clone(),
        });
    }
}

/// Expand the group's member references against the snapshot.
///
/// Inline references missing from the proxy map degrade to a bare named
/// node rather than disappearing; unresolved provider references become
/// [`Member::Unresolved`] and render as skeleton rows.
fn resolve_members(topology: &Topology, group: &ProxyGroup) -> Vec<Member> {
    group
        .all
        .iter()
        .map(|member| match &member.provider {
            Some(provider) => {
                let node = topology.providers.get(provider).and_then(|p| {
                    p.proxies.iter().find(|node| node.name == member.name)
                });
                match node {
                    Some(node) => {
                        let mut node = node.clone();
                        node.provider = Some(provider.clone());
                        Member::Node(node)
                    }
                    None => Member::Unresolved {
                        provider: provider.clone(),
                        name: member.name.clone(),
                    },
                }
            }
            None => match topology.proxies.get(&member.name) {
                Some(node) => Member::Node(node.clone()),
                None => Member::Node(ProxyNode::named(member.name.clone())),
            },
        })
        .collect()
}

fn sort_members(members: &mut [Member], sort: SortKind, cache: &DelayCache, context: &str) {
    match sort {
        // Preserve topology order (configuration file order).
        SortKind::Default => {}
        SortKind::Name => {
            members.sort_by(|a, b| a.name().cmp(b.name()));
        }
        SortKind::Delay => {
            // Successes ascending, failed after them, untested last.
            // Vec::sort_by is stable, so ties keep topology order.
            members.sort_by_key(|m| delay_rank(cache.get(m.name(), context)));
        }
    }
}

/// Rank for the delay sort. A dedicated comparator branch, because the
/// untested sentinel is negative and naive numeric order would put
/// untested entries first.
fn delay_rank(delay: Delay) -> (u8, i32) {
    if delay.is_untested() {
        (2, 0)
    } else if delay.is_failed() {
        (1, 0)
    } else {
        (0, delay.millis())
    }
}

fn emit_list(rows: &mut Vec<RenderRow>, group: &str, members: Vec<Member>) {
    for member in members {
        rows.push(match member {
            Member::Node(proxy) => RenderRow::Item {
                group: group.to_string(),
                proxy,
            },
            Member::Unresolved { provider, name } => RenderRow::ProviderSkeleton {
                group: group.to_string(),
                provider,
                proxy: name,
            },
        });
    }
}

fn emit_grid(rows: &mut Vec<RenderRow>, group: &str, members: Vec<Member>, columns: usize) {
    let mut resolved = Vec::new();
    let mut skeletons = Vec::new();
    for member in members {
        match member {
            Member::Node(node) => resolved.push(node),
            Member::Unresolved { provider, name } => skeletons.push((provider, name)),
        }
    }

    for (index, chunk) in resolved.chunks(columns).enumerate() {
        rows.push(RenderRow::Column {
            group: group.to_string(),
            index,
            proxies: chunk.to_vec(),
        });
    }
    for (provider, name) in skeletons {
        rows.push(RenderRow::ProviderSkeleton {
            group: group.to_string(),
            provider,
            proxy: name,
        });
    }
}
