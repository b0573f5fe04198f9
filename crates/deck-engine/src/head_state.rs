//! Per-group head-bar state: sort, filter, test URL, layout toggles.
//!
//! UI convenience state only; never persisted by the engine. Updates
//! are shallow-merged so two panels patching different fields of the
//! same group cannot clobber each other.

use dashmap::DashMap;
use serde::Serialize;

/// Sort order for a group's member rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKind {
    /// Topology order, as the core reports it.
    #[default]
    Default,
    Delay,
    Name,
}

/// Which inline text input the head bar currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextState {
    Filter,
    Url,
}

/// Head-bar state for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadState {
    pub sort: SortKind,
    pub filter_text: String,
    /// Per-group latency test URL override; empty means "no override".
    pub test_url: String,
    /// Verbose (true) versus compact row rendering.
    pub show_type: bool,
    /// Whether the group's member rows are expanded.
    pub open: bool,
    pub text_state: Option<TextState>,
}

impl Default for HeadState {
    fn default() -> Self {
        Self {
            sort: SortKind::Default,
            filter_text: String::new(),
            test_url: String::new(),
            show_type: false,
            open: true,
            text_state: None,
        }
    }
}

/// Shallow-merge patch for [`HeadState`]. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct HeadStatePatch {
    pub sort: Option<SortKind>,
    pub filter_text: Option<String>,
    pub test_url: Option<String>,
    pub show_type: Option<bool>,
    pub open: Option<bool>,
    /// `Some(None)` clears the inline input.
    pub text_state: Option<Option<TextState>>,
}

impl HeadStatePatch {
    pub fn sort(mut self, sort: SortKind) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn filter_text(mut self, text: impl Into<String>) -> Self {
        self.filter_text = Some(text.into());
        self
    }

    pub fn test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = Some(url.into());
        self
    }

    pub fn show_type(mut self, show: bool) -> Self {
        self.show_type = Some(show);
        self
    }

    pub fn open(mut self, open: bool) -> Self {
        self.open = Some(open);
        self
    }

    pub fn text_state(mut self, state: Option<TextState>) -> Self {
        self.text_state = Some(state);
        self
    }

    fn apply(self, state: &mut HeadState) {
        if let Some(sort) = self.sort {
            state.sort = sort;
        }
        if let Some(text) = self.filter_text {
            state.filter_text = text;
        }
        if let Some(url) = self.test_url {
            state.test_url = url;
        }
        if let Some(show) = self.show_type {
            state.show_type = show;
        }
        if let Some(open) = self.open {
            state.open = open;
        }
        if let Some(text_state) = self.text_state {
            state.text_state = text_state;
        }
    }
}

/// Keyed store of head states, created lazily per group.
#[derive(Default)]
pub struct HeadStateStore {
    states: DashMap<String, HeadState>,
}

impl HeadStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a group, inserting the default on first access.
    pub fn get(&self, group: &str) -> HeadState {
        self.states
            .entry(group.to_string())
            .or_default()
            .clone()
    }

    /// Shallow-merge a patch into a group's state, returning the merged
    /// result.
    pub fn update(&self, group: &str, patch: HeadStatePatch) -> HeadState {
        let mut entry = self.states.entry(group.to_string()).or_default();
        patch.apply(&mut entry);
        entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_default_on_first_access() {
        let store = HeadStateStore::new();
        let state = store.get("G1");
        assert_eq!(state.sort, SortKind::Default);
        assert!(state.filter_text.is_empty());
        assert!(state.test_url.is_empty());
        assert!(!state.show_type);
        assert!(state.open);
        assert!(state.text_state.is_none());
    }

    #[test]
    fn test_patch_is_shallow_merge() {
        let store = HeadStateStore::new();
        store.update("G1", HeadStatePatch::default().filter_text("hk"));
        store.update("G1", HeadStatePatch::default().sort(SortKind::Delay));

        // The second patch must not clobber the first field.
        let state = store.get("G1");
        assert_eq!(state.filter_text, "hk");
        assert_eq!(state.sort, SortKind::Delay);
        assert!(state.open);
    }

    #[test]
    fn test_text_state_can_be_cleared() {
        let store = HeadStateStore::new();
        store.update("G1", HeadStatePatch::default().text_state(Some(TextState::Url)));
        assert_eq!(store.get("G1").text_state, Some(TextState::Url));

        store.update("G1", HeadStatePatch::default().text_state(None));
        assert_eq!(store.get("G1").text_state, None);
    }

    #[test]
    fn test_groups_are_independent() {
        let store = HeadStateStore::new();
        store.update("G1", HeadStatePatch::default().open(false));
        assert!(!store.get("G1").open);
        assert!(store.get("G2").open);
    }
}
