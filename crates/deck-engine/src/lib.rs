//! # Deck Engine
//!
//! Latency probing and render-list engine for ProxyDeck.
//!
//! Four components sit between a polled REST-style topology source and
//! a virtualized list UI:
//!
//! - [`DelayCache`]: last-known latency per `(proxy, context)` key with
//!   per-key push subscriptions ([`delay`])
//! - [`ProbeScheduler`]: concurrent, deduplicated latency probes under a
//!   concurrency cap ([`scheduler`])
//! - [`build_render_list`]: pure flattener from topology + head state to
//!   one keyed row sequence ([`render`])
//! - [`HeadStateStore`]: per-group sort/filter/test-URL UI state
//!   ([`head_state`])
//!
//! The [`Engine`] facade owns the topology snapshot and wires the four
//! together. All I/O goes through the [`deck_core::ControlPlane`] seam.

pub mod config;
pub mod delay;
pub mod engine;
pub mod head_state;
pub mod render;
pub mod scheduler;

// Re-export main types
pub use deck_core::{ControlPlane, Delay, DelayKey, DelayRecord, EngineError, Topology};

pub use config::*;
pub use delay::*;
pub use engine::*;
pub use head_state::*;
pub use render::*;
pub use scheduler::*;
