//! # Deck Core
//!
//! Core types, errors, and the control-plane seam for ProxyDeck.
//!
//! This crate holds the plain-data model of the proxy topology and the
//! [`ControlPlane`] trait that abstracts the proxy core's REST API, so
//! the engine crate can be tested entirely against
//! [`MockControlPlane`].
//!
//! ## Key Types
//!
//! - [`Topology`]: immutable snapshot of groups, proxies, and providers
//! - [`Delay`] / [`DelayKey`] / [`DelayRecord`]: latency values and their
//!   cache keys, with explicit untested/failed sentinels
//! - [`ControlPlane`]: the async seam to the proxy core
//! - [`MockControlPlane`]: scripted in-memory control plane for tests

pub mod control;
pub mod error;
pub mod mock;
pub mod model;

// Re-export main types
pub use control::*;
pub use error::*;
pub use mock::*;
pub use model::*;
