//! Engine configuration.

/// Default latency test URL (a generate_204-class endpoint).
pub const DEFAULT_TEST_URL: &str = "https://cp.cloudflare.com/generate_204";

/// Default per-probe timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Upper bound accepted for a caller-supplied timeout. Anything above
/// this is a caller bug, not a plausible probe timeout.
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// Default cap on concurrently in-flight probes. Keeps a "check all"
/// over a large group from saturating the proxy core or the local
/// network stack.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 10;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global fallback latency test URL, used when neither a head-state
    /// override nor a group-declared URL exists.
    pub default_test_url: String,
    /// Timeout applied when a caller does not supply one.
    pub default_timeout_ms: u64,
    /// Cap on concurrently in-flight probes.
    pub probe_concurrency: usize,
    /// Columns for the grid layout; 1 renders a plain list.
    pub columns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_test_url: DEFAULT_TEST_URL.to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            columns: 1,
        }
    }
}
