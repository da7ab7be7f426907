//! Client configuration.

use std::time::Duration;

/// Default bound for a blocking evaluation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default retention for responses nobody claimed, timed-out request ids and
/// callback waiters.
pub const DEFAULT_ORPHAN_TTL: Duration = Duration::from_secs(60);

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a blocking evaluation waits for its response.
    pub timeout: Duration,
    /// Whether to connect the transport when the client is built.
    pub auto_connect: bool,
    /// How long unclaimed responses and timed-out request ids are retained.
    /// Callback evaluations still waiting after this long fail with a timeout.
    pub orphan_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            auto_connect: true,
            orphan_ttl: DEFAULT_ORPHAN_TTL,
        }
    }
}
