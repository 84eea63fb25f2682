//! Compile-time capacity and runtime timing configuration.

use crate::time::Duration;

/// Compile-time bounds, tunable per target radio.
///
/// The child cap tracks the underlying radio's peer-table limit; raise it
/// only if the target hardware allows more registered peers.
pub trait MeshConfig {
    /// Maximum child records a gateway keeps.
    const MAX_NODES: usize;
}

/// Configuration for the common peer-table limit of 30 entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl MeshConfig for DefaultConfig {
    const MAX_NODES: usize = 30;
}

/// Configuration for radios with a small peer table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl MeshConfig for SmallConfig {
    const MAX_NODES: usize = 8;
}

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_CONTENTION_WINDOW: Duration = Duration::from_millis(1500);
const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_millis(10_000);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(30_000);
const DEFAULT_MAX_PING_ATTEMPTS: u8 = 3;

const MIN_CONTENTION_WINDOW: Duration = Duration::from_millis(100);
const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_millis(2000);
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1000);

/// How long a device waits for `NodeIdAssign` after sending a request.
const ID_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Runtime protocol timing.
///
/// Setters clamp to protocol floors so that hosts cannot configure a mesh
/// that floods the air or declares disconnects on a single lost frame.
#[derive(Debug, Clone)]
pub struct Timing {
    pub discovery_timeout: Duration,
    pub contention_window: Duration,
    pub announce_interval: Duration,
    pub ping_interval: Duration,
    pub max_ping_attempts: u8,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            contention_window: DEFAULT_CONTENTION_WINDOW,
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            ping_interval: DEFAULT_PING_INTERVAL,
            max_ping_attempts: DEFAULT_MAX_PING_ATTEMPTS,
        }
    }
}

impl Timing {
    pub fn set_discovery_timeout(&mut self, ms: u64) {
        self.discovery_timeout = Duration::from_millis(ms);
    }

    pub fn set_contention_window(&mut self, ms: u64) {
        self.contention_window = Duration::from_millis(ms).max(MIN_CONTENTION_WINDOW);
    }

    pub fn set_announce_interval(&mut self, ms: u64) {
        self.announce_interval = Duration::from_millis(ms).max(MIN_ANNOUNCE_INTERVAL);
    }

    pub fn set_ping_interval(&mut self, ms: u64) {
        self.ping_interval = Duration::from_millis(ms).max(MIN_PING_INTERVAL);
    }

    pub fn set_max_ping_attempts(&mut self, attempts: u8) {
        self.max_ping_attempts = attempts.max(1);
    }

    pub fn id_request_timeout(&self) -> Duration {
        ID_REQUEST_TIMEOUT
    }

    /// A child is evicted once silent for longer than this.
    pub fn inactivity_threshold(&self) -> Duration {
        self.ping_interval
            .saturating_mul(self.max_ping_attempts as u64 + 1)
    }

    /// How often the gateway sweeps for inactive children. One ping period
    /// longer than the eviction threshold, plus slack for in-flight pings.
    pub fn cleanup_interval(&self) -> Duration {
        self.ping_interval
            .saturating_mul(self.max_ping_attempts as u64 + 2)
            + Duration::from_millis(10_000)
    }
}
