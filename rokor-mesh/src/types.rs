//! Core types and constants.

use core::fmt;

use crate::membership::GatewayState;
use crate::time::Timestamp;

/// 6-byte hardware address of the underlying datagram radio.
pub type Mac = [u8; 6];

/// 4-byte identifier scoping all transport traffic of one mesh.
///
/// Derived from the network name, see [`crate::identity::derive_bus_id`].
pub type BusId = [u8; 4];

/// 8-bit per-mesh address used by the packet transport.
///
/// `0` and [`BROADCAST_ID`] are reserved and never assigned to a device.
/// "Not yet assigned" is modeled as `Option<LogicalId>` = `None`.
pub type LogicalId = u8;

/// Radio broadcast address (all peers in range).
pub const MAC_BROADCAST: Mac = [0xFF; 6];

/// The all-zero MAC, meaning "unknown".
pub const MAC_UNKNOWN: Mac = [0; 6];

/// Transport-layer broadcast logical id.
pub const BROADCAST_ID: LogicalId = 255;

/// Logical id a gateway adopts when the host supplies no other.
pub const DEFAULT_GATEWAY_ID: LogicalId = 1;

/// Lowest logical id ever handed out to a child node.
pub const FIRST_NODE_ID: LogicalId = 2;

/// Highest valid logical id for any device.
pub const MAX_LOGICAL_ID: LogicalId = 254;

/// Upper bound on host payloads accepted by `send`.
pub const MAX_PAYLOAD_SIZE: usize = 200;

/// Upper bound on the network name length in bytes.
pub const MAX_NETWORK_NAME_LEN: usize = 32;

/// True for ids a device may legitimately carry (1..=254).
#[inline]
pub fn valid_device_id(id: LogicalId) -> bool {
    id != 0 && id != BROADCAST_ID
}

/// What a device currently is, independent of any per-role state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Uninitialized,
    Discovering,
    Node,
    Gateway,
    Error,
}

/// The device role together with its role-specific state.
///
/// Keeping the per-role state inside the variant makes "gateway fields in
/// node role" unrepresentable: the membership table only exists while the
/// device actually is a gateway, and the gateway linkage only while it is
/// a node.
pub enum Role {
    /// `begin()` has not run, or `end()` has torn everything down.
    Uninitialized,
    /// Running the discovery FSM, no operating role yet.
    Discovering,
    /// Child of exactly one gateway.
    Node(NodeState),
    /// Coordinator of up to `MeshConfig::MAX_NODES` children.
    Gateway(GatewayState),
    /// The FSM hit an unrecoverable fault and halted.
    Error,
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Uninitialized => RoleKind::Uninitialized,
            Role::Discovering => RoleKind::Discovering,
            Role::Node(_) => RoleKind::Node,
            Role::Gateway(_) => RoleKind::Gateway,
            Role::Error => RoleKind::Error,
        }
    }

    /// True in one of the two terminal operating roles.
    pub fn is_operational(&self) -> bool {
        matches!(self, Role::Node(_) | Role::Gateway(_))
    }
}

/// Node-side linkage to the gateway this device is a child of.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub gateway_id: LogicalId,
    pub gateway_mac: Mac,
    /// Whether the gateway is currently considered reachable.
    pub connected: bool,
    /// Pings sent since the last sign of life from the gateway.
    pub failed_pings: u8,
    pub next_ping_due: Timestamp,
}

impl NodeState {
    pub fn new(gateway_id: LogicalId, gateway_mac: Mac, next_ping_due: Timestamp) -> Self {
        Self {
            gateway_id,
            gateway_mac,
            connected: false,
            failed_pings: 0,
            next_ping_due,
        }
    }
}

/// Submission outcome reported by the packet transport for one send.
///
/// `Ack` and `Queued` both mean the transport took the packet; `Busy` and
/// `Fail` are refusals. The transport performs its own retransmission, so
/// refusals are not retried at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Ack,
    Queued,
    Busy,
    Fail,
}

impl SendStatus {
    #[inline]
    pub fn is_submitted(self) -> bool {
        matches!(self, SendStatus::Ack | SendStatus::Queued)
    }
}

/// Error kinds surfaced by the coordinator's fallible operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bad name, channel, id, or payload at a configuration boundary.
    InvalidArgument,
    /// The radio driver failed to initialize during `begin()`.
    RadioInitFailed,
    /// The packet transport refused to start listening.
    TransportStartFailed,
    /// The persistent store rejected a read or write.
    PersistenceFailed,
    /// The transport reported `Busy` or `Fail` for a submitted packet.
    SendRefused,
    /// The addressed peer is unreachable.
    ConnectionLost,
    /// The membership table has no free slot.
    PeerTableFull,
    /// No free logical id remains in `2..=254`.
    AddressSpaceExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::RadioInitFailed => write!(f, "radio initialization failed"),
            Error::TransportStartFailed => write!(f, "packet transport failed to start"),
            Error::PersistenceFailed => write!(f, "persistent store operation failed"),
            Error::SendRefused => write!(f, "transport refused the packet"),
            Error::ConnectionLost => write!(f, "peer connection lost"),
            Error::PeerTableFull => write!(f, "membership table full"),
            Error::AddressSpaceExhausted => write!(f, "no free logical id"),
        }
    }
}
