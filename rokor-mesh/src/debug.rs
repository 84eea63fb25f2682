//! Debug events for protocol tracing.
//!
//! Every advisory condition (send refusals, persistence hiccups, dropped
//! allocation requests) surfaces here rather than through callbacks or
//! return values. Test harnesses and the simulator install an emitter to
//! trace protocol flow; production hosts may route events to a serial
//! console or ignore them entirely.

use crate::types::{LogicalId, Mac, SendStatus};

/// Sink for debug events, installed via `Mesh::set_debug_emitter`.
pub trait DebugEmitter {
    fn emit(&mut self, event: DebugEvent);
}

/// Protocol trace events.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    /// The discovery FSM moved between states.
    FsmTransition {
        from: &'static str,
        to: &'static str,
    },
    /// Requested radio channel was out of range, fell back to the default.
    ChannelFallback { requested: u8 },
    /// A broadcast announce was sent.
    AnnounceSent,
    /// A gateway announce was heard while discovering.
    AnnounceHeard { gateway_id: LogicalId, mac: Mac },
    /// Election delay sampled on entry to the contention window.
    ElectionDelayChosen { delay_ms: u64 },
    /// An announce arrived during the contention window; self-promotion
    /// abandoned.
    ElectionCancelled,
    /// A logical-id request was sent to the announcing gateway.
    IdRequestSent { gateway_id: LogicalId },
    /// This device adopted an assigned logical id.
    IdAdopted { id: LogicalId },
    /// A child was added to the membership table.
    NodeJoined { id: LogicalId, mac: Mac },
    /// A known child re-requested its id.
    NodeReassigned { id: LogicalId, mac: Mac },
    /// An inactive child was removed by the cleanup sweep.
    NodeEvicted { id: LogicalId, mac: Mac },
    /// An id request was dropped: no free slot in the table.
    TableFull { mac: Mac },
    /// An id request was dropped: the id space is exhausted.
    AddressSpaceExhausted { mac: Mac },
    /// A ping arrived from an id with no membership record.
    UnknownNodePing { id: LogicalId },
    /// A liveness ping was sent to the gateway.
    PingSent { attempt: u8 },
    /// A pong was returned to a child.
    PongSent { id: LogicalId },
    /// A pong arrived from the gateway.
    PongReceived,
    /// The gateway stopped answering; linkage dropped.
    GatewayLost { failed_pings: u8 },
    /// The bound gateway announced itself under a new MAC.
    GatewayMacUpdated { mac: Mac },
    /// The transport reported a lost connection to a peer.
    ConnectionLost { peer_id: LogicalId },
    /// The transport refused a packet.
    SendFailed {
        dest_id: LogicalId,
        status: SendStatus,
    },
    /// A persisted configuration was loaded and accepted.
    PersistLoaded { role: u8 },
    /// The current configuration was written to the store.
    PersistSaved,
    /// The persisted configuration was cleared.
    PersistCleared,
    /// A store operation failed; the system keeps running without it.
    PersistFailed,
    /// An inbound frame carried a control tag but a malformed body.
    DecodeFailed { len: usize },
}
