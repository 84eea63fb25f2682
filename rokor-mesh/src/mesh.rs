//! The coordinator facade.
//!
//! `Mesh` wires the platform seams together and exposes the host API:
//! `begin`/`end`, the cooperative `update()` tick, `send`, the status
//! callbacks, and the timing tunables. Within one tick the order is fixed:
//! FSM advance, then role-specific periodic work, then draining inbound
//! transport events - so a message's side effects are committed before the
//! next inbound one is processed.

use core::marker::PhantomData;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::{DefaultConfig, MeshConfig};
use crate::debug::{DebugEmitter, DebugEvent};
use crate::discovery::DiscoveryState;
use crate::identity::{derive_bus_id, valid_network_name, Pmk};
use crate::membership::MemberTable;
use crate::persist::{self, PersistedRole};
use crate::time::Timestamp;
use crate::traits::{Clock, Radio, Random, Store, Transport, TransportEvent};
use crate::types::{
    valid_device_id, BusId, Error, LogicalId, Mac, NodeState, Role, RoleKind, BROADCAST_ID,
    DEFAULT_GATEWAY_ID, MAX_PAYLOAD_SIZE,
};
use crate::config::Timing;
use crate::wire::{is_control_tag, DecodeError, Message};

/// Role pinned by the host before `begin()`, bypassing parts of discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedRole {
    Node {
        id: Option<LogicalId>,
        /// Advisory: the gateway this node expects to find. The linkage is
        /// still taken from the announce actually heard on the air.
        gateway_id: Option<LogicalId>,
    },
    Gateway {
        id: LogicalId,
    },
}

type ReceiveCb = Box<dyn FnMut(LogicalId, &[u8])>;
type GatewayStatusCb = Box<dyn FnMut(bool)>;
type NodeStatusCb = Box<dyn FnMut(LogicalId, bool)>;

/// Self-organizing mesh coordinator.
///
/// Generic over the five platform seams:
/// - `T`: addressed packet transport
/// - `R`: broadcast radio driver
/// - `S`: persistent key-value store
/// - `C`: monotonic millisecond clock
/// - `G`: random source
/// - `Cfg`: compile-time capacities (defaults to [`DefaultConfig`])
pub struct Mesh<T, R, S, C, G, Cfg: MeshConfig = DefaultConfig> {
    pub(crate) transport: T,
    pub(crate) radio: R,
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) random: G,
    pub(crate) _config: PhantomData<Cfg>,

    pub(crate) active: bool,
    pub(crate) network_name: String,
    pub(crate) channel: u8,
    pub(crate) bus_id: BusId,
    pub(crate) pmk: Pmk,
    pub(crate) custom_pmk: bool,
    pub(crate) my_mac: Mac,
    pub(crate) my_id: Option<LogicalId>,
    pub(crate) gateway_id_hint: LogicalId,
    pub(crate) forced: Option<ForcedRole>,
    pub(crate) role: Role,
    pub(crate) state: DiscoveryState,
    pub(crate) timing: Timing,

    receive_cb: Option<ReceiveCb>,
    gateway_status_cb: Option<GatewayStatusCb>,
    node_status_cb: Option<NodeStatusCb>,
    debug: Option<Box<dyn DebugEmitter>>,
}

impl<T, R, S, C, G, Cfg> Mesh<T, R, S, C, G, Cfg>
where
    T: Transport,
    R: Radio,
    S: Store,
    C: Clock,
    G: Random,
    Cfg: MeshConfig,
{
    pub fn new(transport: T, radio: R, store: S, clock: C, random: G) -> Self {
        Self {
            transport,
            radio,
            store,
            clock,
            random,
            _config: PhantomData,
            active: false,
            network_name: String::new(),
            channel: 1,
            bus_id: [0; 4],
            pmk: Pmk::EMPTY,
            custom_pmk: false,
            my_mac: [0; 6],
            my_id: None,
            gateway_id_hint: DEFAULT_GATEWAY_ID,
            forced: None,
            role: Role::Uninitialized,
            state: DiscoveryState::Init,
            timing: Timing::default(),
            receive_cb: None,
            gateway_status_cb: None,
            node_status_cb: None,
            debug: None,
        }
    }

    // --- Lifecycle ---

    /// Join (or create) the named mesh.
    ///
    /// Validates the arguments, brings the radio up, and arms the discovery
    /// FSM; the first `update()` calls start it running. A channel outside
    /// `1..=13` falls back to 1. `gateway_id_hint` is the id this device
    /// would adopt if it ends up gateway; `0` and `255` fall back to the
    /// default of 1.
    pub fn begin(
        &mut self,
        network_name: &str,
        channel: u8,
        gateway_id_hint: LogicalId,
    ) -> Result<(), Error> {
        if self.active {
            return Err(Error::InvalidArgument);
        }
        if !valid_network_name(network_name) {
            return Err(Error::InvalidArgument);
        }
        self.channel = if (1..=13).contains(&channel) {
            channel
        } else {
            self.emit(DebugEvent::ChannelFallback { requested: channel });
            1
        };
        self.gateway_id_hint = if valid_device_id(gateway_id_hint) {
            gateway_id_hint
        } else {
            DEFAULT_GATEWAY_ID
        };
        self.network_name = network_name.to_string();
        self.bus_id = derive_bus_id(network_name);
        if !self.custom_pmk {
            self.pmk = Pmk::derive(network_name);
        }

        if self.radio.init(self.channel, &self.pmk).is_err() {
            return Err(Error::RadioInitFailed);
        }
        self.my_mac = self.radio.mac_address();

        self.role = match self.forced {
            Some(ForcedRole::Node { .. }) => Role::Discovering,
            _ => Role::Uninitialized,
        };
        self.state = DiscoveryState::Init;
        self.active = true;
        Ok(())
    }

    /// Leave the mesh and release the radio.
    ///
    /// Synchronous; runtime state is wiped but the persisted record stays,
    /// so a later `begin()` with the same name and channel resumes the old
    /// role without re-discovery.
    pub fn end(&mut self) {
        if !self.active {
            return;
        }
        self.transport.shutdown();
        self.radio.deinit();
        self.active = false;
        self.role = Role::Uninitialized;
        self.state = DiscoveryState::Init;
        self.my_id = None;
        self.pmk = Pmk::EMPTY;
        self.custom_pmk = false;
    }

    /// Install a custom pre-shared key. Must be called before `begin()`;
    /// empty input is ignored, other lengths are truncated or padded to
    /// 16 bytes.
    pub fn set_pmk(&mut self, pmk: &str) -> Result<(), Error> {
        if self.active || pmk.is_empty() {
            return Err(Error::InvalidArgument);
        }
        self.pmk = Pmk::derive(pmk);
        self.custom_pmk = true;
        Ok(())
    }

    /// Pin this device to the node role. Before `begin()` only.
    ///
    /// With `id = None` the device requests an id from the gateway it
    /// discovers; with a fixed id it joins directly on the first announce.
    pub fn force_role_node(
        &mut self,
        id: Option<LogicalId>,
        gateway_id: Option<LogicalId>,
    ) -> Result<(), Error> {
        if self.active {
            return Err(Error::InvalidArgument);
        }
        if id.is_some_and(|v| !valid_device_id(v)) {
            return Err(Error::InvalidArgument);
        }
        if gateway_id.is_some_and(|v| !valid_device_id(v)) {
            return Err(Error::InvalidArgument);
        }
        self.forced = Some(ForcedRole::Node { id, gateway_id });
        Ok(())
    }

    /// Pin this device to the gateway role. Before `begin()` only.
    pub fn force_role_gateway(&mut self, id: Option<LogicalId>) -> Result<(), Error> {
        if self.active {
            return Err(Error::InvalidArgument);
        }
        if id.is_some_and(|v| !valid_device_id(v)) {
            return Err(Error::InvalidArgument);
        }
        self.forced = Some(ForcedRole::Gateway {
            id: id.unwrap_or(DEFAULT_GATEWAY_ID),
        });
        Ok(())
    }

    // --- The cooperative tick ---

    /// Advance the mesh. Call once per host loop iteration.
    pub fn update(&mut self) {
        if !self.active {
            return;
        }
        let now = self.clock.now();
        self.advance_discovery(now);
        match self.role.kind() {
            RoleKind::Node => self.operate_as_node(now),
            RoleKind::Gateway => self.operate_as_gateway(now),
            _ => {}
        }
        while let Some(event) = self.transport.poll() {
            let now = self.clock.now();
            match event {
                TransportEvent::Received {
                    sender_id,
                    sender_mac,
                    payload,
                } => self.dispatch_inbound(sender_id, sender_mac, payload, now),
                TransportEvent::ConnectionLost { peer_id } => {
                    self.on_connection_lost(peer_id, now)
                }
            }
        }
    }

    // --- Sending ---

    /// Send a host payload to a logical id.
    ///
    /// Gateways may address any known child or `255` for broadcast; nodes
    /// may only address their gateway. The first payload byte must stay out
    /// of the reserved control-tag range.
    pub fn send(&mut self, destination: LogicalId, payload: &[u8]) -> Result<(), Error> {
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidArgument);
        }
        if is_control_tag(payload[0]) {
            return Err(Error::InvalidArgument);
        }

        let (dest_id, dest_mac) = match &self.role {
            Role::Gateway(gw) => {
                if destination == BROADCAST_ID {
                    (BROADCAST_ID, crate::types::MAC_BROADCAST)
                } else if let Some(mac) = gw.members.mac_for_id(destination) {
                    (destination, mac)
                } else {
                    return Err(Error::InvalidArgument);
                }
            }
            Role::Node(link) => {
                if destination != link.gateway_id {
                    return Err(Error::InvalidArgument);
                }
                (link.gateway_id, link.gateway_mac)
            }
            _ => return Err(Error::InvalidArgument),
        };

        let status = self.transport.send(dest_id, dest_mac, payload);
        if status.is_submitted() {
            Ok(())
        } else {
            self.emit(DebugEvent::SendFailed { dest_id, status });
            Err(Error::SendRefused)
        }
    }

    /// Node-only shorthand: send to the bound gateway.
    pub fn send_to_gateway(&mut self, payload: &[u8]) -> Result<(), Error> {
        let gateway_id = match &self.role {
            Role::Node(link) if link.connected => link.gateway_id,
            Role::Node(_) => return Err(Error::ConnectionLost),
            _ => return Err(Error::InvalidArgument),
        };
        self.send(gateway_id, payload)
    }

    // --- Callbacks & tracing ---

    /// Host payloads addressed to this device.
    pub fn set_receive_cb(&mut self, cb: impl FnMut(LogicalId, &[u8]) + 'static) {
        self.receive_cb = Some(Box::new(cb));
    }

    /// Node side: connectivity to the gateway changed.
    pub fn set_gateway_status_cb(&mut self, cb: impl FnMut(bool) + 'static) {
        self.gateway_status_cb = Some(Box::new(cb));
    }

    /// Gateway side: a child's connectivity changed.
    pub fn set_node_status_cb(&mut self, cb: impl FnMut(LogicalId, bool) + 'static) {
        self.node_status_cb = Some(Box::new(cb));
    }

    pub fn set_debug_emitter(&mut self, emitter: impl DebugEmitter + 'static) {
        self.debug = Some(Box::new(emitter));
    }

    // --- Getters ---

    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn logical_id(&self) -> Option<LogicalId> {
        self.my_id
    }

    pub fn bus_id(&self) -> &BusId {
        &self.bus_id
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn mac_address(&self) -> Mac {
        self.my_mac
    }

    /// True once the device operates as node or gateway.
    pub fn is_network_active(&self) -> bool {
        self.active && self.role.is_operational()
    }

    /// Node side: is the gateway currently reachable?
    pub fn is_gateway_connected(&self) -> bool {
        matches!(&self.role, Role::Node(link) if link.connected)
    }

    /// Gateway side: the child table, while operating as gateway.
    pub fn members(&self) -> Option<&MemberTable> {
        match &self.role {
            Role::Gateway(gw) => Some(&gw.members),
            _ => None,
        }
    }

    /// Node side: the gateway linkage, while operating as node.
    pub fn gateway_link(&self) -> Option<&NodeState> {
        match &self.role {
            Role::Node(link) => Some(link),
            _ => None,
        }
    }

    // --- Tunables ---

    pub fn set_discovery_timeout(&mut self, ms: u64) {
        self.timing.set_discovery_timeout(ms);
    }

    pub fn set_contention_window(&mut self, ms: u64) {
        self.timing.set_contention_window(ms);
    }

    pub fn set_announce_interval(&mut self, ms: u64) {
        self.timing.set_announce_interval(ms);
    }

    pub fn set_ping_interval(&mut self, ms: u64) {
        self.timing.set_ping_interval(ms);
    }

    pub fn set_max_ping_attempts(&mut self, attempts: u8) {
        self.timing.set_max_ping_attempts(attempts);
    }

    // --- Inbound dispatch ---

    /// Route one inbound packet. The only place event-driven FSM
    /// transitions originate.
    fn dispatch_inbound(
        &mut self,
        sender_id: LogicalId,
        sender_mac: Mac,
        payload: Vec<u8>,
        now: Timestamp,
    ) {
        match Message::decode_from_slice(&payload) {
            Ok(msg) => self.dispatch_control(sender_id, sender_mac, msg, &payload, now),
            Err(DecodeError::NotControl) => self.surface_to_host(sender_id, &payload, now),
            Err(_) => self.emit(DebugEvent::DecodeFailed { len: payload.len() }),
        }
    }

    fn dispatch_control(
        &mut self,
        sender_id: LogicalId,
        sender_mac: Mac,
        msg: Message,
        raw: &[u8],
        now: Timestamp,
    ) {
        // Recruitment: an announce heard while still looking for a gateway.
        if self.state.is_listening_for_announce() {
            if let Message::GatewayAnnounce { mac } = msg {
                self.on_gateway_announce(sender_id, mac, now);
                return;
            }
        }
        // An id grant answered from RequestNodeId.
        if matches!(self.state, DiscoveryState::RequestNodeId { .. }) {
            if let Message::NodeIdAssign { id, mac } = msg {
                self.on_id_assigned(sender_id, id, mac, now);
            }
            return;
        }

        match self.role.kind() {
            RoleKind::Gateway => match msg {
                Message::NodeIdRequest { mac } => {
                    self.gateway_on_id_request(sender_mac, mac, now)
                }
                Message::NodeIdAck => self.gateway_on_ack(sender_id, now),
                Message::NodePing => self.gateway_on_ping(sender_id, now),
                // Stray control traffic (another gateway's announce, a
                // misrouted grant) is the host's to judge.
                _ => self.surface_to_host(sender_id, raw, now),
            },
            RoleKind::Node => {
                let (gateway_id, gateway_mac) = match &self.role {
                    Role::Node(link) => (link.gateway_id, link.gateway_mac),
                    _ => return,
                };
                if sender_id != gateway_id {
                    // Nodes only talk to their own gateway.
                    return;
                }
                match msg {
                    Message::NodeIdAssign { id, mac } if mac == self.my_mac => {
                        // The gateway rebooted and re-granted an id; adopt
                        // it even if it differs from the one held.
                        self.adopt_assigned_id(id, gateway_id, gateway_mac, now);
                    }
                    Message::GatewayPong => {
                        self.emit(DebugEvent::PongReceived);
                        self.node_mark_alive();
                    }
                    Message::GatewayAnnounce { mac } => {
                        self.node_refresh_gateway_mac(mac);
                        self.node_mark_alive();
                    }
                    Message::NodeIdAssign { .. } => {} // targeted at someone else
                    _ => self.surface_to_host(sender_id, raw, now),
                }
            }
            _ => {}
        }
    }

    /// The bound gateway announced itself under a (possibly new) MAC.
    fn node_refresh_gateway_mac(&mut self, mac: Mac) {
        let changed = match &mut self.role {
            Role::Node(link) => {
                let changed = link.gateway_mac != mac;
                link.gateway_mac = mac;
                changed
            }
            _ => return,
        };
        let encrypt = self.encrypt();
        let _ = self.radio.add_peer(mac, encrypt);
        if changed {
            self.emit(DebugEvent::GatewayMacUpdated { mac });
        }
    }

    /// Deliver a frame to the host callback, counting it as liveness.
    fn surface_to_host(&mut self, sender_id: LogicalId, payload: &[u8], now: Timestamp) {
        match self.role.kind() {
            RoleKind::Gateway => {
                self.gateway_touch(sender_id, now);
            }
            RoleKind::Node => {
                let from_gateway =
                    matches!(&self.role, Role::Node(link) if link.gateway_id == sender_id);
                if !from_gateway {
                    return;
                }
                self.node_mark_alive();
            }
            _ => return,
        }
        if let Some(cb) = self.receive_cb.as_mut() {
            cb(sender_id, payload);
        }
    }

    // --- Internal helpers shared by the role modules ---

    pub(crate) fn emit(&mut self, event: DebugEvent) {
        if let Some(emitter) = self.debug.as_mut() {
            emitter.emit(event);
        }
    }

    pub(crate) fn notify_gateway_status(&mut self, connected: bool) {
        if let Some(cb) = self.gateway_status_cb.as_mut() {
            cb(connected);
        }
    }

    pub(crate) fn notify_node_status(&mut self, id: LogicalId, connected: bool) {
        if let Some(cb) = self.node_status_cb.as_mut() {
            cb(id, connected);
        }
    }

    pub(crate) fn encrypt(&self) -> bool {
        !self.pmk.is_empty()
    }

    pub(crate) fn set_state(&mut self, next: DiscoveryState) {
        if self.state.name() != next.name() {
            self.emit(DebugEvent::FsmTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
    }

    /// (Re)configure the transport. A refusal is fatal for the FSM.
    pub(crate) fn stand_up_transport(&mut self, local_id: Option<LogicalId>) -> bool {
        if self.transport.configure(local_id, self.bus_id).is_err()
            || !self.transport.is_listening()
        {
            self.role = Role::Error;
            self.set_state(DiscoveryState::Error);
            return false;
        }
        true
    }

    /// Encode and submit one control message; refusals are advisory.
    pub(crate) fn submit(&mut self, dest_id: LogicalId, dest_mac: Mac, msg: &Message) {
        let status = self.transport.send(dest_id, dest_mac, &msg.encode_to_vec());
        if !status.is_submitted() {
            self.emit(DebugEvent::SendFailed { dest_id, status });
        }
    }

    /// Write the current role to the store; failures are advisory (the
    /// device stays up and simply re-discovers on the next boot).
    pub(crate) fn persist_current(&mut self) {
        let Some(my_id) = self.my_id else { return };
        let (role, link) = match &self.role {
            Role::Gateway(_) => (PersistedRole::Gateway, None),
            Role::Node(l) => (PersistedRole::Node, Some((l.gateway_id, l.gateway_mac))),
            _ => return,
        };
        let result = persist::save(
            &mut self.store,
            &self.network_name,
            self.channel,
            &self.bus_id,
            role,
            my_id,
            link,
        );
        match result {
            Ok(()) => self.emit(DebugEvent::PersistSaved),
            Err(_) => self.emit(DebugEvent::PersistFailed),
        }
    }
}
