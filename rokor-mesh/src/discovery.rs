//! Role-negotiation state machine.
//!
//! Timer-driven progress lives in [`Mesh::advance_discovery`], called once
//! per `update()` tick; it advances at most one state per tick. Transitions
//! triggered by inbound messages are centralized in the two `on_*` handlers
//! at the bottom so every event-driven state change is auditable in one
//! place.

use crate::config::MeshConfig;
use crate::debug::DebugEvent;
use crate::persist;
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Radio, Random, Store, Transport};
use crate::types::{LogicalId, Mac, NodeState, Role, MAC_BROADCAST};
use crate::wire::Message;
use crate::{ForcedRole, Mesh};

/// Discovery FSM states.
///
/// `OperationalNode` and `OperationalGateway` are the terminal operating
/// states; `Error` halts the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Init,
    LoadConfig,
    CheckForcedRole,
    ListenForGateway {
        since: Timestamp,
    },
    GatewayElectionDelay {
        since: Timestamp,
        delay: Duration,
    },
    AnnounceAsGateway,
    RequestNodeId {
        gateway_id: LogicalId,
        gateway_mac: Mac,
        since: Timestamp,
    },
    OperationalNode,
    OperationalGateway,
    Error,
}

impl DiscoveryState {
    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryState::Init => "Init",
            DiscoveryState::LoadConfig => "LoadConfig",
            DiscoveryState::CheckForcedRole => "CheckForcedRole",
            DiscoveryState::ListenForGateway { .. } => "ListenForGateway",
            DiscoveryState::GatewayElectionDelay { .. } => "GatewayElectionDelay",
            DiscoveryState::AnnounceAsGateway => "AnnounceAsGateway",
            DiscoveryState::RequestNodeId { .. } => "RequestNodeId",
            DiscoveryState::OperationalNode => "OperationalNode",
            DiscoveryState::OperationalGateway => "OperationalGateway",
            DiscoveryState::Error => "Error",
        }
    }

    /// States in which a `GatewayAnnounce` recruits this device as a node.
    pub(crate) fn is_listening_for_announce(&self) -> bool {
        matches!(
            self,
            DiscoveryState::ListenForGateway { .. } | DiscoveryState::GatewayElectionDelay { .. }
        )
    }
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
    /// Timer-driven FSM step; one state per tick.
    pub(crate) fn advance_discovery(&mut self, now: Timestamp) {
        match self.state {
            DiscoveryState::Init => {
                self.set_state(DiscoveryState::LoadConfig);
            }
            DiscoveryState::LoadConfig => {
                self.state_load_config(now);
            }
            DiscoveryState::CheckForcedRole => {
                self.state_check_forced_role(now);
            }
            DiscoveryState::ListenForGateway { since } => {
                if now.saturating_since(since) > self.timing.discovery_timeout {
                    // No gateway on the air; contend to become one. The
                    // listen is reset so a stale session does not carry into
                    // the election, but reception stays up: an announce from
                    // a faster contender must still be able to cancel it.
                    self.transport.shutdown();
                    if !self.stand_up_transport(self.my_id) {
                        return;
                    }
                    let window = self.timing.contention_window.as_millis();
                    let delay = Duration::from_millis(self.random.gen_range(0, window));
                    self.emit(DebugEvent::ElectionDelayChosen {
                        delay_ms: delay.as_millis(),
                    });
                    self.set_state(DiscoveryState::GatewayElectionDelay { since: now, delay });
                }
            }
            DiscoveryState::GatewayElectionDelay { since, delay } => {
                if now.saturating_since(since) > delay {
                    self.set_state(DiscoveryState::AnnounceAsGateway);
                }
            }
            DiscoveryState::AnnounceAsGateway => {
                if self.become_gateway(now) {
                    self.send_gateway_announce(now);
                    self.persist_current();
                    self.set_state(DiscoveryState::OperationalGateway);
                }
            }
            DiscoveryState::RequestNodeId { since, .. } => {
                if now.saturating_since(since) > self.timing.id_request_timeout() {
                    // The gateway never answered; forget it and listen anew.
                    self.set_state(DiscoveryState::ListenForGateway { since: now });
                }
            }
            DiscoveryState::OperationalNode
            | DiscoveryState::OperationalGateway
            | DiscoveryState::Error => {}
        }
    }

    fn state_load_config(&mut self, now: Timestamp) {
        let loaded = persist::load(&mut self.store, &self.network_name, self.channel);
        let Some(cfg) = loaded else {
            if persist::clear(&mut self.store).is_err() {
                self.emit(DebugEvent::PersistFailed);
            } else {
                self.emit(DebugEvent::PersistCleared);
            }
            self.role = Role::Uninitialized;
            self.my_id = None;
            self.set_state(DiscoveryState::CheckForcedRole);
            return;
        };

        self.emit(DebugEvent::PersistLoaded {
            role: cfg.role.to_byte(),
        });
        match cfg.role {
            persist::PersistedRole::Gateway => {
                self.my_id = Some(cfg.my_id);
                if self.become_gateway(now) {
                    // Children rediscover on the next announce; the table
                    // starts empty after a reboot.
                    self.set_state(DiscoveryState::OperationalGateway);
                }
            }
            persist::PersistedRole::Node => match cfg.gateway_id {
                Some(gateway_id) if cfg.has_gateway_link() => {
                    self.my_id = Some(cfg.my_id);
                    if !self.stand_up_transport(Some(cfg.my_id)) {
                        return;
                    }
                    let encrypt = self.encrypt();
                    let _ = self.radio.add_peer(cfg.gateway_mac, encrypt);
                    self.role = Role::Node(NodeState::new(gateway_id, cfg.gateway_mac, now));
                    self.set_state(DiscoveryState::OperationalNode);
                }
                _ => {
                    // Node role without a usable gateway linkage: drop the
                    // node-specific fields and rediscover.
                    self.my_id = None;
                    self.role = Role::Discovering;
                    if self.stand_up_transport(None) {
                        self.set_state(DiscoveryState::ListenForGateway { since: now });
                    }
                }
            },
        }
    }

    fn state_check_forced_role(&mut self, now: Timestamp) {
        match self.forced {
            Some(ForcedRole::Gateway { id }) => {
                self.my_id = Some(id);
                if self.become_gateway(now) {
                    self.persist_current();
                    self.set_state(DiscoveryState::OperationalGateway);
                }
            }
            Some(ForcedRole::Node { id, .. }) => {
                self.my_id = id;
                self.role = Role::Discovering;
                if self.stand_up_transport(id) {
                    self.set_state(DiscoveryState::ListenForGateway { since: now });
                }
            }
            None => {
                self.my_id = None;
                self.role = Role::Discovering;
                if self.stand_up_transport(None) {
                    self.set_state(DiscoveryState::ListenForGateway { since: now });
                }
            }
        }
    }

    /// Stand this device up as the mesh gateway. Returns false (and halts
    /// the FSM) if the transport refuses to start.
    fn become_gateway(&mut self, now: Timestamp) -> bool {
        let id = self.my_id.unwrap_or(self.gateway_id_hint);
        self.my_id = Some(id);
        if !self.stand_up_transport(Some(id)) {
            return false;
        }
        let encrypt = self.encrypt();
        let _ = self.radio.add_peer(MAC_BROADCAST, encrypt);
        self.role = Role::Gateway(crate::membership::GatewayState::new(Cfg::MAX_NODES, now));
        true
    }

    /// A `GatewayAnnounce` arrived while this device was still looking for
    /// one. Bind to the announcing gateway; either request an id or, if one
    /// is already held, go operational directly.
    pub(crate) fn on_gateway_announce(
        &mut self,
        gateway_id: LogicalId,
        gateway_mac: Mac,
        now: Timestamp,
    ) {
        self.emit(DebugEvent::AnnounceHeard { gateway_id, mac: gateway_mac });
        if self.my_id == Some(gateway_id) {
            // A device cannot be a child of a gateway sharing its own id;
            // keep listening for one it can actually bind to.
            return;
        }
        if matches!(self.state, DiscoveryState::GatewayElectionDelay { .. }) {
            self.emit(DebugEvent::ElectionCancelled);
        }
        let encrypt = self.encrypt();
        let _ = self.radio.add_peer(gateway_mac, encrypt);

        if self.my_id.is_none() {
            let msg = Message::NodeIdRequest { mac: self.my_mac };
            self.submit(gateway_id, gateway_mac, &msg);
            self.emit(DebugEvent::IdRequestSent { gateway_id });
            self.set_state(DiscoveryState::RequestNodeId {
                gateway_id,
                gateway_mac,
                since: now,
            });
        } else {
            // Already holding an id (forced, persisted, or kept across a
            // gateway loss): rejoin without re-requesting.
            self.transport.set_local_id(self.my_id);
            self.role = Role::Node(NodeState::new(gateway_id, gateway_mac, now));
            self.persist_current();
            self.set_state(DiscoveryState::OperationalNode);
        }
    }

    /// A `NodeIdAssign` arrived while waiting in `RequestNodeId`.
    pub(crate) fn on_id_assigned(
        &mut self,
        sender_id: LogicalId,
        assigned_id: LogicalId,
        target_mac: Mac,
        now: Timestamp,
    ) {
        let DiscoveryState::RequestNodeId {
            gateway_id,
            gateway_mac,
            ..
        } = self.state
        else {
            return;
        };
        if sender_id != gateway_id || target_mac != self.my_mac {
            return;
        }
        self.adopt_assigned_id(assigned_id, gateway_id, gateway_mac, now);
    }

    /// Take ownership of an assigned id, confirm it, and go operational.
    ///
    /// The assignment itself proves the gateway is alive, so the linkage
    /// starts connected and the first ping is one full interval out.
    pub(crate) fn adopt_assigned_id(
        &mut self,
        assigned_id: LogicalId,
        gateway_id: LogicalId,
        gateway_mac: Mac,
        now: Timestamp,
    ) {
        self.my_id = Some(assigned_id);
        self.transport.set_local_id(Some(assigned_id));
        self.submit(gateway_id, gateway_mac, &Message::NodeIdAck);
        self.emit(DebugEvent::IdAdopted { id: assigned_id });

        let mut link = NodeState::new(gateway_id, gateway_mac, now + self.timing.ping_interval);
        link.connected = true;
        self.role = Role::Node(link);
        self.persist_current();
        self.set_state(DiscoveryState::OperationalNode);
        self.notify_gateway_status(true);
    }
}
