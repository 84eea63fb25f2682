//! Node-side gateway liveness.
//!
//! A node probes its gateway with periodic pings and counts unanswered
//! ones. Any traffic from the gateway counts as life. Once `max_attempts`
//! pings have gone unanswered at the moment the next one would be sent,
//! the linkage is dropped and the device goes back to listening for a
//! gateway - keeping its assigned id so it can rejoin without a fresh
//! request.

use crate::config::MeshConfig;
use crate::debug::DebugEvent;
use crate::discovery::DiscoveryState;
use crate::time::Timestamp;
use crate::traits::{Clock, Radio, Random, Store, Transport};
use crate::types::{LogicalId, Role};
use crate::wire::Message;
use crate::Mesh;

impl<T, R, S, C, G, Cfg> Mesh<T, R, S, C, G, Cfg>
where
    T: Transport,
    R: Radio,
    S: Store,
    C: Clock,
    G: Random,
    Cfg: MeshConfig,
{
    /// Periodic node work: the ping schedule and the disconnect check.
    pub(crate) fn operate_as_node(&mut self, now: Timestamp) {
        let max_attempts = self.timing.max_ping_attempts;
        let ping_interval = self.timing.ping_interval;

        let action = match &mut self.role {
            Role::Node(link) => {
                if now < link.next_ping_due {
                    return;
                }
                if link.failed_pings >= max_attempts {
                    None
                } else {
                    link.failed_pings += 1;
                    link.next_ping_due = now + ping_interval;
                    Some((link.gateway_id, link.gateway_mac, link.failed_pings))
                }
            }
            _ => return,
        };

        match action {
            Some((gateway_id, gateway_mac, attempt)) => {
                self.submit(gateway_id, gateway_mac, &Message::NodePing);
                self.emit(DebugEvent::PingSent { attempt });
            }
            None => self.node_disconnect(now),
        }
    }

    /// Any sign of life from the gateway: zero the failure counter and
    /// report a reconnect edge if the link was considered down.
    pub(crate) fn node_mark_alive(&mut self) {
        let reconnected = match &mut self.role {
            Role::Node(link) => {
                link.failed_pings = 0;
                if !link.connected {
                    link.connected = true;
                    true
                } else {
                    false
                }
            }
            _ => return,
        };
        if reconnected {
            self.notify_gateway_status(true);
        }
    }

    /// Drop the gateway linkage and go back to listening.
    pub(crate) fn node_disconnect(&mut self, now: Timestamp) {
        let (was_connected, failed_pings) = match &self.role {
            Role::Node(link) => (link.connected, link.failed_pings),
            _ => return,
        };
        self.emit(DebugEvent::GatewayLost { failed_pings });
        if was_connected {
            self.notify_gateway_status(false);
        }

        // The id is kept: a later announce re-admits this device without a
        // fresh request. Only the linkage is forgotten.
        self.role = Role::Discovering;
        self.transport.shutdown();
        if self.stand_up_transport(self.my_id) {
            self.set_state(DiscoveryState::ListenForGateway { since: now });
        }
    }

    /// Transport-level connection loss, dispatched by role.
    pub(crate) fn on_connection_lost(&mut self, peer_id: LogicalId, now: Timestamp) {
        self.emit(DebugEvent::ConnectionLost { peer_id });
        match &self.role {
            Role::Node(link) if link.gateway_id == peer_id => self.node_disconnect(now),
            Role::Gateway(_) => self.gateway_on_connection_lost(peer_id),
            _ => {}
        }
    }
}
