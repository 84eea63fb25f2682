//! Gateway-side membership: the child table and its liveness.
//!
//! The table is the gateway's authoritative view of the mesh. It is bounded
//! by the radio's peer-table limit, keyed by logical id with a secondary
//! MAC index, and enforces the two uniqueness invariants directly: at most
//! one record per logical id and at most one per MAC.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::config::MeshConfig;
use crate::debug::DebugEvent;
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Radio, Random, Store, Transport};
use crate::types::{
    LogicalId, Mac, Role, BROADCAST_ID, DEFAULT_GATEWAY_ID, FIRST_NODE_ID, MAC_BROADCAST,
    MAC_UNKNOWN, MAX_LOGICAL_ID,
};
use crate::wire::Message;
use crate::Mesh;

/// One child of this gateway.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub id: LogicalId,
    pub mac: Mac,
    pub last_seen: Timestamp,
    /// Set when an assignment was sent and no `NodeIdAck` has come back yet.
    pub awaiting_ack: bool,
    /// Last connection status reported to the host for this child.
    pub connected: bool,
}

/// Result of one id-request allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOutcome {
    /// Known MAC; the previously assigned id is re-sent.
    Existing(LogicalId),
    /// Fresh record appended with this id.
    Assigned(LogicalId),
    /// No free slot; the request is dropped.
    TableFull,
    /// 254 probes found no free id; the request is dropped.
    Exhausted,
}

/// Fixed-capacity child table.
pub struct MemberTable {
    entries: BTreeMap<LogicalId, MemberRecord>,
    by_mac: BTreeMap<Mac, LogicalId>,
    capacity: usize,
    next_candidate: LogicalId,
}

impl MemberTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            by_mac: BTreeMap::new(),
            capacity,
            next_candidate: FIRST_NODE_ID,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, id: LogicalId) -> Option<&MemberRecord> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: LogicalId) -> Option<&mut MemberRecord> {
        self.entries.get_mut(&id)
    }

    pub fn id_for_mac(&self, mac: &Mac) -> Option<LogicalId> {
        self.by_mac.get(mac).copied()
    }

    pub fn mac_for_id(&self, id: LogicalId) -> Option<Mac> {
        self.entries.get(&id).map(|r| r.mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberRecord> {
        self.entries.values()
    }

    /// Refresh `last_seen`. Returns whether the id was known.
    pub fn touch(&mut self, id: LogicalId, now: Timestamp) -> bool {
        if let Some(rec) = self.entries.get_mut(&id) {
            rec.last_seen = now;
            true
        } else {
            false
        }
    }

    /// Serve an id request from `mac`.
    ///
    /// Idempotent per MAC: a re-request returns the id already on file and
    /// refreshes its liveness. A new MAC gets the first free id at or above
    /// the candidate counter, skipping the gateway's own id and the
    /// reserved values; the counter then advances past the grant so that
    /// rebooting children rarely collide.
    pub fn allocate(&mut self, mac: Mac, own_id: LogicalId, now: Timestamp) -> AllocOutcome {
        if let Some(id) = self.id_for_mac(&mac) {
            self.touch(id, now);
            return AllocOutcome::Existing(id);
        }
        if self.entries.len() >= self.capacity {
            return AllocOutcome::TableFull;
        }

        let mut assigned = None;
        for _ in 0..(MAX_LOGICAL_ID as usize) {
            if self.next_candidate == own_id
                || self.next_candidate < FIRST_NODE_ID
                || self.next_candidate > MAX_LOGICAL_ID
            {
                self.next_candidate = FIRST_NODE_ID;
                if self.next_candidate == own_id {
                    self.next_candidate += 1;
                }
            }
            let candidate = self.next_candidate;
            self.next_candidate = self.next_candidate.wrapping_add(1);
            if !self.entries.contains_key(&candidate) {
                assigned = Some(candidate);
                break;
            }
        }

        let Some(id) = assigned else {
            return AllocOutcome::Exhausted;
        };
        self.entries.insert(
            id,
            MemberRecord {
                id,
                mac,
                last_seen: now,
                awaiting_ack: true,
                connected: false,
            },
        );
        self.by_mac.insert(mac, id);
        AllocOutcome::Assigned(id)
    }

    /// Remove every record silent for longer than `threshold` and return
    /// them so the caller can de-register peers and notify the host.
    pub fn remove_expired(&mut self, now: Timestamp, threshold: Duration) -> Vec<MemberRecord> {
        let expired: Vec<LogicalId> = self
            .entries
            .values()
            .filter(|r| now.saturating_since(r.last_seen) > threshold)
            .map(|r| r.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| {
                let rec = self.entries.remove(&id)?;
                self.by_mac.remove(&rec.mac);
                Some(rec)
            })
            .collect()
    }
}

/// Everything a device carries while operating as gateway.
pub struct GatewayState {
    pub members: MemberTable,
    /// `None` until the first announce goes out (forces one immediately).
    pub last_announce: Option<Timestamp>,
    pub last_cleanup: Timestamp,
}

impl GatewayState {
    pub fn new(capacity: usize, now: Timestamp) -> Self {
        Self {
            members: MemberTable::new(capacity),
            last_announce: None,
            last_cleanup: now,
        }
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
    /// Periodic gateway work: announce and the inactivity sweep.
    pub(crate) fn operate_as_gateway(&mut self, now: Timestamp) {
        let (announce_due, cleanup_due) = match &self.role {
            Role::Gateway(gw) => (
                gw.last_announce
                    .map_or(true, |t| now.saturating_since(t) >= self.timing.announce_interval),
                now.saturating_since(gw.last_cleanup) >= self.timing.cleanup_interval(),
            ),
            _ => return,
        };
        if announce_due {
            self.send_gateway_announce(now);
        }
        if cleanup_due {
            self.cleanup_members(now);
        }
    }

    /// Broadcast this gateway's presence and MAC.
    pub(crate) fn send_gateway_announce(&mut self, now: Timestamp) {
        let encrypt = self.encrypt();
        let _ = self.radio.add_peer(MAC_BROADCAST, encrypt);
        let msg = Message::GatewayAnnounce { mac: self.my_mac };
        self.submit(BROADCAST_ID, MAC_BROADCAST, &msg);
        if let Role::Gateway(gw) = &mut self.role {
            gw.last_announce = Some(now);
        }
        self.emit(DebugEvent::AnnounceSent);
    }

    /// Sweep out children that have gone silent.
    fn cleanup_members(&mut self, now: Timestamp) {
        let threshold = self.timing.inactivity_threshold();
        let expired = match &mut self.role {
            Role::Gateway(gw) => {
                gw.last_cleanup = now;
                gw.members.remove_expired(now, threshold)
            }
            _ => return,
        };
        for rec in expired {
            self.radio.remove_peer(rec.mac);
            self.emit(DebugEvent::NodeEvicted {
                id: rec.id,
                mac: rec.mac,
            });
            self.notify_node_status(rec.id, false);
        }
    }

    /// Handle a `NodeIdRequest`.
    ///
    /// The assignment rides a transport broadcast but is radio-addressed to
    /// the requester, preferring the radio-layer source MAC over the one
    /// embedded in the request body.
    pub(crate) fn gateway_on_id_request(
        &mut self,
        sender_mac: Mac,
        requester_mac: Mac,
        now: Timestamp,
    ) {
        let own_id = self.my_id.unwrap_or(DEFAULT_GATEWAY_ID);
        let outcome = match &mut self.role {
            Role::Gateway(gw) => gw.members.allocate(requester_mac, own_id, now),
            _ => return,
        };

        let id = match outcome {
            AllocOutcome::Assigned(id) => {
                self.emit(DebugEvent::NodeJoined {
                    id,
                    mac: requester_mac,
                });
                id
            }
            AllocOutcome::Existing(id) => {
                self.emit(DebugEvent::NodeReassigned {
                    id,
                    mac: requester_mac,
                });
                id
            }
            AllocOutcome::TableFull => {
                self.emit(DebugEvent::TableFull { mac: requester_mac });
                return;
            }
            AllocOutcome::Exhausted => {
                self.emit(DebugEvent::AddressSpaceExhausted { mac: requester_mac });
                return;
            }
        };

        let peer_mac = if sender_mac != MAC_UNKNOWN {
            sender_mac
        } else {
            requester_mac
        };
        let encrypt = self.encrypt();
        let _ = self.radio.add_peer(peer_mac, encrypt);
        let msg = Message::NodeIdAssign { id, mac: peer_mac };
        self.submit(BROADCAST_ID, peer_mac, &msg);
        self.gateway_report_connected(id);
    }

    /// Handle a `NodeIdAck` from a child confirming its id.
    pub(crate) fn gateway_on_ack(&mut self, sender_id: LogicalId, now: Timestamp) {
        let known = match &mut self.role {
            Role::Gateway(gw) => match gw.members.get_mut(sender_id) {
                Some(rec) => {
                    rec.awaiting_ack = false;
                    rec.last_seen = now;
                    true
                }
                None => false,
            },
            _ => return,
        };
        if known {
            self.gateway_report_connected(sender_id);
        }
    }

    /// Handle a `NodePing`: refresh the record and answer synchronously.
    pub(crate) fn gateway_on_ping(&mut self, sender_id: LogicalId, now: Timestamp) {
        let mac = match &mut self.role {
            Role::Gateway(gw) => match gw.members.get_mut(sender_id) {
                Some(rec) => {
                    rec.last_seen = now;
                    Some(rec.mac)
                }
                None => None,
            },
            _ => return,
        };
        let Some(mac) = mac else {
            self.emit(DebugEvent::UnknownNodePing { id: sender_id });
            return;
        };
        self.submit(sender_id, mac, &Message::GatewayPong);
        self.emit(DebugEvent::PongSent { id: sender_id });
        self.gateway_report_connected(sender_id);
    }

    /// Refresh liveness for any inbound traffic from a known child.
    /// Returns whether the sender is in the table.
    pub(crate) fn gateway_touch(&mut self, sender_id: LogicalId, now: Timestamp) -> bool {
        let known = match &mut self.role {
            Role::Gateway(gw) => gw.members.touch(sender_id, now),
            _ => false,
        };
        if known {
            self.gateway_report_connected(sender_id);
        }
        known
    }

    /// Fire the node-status callback on a disconnected-to-connected edge.
    fn gateway_report_connected(&mut self, id: LogicalId) {
        let edge = match &mut self.role {
            Role::Gateway(gw) => match gw.members.get_mut(id) {
                Some(rec) if !rec.connected => {
                    rec.connected = true;
                    true
                }
                _ => false,
            },
            _ => false,
        };
        if edge {
            self.notify_node_status(id, true);
        }
    }

    /// A transport-level loss towards a child: report it, keep the record.
    /// The cleanup sweep is the sole removal path, so a transient loss can
    /// recover without a fresh id request.
    pub(crate) fn gateway_on_connection_lost(&mut self, peer_id: LogicalId) {
        let known = match &mut self.role {
            Role::Gateway(gw) => match gw.members.get_mut(peer_id) {
                Some(rec) => {
                    rec.connected = false;
                    true
                }
                None => false,
            },
            _ => false,
        };
        if known {
            self.notify_node_status(peer_id, false);
        }
    }
}
