//! Shared radio medium and the trait adapters that run a `Mesh` over it.
//!
//! Every simulated device registers its MAC with one [`Medium`]. A send is
//! delivered immediately into the inbox of the addressed MAC (or, for the
//! broadcast MAC, into every other listening inbox); receivers drain their
//! inbox through `Transport::poll` on their next tick. Offline devices
//! neither receive nor deliver, which is how scenarios silence a gateway.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use hashbrown::HashMap;
use rokor_mesh::traits::TransportEvent;
use rokor_mesh::types::MAC_BROADCAST;
use rokor_mesh::{BusId, LogicalId, Mac, Pmk, Radio, SendStatus, Transport, BROADCAST_ID};

/// One frame in flight.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sender_id: LogicalId,
    pub sender_mac: Mac,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct MediumInner {
    inboxes: HashMap<Mac, VecDeque<Frame>>,
    listening: HashMap<Mac, bool>,
    online: HashMap<Mac, bool>,
}

/// Handle to the shared medium; clones refer to the same air.
#[derive(Clone, Default)]
pub struct Medium {
    inner: Rc<RefCell<MediumInner>>,
}

impl Medium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a MAC. Also used by tests to create a "tap": a bare inbox
    /// that collects frames without a device behind it.
    pub fn register(&self, mac: Mac) {
        let mut inner = self.inner.borrow_mut();
        inner.inboxes.entry(mac).or_default();
        inner.listening.insert(mac, true);
        inner.online.insert(mac, true);
    }

    pub fn set_online(&self, mac: Mac, online: bool) {
        self.inner.borrow_mut().online.insert(mac, online);
    }

    pub fn set_listening(&self, mac: Mac, listening: bool) {
        self.inner.borrow_mut().listening.insert(mac, listening);
    }

    fn can_hear(inner: &MediumInner, mac: &Mac) -> bool {
        inner.online.get(mac).copied().unwrap_or(false)
            && inner.listening.get(mac).copied().unwrap_or(false)
    }

    /// Deliver a frame from `sender_mac` to `dest_mac` (or everyone, for
    /// the broadcast MAC).
    pub fn deliver(&self, sender_id: LogicalId, sender_mac: Mac, dest_mac: Mac, payload: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        if !inner.online.get(&sender_mac).copied().unwrap_or(false) {
            return;
        }
        let frame = Frame {
            sender_id,
            sender_mac,
            payload: payload.to_vec(),
        };
        if dest_mac == MAC_BROADCAST {
            let targets: Vec<Mac> = inner
                .inboxes
                .keys()
                .copied()
                .filter(|mac| *mac != sender_mac && Self::can_hear(&inner, mac))
                .collect();
            for mac in targets {
                if let Some(inbox) = inner.inboxes.get_mut(&mac) {
                    inbox.push_back(frame.clone());
                }
            }
        } else if Self::can_hear(&inner, &dest_mac) {
            if let Some(inbox) = inner.inboxes.get_mut(&dest_mac) {
                inbox.push_back(frame);
            }
        }
    }

    /// Push a frame straight into one inbox, bypassing delivery rules.
    pub fn push_to(&self, dest_mac: Mac, frame: Frame) {
        if let Some(inbox) = self.inner.borrow_mut().inboxes.get_mut(&dest_mac) {
            inbox.push_back(frame);
        }
    }

    pub fn pop(&self, mac: Mac) -> Option<Frame> {
        self.inner.borrow_mut().inboxes.get_mut(&mac)?.pop_front()
    }

    /// Drain a tap inbox.
    pub fn drain(&self, mac: Mac) -> Vec<Frame> {
        match self.inner.borrow_mut().inboxes.get_mut(&mac) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }
}

/// `Transport` adapter over the shared medium.
pub struct SimTransport {
    medium: Medium,
    mac: Mac,
    local_id: Option<LogicalId>,
    listening: bool,
}

impl SimTransport {
    pub fn new(medium: &Medium, mac: Mac) -> Self {
        Self {
            medium: medium.clone(),
            mac,
            local_id: None,
            listening: false,
        }
    }
}

#[derive(Debug)]
pub struct SimTransportError;

impl Transport for SimTransport {
    type Error = SimTransportError;

    fn configure(&mut self, local_id: Option<LogicalId>, _bus_id: BusId) -> Result<(), Self::Error> {
        self.local_id = local_id;
        self.listening = true;
        self.medium.set_listening(self.mac, true);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.listening = false;
        self.medium.set_listening(self.mac, false);
    }

    fn is_listening(&self) -> bool {
        self.listening
    }

    fn set_local_id(&mut self, id: Option<LogicalId>) {
        self.local_id = id;
    }

    fn send(&mut self, _dest_id: LogicalId, dest_mac: Mac, payload: &[u8]) -> SendStatus {
        if !self.listening {
            return SendStatus::Fail;
        }
        // An unassigned device sends under the reserved broadcast id, the
        // way the real transport marks "no id yet".
        let sender_id = self.local_id.unwrap_or(BROADCAST_ID);
        self.medium.deliver(sender_id, self.mac, dest_mac, payload);
        SendStatus::Ack
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if !self.listening {
            return None;
        }
        self.medium.pop(self.mac).map(|frame| TransportEvent::Received {
            sender_id: frame.sender_id,
            sender_mac: frame.sender_mac,
            payload: frame.payload,
        })
    }
}

/// `Radio` adapter: records peer registrations, hands out the MAC.
pub struct SimRadio {
    mac: Mac,
    pub peers: Vec<Mac>,
    initialized: bool,
}

impl SimRadio {
    pub fn new(mac: Mac) -> Self {
        Self {
            mac,
            peers: Vec::new(),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[derive(Debug)]
pub struct SimRadioError;

impl Radio for SimRadio {
    type Error = SimRadioError;

    fn init(&mut self, _channel: u8, _pmk: &Pmk) -> Result<(), Self::Error> {
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) {
        self.initialized = false;
        self.peers.clear();
    }

    fn mac_address(&self) -> Mac {
        self.mac
    }

    fn add_peer(&mut self, mac: Mac, _encrypt: bool) -> Result<(), Self::Error> {
        if !self.peers.contains(&mac) {
            self.peers.push(mac);
        }
        Ok(())
    }

    fn remove_peer(&mut self, mac: Mac) {
        self.peers.retain(|p| *p != mac);
    }
}
