//! One simulated device: a `Mesh` wired to the shared medium, plus
//! captured callback logs for assertions.

use std::cell::RefCell;
use std::rc::Rc;

use rokor_mesh::traits::test_impls::{MemStore, MockClock, ScriptedRandom};
use rokor_mesh::{DebugEmitter, DebugEvent, Error, LogicalId, Mac, Mesh};

use crate::medium::{Medium, SimRadio, SimTransport};

/// The concrete coordinator type every simulated device runs.
pub type SimMesh = Mesh<SimTransport, SimRadio, MemStore, MockClock, ScriptedRandom>;

/// Debug emitter that appends into a shared log.
pub struct VecEmitter {
    events: Rc<RefCell<Vec<DebugEvent>>>,
}

impl DebugEmitter for VecEmitter {
    fn emit(&mut self, event: DebugEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// A device on the simulated air.
pub struct SimDevice {
    pub mesh: SimMesh,
    pub mac: Mac,
    pub online: bool,
    /// Store handle shared with the mesh; survives `reboot`.
    pub store: MemStore,
    /// Node-side gateway connectivity edges, in order.
    pub gateway_status_log: Rc<RefCell<Vec<bool>>>,
    /// Gateway-side child connectivity edges, in order.
    pub node_status_log: Rc<RefCell<Vec<(LogicalId, bool)>>>,
    /// Host payloads delivered to this device.
    pub received: Rc<RefCell<Vec<(LogicalId, Vec<u8>)>>>,
    /// Protocol trace.
    pub debug_log: Rc<RefCell<Vec<DebugEvent>>>,
    medium: Medium,
    clock: MockClock,
}

impl SimDevice {
    pub fn new(medium: &Medium, clock: &MockClock, mac: Mac, random_script: &[u64]) -> Self {
        medium.register(mac);
        // Devices start with the transport down until the FSM stands it up.
        medium.set_listening(mac, false);
        let store = MemStore::new();
        let mut device = Self {
            mesh: Self::build_mesh(medium, clock, mac, store.clone(), random_script),
            mac,
            online: true,
            store,
            gateway_status_log: Rc::new(RefCell::new(Vec::new())),
            node_status_log: Rc::new(RefCell::new(Vec::new())),
            received: Rc::new(RefCell::new(Vec::new())),
            debug_log: Rc::new(RefCell::new(Vec::new())),
            medium: medium.clone(),
            clock: clock.clone(),
        };
        device.install_callbacks();
        device
    }

    fn build_mesh(
        medium: &Medium,
        clock: &MockClock,
        mac: Mac,
        store: MemStore,
        random_script: &[u64],
    ) -> SimMesh {
        let mut random = ScriptedRandom::new();
        for &value in random_script {
            random.push(value);
        }
        Mesh::new(
            SimTransport::new(medium, mac),
            SimRadio::new(mac),
            store,
            clock.clone(),
            random,
        )
    }

    fn install_callbacks(&mut self) {
        let gateway_log = self.gateway_status_log.clone();
        self.mesh
            .set_gateway_status_cb(move |connected| gateway_log.borrow_mut().push(connected));
        let node_log = self.node_status_log.clone();
        self.mesh
            .set_node_status_cb(move |id, connected| node_log.borrow_mut().push((id, connected)));
        let received = self.received.clone();
        self.mesh.set_receive_cb(move |from, payload| {
            received.borrow_mut().push((from, payload.to_vec()));
        });
        let events = self.debug_log.clone();
        self.mesh.set_debug_emitter(VecEmitter { events });
    }

    pub fn begin(&mut self, network_name: &str, channel: u8) -> Result<(), Error> {
        self.mesh.begin(network_name, channel, 1)
    }

    /// Simulate a power cycle: the old mesh is dropped on the floor (no
    /// orderly `end()`), runtime state is lost, the store survives.
    pub fn reboot(&mut self, random_script: &[u64]) {
        self.medium.set_listening(self.mac, false);
        self.mesh = Self::build_mesh(
            &self.medium,
            &self.clock,
            self.mac,
            self.store.clone(),
            random_script,
        );
        self.install_callbacks();
    }
}
