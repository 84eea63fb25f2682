//! Time-stepped deterministic simulator.
//!
//! All devices share one virtual clock and one medium. `run_for` advances
//! the clock in fixed quanta and ticks every online device in creation
//! order, so a run is exactly reproducible: the only randomness is each
//! device's scripted `Random`.

use rokor_mesh::traits::test_impls::MockClock;
use rokor_mesh::{Duration, Mac, RoleKind};

use crate::device::SimDevice;
use crate::medium::Medium;

/// Clock quantum per simulation step. Protocol timers are hundreds of
/// milliseconds and up, so 10 ms keeps ordering faithful without waste.
const STEP_MS: u64 = 10;

pub struct Simulator {
    pub clock: MockClock,
    pub medium: Medium,
    pub devices: Vec<SimDevice>,
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            clock: MockClock::new(),
            medium: Medium::new(),
            devices: Vec::new(),
        }
    }

    /// Add a device with a locally-administered MAC ending in `last_byte`
    /// and a scripted random sequence (used for the election delay).
    /// Returns its index.
    pub fn add_device(&mut self, last_byte: u8, random_script: &[u64]) -> usize {
        let mac = Self::mac(last_byte);
        self.devices
            .push(SimDevice::new(&self.medium, &self.clock, mac, random_script));
        self.devices.len() - 1
    }

    pub fn mac(last_byte: u8) -> Mac {
        [0x02, 0x00, 0x00, 0x00, 0x00, last_byte]
    }

    /// `begin()` every device on the same network and channel.
    pub fn begin_all(&mut self, network_name: &str, channel: u8) {
        for device in &mut self.devices {
            device
                .begin(network_name, channel)
                .expect("simulated begin cannot fail");
        }
    }

    /// Advance simulated time, ticking every online device each step.
    pub fn run_for(&mut self, duration: Duration) {
        let steps = duration.as_millis() / STEP_MS;
        for _ in 0..steps {
            self.clock.advance(STEP_MS);
            for device in &mut self.devices {
                if device.online {
                    device.mesh.update();
                }
            }
        }
    }

    /// Power a device on or off. Offline devices neither tick nor hear.
    pub fn set_online(&mut self, index: usize, online: bool) {
        let mac = self.devices[index].mac;
        self.devices[index].online = online;
        self.medium.set_online(mac, online);
    }

    pub fn device(&self, index: usize) -> &SimDevice {
        &self.devices[index]
    }

    pub fn device_mut(&mut self, index: usize) -> &mut SimDevice {
        &mut self.devices[index]
    }

    pub fn gateway_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.mesh.role() == RoleKind::Gateway)
            .count()
    }

    pub fn node_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.mesh.role() == RoleKind::Node)
            .count()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
