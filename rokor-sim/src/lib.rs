//! rokor-sim - deterministic multi-device simulator for rokor-mesh.
//!
//! Runs several [`rokor_mesh::Mesh`] coordinators in one process over a
//! simulated broadcast medium, with a shared virtual clock and scripted
//! randomness. No real time passes and no ordering is left to chance, so
//! whole-mesh scenarios (elections, reboots, disconnects) assert exact
//! end states.
//!
//! # Example
//!
//! ```
//! use rokor_sim::Simulator;
//! use rokor_mesh::Duration;
//!
//! // Two devices cold-boot; scripted delays decide the election.
//! let mut sim = Simulator::new();
//! sim.add_device(1, &[200]);
//! sim.add_device(2, &[800]);
//! sim.begin_all("example", 6);
//! sim.run_for(Duration::from_secs(7));
//! assert_eq!(sim.gateway_count(), 1);
//! ```

pub mod device;
pub mod medium;
pub mod sim;

pub use device::{SimDevice, SimMesh, VecEmitter};
pub use medium::{Frame, Medium, SimRadio, SimTransport};
pub use sim::Simulator;
