//! Platform traits: radio, packet transport, persistent store, clock,
//! randomness.
//!
//! The coordinator is generic over these five seams so the same core runs
//! on real hardware, in unit tests, and in the simulator. All of them are
//! polled from the cooperative `update()` tick; none may block beyond the
//! transport's bounded receive window (≤10 ms).

use core::fmt::Debug;

use alloc::string::String;
use alloc::vec::Vec;

use crate::identity::Pmk;
use crate::time::Timestamp;
use crate::types::{BusId, LogicalId, Mac, SendStatus};

/// Driver for the connectionless broadcast radio.
///
/// Peer registration mirrors radios with a hardware peer table (the table
/// limit is what bounds the mesh size). `add_peer` must be idempotent:
/// re-registering a known MAC updates it in place, falling back to
/// delete-and-add inside the driver if an in-place update fails.
pub trait Radio {
    type Error: Debug;

    /// Bring the radio up on the given channel.
    ///
    /// A non-empty `pmk` enables link-layer encryption for peers registered
    /// with `encrypt = true`.
    fn init(&mut self, channel: u8, pmk: &Pmk) -> Result<(), Self::Error>;

    /// Tear the radio down. Peers are forgotten.
    fn deinit(&mut self);

    /// This device's hardware address.
    fn mac_address(&self) -> Mac;

    /// Register or update a peer. Idempotent.
    fn add_peer(&mut self, mac: Mac, encrypt: bool) -> Result<(), Self::Error>;

    /// Forget a peer. Unknown MACs are ignored.
    fn remove_peer(&mut self, mac: Mac);
}

/// Inbound notification from the packet transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An addressed packet arrived.
    Received {
        sender_id: LogicalId,
        sender_mac: Mac,
        payload: Vec<u8>,
    },
    /// The transport gave up on reaching a peer after its own retries.
    ConnectionLost { peer_id: LogicalId },
}

/// The addressed packet layer riding on the radio.
///
/// Provides per-packet acknowledged unicast keyed by logical id, scoped by
/// the 4-byte bus id. Implementations that receive in interrupt context
/// must buffer there and hand events out through [`poll`](Transport::poll),
/// which is only ever called from the cooperative tick.
pub trait Transport {
    type Error: Debug;

    /// (Re)start the transport with a local id and bus id.
    ///
    /// Idempotent; an already-running transport is stopped first.
    fn configure(&mut self, local_id: Option<LogicalId>, bus_id: BusId)
        -> Result<(), Self::Error>;

    /// Stop listening and drop queued traffic.
    fn shutdown(&mut self);

    fn is_listening(&self) -> bool;

    /// Change the local id without a full restart (used when an id is
    /// assigned mid-session).
    fn set_local_id(&mut self, id: Option<LogicalId>);

    /// Submit one packet to `dest_id`, radio-addressed to `dest_mac`.
    fn send(&mut self, dest_id: LogicalId, dest_mac: Mac, payload: &[u8]) -> SendStatus;

    /// Drain the driver (bounded, ≤10 ms) and return the next pending
    /// event, if any.
    fn poll(&mut self) -> Option<TransportEvent>;
}

/// Small key-value persistence (flash NVS or similar).
///
/// Keys are short ASCII names inside one namespace owned by the mesh
/// (see [`crate::persist::STORE_NAMESPACE`]). Writes become durable at
/// `commit`.
pub trait Store {
    type Error: Debug;

    fn get_u8(&mut self, key: &str) -> Result<Option<u8>, Self::Error>;
    fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Self::Error>;

    fn get_str(&mut self, key: &str) -> Result<Option<String>, Self::Error>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Read a blob into `out`; returns the stored length.
    fn get_blob(&mut self, key: &str, out: &mut [u8]) -> Result<Option<usize>, Self::Error>;
    fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;

    fn commit(&mut self) -> Result<(), Self::Error>;
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Random source, used for the election contention delay.
pub trait Random {
    /// Uniform value in `[min, max)`. `max == min` returns `min`.
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

#[cfg(any(test, feature = "mock"))]
pub mod test_impls {
    //! Trait implementations for unit tests and simulation.

    use alloc::collections::{BTreeMap, VecDeque};
    use alloc::rc::Rc;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use super::*;

    /// Radio that records peer operations.
    pub struct MockRadio {
        pub mac: Mac,
        pub peers: Vec<Mac>,
        pub init_channel: Option<u8>,
        pub fail_init: bool,
    }

    impl MockRadio {
        pub fn new(mac: Mac) -> Self {
            Self {
                mac,
                peers: Vec::new(),
                init_channel: None,
                fail_init: false,
            }
        }
    }

    #[derive(Debug)]
    pub struct MockRadioError;

    impl Radio for MockRadio {
        type Error = MockRadioError;

        fn init(&mut self, channel: u8, _pmk: &Pmk) -> Result<(), Self::Error> {
            if self.fail_init {
                return Err(MockRadioError);
            }
            self.init_channel = Some(channel);
            Ok(())
        }

        fn deinit(&mut self) {
            self.init_channel = None;
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

    /// Transport that logs sends and replays injected events.
    pub struct MockTransport {
        pub local_id: Option<LogicalId>,
        pub bus_id: BusId,
        pub listening: bool,
        pub fail_configure: bool,
        pub send_status: SendStatus,
        pub tx_log: Vec<(LogicalId, Mac, Vec<u8>)>,
        pub rx_queue: VecDeque<TransportEvent>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                local_id: None,
                bus_id: [0; 4],
                listening: false,
                fail_configure: false,
                send_status: SendStatus::Ack,
                tx_log: Vec::new(),
                rx_queue: VecDeque::new(),
            }
        }

        pub fn inject(&mut self, sender_id: LogicalId, sender_mac: Mac, payload: &[u8]) {
            self.rx_queue.push_back(TransportEvent::Received {
                sender_id,
                sender_mac,
                payload: payload.to_vec(),
            });
        }

        pub fn inject_connection_lost(&mut self, peer_id: LogicalId) {
            self.rx_queue
                .push_back(TransportEvent::ConnectionLost { peer_id });
        }

        /// Sent payloads for one destination id, oldest first.
        pub fn sent_to(&self, dest: LogicalId) -> Vec<&[u8]> {
            self.tx_log
                .iter()
                .filter(|(id, _, _)| *id == dest)
                .map(|(_, _, p)| p.as_slice())
                .collect()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[derive(Debug)]
    pub struct MockTransportError;

    impl Transport for MockTransport {
        type Error = MockTransportError;

        fn configure(
            &mut self,
            local_id: Option<LogicalId>,
            bus_id: BusId,
        ) -> Result<(), Self::Error> {
            if self.fail_configure {
                self.listening = false;
                return Err(MockTransportError);
            }
            self.local_id = local_id;
            self.bus_id = bus_id;
            self.listening = true;
            Ok(())
        }

        fn shutdown(&mut self) {
            self.listening = false;
        }

        fn is_listening(&self) -> bool {
            self.listening
        }

        fn set_local_id(&mut self, id: Option<LogicalId>) {
            self.local_id = id;
        }

        fn send(&mut self, dest_id: LogicalId, dest_mac: Mac, payload: &[u8]) -> SendStatus {
            self.tx_log.push((dest_id, dest_mac, payload.to_vec()));
            self.send_status
        }

        fn poll(&mut self) -> Option<TransportEvent> {
            if self.listening {
                self.rx_queue.pop_front()
            } else {
                None
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Value {
        U8(u8),
        Str(String),
        Blob(Vec<u8>),
    }

    /// In-memory store. Cloning yields a handle to the same underlying
    /// data, which is how the simulator persists records across a reboot.
    #[derive(Clone, Default)]
    pub struct MemStore {
        inner: Rc<RefCell<BTreeMap<String, Value>>>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.inner.borrow().len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.borrow().is_empty()
        }
    }

    #[derive(Debug)]
    pub struct MemStoreError;

    impl Store for MemStore {
        type Error = MemStoreError;

        fn get_u8(&mut self, key: &str) -> Result<Option<u8>, Self::Error> {
            match self.inner.borrow().get(key) {
                Some(Value::U8(v)) => Ok(Some(*v)),
                _ => Ok(None),
            }
        }

        fn set_u8(&mut self, key: &str, value: u8) -> Result<(), Self::Error> {
            self.inner
                .borrow_mut()
                .insert(key.to_string(), Value::U8(value));
            Ok(())
        }

        fn get_str(&mut self, key: &str) -> Result<Option<String>, Self::Error> {
            match self.inner.borrow().get(key) {
                Some(Value::Str(v)) => Ok(Some(v.clone())),
                _ => Ok(None),
            }
        }

        fn set_str(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
            self.inner
                .borrow_mut()
                .insert(key.to_string(), Value::Str(value.to_string()));
            Ok(())
        }

        fn get_blob(&mut self, key: &str, out: &mut [u8]) -> Result<Option<usize>, Self::Error> {
            match self.inner.borrow().get(key) {
                Some(Value::Blob(v)) => {
                    let len = v.len().min(out.len());
                    out[..len].copy_from_slice(&v[..len]);
                    Ok(Some(v.len()))
                }
                _ => Ok(None),
            }
        }

        fn set_blob(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
            self.inner
                .borrow_mut()
                .insert(key.to_string(), Value::Blob(value.to_vec()));
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
            self.inner.borrow_mut().remove(key);
            Ok(())
        }

        fn commit(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    /// Clock backed by a shared counter. Cloning yields a handle to the
    /// same instant, so many devices can run on one virtual clock.
    #[derive(Clone, Default)]
    pub struct MockClock {
        now_ms: Rc<Cell<u64>>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn advance(&self, ms: u64) {
            self.now_ms.set(self.now_ms.get() + ms);
        }

        pub fn set(&self, ms: u64) {
            self.now_ms.set(ms);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.now_ms.get())
        }
    }

    /// Random source that replays scripted values before falling back to
    /// a fixed-seed LCG. Scripted values are reduced into the requested
    /// range, so a script of `[200]` yields exactly 200 from
    /// `gen_range(0, 1500)`.
    pub struct ScriptedRandom {
        script: VecDeque<u64>,
        state: u64,
    }

    impl ScriptedRandom {
        pub fn new() -> Self {
            Self::with_seed(0x5eed)
        }

        pub fn with_seed(seed: u64) -> Self {
            Self {
                script: VecDeque::new(),
                state: seed,
            }
        }

        pub fn push(&mut self, value: u64) {
            self.script.push_back(value);
        }
    }

    impl Default for ScriptedRandom {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Random for ScriptedRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            let range = max.saturating_sub(min);
            if range == 0 {
                return min;
            }
            if let Some(v) = self.script.pop_front() {
                return min + v % range;
            }
            self.state = self
                .state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            min + self.state % range
        }
    }
}
