//! Network identity derivations.
//!
//! The human-readable network name deterministically produces both the
//! 4-byte bus id that scopes transport traffic and, absent a user key, the
//! 16-byte pre-shared key for link-layer encryption.

use sha1::{Digest, Sha1};

use crate::types::{BusId, MAX_NETWORK_NAME_LEN};

/// Length of the radio's pre-shared key.
pub const PMK_LEN: usize = 16;

/// Bytes used to pad a short PMK input up to [`PMK_LEN`].
const PMK_PAD: [u8; 4] = *b"RoKr";

/// 16-byte pre-shared key for the radio link.
///
/// An all-zero key means the link runs unencrypted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pmk([u8; PMK_LEN]);

impl Pmk {
    pub const EMPTY: Pmk = Pmk([0; PMK_LEN]);

    /// Build a key from arbitrary input: truncated to 16 bytes, or padded
    /// with the repeating `R o K r` pattern indexed by absolute position.
    pub fn derive(input: &str) -> Pmk {
        let mut buf = [0u8; PMK_LEN];
        let bytes = input.as_bytes();
        let copied = bytes.len().min(PMK_LEN);
        buf[..copied].copy_from_slice(&bytes[..copied]);
        for (i, slot) in buf.iter_mut().enumerate().skip(copied) {
            *slot = PMK_PAD[i % 4];
        }
        Pmk(buf)
    }

    pub fn as_bytes(&self) -> &[u8; PMK_LEN] {
        &self.0
    }

    /// True for the all-zero key (unencrypted link).
    pub fn is_empty(&self) -> bool {
        self.0 == [0; PMK_LEN]
    }
}

impl core::fmt::Debug for Pmk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Never print key material.
        write!(f, "Pmk({})", if self.is_empty() { "empty" } else { "set" })
    }
}

/// Derive the bus id: the first 4 bytes of SHA-1 over the name.
pub fn derive_bus_id(name: &str) -> BusId {
    let digest = Sha1::digest(name.as_bytes());
    let mut bus_id = [0u8; 4];
    bus_id.copy_from_slice(&digest[..4]);
    bus_id
}

/// A usable network name is 1..=32 bytes of printable ASCII.
pub fn valid_network_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NETWORK_NAME_LEN
        && name.bytes().all(|b| (0x20..0x7F).contains(&b))
}
