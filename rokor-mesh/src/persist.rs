//! Persisted configuration record.
//!
//! One flat record under a single namespace lets a device resume its
//! operating role across power cycles without re-running discovery. A
//! stored record is only trusted when the stored network name and channel
//! match the current `begin()` arguments; anything else is invalidated.
//!
//! The role is stored as a symbolic byte (`b'N'` / `b'G'`) rather than an
//! enum ordinal, so reordering the `Role` variants between firmware
//! revisions cannot misload old records.

use crate::traits::Store;
use crate::types::{valid_device_id, LogicalId, Mac, MAC_UNKNOWN};

/// Namespace all keys live under in the host's key-value store.
pub const STORE_NAMESPACE: &str = "rokor_mesh";

const KEY_NET_NAME: &str = "net_name";
const KEY_ROLE: &str = "role";
const KEY_PJON_ID: &str = "pjon_id";
const KEY_BUS_ID: &str = "bus_id";
const KEY_CHANNEL: &str = "channel";
const KEY_GW_ID: &str = "gw_pjonid";
const KEY_GW_MAC: &str = "gw_mac";

const ROLE_BYTE_NODE: u8 = b'N';
const ROLE_BYTE_GATEWAY: u8 = b'G';

/// Operating role as stored on flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedRole {
    Node,
    Gateway,
}

impl PersistedRole {
    pub fn to_byte(self) -> u8 {
        match self {
            PersistedRole::Node => ROLE_BYTE_NODE,
            PersistedRole::Gateway => ROLE_BYTE_GATEWAY,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            ROLE_BYTE_NODE => Some(PersistedRole::Node),
            ROLE_BYTE_GATEWAY => Some(PersistedRole::Gateway),
            _ => None,
        }
    }
}

/// A record accepted from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedConfig {
    pub role: PersistedRole,
    pub my_id: LogicalId,
    /// Node role only; `None` when the stored linkage is absent or invalid.
    pub gateway_id: Option<LogicalId>,
    /// Node role only; [`MAC_UNKNOWN`] when absent.
    pub gateway_mac: Mac,
}

impl PersistedConfig {
    /// A node record is only complete with a usable gateway linkage.
    pub fn has_gateway_link(&self) -> bool {
        self.gateway_id.is_some() && self.gateway_mac != MAC_UNKNOWN
    }
}

/// Load and validate the stored record.
///
/// Returns `None` on store errors, missing keys, name or channel mismatch,
/// an unknown role byte, or an out-of-range stored id.
pub fn load<S: Store>(store: &mut S, name: &str, channel: u8) -> Option<PersistedConfig> {
    let stored_name = store.get_str(KEY_NET_NAME).ok()??;
    if stored_name != name {
        return None;
    }
    let stored_channel = store.get_u8(KEY_CHANNEL).ok()??;
    if stored_channel != channel {
        return None;
    }
    let role = PersistedRole::from_byte(store.get_u8(KEY_ROLE).ok()??)?;
    let my_id = store.get_u8(KEY_PJON_ID).ok()??;
    if !valid_device_id(my_id) {
        return None;
    }

    let mut gateway_id = None;
    let mut gateway_mac = MAC_UNKNOWN;
    if role == PersistedRole::Node {
        gateway_id = store
            .get_u8(KEY_GW_ID)
            .ok()
            .flatten()
            .filter(|id| valid_device_id(*id));
        let mut mac = MAC_UNKNOWN;
        if let Ok(Some(len)) = store.get_blob(KEY_GW_MAC, &mut mac) {
            if len == mac.len() {
                gateway_mac = mac;
            }
        }
    }

    Some(PersistedConfig {
        role,
        my_id,
        gateway_id,
        gateway_mac,
    })
}

/// Write the current configuration. Durable once `commit` succeeds.
pub fn save<S: Store>(
    store: &mut S,
    name: &str,
    channel: u8,
    bus_id: &[u8; 4],
    role: PersistedRole,
    my_id: LogicalId,
    gateway_link: Option<(LogicalId, Mac)>,
) -> Result<(), S::Error> {
    store.set_str(KEY_NET_NAME, name)?;
    store.set_u8(KEY_ROLE, role.to_byte())?;
    store.set_u8(KEY_PJON_ID, my_id)?;
    store.set_blob(KEY_BUS_ID, bus_id)?;
    store.set_u8(KEY_CHANNEL, channel)?;
    if let Some((gw_id, gw_mac)) = gateway_link {
        store.set_u8(KEY_GW_ID, gw_id)?;
        if gw_mac != MAC_UNKNOWN {
            store.set_blob(KEY_GW_MAC, &gw_mac)?;
        }
    }
    store.commit()
}

/// Remove every key of the record.
pub fn clear<S: Store>(store: &mut S) -> Result<(), S::Error> {
    for key in [
        KEY_NET_NAME,
        KEY_ROLE,
        KEY_PJON_ID,
        KEY_BUS_ID,
        KEY_CHANNEL,
        KEY_GW_ID,
        KEY_GW_MAC,
    ] {
        store.remove(key)?;
    }
    store.commit()
}
