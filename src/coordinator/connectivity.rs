//! Device Connectivity Tracker
//!
//! Last-known broker connectivity for the fixed device set. Pure mapping
//! updates driven by explicit status events; a device that stops publishing
//! is not presumed disconnected here.

use crate::types::Device;
use std::collections::BTreeMap;

/// Connectivity table over the closed device enumeration.
#[derive(Debug, Clone)]
pub struct ConnectivityTable {
    statuses: BTreeMap<Device, bool>,
}

impl Default for ConnectivityTable {
    fn default() -> Self {
        Self {
            statuses: Device::ALL.iter().map(|d| (*d, false)).collect(),
        }
    }
}

impl ConnectivityTable {
    pub fn set(&mut self, device: Device, connected: bool) {
        self.statuses.insert(device, connected);
    }

    pub fn get(&self, device: Device) -> bool {
        self.statuses.get(&device).copied().unwrap_or(false)
    }

    /// Point-in-time view of all device statuses, keyed by wire id.
    pub fn snapshot(&self) -> BTreeMap<&'static str, bool> {
        self.statuses.iter().map(|(d, c)| (d.id(), *c)).collect()
    }
}
