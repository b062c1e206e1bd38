use std::fmt;

use serde::{Deserialize, Serialize};

use super::VendorKind;

/// Channel a device is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    WebUsb,
    Bridge,
    Udp,
    Hid,
}

/// Which transports enumeration may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSet {
    pub webusb: bool,
    pub bridge: bool,
    pub udp: bool,
    pub hid: bool,
}

impl TransportSet {
    pub fn allows(&self, kind: TransportKind) -> bool {
        match kind {
            TransportKind::WebUsb => self.webusb,
            TransportKind::Bridge => self.bridge,
            TransportKind::Udp => self.udp,
            TransportKind::Hid => self.hid,
        }
    }
}

impl Default for TransportSet {
    fn default() -> Self {
        Self {
            webusb: true,
            bridge: true,
            udp: true,
            hid: true,
        }
    }
}

/// Opaque locator a vendor binding hands out on enumeration and accepts on open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transport {
    pub kind: TransportKind,
    pub path: String,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.path)
    }
}

/// A device as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: VendorKind,
    /// Vendor-assigned id, stable across reconnects, regenerated on wipe
    pub device_id: String,
    pub label: String,
    pub model: String,
    pub transport: Transport,
    pub initialized: bool,
    pub bootloader_mode: bool,
}

impl DeviceInfo {
    /// One-line description shown when the user has to pick a device
    pub fn description(&self) -> String {
        let mut desc = if self.label.is_empty() {
            format!("{} {}", self.kind, self.model)
        } else {
            format!("{} {} '{}'", self.kind, self.model, self.label)
        };
        if self.bootloader_mode {
            desc.push_str(" [bootloader]");
        } else if !self.initialized {
            desc.push_str(" [not initialized]");
        }
        desc
    }
}

/// Identity of one opened native client; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(raw: u64) -> Self {
        ClientId(raw)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
