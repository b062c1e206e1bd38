//! Per-vendor entry point used by the device registry

use std::sync::Arc;

use crate::config::PassphraseEncoding;
use crate::error::HwResult;
use crate::model::{DeviceInfo, InitSettings, LifecycleOutcome, Transport, TransportSet, VendorKind};

use super::VendorClient;

/// Enumerates, opens and (re)initialises devices of one vendor kind
pub trait VendorAdapter: Send + Sync {
    fn kind(&self) -> VendorKind;

    /// Devices currently attached through any allowed transport
    fn list_devices(&self, transports: &TransportSet) -> HwResult<Vec<DeviceInfo>>;

    /// Open a native client for the device behind `transport`.
    ///
    /// Passphrases sent through the client are normalised with `encoding` where the vendor
    /// SDK supports it.
    fn open(
        &self,
        transport: &Transport,
        encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>>;

    /// Erase the device. The outcome carries the device id assigned afterwards.
    ///
    /// A cancellation on the device is an `Ok` outcome with `cancelled` set, not an error.
    fn wipe(&self, device_id: &str) -> HwResult<LifecycleOutcome>;

    /// Restore a seed entered on the device
    fn recover(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome>;

    /// Generate a fresh seed on the device
    fn reset(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome>;
}
