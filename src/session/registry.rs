//! Attached devices and the clients opened on them

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapters::AdapterSet;
use crate::config::PassphraseEncoding;
use crate::error::{HwError, HwResult};
use crate::model::{ClientId, DeviceInfo, TransportSet, VendorKind};
use crate::ports::{VendorAdapter, VendorClient};

/// A client handle opened on a device
#[derive(Clone)]
pub struct ActiveClient {
    pub id: ClientId,
    pub kind: VendorKind,
    pub device_id: String,
    pub handle: Arc<dyn VendorClient>,
}

impl fmt::Debug for ActiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveClient")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .finish()
    }
}

/// One enumerated device. At most one client is open on it at a time.
#[derive(Debug)]
pub struct Device {
    info: DeviceInfo,
    client: Option<ActiveClient>,
}

impl Device {
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn client(&self) -> Option<&ActiveClient> {
        self.client.as_ref()
    }
}

#[derive(Debug)]
pub struct DeviceRegistry {
    adapters: AdapterSet,
    kinds: Vec<VendorKind>,
    transports: TransportSet,
    passphrase_encoding: PassphraseEncoding,
    devices: Vec<Device>,
    selected: Option<String>,
    fetched: bool,
    next_client: u64,
}

impl DeviceRegistry {
    pub fn new(adapters: AdapterSet, kinds: Vec<VendorKind>, transports: TransportSet) -> Self {
        Self {
            adapters,
            kinds,
            transports,
            passphrase_encoding: PassphraseEncoding::default(),
            devices: Vec::new(),
            selected: None,
            fetched: false,
            next_client: 1,
        }
    }

    /// Change which vendor kinds and transports the next load enumerates
    pub fn set_scope(&mut self, kinds: Vec<VendorKind>, transports: TransportSet) {
        self.kinds = kinds;
        self.transports = transports;
    }

    /// Encoding handed to adapters for clients opened from now on
    pub fn set_passphrase_encoding(&mut self, encoding: PassphraseEncoding) {
        self.passphrase_encoding = encoding;
    }

    pub fn is_fetched(&self) -> bool {
        self.fetched
    }

    /// Enumerate devices of every enabled kind.
    ///
    /// Does nothing if a list was already fetched and `force` is false. Otherwise every open
    /// client is closed first; the ids of the closed clients are returned. A kind whose
    /// enumeration fails is logged and skipped.
    pub fn load(&mut self, force: bool) -> Vec<ClientId> {
        if self.fetched && !force {
            return Vec::new();
        }
        let closed = self.close_all();
        self.devices.clear();

        for kind in self.kinds.clone() {
            let adapter = match self.adapters.get(kind) {
                Ok(adapter) => adapter,
                Err(_) => {
                    debug!("No adapter for {}, skipping enumeration", kind);
                    continue;
                }
            };
            match adapter.list_devices(&self.transports) {
                Ok(found) => {
                    debug!("{} device(s) of kind {}", found.len(), kind);
                    self.devices.extend(found.into_iter().map(|info| Device { info, client: None }));
                }
                Err(e) => warn!("Enumerating {} devices failed: {}", kind, e),
            }
        }

        if let Some(id) = &self.selected {
            if self.find(id).is_none() {
                debug!("Selected device {} is gone", id);
                self.selected = None;
            }
        }
        self.fetched = true;
        info!("Found {} hardware wallet device(s)", self.devices.len());
        closed
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_infos(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info.clone()).collect()
    }

    pub fn find(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.info.device_id == device_id)
    }

    pub fn select(&mut self, device_id: &str) -> HwResult<()> {
        if self.find(device_id).is_none() {
            return Err(HwError::NotFound {
                device_id: device_id.to_string(),
            });
        }
        self.selected = Some(device_id.to_string());
        Ok(())
    }

    pub fn select_index(&mut self, index: usize) -> HwResult<()> {
        let device_id = self
            .devices
            .get(index)
            .map(|d| d.info.device_id.clone())
            .ok_or_else(|| HwError::NotFound {
                device_id: format!("#{index}"),
            })?;
        self.selected = Some(device_id);
        Ok(())
    }

    pub fn selected(&self) -> Option<&Device> {
        self.selected.as_deref().and_then(|id| self.find(id))
    }

    pub fn selected_client(&self) -> Option<&ActiveClient> {
        self.selected().and_then(Device::client)
    }

    pub fn adapter(&self, kind: VendorKind) -> HwResult<Arc<dyn VendorAdapter>> {
        self.adapters.get(kind)
    }

    /// Open a client on the device, or hand back the one already open
    pub fn open_client(&mut self, device_id: &str) -> HwResult<ActiveClient> {
        let index = self
            .devices
            .iter()
            .position(|d| d.info.device_id == device_id)
            .ok_or_else(|| HwError::NotFound {
                device_id: device_id.to_string(),
            })?;
        if let Some(client) = &self.devices[index].client {
            return Ok(client.clone());
        }

        let info = &self.devices[index].info;
        let adapter = self.adapters.get(info.kind)?;
        let handle = adapter.open(&info.transport, self.passphrase_encoding)?;
        let client = ActiveClient {
            id: ClientId::new(self.next_client),
            kind: info.kind,
            device_id: info.device_id.clone(),
            handle,
        };
        self.next_client += 1;
        info!("Opened {} for device {}", client.id, client.device_id);
        self.devices[index].client = Some(client.clone());
        Ok(client)
    }

    /// Whether a client with this id is open on any device
    pub fn is_open(&self, id: ClientId) -> bool {
        self.devices
            .iter()
            .any(|d| d.client.as_ref().is_some_and(|c| c.id == id))
    }

    /// Close the device's client. Close errors are logged, never returned.
    pub fn close_client(&mut self, device_id: &str) -> Option<ClientId> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.info.device_id == device_id)?;
        let client = device.client.take()?;
        close_quietly(&client);
        Some(client.id)
    }

    pub fn close_all(&mut self) -> Vec<ClientId> {
        self.devices
            .iter_mut()
            .filter_map(|d| d.client.take())
            .map(|client| {
                close_quietly(&client);
                client.id
            })
            .collect()
    }
}

fn close_quietly(client: &ActiveClient) {
    match client.handle.close() {
        Ok(()) => debug!("Closed {}", client.id),
        Err(e) => warn!("Closing {} failed: {}", client.id, e),
    }
}
