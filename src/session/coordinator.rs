//! Session lifecycle
//!
//! The coordinator owns the device registry, the identity read from the selected device
//! and the per-client locks. It walks the session through
//! `Disconnected -> Selecting -> Connecting -> Initiating -> Ready` and back.
//!
//! `connect` and `disconnect` are expected to be driven by one coordinating thread. They
//! are still serialised internally so a stray call from elsewhere cannot interleave with a
//! connect in progress.
//!
//! Every vendor kind whose client was opened stays recorded for the life of the coordinator.
//! On platforms where two vendor SDKs cannot share a process, a kind conflicting with one of
//! those is refused until restart.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::adapters::AdapterSet;
use crate::config::HwConfig;
use crate::error::{HwError, HwResult};
use crate::logic::{hd_tree_identity, validate_address, HdTreeIdentity};
use crate::model::{Bip32Path, ClientId, DeviceInfo, Network, VendorKind, VendorPath};
use crate::ports::{BlockingTaskRunner, DeviceSelector, TaskPrompt, VendorAdapter, VendorClient};

use super::address_cache::AddressCache;
use super::locks::ClientLocks;
use super::registry::{ActiveClient, DeviceRegistry};

/// Delay before the busy prompt appears for calls that usually answer at once
pub const PROMPT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Selecting,
    Connecting,
    Initiating,
    Ready,
}

/// Notifications for whoever renders connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        kind: VendorKind,
        device_id: String,
        label: String,
    },
    Disconnected,
    ConnectionError {
        message: String,
        help_url: Option<String>,
    },
}

/// What the session learned about the seed when it was initiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub base_path: Bip32Path,
    pub base_public_key: Vec<u8>,
}

struct Inner {
    registry: DeviceRegistry,
    identity: Option<SessionIdentity>,
    state: SessionState,
}

pub struct SessionCoordinator<R> {
    config: RwLock<HwConfig>,
    runner: R,
    selector: Box<dyn DeviceSelector>,
    inner: Mutex<Inner>,
    connect_gate: ReentrantMutex<()>,
    locks: ClientLocks,
    cache: Mutex<AddressCache>,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
    loaded_sdks: Mutex<Vec<VendorKind>>,
}

impl<R: BlockingTaskRunner> SessionCoordinator<R> {
    pub fn new(
        config: HwConfig,
        adapters: AdapterSet,
        runner: R,
        selector: Box<dyn DeviceSelector>,
        cache: AddressCache,
    ) -> HwResult<Self> {
        config.validate()?;
        let mut registry =
            DeviceRegistry::new(adapters, config.vendors_to_enumerate(), config.transports);
        registry.set_passphrase_encoding(config.passphrase_encoding);
        Ok(Self {
            config: RwLock::new(config),
            runner,
            selector,
            inner: Mutex::new(Inner {
                registry,
                identity: None,
                state: SessionState::Disconnected,
            }),
            connect_gate: ReentrantMutex::new(()),
            locks: ClientLocks::new(),
            cache: Mutex::new(cache),
            subscribers: Mutex::new(Vec::new()),
            loaded_sdks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> HwConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. A changed vendor preference or passphrase encoding takes
    /// effect on the next connect that opens a client.
    pub fn update_config(&self, config: HwConfig) -> HwResult<()> {
        config.validate()?;
        {
            let mut inner = self.inner.lock();
            inner
                .registry
                .set_scope(config.vendors_to_enumerate(), config.transports);
            inner.registry.set_passphrase_encoding(config.passphrase_encoding);
        }
        *self.config.write() = config;
        Ok(())
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Client of the session, once it is ready for device operations
    pub fn active_client(&self) -> Option<ActiveClient> {
        let inner = self.inner.lock();
        if inner.state != SessionState::Ready {
            return None;
        }
        inner.registry.selected_client().cloned()
    }

    /// Device the session currently holds a client for
    pub fn active_device_id(&self) -> Option<String> {
        self.open_client().map(|client| client.device_id)
    }

    pub fn session_identity(&self) -> Option<SessionIdentity> {
        self.inner.lock().identity.clone()
    }

    /// Fingerprint of the seed on the connected device for `coin`
    pub fn hd_tree_identity(&self, coin: &str) -> HwResult<HdTreeIdentity> {
        if coin.is_empty() {
            return Err(HwError::invalid_argument("coin name is required"));
        }
        let inner = self.inner.lock();
        let identity = inner.identity.as_ref().ok_or(HwError::NotConnected)?;
        Ok(hd_tree_identity(&identity.base_public_key, coin))
    }

    pub fn address_cache(&self) -> MutexGuard<'_, AddressCache> {
        self.cache.lock()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.inner.lock().registry.device_infos()
    }

    /// Number of client locks currently tracked
    pub fn client_lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Vendor kinds whose SDK has served a client in this process
    pub fn loaded_sdks(&self) -> Vec<VendorKind> {
        self.loaded_sdks.lock().clone()
    }

    /// Refuse `kind` when the platform cannot load its SDK next to one already in use
    pub fn check_sdk_compatible(&self, kind: VendorKind) -> HwResult<()> {
        let platform = self.config.read().platform;
        let loaded = self.loaded_sdks.lock();
        match loaded.iter().find(|other| platform.sdks_conflict(**other, kind)) {
            Some(other) => Err(HwError::PlatformConflict {
                message: format!(
                    "The {} and {} libraries cannot be used together on this platform. \
                     Restart the application to switch to {}.",
                    other, kind, kind
                ),
            }),
            None => Ok(()),
        }
    }

    pub fn adapter(&self, kind: VendorKind) -> HwResult<Arc<dyn VendorAdapter>> {
        self.inner.lock().registry.adapter(kind)
    }

    /// Look a device up by id, enumerating first if that never happened
    pub fn find_device(&self, device_id: &str) -> HwResult<DeviceInfo> {
        let mut inner = self.inner.lock();
        inner.registry.load(false);
        inner
            .registry
            .find(device_id)
            .map(|device| device.info().clone())
            .ok_or_else(|| HwError::NotFound {
                device_id: device_id.to_string(),
            })
    }

    /// Re-enumerate devices. Any open client is closed and the session ends.
    pub fn reload_devices(&self) -> Vec<DeviceInfo> {
        let _gate = self.connect_gate.lock();
        let (closed, devices) = {
            let mut inner = self.inner.lock();
            let closed = inner.registry.load(true);
            if !closed.is_empty() {
                inner.identity = None;
                inner.state = SessionState::Disconnected;
            }
            (closed, inner.registry.device_infos())
        };
        self.forget_clients(&closed);
        devices
    }

    /// Make sure the session is `Ready` and return its client.
    ///
    /// With `force_reload` the device list is enumerated again, which closes any open client.
    pub fn connect(&self, force_reload: bool) -> HwResult<ActiveClient> {
        let _gate = self.connect_gate.lock();
        let config = self.config();

        if let Some(preferred) = config.vendor_preference {
            self.check_sdk_compatible(preferred)?;
        }
        if let Some(client) = self.open_client() {
            if config.vendor_preference.is_some_and(|kind| kind != client.kind) {
                info!(
                    "Open client is a {} but {:?} is preferred, disconnecting",
                    client.kind, config.vendor_preference
                );
                self.close_session();
            }
        }

        let pending = {
            let mut inner = self.inner.lock();
            let reload = force_reload
                || inner.registry.devices().is_empty()
                || inner.registry.selected_client().is_none();
            let closed = if reload {
                inner.registry.load(true)
            } else {
                Vec::new()
            };
            if !closed.is_empty() {
                inner.identity = None;
            }
            let open = inner.registry.selected_client().cloned();
            let pending = match open {
                Some(client) if inner.identity.is_some() => {
                    inner.state = SessionState::Ready;
                    Ok(client)
                }
                other => Err(other),
            };
            drop(inner);
            self.forget_clients(&closed);
            pending
        };

        let client = match pending {
            Ok(ready) => return Ok(ready),
            // Left open by a PIN failure; initiate again without reopening
            Err(Some(client)) => client,
            Err(None) => self.select_and_open()?,
        };

        self.initiate(&client, &config)?;
        self.check_network_support(&client, &config)?;

        self.inner.lock().state = SessionState::Ready;
        info!("Connected to {} device {}", client.kind, client.device_id);
        self.emit(SessionEvent::Connected {
            kind: client.kind,
            device_id: client.device_id.clone(),
            label: client.handle.label(),
        });
        Ok(client)
    }

    /// Close the session client and forget the session identity
    pub fn disconnect(&self) {
        let _gate = self.connect_gate.lock();
        self.close_session();
    }

    /// Run `work` against `client` under the client's lock, through the task runner.
    ///
    /// A client closed while the caller waited for its lock is never called; that yields
    /// `Disconnected`. When `work` reports a lost connection the client is closed before the
    /// lock is released. The lock guard is dropped before returning, whatever the outcome.
    pub(crate) fn run_guarded<T, F>(
        &self,
        client: &ActiveClient,
        prompt: &TaskPrompt,
        work: F,
    ) -> HwResult<T>
    where
        T: Send,
        F: FnOnce(&dyn VendorClient) -> HwResult<T> + Send,
    {
        let lock = self.locks.lock_for(client.id);
        let _guard = lock.lock();

        if !self.inner.lock().registry.is_open(client.id) {
            debug!("{} was closed while waiting for its lock", client.id);
            self.locks.remove(client.id);
            return Err(HwError::Disconnected {
                reason: format!("{} is no longer connected", client.device_id),
            });
        }

        let device = Arc::clone(&client.handle);
        let cancel_target = Arc::clone(&client.handle);
        let cancel_hook = move || request_cancel(cancel_target.as_ref());
        let result = self
            .runner
            .run_blocking(prompt, move || work(device.as_ref()), &cancel_hook);

        if let Err(e @ HwError::Disconnected { .. }) = &result {
            warn!("{} lost: {}", client.device_id, e);
            self.retire_client(client.id);
        }
        result
    }

    fn open_client(&self) -> Option<ActiveClient> {
        self.inner.lock().registry.selected_client().cloned()
    }

    fn set_state(&self, state: SessionState) {
        self.inner.lock().state = state;
    }

    fn select_and_open(&self) -> HwResult<ActiveClient> {
        let devices = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Selecting;
            inner.registry.device_infos()
        };

        let device_id = match devices.as_slice() {
            [] => {
                self.set_state(SessionState::Disconnected);
                return Err(HwError::NoDeviceDetected);
            }
            [only] => only.device_id.clone(),
            _ => match self.selector.select_device(&devices) {
                Some(device_id) => device_id,
                None => {
                    debug!("Device selection cancelled");
                    self.set_state(SessionState::Disconnected);
                    return Err(HwError::Cancelled);
                }
            },
        };

        let kind = devices
            .iter()
            .find(|d| d.device_id == device_id)
            .map(|d| d.kind);
        if let Some(Err(e)) = kind.map(|kind| self.check_sdk_compatible(kind)) {
            warn!("Not opening {}: {}", device_id, e);
            self.set_state(SessionState::Disconnected);
            self.report_error(&e);
            return Err(e);
        }

        let opened = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Connecting;
            let opened = match inner.registry.select(&device_id) {
                Ok(()) => inner.registry.open_client(&device_id),
                Err(e) => Err(e),
            };
            if opened.is_err() {
                inner.state = SessionState::Disconnected;
            }
            opened
        };

        match opened {
            Ok(client) => {
                let mut loaded = self.loaded_sdks.lock();
                if !loaded.contains(&client.kind) {
                    loaded.push(client.kind);
                }
                Ok(client)
            }
            Err(e) => {
                error!("Cannot open device {}: {}", device_id, e);
                self.report_error(&e);
                Err(e)
            }
        }
    }

    fn initiate(&self, client: &ActiveClient, config: &HwConfig) -> HwResult<()> {
        self.set_state(SessionState::Initiating);
        let coin = config.network.coin_name();
        let base_path = config.network.base_path();
        let path = VendorPath::new(client.kind.path_form(), &base_path);
        let prompt = TaskPrompt::busy().with_delay(PROMPT_DELAY);

        let result = self
            .run_guarded(client, &prompt, |device| device.get_public_node(coin, &path))
            .and_then(|node| {
                if node.public_key.is_empty() {
                    Err(HwError::vendor(
                        "get_public_node",
                        "Couldn't read data from the hardware wallet",
                    ))
                } else {
                    Ok(node)
                }
            });

        match result {
            Ok(node) => {
                let identity = hd_tree_identity(&node.public_key, coin);
                debug!("Session initiated, tree identity {}", identity);
                self.cache.lock().retain_only(&identity);
                self.inner.lock().identity = Some(SessionIdentity {
                    base_path,
                    base_public_key: node.public_key,
                });
                Ok(())
            }
            Err(HwError::Cancelled) => {
                info!("Session initiation cancelled");
                request_cancel(client.handle.as_ref());
                self.close_session();
                Err(HwError::Cancelled)
            }
            Err(e @ HwError::PinRequired { .. }) => {
                warn!("PIN error while initiating session: {}", e);
                if let Err(clear) = client.handle.clear_session() {
                    warn!("Clearing device session failed: {}", clear);
                }
                self.set_state(SessionState::Connecting);
                self.report_error(&e);
                Err(e)
            }
            Err(e) => {
                error!("Initiating session on {} failed: {}", client.device_id, e);
                self.close_session();
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// Reject devices that cannot produce addresses for the test network
    fn check_network_support(&self, client: &ActiveClient, config: &HwConfig) -> HwResult<()> {
        if config.network != Network::Testnet {
            return Ok(());
        }
        let coin = config.network.coin_name();
        let path = VendorPath::new(
            client.kind.path_form(),
            &config.network.default_address_path(),
        );

        let supported = match self.run_guarded(client, &TaskPrompt::busy(), |device| {
            device.get_address(coin, &path, false)
        }) {
            Ok(address) => {
                let valid = validate_address(&address, config.network);
                if !valid {
                    warn!("Device returned {} which is not a testnet address", address);
                }
                valid
            }
            Err(e @ HwError::Disconnected { .. }) => {
                self.close_session();
                return Err(e);
            }
            Err(e) => {
                if !e.to_string().contains("Invalid coin name") {
                    error!("Testnet address check failed: {}", e);
                }
                false
            }
        };
        if supported {
            return Ok(());
        }

        self.close_session();
        let err = HwError::CapabilityUnsupported {
            detail: format!(
                "Your hardware wallet device ({}) does not support Dash TESTNET",
                client.kind
            ),
            help_url: config.testnet_help_url.clone(),
        };
        self.report_error(&err);
        Err(err)
    }

    fn close_session(&self) {
        let closed = {
            let mut inner = self.inner.lock();
            inner.identity = None;
            inner.state = SessionState::Disconnected;
            let device_id = inner
                .registry
                .selected_client()
                .map(|client| client.device_id.clone());
            device_id.and_then(|id| inner.registry.close_client(&id))
        };
        if let Some(id) = closed {
            info!("Session closed {}", id);
            self.forget_clients(&[id]);
        }
    }

    /// Close `id` if it is still open, ending the session when it was the session's client
    fn retire_client(&self, id: ClientId) {
        let closed = {
            let mut inner = self.inner.lock();
            let owner = inner
                .registry
                .devices()
                .iter()
                .find(|d| d.client().is_some_and(|c| c.id == id))
                .map(|d| d.info().device_id.clone());
            let selected = inner.registry.selected_client().is_some_and(|c| c.id == id);
            let closed = owner.and_then(|device_id| inner.registry.close_client(&device_id));
            if closed.is_some() && selected {
                inner.identity = None;
                inner.state = SessionState::Disconnected;
            }
            closed
        };
        if let Some(id) = closed {
            info!("Closed {} after losing the device", id);
            self.forget_clients(&[id]);
        }
    }

    fn forget_clients(&self, closed: &[ClientId]) {
        for id in closed {
            self.locks.remove(*id);
        }
        if !closed.is_empty() {
            self.emit(SessionEvent::Disconnected);
        }
    }

    fn report_error(&self, err: &HwError) {
        self.emit(SessionEvent::ConnectionError {
            message: err.to_string(),
            help_url: err.help_url().map(str::to_string),
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Ask the device to abort its pending call. Returns whether the request could be sent.
fn request_cancel(client: &dyn VendorClient) -> bool {
    if !client.supports_cancel() {
        return false;
    }
    if let Err(e) = client.cancel() {
        warn!("Cancel request failed: {}", e);
    }
    true
}
