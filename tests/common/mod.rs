//! Recording vendor double shared by the scenario tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use hwkit::model::{
    CipherOutput, DeviceInfo, InitSettings, LifecycleOutcome, PublicNode, SignTxRequest,
    SignedTx, Transport, TransportKind, TransportSet, VendorKind, VendorPath,
};
use hwkit::ports::{
    DeviceSelector, DeviceSettings, KeyReader, Signer, ValueCipher, VendorAdapter, VendorClient,
};
use hwkit::{HwError, HwResult, PassphraseEncoding};
use parking_lot::Mutex;

pub const STUB_ADDRESS: &str = "XyzTestAddress1";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub operation: &'static str,
    pub device_id: String,
    pub path: Option<VendorPath>,
}

/// Everything the double saw, shared between the adapter and its clients
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<Recorded>>,
    pub spans: Mutex<Vec<(Instant, Instant)>>,
    pub address: Mutex<Option<String>>,
    pub delay: Mutex<Duration>,
    pub disconnect_next: AtomicBool,
    pub block_until_cancel: AtomicBool,
    cancelled: AtomicBool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub cancels: AtomicUsize,
}

impl Recorder {
    pub fn calls_to(&self, operation: &str) -> Vec<Recorded> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    fn enter(&self, operation: &'static str, device_id: &str, path: Option<&VendorPath>) -> HwResult<()> {
        self.calls.lock().push(Recorded {
            operation,
            device_id: device_id.to_string(),
            path: path.cloned(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let start = Instant::now();

        let result = self.work();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().push((start, Instant::now()));
        result
    }

    fn work(&self) -> HwResult<()> {
        let delay = *self.delay.lock();
        thread::sleep(delay);

        if self.block_until_cancel.swap(false, Ordering::SeqCst) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if self.cancelled.swap(false, Ordering::SeqCst) {
                    return Err(HwError::Cancelled);
                }
                thread::sleep(Duration::from_millis(2));
            }
        }
        if self.disconnect_next.swap(false, Ordering::SeqCst) {
            return Err(HwError::Disconnected {
                reason: "USB device unplugged".to_string(),
            });
        }
        Ok(())
    }
}

pub struct RecordingVendor {
    kind: VendorKind,
    devices: Vec<String>,
    pub recorder: Arc<Recorder>,
}

impl RecordingVendor {
    pub fn new(kind: VendorKind, devices: &[&str]) -> Self {
        Self {
            kind,
            devices: devices.iter().map(|d| d.to_string()).collect(),
            recorder: Arc::new(Recorder::default()),
        }
    }

    fn info(&self, device_id: &str) -> DeviceInfo {
        DeviceInfo {
            kind: self.kind,
            device_id: device_id.to_string(),
            label: format!("{device_id} label"),
            model: "T".to_string(),
            transport: Transport {
                kind: TransportKind::WebUsb,
                path: format!("webusb:{device_id}"),
            },
            initialized: true,
            bootloader_mode: false,
        }
    }
}

impl VendorAdapter for RecordingVendor {
    fn kind(&self) -> VendorKind {
        self.kind
    }

    fn list_devices(&self, _transports: &TransportSet) -> HwResult<Vec<DeviceInfo>> {
        Ok(self.devices.iter().map(|id| self.info(id)).collect())
    }

    fn open(
        &self,
        transport: &Transport,
        _encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>> {
        let device_id = transport
            .path
            .strip_prefix("webusb:")
            .ok_or_else(|| HwError::ConnectionFailed {
                reason: transport.path.clone(),
            })?;
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingClient {
            kind: self.kind,
            device_id: device_id.to_string(),
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn wipe(&self, device_id: &str) -> HwResult<LifecycleOutcome> {
        self.recorder.enter("wipe", device_id, None)?;
        Ok(LifecycleOutcome::completed(format!("{device_id}-new")))
    }

    fn recover(&self, device_id: &str, _settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        self.recorder.enter("recover", device_id, None)?;
        Ok(LifecycleOutcome::completed(format!("{device_id}-new")))
    }

    fn reset(&self, device_id: &str, _settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        self.recorder.enter("reset", device_id, None)?;
        Ok(LifecycleOutcome::completed(format!("{device_id}-new")))
    }
}

struct RecordingClient {
    kind: VendorKind,
    device_id: String,
    recorder: Arc<Recorder>,
}

impl RecordingClient {
    fn enter(&self, operation: &'static str, path: Option<&VendorPath>) -> HwResult<()> {
        self.recorder.enter(operation, &self.device_id, path)
    }
}

impl KeyReader for RecordingClient {
    fn get_address(&self, _coin: &str, path: &VendorPath, _show: bool) -> HwResult<String> {
        self.enter("get_address", Some(path))?;
        Ok(self
            .recorder
            .address
            .lock()
            .clone()
            .unwrap_or_else(|| STUB_ADDRESS.to_string()))
    }

    fn get_public_node(&self, _coin: &str, path: &VendorPath) -> HwResult<PublicNode> {
        self.enter("get_public_node", Some(path))?;
        Ok(PublicNode {
            xpub: format!("xpub-{}", self.device_id),
            public_key: vec![3; 33],
        })
    }
}

impl Signer for RecordingClient {
    fn sign_tx(&self, _coin: &str, request: &SignTxRequest) -> HwResult<SignedTx> {
        self.enter("sign_tx", None)?;
        Ok(SignedTx {
            raw_tx: vec![2, 0, 0, 0],
            total_amount: request.total_output_amount(),
        })
    }

    fn sign_message(&self, _coin: &str, path: &VendorPath, _message: &str) -> HwResult<Vec<u8>> {
        self.enter("sign_message", Some(path))?;
        Ok(vec![0x20; 65])
    }
}

impl ValueCipher for RecordingClient {
    fn encrypt_value(
        &self,
        path: &VendorPath,
        _label: &str,
        value: &[u8; 32],
        _ask_on_encrypt: bool,
        _ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        self.enter("encrypt_value", Some(path))?;
        Ok(CipherOutput {
            data: value.iter().rev().copied().collect(),
            public_key: vec![3; 33],
        })
    }

    fn decrypt_value(
        &self,
        path: &VendorPath,
        _label: &str,
        value: &[u8; 32],
        _ask_on_encrypt: bool,
        _ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        self.enter("decrypt_value", Some(path))?;
        Ok(CipherOutput {
            data: value.iter().rev().copied().collect(),
            public_key: vec![3; 33],
        })
    }
}

impl DeviceSettings for RecordingClient {
    fn change_pin(&self, _remove: bool) -> HwResult<()> {
        self.enter("change_pin", None)
    }

    fn enable_passphrase(&self, _enabled: bool) -> HwResult<()> {
        self.enter("enable_passphrase", None)
    }

    fn set_passphrase_always_on_device(&self, _enabled: bool) -> HwResult<()> {
        self.enter("set_passphrase_always_on_device", None)
    }

    fn set_wipe_code(&self, _enabled: bool) -> HwResult<()> {
        self.enter("set_wipe_code", None)
    }

    fn firmware_update(&self, _firmware: &[u8]) -> HwResult<()> {
        self.enter("firmware_update", None)
    }
}

impl VendorClient for RecordingClient {
    fn kind(&self) -> VendorKind {
        self.kind
    }

    fn label(&self) -> String {
        format!("{} label", self.device_id)
    }

    fn firmware_version(&self) -> HwResult<String> {
        Ok("2.6.0".to_string())
    }

    fn supports_cancel(&self) -> bool {
        self.kind != VendorKind::LedgerNano
    }

    fn cancel(&self) -> HwResult<()> {
        if !self.supports_cancel() {
            return Err(HwError::unsupported("no cancel primitive"));
        }
        self.recorder.cancels.fetch_add(1, Ordering::SeqCst);
        self.recorder.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> HwResult<()> {
        self.recorder.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Selects a fixed device id and counts how often it was asked
pub struct PickById {
    pub device_id: String,
    pub asked: Arc<AtomicUsize>,
}

impl PickById {
    pub fn new(device_id: &str) -> (Self, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        (
            Self {
                device_id: device_id.to_string(),
                asked: Arc::clone(&asked),
            },
            asked,
        )
    }
}

impl DeviceSelector for PickById {
    fn select_device(&self, devices: &[DeviceInfo]) -> Option<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        devices
            .iter()
            .find(|d| d.device_id == self.device_id)
            .map(|d| d.device_id.clone())
    }
}
