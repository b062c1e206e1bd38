//! Scriptable in-memory vendor for session and dispatcher tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::PassphraseEncoding;
use crate::error::{HwError, HwResult};
use crate::model::{
    CipherOutput, DeviceInfo, InitSettings, LifecycleOutcome, PublicNode, SignTxRequest,
    SignedTx, Transport, TransportKind, TransportSet, VendorKind, VendorPath,
};
use crate::ports::{DeviceSettings, KeyReader, Signer, ValueCipher, VendorAdapter, VendorClient};

pub fn mainnet_address(seed: u8) -> String {
    encode_address(76, seed)
}

pub fn testnet_address(seed: u8) -> String {
    encode_address(140, seed)
}

fn encode_address(version: u8, seed: u8) -> String {
    let mut payload = vec![version];
    payload.extend_from_slice(&[seed; 20]);
    bs58::encode(payload).with_check().into_string()
}

/// One call that reached the fake device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub device_id: String,
    pub path: Option<VendorPath>,
}

/// Shared by the adapter and every client it opens
pub struct FakeState {
    pub calls: Mutex<Vec<Call>>,
    /// Consumed by the first call with a matching operation name
    pub failures: Mutex<Vec<(&'static str, HwError)>>,
    pub list_failure: Mutex<Option<HwError>>,
    pub open_failure: Mutex<Option<HwError>>,
    pub address_override: Mutex<Option<String>>,
    pub supports_testnet: AtomicBool,
    pub public_key: Mutex<Vec<u8>>,
    pub delay: Mutex<Duration>,
    /// Operation that blocks until `cancel` is called on its client
    pub block_until_cancel: Mutex<Option<&'static str>>,
    cancel_requested: AtomicBool,
    pub opened: AtomicUsize,
    /// Encoding passed to the latest `open`
    pub opened_with: Mutex<Option<PassphraseEncoding>>,
    pub closed: AtomicUsize,
    pub cancels: AtomicUsize,
    pub cleared_sessions: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub spans: Mutex<Vec<(Instant, Instant)>>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            list_failure: Mutex::new(None),
            open_failure: Mutex::new(None),
            address_override: Mutex::new(None),
            supports_testnet: AtomicBool::new(true),
            public_key: Mutex::new(vec![2; 33]),
            delay: Mutex::new(Duration::ZERO),
            block_until_cancel: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            opened_with: Mutex::new(None),
            closed: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            cleared_sessions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            spans: Mutex::new(Vec::new()),
        }
    }
}

impl FakeState {
    pub fn fail_next(&self, operation: &'static str, error: HwError) {
        self.failures.lock().push((operation, error));
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    fn call(&self, operation: &'static str, device_id: &str, path: Option<&VendorPath>) -> HwResult<()> {
        self.calls.lock().push(Call {
            operation,
            device_id: device_id.to_string(),
            path: path.cloned(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let start = Instant::now();

        let result = self.perform(operation);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().push((start, Instant::now()));
        result
    }

    fn perform(&self, operation: &'static str) -> HwResult<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if *self.block_until_cancel.lock() == Some(operation) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if self.cancel_requested.swap(false, Ordering::SeqCst) {
                    return Err(HwError::Cancelled);
                }
                thread::sleep(Duration::from_millis(2));
            }
        }

        let mut failures = self.failures.lock();
        match failures.iter().position(|(op, _)| *op == operation) {
            Some(index) => Err(failures.remove(index).1),
            None => Ok(()),
        }
    }
}

pub struct FakeVendor {
    kind: VendorKind,
    devices: Mutex<Vec<DeviceInfo>>,
    pub state: Arc<FakeState>,
}

impl FakeVendor {
    pub fn new(kind: VendorKind) -> Self {
        Self {
            kind,
            devices: Mutex::new(Vec::new()),
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn with_device(self, device_id: &str, label: &str) -> Self {
        self.devices.lock().push(DeviceInfo {
            kind: self.kind,
            device_id: device_id.to_string(),
            label: label.to_string(),
            model: "fake".to_string(),
            transport: Transport {
                kind: TransportKind::Hid,
                path: format!("hid:{device_id}"),
            },
            initialized: true,
            bootloader_mode: false,
        });
        self
    }

    pub fn unplug_all(&self) {
        self.devices.lock().clear();
    }

    /// Recover and reset erase the device first, so a cancel there still re-identifies it
    fn lifecycle(
        &self,
        operation: &'static str,
        device_id: &str,
        new_id: String,
        erases_first: bool,
    ) -> HwResult<LifecycleOutcome> {
        match self.state.call(operation, device_id, None) {
            Ok(()) => Ok(LifecycleOutcome::completed(new_id)),
            Err(HwError::Cancelled) if erases_first => Ok(LifecycleOutcome::cancelled(new_id)),
            Err(HwError::Cancelled) => Ok(LifecycleOutcome::cancelled(device_id)),
            Err(e) => Err(e),
        }
    }
}

impl VendorAdapter for FakeVendor {
    fn kind(&self) -> VendorKind {
        self.kind
    }

    fn list_devices(&self, _transports: &TransportSet) -> HwResult<Vec<DeviceInfo>> {
        if let Some(error) = self.state.list_failure.lock().take() {
            return Err(error);
        }
        Ok(self.devices.lock().clone())
    }

    fn open(
        &self,
        transport: &Transport,
        encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>> {
        if let Some(error) = self.state.open_failure.lock().take() {
            return Err(error);
        }
        let device = self
            .devices
            .lock()
            .iter()
            .find(|d| &d.transport == transport)
            .cloned()
            .ok_or_else(|| HwError::ConnectionFailed {
                reason: format!("nothing at {transport}"),
            })?;
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        *self.state.opened_with.lock() = Some(encoding);
        Ok(Arc::new(FakeClient {
            kind: self.kind,
            device_id: device.device_id,
            label: device.label,
            state: Arc::clone(&self.state),
        }))
    }

    fn wipe(&self, device_id: &str) -> HwResult<LifecycleOutcome> {
        self.lifecycle("wipe", device_id, format!("{device_id}-wiped"), false)
    }

    fn recover(&self, device_id: &str, _settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        self.lifecycle("recover", device_id, format!("{device_id}-recovered"), true)
    }

    fn reset(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        let new_id = format!("{device_id}-reset-{}", settings.word_count.strength_bits());
        self.lifecycle("reset", device_id, new_id, true)
    }
}

pub struct FakeClient {
    kind: VendorKind,
    device_id: String,
    label: String,
    state: Arc<FakeState>,
}

impl FakeClient {
    fn call(&self, operation: &'static str, path: Option<&VendorPath>) -> HwResult<()> {
        self.state.call(operation, &self.device_id, path)
    }
}

impl KeyReader for FakeClient {
    fn get_address(&self, coin: &str, path: &VendorPath, _show_on_device: bool) -> HwResult<String> {
        self.call("get_address", Some(path))?;
        if let Some(address) = self.state.address_override.lock().clone() {
            return Ok(address);
        }
        let testnet = coin.ends_with("Testnet") && self.state.supports_testnet.load(Ordering::SeqCst);
        Ok(if testnet {
            testnet_address(1)
        } else {
            mainnet_address(1)
        })
    }

    fn get_public_node(&self, _coin: &str, path: &VendorPath) -> HwResult<PublicNode> {
        self.call("get_public_node", Some(path))?;
        Ok(PublicNode {
            xpub: format!("xpub-{}", self.device_id),
            public_key: self.state.public_key.lock().clone(),
        })
    }
}

impl Signer for FakeClient {
    fn sign_tx(&self, _coin: &str, request: &SignTxRequest) -> HwResult<SignedTx> {
        self.call("sign_tx", None)?;
        Ok(SignedTx {
            raw_tx: vec![0x01, 0x00, 0x00, 0x00],
            total_amount: request.total_output_amount(),
        })
    }

    fn sign_message(&self, _coin: &str, path: &VendorPath, _message: &str) -> HwResult<Vec<u8>> {
        self.call("sign_message", Some(path))?;
        Ok(vec![0x1f; 65])
    }
}

impl ValueCipher for FakeClient {
    fn encrypt_value(
        &self,
        path: &VendorPath,
        _label: &str,
        value: &[u8; 32],
        _ask_on_encrypt: bool,
        _ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        self.call("encrypt_value", Some(path))?;
        Ok(CipherOutput {
            data: value.iter().map(|b| b ^ 0xaa).collect(),
            public_key: self.state.public_key.lock().clone(),
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
        self.call("decrypt_value", Some(path))?;
        Ok(CipherOutput {
            data: value.iter().map(|b| b ^ 0xaa).collect(),
            public_key: self.state.public_key.lock().clone(),
        })
    }
}

impl DeviceSettings for FakeClient {
    fn change_pin(&self, _remove: bool) -> HwResult<()> {
        self.call("change_pin", None)
    }

    fn enable_passphrase(&self, _enabled: bool) -> HwResult<()> {
        self.call("enable_passphrase", None)
    }

    fn set_passphrase_always_on_device(&self, _enabled: bool) -> HwResult<()> {
        self.call("set_passphrase_always_on_device", None)
    }

    fn set_wipe_code(&self, _enabled: bool) -> HwResult<()> {
        self.call("set_wipe_code", None)
    }

    fn firmware_update(&self, _firmware: &[u8]) -> HwResult<()> {
        self.call("firmware_update", None)
    }
}

impl VendorClient for FakeClient {
    fn kind(&self) -> VendorKind {
        self.kind
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn firmware_version(&self) -> HwResult<String> {
        self.call("firmware_version", None)?;
        Ok("1.2.3".to_string())
    }

    fn supports_cancel(&self) -> bool {
        self.kind != VendorKind::LedgerNano
    }

    fn cancel(&self) -> HwResult<()> {
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
        self.state.cancel_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear_session(&self) -> HwResult<()> {
        self.state.cleared_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> HwResult<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests_for;
    use crate::ports::contract_tests::vendor_client_contract;

    fn make_client() -> Arc<dyn VendorClient> {
        let vendor = FakeVendor::new(VendorKind::Trezor).with_device("F1", "fake");
        let transport = vendor.list_devices(&TransportSet::default()).unwrap()[0]
            .transport
            .clone();
        vendor.open(&transport, PassphraseEncoding::Nfc).unwrap()
    }

    contract_tests_for!(
        fake_contract,
        make = make_client,
        tests = {
            get_address_is_valid => vendor_client_contract::test_get_address_is_valid,
            get_public_node => vendor_client_contract::test_get_public_node,
            address_and_pubkey_agree => vendor_client_contract::test_address_and_pubkey_agree,
            sign_message => vendor_client_contract::test_sign_message,
            firmware_version => vendor_client_contract::test_firmware_version,
            cancel_matches_support => vendor_client_contract::test_cancel_matches_support,
            close => vendor_client_contract::test_close,
        }
    );

    #[test]
    fn test_scripted_failure_is_consumed_once() {
        let vendor = FakeVendor::new(VendorKind::Keepkey).with_device("F3", "");
        let transport = vendor.list_devices(&TransportSet::default()).unwrap()[0]
            .transport
            .clone();
        let client = vendor.open(&transport, PassphraseEncoding::Nfc).unwrap();
        let path = VendorPath::Indices(vec![1]);

        vendor.state.fail_next("get_address", HwError::Cancelled);
        assert_eq!(
            client.get_address("Dash", &path, false).unwrap_err(),
            HwError::Cancelled
        );
        assert!(client.get_address("Dash", &path, false).is_ok());
        assert_eq!(vendor.state.calls_to("get_address").len(), 2);
    }

    #[test]
    fn test_testnet_support_toggle() {
        let vendor = FakeVendor::new(VendorKind::Trezor).with_device("F2", "");
        let transport = vendor.list_devices(&TransportSet::default()).unwrap()[0]
            .transport
            .clone();
        let client = vendor.open(&transport, PassphraseEncoding::Nfc).unwrap();
        let path = VendorPath::Indices(vec![1]);

        assert_eq!(
            client.get_address("Dash Testnet", &path, false).unwrap(),
            testnet_address(1)
        );
        vendor.state.supports_testnet.store(false, Ordering::SeqCst);
        assert_eq!(
            client.get_address("Dash Testnet", &path, false).unwrap(),
            mainnet_address(1)
        );
    }
}
