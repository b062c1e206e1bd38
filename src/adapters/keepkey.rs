//! Keepkey adapter
//!
//! The Keepkey binding is a fork of the Trezor one and shares its device model, but it
//! reports every firmware failure as a generic call exception carrying a numeric code.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PassphraseEncoding;
use crate::error::{HwError, HwResult};
use crate::model::{
    CipherOutput, DeviceInfo, InitSettings, LifecycleOutcome, PublicNode, SignTxRequest, SignedTx,
    Transport, TransportSet, VendorKind, VendorPath,
};
use crate::ports::{DeviceSettings, KeyReader, Signer, ValueCipher, VendorAdapter, VendorClient};

use super::{
    path_indices, settle_lifecycle, tx_specs, FirmwareDescriptor, FirmwareFeatures, SeedInit,
    TxInputSpec, TxOutputSpec,
};

const FAILURE_ACTION_CANCELLED: u32 = 4;
const FAILURE_PIN_CANCELLED: u32 = 6;
const FAILURE_PIN_INVALID: u32 = 7;

/// Failure reported by the Keepkey binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepkeyFailure {
    /// Firmware answered with a `Failure` message
    Call { code: u32, message: String },
    /// HID or WebUSB I/O failed
    Connection { message: String },
}

impl KeepkeyFailure {
    fn into_hw(self, operation: &str) -> HwError {
        match self {
            KeepkeyFailure::Call { code, .. }
                if code == FAILURE_ACTION_CANCELLED || code == FAILURE_PIN_CANCELLED =>
            {
                HwError::Cancelled
            }
            KeepkeyFailure::Call { message, .. } if message.to_lowercase().contains("cancel") => {
                HwError::Cancelled
            }
            KeepkeyFailure::Call { code, message } if code == FAILURE_PIN_INVALID => {
                HwError::PinRequired { message }
            }
            KeepkeyFailure::Call { message, .. } => HwError::vendor(operation, message),
            KeepkeyFailure::Connection { message } => HwError::Disconnected { reason: message },
        }
    }
}

pub trait KeepkeySdk: Send + Sync {
    fn enumerate(&self, transports: &TransportSet)
        -> Result<Vec<FirmwareDescriptor>, KeepkeyFailure>;

    /// Open a client that normalises passphrases with `encoding` before sending them
    fn connect(
        &self,
        transport: &Transport,
        encoding: PassphraseEncoding,
    ) -> Result<Arc<dyn KeepkeyLink>, KeepkeyFailure>;

    fn wipe_device(&self, device_id: &str) -> Result<LifecycleOutcome, KeepkeyFailure>;

    fn recover_device(
        &self,
        device_id: &str,
        init: &SeedInit,
    ) -> Result<LifecycleOutcome, KeepkeyFailure>;

    fn reset_device(
        &self,
        device_id: &str,
        init: &SeedInit,
    ) -> Result<LifecycleOutcome, KeepkeyFailure>;
}

pub trait KeepkeyLink: Send + Sync {
    fn features(&self) -> FirmwareFeatures;

    fn get_address(
        &self,
        coin: &str,
        path: &[u32],
        show_display: bool,
    ) -> Result<String, KeepkeyFailure>;

    fn get_public_node(&self, path: &[u32]) -> Result<PublicNode, KeepkeyFailure>;

    fn sign_tx(
        &self,
        coin: &str,
        inputs: &[TxInputSpec<Vec<u32>>],
        outputs: &[TxOutputSpec<Vec<u32>>],
    ) -> Result<Vec<u8>, KeepkeyFailure>;

    fn sign_message(&self, coin: &str, path: &[u32], message: &str)
        -> Result<Vec<u8>, KeepkeyFailure>;

    fn encrypt_keyvalue(
        &self,
        path: &[u32],
        key: &str,
        value: &[u8],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> Result<Vec<u8>, KeepkeyFailure>;

    fn decrypt_keyvalue(
        &self,
        path: &[u32],
        key: &str,
        value: &[u8],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> Result<Vec<u8>, KeepkeyFailure>;

    fn change_pin(&self, remove: bool) -> Result<(), KeepkeyFailure>;

    fn apply_settings(&self, use_passphrase: bool) -> Result<(), KeepkeyFailure>;

    fn firmware_update(&self, firmware: &[u8]) -> Result<(), KeepkeyFailure>;

    fn cancel(&self) -> Result<(), KeepkeyFailure>;

    fn clear_session(&self) -> Result<(), KeepkeyFailure>;

    fn close(&self) -> Result<(), KeepkeyFailure>;
}

pub struct KeepkeyAdapter {
    sdk: Arc<dyn KeepkeySdk>,
}

impl KeepkeyAdapter {
    pub fn new(sdk: Arc<dyn KeepkeySdk>) -> Self {
        Self { sdk }
    }
}

impl VendorAdapter for KeepkeyAdapter {
    fn kind(&self) -> VendorKind {
        VendorKind::Keepkey
    }

    fn list_devices(&self, transports: &TransportSet) -> HwResult<Vec<DeviceInfo>> {
        let found = self
            .sdk
            .enumerate(transports)
            .map_err(|e| e.into_hw("enumerate"))?;
        debug!("Keepkey enumeration found {} device(s)", found.len());

        Ok(found
            .into_iter()
            .filter(|d| transports.allows(d.transport.kind))
            .map(|d| DeviceInfo {
                kind: VendorKind::Keepkey,
                device_id: d.features.device_id,
                label: d.features.label,
                model: d.features.model,
                transport: d.transport,
                initialized: d.features.initialized,
                bootloader_mode: d.features.bootloader_mode,
            })
            .collect())
    }

    fn open(
        &self,
        transport: &Transport,
        encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>> {
        let link = self
            .sdk
            .connect(transport, encoding)
            .map_err(|e| match e {
                KeepkeyFailure::Connection { message } => HwError::ConnectionFailed { reason: message },
                other => other.into_hw("connect"),
            })?;
        info!("Opened Keepkey client on {} ({:?} passphrases)", transport, encoding);
        Ok(Arc::new(KeepkeyClient { link }))
    }

    fn wipe(&self, device_id: &str) -> HwResult<LifecycleOutcome> {
        let result = self
            .sdk
            .wipe_device(device_id)
            .map_err(|e| e.into_hw("wipe_device"));
        settle_lifecycle(device_id, result)
    }

    fn recover(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        let result = self
            .sdk
            .recover_device(device_id, &SeedInit::from(settings))
            .map_err(|e| e.into_hw("recover_device"));
        settle_lifecycle(device_id, result)
    }

    fn reset(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        let result = self
            .sdk
            .reset_device(device_id, &SeedInit::from(settings))
            .map_err(|e| e.into_hw("reset_device"));
        settle_lifecycle(device_id, result)
    }
}

struct KeepkeyClient {
    link: Arc<dyn KeepkeyLink>,
}

impl KeepkeyClient {
    fn node_key(&self, path: &[u32], operation: &str) -> HwResult<Vec<u8>> {
        self.link
            .get_public_node(path)
            .map(|node| node.public_key)
            .map_err(|e| e.into_hw(operation))
    }
}

impl KeyReader for KeepkeyClient {
    fn get_address(&self, coin: &str, path: &VendorPath, show_on_device: bool) -> HwResult<String> {
        self.link
            .get_address(coin, &path_indices(path)?, show_on_device)
            .map_err(|e| e.into_hw("get_address"))
    }

    fn get_public_node(&self, _coin: &str, path: &VendorPath) -> HwResult<PublicNode> {
        self.link
            .get_public_node(&path_indices(path)?)
            .map_err(|e| e.into_hw("get_public_node"))
    }
}

impl Signer for KeepkeyClient {
    fn sign_tx(&self, coin: &str, request: &SignTxRequest) -> HwResult<SignedTx> {
        let (inputs, outputs) = tx_specs(request, |path| path.indices());
        let raw_tx = self
            .link
            .sign_tx(coin, &inputs, &outputs)
            .map_err(|e| e.into_hw("sign_tx"))?;
        Ok(SignedTx {
            raw_tx,
            total_amount: request.total_output_amount(),
        })
    }

    fn sign_message(&self, coin: &str, path: &VendorPath, message: &str) -> HwResult<Vec<u8>> {
        self.link
            .sign_message(coin, &path_indices(path)?, message)
            .map_err(|e| e.into_hw("sign_message"))
    }
}

impl ValueCipher for KeepkeyClient {
    fn encrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        let path = path_indices(path)?;
        let data = self
            .link
            .encrypt_keyvalue(&path, label, value, ask_on_encrypt, ask_on_decrypt)
            .map_err(|e| e.into_hw("encrypt_value"))?;
        Ok(CipherOutput {
            data,
            public_key: self.node_key(&path, "encrypt_value")?,
        })
    }

    fn decrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        let path = path_indices(path)?;
        let data = self
            .link
            .decrypt_keyvalue(&path, label, value, ask_on_encrypt, ask_on_decrypt)
            .map_err(|e| e.into_hw("decrypt_value"))?;
        Ok(CipherOutput {
            data,
            public_key: self.node_key(&path, "decrypt_value")?,
        })
    }
}

impl DeviceSettings for KeepkeyClient {
    fn change_pin(&self, remove: bool) -> HwResult<()> {
        self.link
            .change_pin(remove)
            .map_err(|e| e.into_hw("change_pin"))
    }

    fn enable_passphrase(&self, enabled: bool) -> HwResult<()> {
        self.link
            .apply_settings(enabled)
            .map_err(|e| e.into_hw("enable_passphrase"))
    }

    fn set_passphrase_always_on_device(&self, _enabled: bool) -> HwResult<()> {
        Err(HwError::unsupported(
            "Keepkey has no option to enter the passphrase on the device",
        ))
    }

    fn set_wipe_code(&self, _enabled: bool) -> HwResult<()> {
        Err(HwError::unsupported("Keepkey does not support a wipe code"))
    }

    fn firmware_update(&self, firmware: &[u8]) -> HwResult<()> {
        if !self.link.features().bootloader_mode {
            return Err(HwError::invalid_argument(
                "Keepkey must be in bootloader mode to update firmware",
            ));
        }
        self.link
            .firmware_update(firmware)
            .map_err(|e| e.into_hw("firmware_update"))
    }
}

impl VendorClient for KeepkeyClient {
    fn kind(&self) -> VendorKind {
        VendorKind::Keepkey
    }

    fn label(&self) -> String {
        self.link.features().label
    }

    fn firmware_version(&self) -> HwResult<String> {
        Ok(self.link.features().version())
    }

    fn supports_cancel(&self) -> bool {
        true
    }

    fn cancel(&self) -> HwResult<()> {
        self.link.cancel().map_err(|e| e.into_hw("cancel"))
    }

    fn clear_session(&self) -> HwResult<()> {
        self.link
            .clear_session()
            .map_err(|e| e.into_hw("clear_session"))
    }

    fn close(&self) -> HwResult<()> {
        self.link.close().map_err(|e| e.into_hw("close"))
    }
}
