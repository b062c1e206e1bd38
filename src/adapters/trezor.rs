//! Trezor adapter
//!
//! Talks to Trezor devices through a `TrezorSdk` binding. The binding addresses keys by
//! index arrays and signals failures with `TrezorFailure`.

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

/// Failure reported by the Trezor binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrezorFailure {
    /// The user pressed cancel on the device, or a cancel request arrived
    ActionCancelled,
    /// PIN entry was dismissed
    PinCancelled,
    PinInvalid { message: String },
    /// USB or bridge I/O failed
    Transport { message: String },
    /// Firmware returned a `Failure` message
    Failure { message: String },
}

impl TrezorFailure {
    fn into_hw(self, operation: &str) -> HwError {
        match self {
            TrezorFailure::ActionCancelled | TrezorFailure::PinCancelled => HwError::Cancelled,
            TrezorFailure::PinInvalid { message } => HwError::PinRequired { message },
            TrezorFailure::Transport { message } => HwError::Disconnected { reason: message },
            TrezorFailure::Failure { message } => HwError::vendor(operation, message),
        }
    }
}

/// Settings changed through `apply_settings`; `None` leaves the setting untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrezorSettings {
    pub use_passphrase: Option<bool>,
    pub passphrase_always_on_device: Option<bool>,
}

/// Device enumeration and seed management
pub trait TrezorSdk: Send + Sync {
    fn enumerate(&self, transports: &TransportSet)
        -> Result<Vec<FirmwareDescriptor>, TrezorFailure>;

    fn connect(&self, transport: &Transport) -> Result<Arc<dyn TrezorLink>, TrezorFailure>;

    fn wipe_device(&self, device_id: &str) -> Result<LifecycleOutcome, TrezorFailure>;

    fn recover_device(
        &self,
        device_id: &str,
        init: &SeedInit,
    ) -> Result<LifecycleOutcome, TrezorFailure>;

    fn reset_device(
        &self,
        device_id: &str,
        init: &SeedInit,
    ) -> Result<LifecycleOutcome, TrezorFailure>;
}

/// An open Trezor client
pub trait TrezorLink: Send + Sync {
    fn features(&self) -> FirmwareFeatures;

    fn get_address(
        &self,
        coin: &str,
        path: &[u32],
        show_display: bool,
    ) -> Result<String, TrezorFailure>;

    /// `coin` selects the xpub version bytes; `None` uses the firmware default
    fn get_public_node(&self, coin: Option<&str>, path: &[u32])
        -> Result<PublicNode, TrezorFailure>;

    fn sign_tx(
        &self,
        coin: &str,
        inputs: &[TxInputSpec<Vec<u32>>],
        outputs: &[TxOutputSpec<Vec<u32>>],
    ) -> Result<Vec<u8>, TrezorFailure>;

    fn sign_message(&self, coin: &str, path: &[u32], message: &str)
        -> Result<Vec<u8>, TrezorFailure>;

    fn cipher_key_value(
        &self,
        path: &[u32],
        key: &str,
        value: &[u8],
        encrypt: bool,
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> Result<Vec<u8>, TrezorFailure>;

    fn change_pin(&self, remove: bool) -> Result<(), TrezorFailure>;

    fn apply_settings(&self, settings: &TrezorSettings) -> Result<(), TrezorFailure>;

    fn change_wipe_code(&self, remove: bool) -> Result<(), TrezorFailure>;

    fn firmware_update(&self, firmware: &[u8]) -> Result<(), TrezorFailure>;

    fn cancel(&self) -> Result<(), TrezorFailure>;

    fn clear_session(&self) -> Result<(), TrezorFailure>;

    fn close(&self) -> Result<(), TrezorFailure>;
}

pub struct TrezorAdapter {
    sdk: Arc<dyn TrezorSdk>,
}

impl TrezorAdapter {
    pub fn new(sdk: Arc<dyn TrezorSdk>) -> Self {
        Self { sdk }
    }
}

impl VendorAdapter for TrezorAdapter {
    fn kind(&self) -> VendorKind {
        VendorKind::Trezor
    }

    fn list_devices(&self, transports: &TransportSet) -> HwResult<Vec<DeviceInfo>> {
        let found = self
            .sdk
            .enumerate(transports)
            .map_err(|e| e.into_hw("enumerate"))?;
        debug!("Trezor enumeration found {} device(s)", found.len());

        Ok(found
            .into_iter()
            .filter(|d| transports.allows(d.transport.kind))
            .map(|d| DeviceInfo {
                kind: VendorKind::Trezor,
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
        _encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>> {
        let link = self.sdk.connect(transport).map_err(|e| match e {
            TrezorFailure::Transport { message } | TrezorFailure::Failure { message } => {
                HwError::ConnectionFailed { reason: message }
            }
            other => other.into_hw("connect"),
        })?;
        info!("Opened Trezor client on {}", transport);
        Ok(Arc::new(TrezorClient { link }))
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

struct TrezorClient {
    link: Arc<dyn TrezorLink>,
}

impl TrezorClient {
    fn cipher(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        encrypt: bool,
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        let operation = if encrypt { "encrypt_value" } else { "decrypt_value" };
        let path = path_indices(path)?;
        let data = self
            .link
            .cipher_key_value(&path, label, value, encrypt, ask_on_encrypt, ask_on_decrypt)
            .map_err(|e| e.into_hw(operation))?;
        let node = self
            .link
            .get_public_node(None, &path)
            .map_err(|e| e.into_hw(operation))?;
        Ok(CipherOutput {
            data,
            public_key: node.public_key,
        })
    }
}

impl KeyReader for TrezorClient {
    fn get_address(&self, coin: &str, path: &VendorPath, show_on_device: bool) -> HwResult<String> {
        self.link
            .get_address(coin, &path_indices(path)?, show_on_device)
            .map_err(|e| e.into_hw("get_address"))
    }

    fn get_public_node(&self, coin: &str, path: &VendorPath) -> HwResult<PublicNode> {
        self.link
            .get_public_node(Some(coin), &path_indices(path)?)
            .map_err(|e| e.into_hw("get_public_node"))
    }
}

impl Signer for TrezorClient {
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

impl ValueCipher for TrezorClient {
    fn encrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        self.cipher(path, label, value, true, ask_on_encrypt, ask_on_decrypt)
    }

    fn decrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        self.cipher(path, label, value, false, ask_on_encrypt, ask_on_decrypt)
    }
}

impl DeviceSettings for TrezorClient {
    fn change_pin(&self, remove: bool) -> HwResult<()> {
        self.link
            .change_pin(remove)
            .map_err(|e| e.into_hw("change_pin"))
    }

    fn enable_passphrase(&self, enabled: bool) -> HwResult<()> {
        let settings = TrezorSettings {
            use_passphrase: Some(enabled),
            ..TrezorSettings::default()
        };
        self.link
            .apply_settings(&settings)
            .map_err(|e| e.into_hw("enable_passphrase"))
    }

    fn set_passphrase_always_on_device(&self, enabled: bool) -> HwResult<()> {
        let settings = TrezorSettings {
            passphrase_always_on_device: Some(enabled),
            ..TrezorSettings::default()
        };
        self.link
            .apply_settings(&settings)
            .map_err(|e| e.into_hw("set_passphrase_always_on_device"))
    }

    fn set_wipe_code(&self, enabled: bool) -> HwResult<()> {
        self.link
            .change_wipe_code(!enabled)
            .map_err(|e| e.into_hw("set_wipe_code"))
    }

    fn firmware_update(&self, firmware: &[u8]) -> HwResult<()> {
        let features = self.link.features();
        if !features.bootloader_mode {
            return Err(HwError::invalid_argument(
                "Trezor must be in bootloader mode to update firmware",
            ));
        }
        self.link
            .firmware_update(firmware)
            .map_err(|e| e.into_hw("firmware_update"))
    }
}

impl VendorClient for TrezorClient {
    fn kind(&self) -> VendorKind {
        VendorKind::Trezor
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
