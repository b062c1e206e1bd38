//! Ledger Nano adapter
//!
//! The Ledger binding speaks APDUs to the Dash app and takes derivation paths as text.
//! It cannot interrupt a pending request, and the app offers no seed management,
//! value encryption or device settings.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PassphraseEncoding;
use crate::error::{HwError, HwResult};
use crate::model::{
    AddressAndPubkey, CipherOutput, DeviceInfo, InitSettings, LifecycleOutcome, PublicNode,
    SignTxRequest, SignedTx, Transport, TransportKind, TransportSet, VendorKind, VendorPath,
};
use crate::ports::{DeviceSettings, KeyReader, Signer, ValueCipher, VendorAdapter, VendorClient};

use super::{path_text, tx_specs, TxInputSpec, TxOutputSpec};

const SW_SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
const SW_COMMAND_NOT_ALLOWED: u16 = 0x6986;
const SW_INS_NOT_SUPPORTED: u16 = 0x6d00;
const SW_CLA_NOT_SUPPORTED: u16 = 0x6e00;

/// Failure reported by the Ledger binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFailure {
    /// The app answered with a status word other than 0x9000
    Status { code: u16 },
    /// HID exchange failed
    Comm { message: String },
}

impl LedgerFailure {
    fn into_hw(self, operation: &str) -> HwError {
        match self {
            LedgerFailure::Status {
                code: SW_CONDITIONS_NOT_SATISFIED | SW_COMMAND_NOT_ALLOWED,
            } => HwError::Cancelled,
            LedgerFailure::Status {
                code: SW_SECURITY_STATUS_NOT_SATISFIED,
            } => HwError::PinRequired {
                message: "Unlock the Ledger device with its PIN".to_string(),
            },
            LedgerFailure::Status {
                code: SW_INS_NOT_SUPPORTED | SW_CLA_NOT_SUPPORTED,
            } => HwError::vendor(operation, "Open the Dash app on the Ledger device"),
            LedgerFailure::Status { code } => {
                HwError::vendor(operation, format!("status word {code:#06x}"))
            }
            LedgerFailure::Comm { message } => HwError::Disconnected { reason: message },
        }
    }
}

/// Public key data as returned by the Dash app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPublicKey {
    pub address: String,
    pub public_key: Vec<u8>,
    pub chain_code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerDescriptor {
    pub transport: Transport,
    pub model: String,
    /// HID serial number; the transport path stands in when the device reports none
    pub serial: Option<String>,
}

pub trait LedgerSdk: Send + Sync {
    fn enumerate(&self) -> Result<Vec<LedgerDescriptor>, LedgerFailure>;

    fn connect(&self, transport: &Transport) -> Result<Arc<dyn LedgerLink>, LedgerFailure>;
}

pub trait LedgerLink: Send + Sync {
    fn get_wallet_public_key(
        &self,
        path: &str,
        show_on_device: bool,
    ) -> Result<LedgerPublicKey, LedgerFailure>;

    fn get_xpub(&self, path: &str) -> Result<String, LedgerFailure>;

    fn sign_tx(
        &self,
        inputs: &[TxInputSpec<String>],
        outputs: &[TxOutputSpec<String>],
    ) -> Result<Vec<u8>, LedgerFailure>;

    fn sign_message(&self, path: &str, message: &[u8]) -> Result<Vec<u8>, LedgerFailure>;

    fn firmware_version(&self) -> Result<String, LedgerFailure>;

    fn close(&self) -> Result<(), LedgerFailure>;
}

pub struct LedgerNanoAdapter {
    sdk: Arc<dyn LedgerSdk>,
}

impl LedgerNanoAdapter {
    pub fn new(sdk: Arc<dyn LedgerSdk>) -> Self {
        Self { sdk }
    }
}

fn seed_management_unsupported() -> HwError {
    HwError::unsupported("Ledger Nano devices are initialised with Ledger's own tools")
}

impl VendorAdapter for LedgerNanoAdapter {
    fn kind(&self) -> VendorKind {
        VendorKind::LedgerNano
    }

    fn list_devices(&self, transports: &TransportSet) -> HwResult<Vec<DeviceInfo>> {
        if !transports.allows(TransportKind::Hid) {
            debug!("HID transport disabled, skipping Ledger enumeration");
            return Ok(Vec::new());
        }
        let found = self.sdk.enumerate().map_err(|e| e.into_hw("enumerate"))?;

        Ok(found
            .into_iter()
            .map(|d| DeviceInfo {
                kind: VendorKind::LedgerNano,
                device_id: d.serial.unwrap_or_else(|| d.transport.path.clone()),
                label: String::new(),
                model: d.model,
                transport: d.transport,
                initialized: true,
                bootloader_mode: false,
            })
            .collect())
    }

    fn open(
        &self,
        transport: &Transport,
        _encoding: PassphraseEncoding,
    ) -> HwResult<Arc<dyn VendorClient>> {
        let link = self.sdk.connect(transport).map_err(|e| match e {
            LedgerFailure::Comm { message } => HwError::ConnectionFailed { reason: message },
            other => other.into_hw("connect"),
        })?;
        info!("Opened Ledger client on {}", transport);
        Ok(Arc::new(LedgerClient { link }))
    }

    fn wipe(&self, _device_id: &str) -> HwResult<LifecycleOutcome> {
        Err(seed_management_unsupported())
    }

    fn recover(&self, _device_id: &str, _settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        Err(seed_management_unsupported())
    }

    fn reset(&self, _device_id: &str, _settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        Err(seed_management_unsupported())
    }
}

struct LedgerClient {
    link: Arc<dyn LedgerLink>,
}

impl KeyReader for LedgerClient {
    fn get_address(&self, _coin: &str, path: &VendorPath, show_on_device: bool) -> HwResult<String> {
        self.link
            .get_wallet_public_key(&path_text(path)?, show_on_device)
            .map(|key| key.address)
            .map_err(|e| e.into_hw("get_address"))
    }

    fn get_public_node(&self, _coin: &str, path: &VendorPath) -> HwResult<PublicNode> {
        let path = path_text(path)?;
        let key = self
            .link
            .get_wallet_public_key(&path, false)
            .map_err(|e| e.into_hw("get_public_node"))?;
        let xpub = self
            .link
            .get_xpub(&path)
            .map_err(|e| e.into_hw("get_public_node"))?;
        Ok(PublicNode {
            xpub,
            public_key: key.public_key,
        })
    }

    fn get_address_and_pubkey(&self, _coin: &str, path: &VendorPath) -> HwResult<AddressAndPubkey> {
        let key = self
            .link
            .get_wallet_public_key(&path_text(path)?, false)
            .map_err(|e| e.into_hw("get_address_and_pubkey"))?;
        Ok(AddressAndPubkey {
            address: key.address,
            public_key: key.public_key,
        })
    }
}

impl Signer for LedgerClient {
    fn sign_tx(&self, _coin: &str, request: &SignTxRequest) -> HwResult<SignedTx> {
        let (inputs, outputs) = tx_specs(request, |path| path.to_unprefixed());
        let raw_tx = self
            .link
            .sign_tx(&inputs, &outputs)
            .map_err(|e| e.into_hw("sign_tx"))?;
        Ok(SignedTx {
            raw_tx,
            total_amount: request.total_output_amount(),
        })
    }

    fn sign_message(&self, _coin: &str, path: &VendorPath, message: &str) -> HwResult<Vec<u8>> {
        self.link
            .sign_message(&path_text(path)?, message.as_bytes())
            .map_err(|e| e.into_hw("sign_message"))
    }
}

impl ValueCipher for LedgerClient {
    fn encrypt_value(
        &self,
        _path: &VendorPath,
        _label: &str,
        _value: &[u8; 32],
        _ask_on_encrypt: bool,
        _ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        Err(HwError::unsupported("Ledger Nano cannot encrypt values"))
    }

    fn decrypt_value(
        &self,
        _path: &VendorPath,
        _label: &str,
        _value: &[u8; 32],
        _ask_on_encrypt: bool,
        _ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        Err(HwError::unsupported("Ledger Nano cannot decrypt values"))
    }
}

impl DeviceSettings for LedgerClient {
    fn change_pin(&self, _remove: bool) -> HwResult<()> {
        Err(HwError::unsupported(
            "Change the PIN of a Ledger Nano in the device settings",
        ))
    }

    fn enable_passphrase(&self, _enabled: bool) -> HwResult<()> {
        Err(HwError::unsupported(
            "Configure passphrases of a Ledger Nano in the device settings",
        ))
    }

    fn set_passphrase_always_on_device(&self, _enabled: bool) -> HwResult<()> {
        Err(HwError::unsupported(
            "Configure passphrases of a Ledger Nano in the device settings",
        ))
    }

    fn set_wipe_code(&self, _enabled: bool) -> HwResult<()> {
        Err(HwError::unsupported("Ledger Nano does not support a wipe code"))
    }

    fn firmware_update(&self, _firmware: &[u8]) -> HwResult<()> {
        Err(HwError::unsupported(
            "Update Ledger Nano firmware with Ledger's own tools",
        ))
    }
}

impl VendorClient for LedgerClient {
    fn kind(&self) -> VendorKind {
        VendorKind::LedgerNano
    }

    fn label(&self) -> String {
        VendorKind::LedgerNano.display_name().to_string()
    }

    fn firmware_version(&self) -> HwResult<String> {
        self.link
            .firmware_version()
            .map_err(|e| e.into_hw("firmware_version"))
    }

    fn supports_cancel(&self) -> bool {
        false
    }

    fn cancel(&self) -> HwResult<()> {
        warn!("Ledger requests cannot be cancelled from the host");
        Err(HwError::unsupported(
            "Ledger requests can only be cancelled on the device",
        ))
    }

    fn close(&self) -> HwResult<()> {
        self.link.close().map_err(|e| e.into_hw("close"))
    }
}
