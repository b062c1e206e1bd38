//! Capabilities of an opened hardware wallet client
//!
//! A `VendorClient` is the session-facing view of one native client handle. Methods take
//! `&self` because `cancel` must be callable from the coordinating thread while another
//! call is still blocked inside the vendor SDK.

use crate::error::HwResult;
use crate::model::{
    AddressAndPubkey, CipherOutput, PublicNode, SignTxRequest, SignedTx, VendorKind, VendorPath,
};

/// Reading keys and addresses
pub trait KeyReader {
    /// Address at `path`, optionally confirmed on the device screen
    fn get_address(&self, coin: &str, path: &VendorPath, show_on_device: bool)
        -> HwResult<String>;

    fn get_public_node(&self, coin: &str, path: &VendorPath) -> HwResult<PublicNode>;

    /// Address and public key in one step. Bindings without a combined call issue two requests.
    fn get_address_and_pubkey(&self, coin: &str, path: &VendorPath) -> HwResult<AddressAndPubkey> {
        let address = self.get_address(coin, path, false)?;
        let node = self.get_public_node(coin, path)?;
        Ok(AddressAndPubkey {
            address,
            public_key: node.public_key,
        })
    }
}

/// Producing signatures
pub trait Signer {
    fn sign_tx(&self, coin: &str, request: &SignTxRequest) -> HwResult<SignedTx>;

    /// Signed message bytes as returned by the device
    fn sign_message(&self, coin: &str, path: &VendorPath, message: &str) -> HwResult<Vec<u8>>;
}

/// Device-bound symmetric encryption of 32-byte values
pub trait ValueCipher {
    fn encrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput>;

    fn decrypt_value(
        &self,
        path: &VendorPath,
        label: &str,
        value: &[u8; 32],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput>;
}

/// Changing persistent device settings
pub trait DeviceSettings {
    /// Set or change the PIN, or remove it when `remove` is true
    fn change_pin(&self, remove: bool) -> HwResult<()>;

    fn enable_passphrase(&self, enabled: bool) -> HwResult<()>;

    fn set_passphrase_always_on_device(&self, enabled: bool) -> HwResult<()>;

    fn set_wipe_code(&self, enabled: bool) -> HwResult<()>;

    fn firmware_update(&self, firmware: &[u8]) -> HwResult<()>;
}

/// One open native client handle
pub trait VendorClient: KeyReader + Signer + ValueCipher + DeviceSettings + Send + Sync {
    fn kind(&self) -> VendorKind;

    /// Label the user gave the device
    fn label(&self) -> String;

    fn firmware_version(&self) -> HwResult<String>;

    /// Whether `cancel` can interrupt an in-flight call
    fn supports_cancel(&self) -> bool;

    /// Abort the in-flight call. The blocked call then fails with `HwError::Cancelled`.
    fn cancel(&self) -> HwResult<()>;

    /// Forget cached PIN and passphrase state on the device
    fn clear_session(&self) -> HwResult<()> {
        Ok(())
    }

    fn close(&self) -> HwResult<()>;
}
