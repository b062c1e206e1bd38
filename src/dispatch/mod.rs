//! Device operations routed through the session
//!
//! Every call goes through [`OperationDispatcher::dispatch`]: it makes sure a client is open,
//! refuses vendor switches the platform cannot handle, takes the client lock, runs the vendor
//! call through the task runner and normalises the outcome. A lost connection has already
//! closed the client by the time the error reaches the caller.

mod lifecycle;
mod path;

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::error::{HwError, HwResult};
use crate::model::{
    AddressAndPubkey, Bip32Path, CipherOutput, PublicNode, SignTxRequest, SignedTx, VendorKind,
    VendorPath,
};
use crate::ports::{BlockingTaskRunner, TaskPrompt, VendorClient, BUSY_MESSAGE, BUSY_TITLE, CONFIRM_MESSAGE};
use crate::session::{ActiveClient, SessionCoordinator, PROMPT_DELAY};

pub use path::IntoBip32Path;

pub struct OperationDispatcher<R> {
    session: Arc<SessionCoordinator<R>>,
}

impl<R: BlockingTaskRunner> OperationDispatcher<R> {
    pub fn new(session: Arc<SessionCoordinator<R>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionCoordinator<R>> {
        &self.session
    }

    /// Run `work` against the session client.
    ///
    /// `operation` names the call in logs and in `HwError::VendorError`.
    pub fn dispatch<T, F>(&self, operation: &'static str, prompt: TaskPrompt, work: F) -> HwResult<T>
    where
        T: Send,
        F: FnOnce(&dyn VendorClient) -> HwResult<T> + Send,
    {
        self.dispatch_with(operation, |_| prompt, work)
    }

    fn dispatch_with<T, F>(
        &self,
        operation: &'static str,
        prompt_for: impl FnOnce(VendorKind) -> TaskPrompt,
        work: F,
    ) -> HwResult<T>
    where
        T: Send,
        F: FnOnce(&dyn VendorClient) -> HwResult<T> + Send,
    {
        self.check_platform()?;
        let client = self.ensure_client()?;

        debug!("{} on {}", operation, client.device_id);
        let prompt = prompt_for(client.kind);
        self.session
            .run_guarded(&client, &prompt, work)
            .map_err(|e| self.normalize(operation, &client, e))
    }

    fn ensure_client(&self) -> HwResult<ActiveClient> {
        if let Some(client) = self.session.active_client() {
            return Ok(client);
        }
        match self.session.connect(false) {
            Ok(client) => Ok(client),
            Err(
                e @ (HwError::Cancelled
                | HwError::PinRequired { .. }
                | HwError::Disconnected { .. }
                | HwError::PlatformConflict { .. }),
            ) => Err(e),
            Err(e) => {
                warn!("Connecting before a device call failed: {}", e);
                Err(HwError::NotConnected)
            }
        }
    }

    /// The preferred vendor must be loadable next to every SDK this process already used
    fn check_platform(&self) -> HwResult<()> {
        match self.session.config().vendor_preference {
            Some(preferred) => self.session.check_sdk_compatible(preferred),
            None => Ok(()),
        }
    }

    fn normalize(&self, operation: &'static str, client: &ActiveClient, err: HwError) -> HwError {
        match err {
            HwError::Disconnected { .. } => {
                warn!("{} lost during {}: {}", client.device_id, operation, err);
                err
            }
            HwError::PinRequired { .. } => {
                if let Err(clear) = client.handle.clear_session() {
                    warn!("Clearing device session failed: {}", clear);
                }
                err
            }
            HwError::VendorError { message, .. } => {
                error!("{} failed on {}: {}", operation, client.device_id, message);
                HwError::vendor(operation, message)
            }
            other => other,
        }
    }

    fn coin(&self) -> &'static str {
        self.session.config().network.coin_name()
    }

    pub fn get_address(&self, path: impl IntoBip32Path, show_on_device: bool) -> HwResult<String> {
        let path = path.into_bip32_path()?;
        let coin = self.coin();
        let prompt = if show_on_device {
            TaskPrompt::new(BUSY_TITLE, CONFIRM_MESSAGE)
        } else {
            TaskPrompt::busy().with_delay(PROMPT_DELAY)
        };
        self.dispatch("get_address", prompt, |device| {
            device.get_address(coin, &vendor_path(device, &path), show_on_device)
        })
    }

    /// Address at `path`, read from the device only when the session seed has no cached entry
    pub fn get_address_cached(&self, path: impl IntoBip32Path) -> HwResult<String> {
        let path = path.into_bip32_path()?;
        let coin = self.coin();
        if let Ok(identity) = self.session.hd_tree_identity(coin) {
            if let Some(hit) = self.session.address_cache().get(&identity, &path) {
                return Ok(hit.address.clone());
            }
        }

        let address = self.get_address(&path, false)?;
        let identity = self.session.hd_tree_identity(coin)?;
        self.session
            .address_cache()
            .insert(&identity, &path, address.clone(), None);
        Ok(address)
    }

    pub fn get_address_and_pubkey(&self, path: impl IntoBip32Path) -> HwResult<AddressAndPubkey> {
        let path = path.into_bip32_path()?;
        let coin = self.coin();
        self.dispatch("get_address_and_pubkey", TaskPrompt::busy().with_delay(PROMPT_DELAY), |device| {
            device.get_address_and_pubkey(coin, &vendor_path(device, &path))
        })
    }

    pub fn get_public_node(&self, path: impl IntoBip32Path) -> HwResult<PublicNode> {
        let path = path.into_bip32_path()?;
        let coin = self.coin();
        self.dispatch("get_public_node", TaskPrompt::busy().with_delay(PROMPT_DELAY), |device| {
            device.get_public_node(coin, &vendor_path(device, &path))
        })
    }

    pub fn get_xpub(&self, path: impl IntoBip32Path) -> HwResult<String> {
        Ok(self.get_public_node(path)?.xpub)
    }

    pub fn sign_tx(&self, request: &SignTxRequest) -> HwResult<SignedTx> {
        let coin = self.coin();
        self.dispatch("sign_tx", TaskPrompt::busy(), |device| device.sign_tx(coin, request))
    }

    pub fn sign_message(&self, path: impl IntoBip32Path, message: &str) -> HwResult<Vec<u8>> {
        let path = path.into_bip32_path()?;
        let coin = self.coin();
        self.dispatch_with(
            "sign_message",
            |kind| sign_message_prompt(kind, message),
            |device| device.sign_message(coin, &vendor_path(device, &path), message),
        )
    }

    pub fn encrypt_value(
        &self,
        path: impl IntoBip32Path,
        label: &str,
        value: &[u8],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        let value = cipher_input(value)?;
        let path = path.into_bip32_path()?;
        self.dispatch("encrypt_value", TaskPrompt::busy(), |device| {
            device.encrypt_value(&vendor_path(device, &path), label, value, ask_on_encrypt, ask_on_decrypt)
        })
    }

    pub fn decrypt_value(
        &self,
        path: impl IntoBip32Path,
        label: &str,
        value: &[u8],
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    ) -> HwResult<CipherOutput> {
        let value = cipher_input(value)?;
        let path = path.into_bip32_path()?;
        self.dispatch("decrypt_value", TaskPrompt::busy(), |device| {
            device.decrypt_value(&vendor_path(device, &path), label, value, ask_on_encrypt, ask_on_decrypt)
        })
    }

    pub fn enable_passphrase(&self, enabled: bool) -> HwResult<()> {
        self.dispatch("enable_passphrase", TaskPrompt::busy(), |device| {
            device.enable_passphrase(enabled)
        })
    }

    pub fn set_passphrase_always_on_device(&self, enabled: bool) -> HwResult<()> {
        self.dispatch("set_passphrase_always_on_device", TaskPrompt::busy(), |device| {
            device.set_passphrase_always_on_device(enabled)
        })
    }

    pub fn set_wipe_code(&self, enabled: bool) -> HwResult<()> {
        self.dispatch("set_wipe_code", TaskPrompt::busy(), |device| {
            device.set_wipe_code(enabled)
        })
    }

    pub fn change_pin(&self, remove: bool) -> HwResult<()> {
        self.dispatch("change_pin", TaskPrompt::busy(), |device| device.change_pin(remove))
    }

    pub fn firmware_update(&self, firmware: &[u8]) -> HwResult<()> {
        if firmware.is_empty() {
            return Err(HwError::invalid_argument("firmware image is empty"));
        }
        self.dispatch("firmware_update", TaskPrompt::busy(), |device| match device.kind() {
            VendorKind::Trezor | VendorKind::Keepkey => device.firmware_update(firmware),
            VendorKind::LedgerNano => Err(HwError::unsupported(
                "Firmware update is not supported for Ledger Nano devices",
            )),
        })
    }

    pub fn firmware_version(&self) -> HwResult<String> {
        self.dispatch("firmware_version", TaskPrompt::busy().with_delay(PROMPT_DELAY), |device| {
            device.firmware_version()
        })
    }
}

fn vendor_path(device: &dyn VendorClient, path: &Bip32Path) -> VendorPath {
    VendorPath::new(device.kind().path_form(), path)
}

fn cipher_input(value: &[u8]) -> HwResult<&[u8; 32]> {
    value.try_into().map_err(|_| {
        HwError::invalid_argument(format!("value must be exactly 32 bytes, got {}", value.len()))
    })
}

/// Ledger shows only a hash of long messages, so the prompt carries it for comparison
fn sign_message_prompt(kind: VendorKind, message: &str) -> TaskPrompt {
    match kind {
        VendorKind::LedgerNano => {
            let digest = hex::encode(Sha256::digest(message.as_bytes()));
            TaskPrompt::new(
                BUSY_TITLE,
                format!("{BUSY_MESSAGE}\n\nMessage hash: {digest}"),
            )
        }
        VendorKind::Trezor | VendorKind::Keepkey => TaskPrompt::busy(),
    }
}
