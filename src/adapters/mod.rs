//! Adapters - concrete implementations of the ports
//!
//! Each vendor adapter wraps a binding trait describing the native SDK surface it needs
//! (`TrezorSdk`, `KeepkeySdk`, `LedgerSdk`). Bindings report failures through their own
//! error enums; the adapters are the only place those are turned into `HwError`.

mod keepkey;
mod ledger_nano;
mod thread_runner;
mod trezor;

#[cfg(test)]
pub mod fake_vendor;

use std::fmt;
use std::sync::Arc;

use crate::error::{HwError, HwResult};
use crate::model::{
    Bip32Path, InitSettings, LifecycleOutcome, SignTxRequest, Transport, VendorKind, VendorPath,
};
use crate::ports::VendorAdapter;

pub use keepkey::{KeepkeyAdapter, KeepkeyFailure, KeepkeyLink, KeepkeySdk};
pub use ledger_nano::{
    LedgerDescriptor, LedgerFailure, LedgerLink, LedgerNanoAdapter, LedgerPublicKey, LedgerSdk,
};
pub use thread_runner::{CancelHandle, InlineRunner, ThreadRunner};
pub use trezor::{TrezorAdapter, TrezorFailure, TrezorLink, TrezorSdk, TrezorSettings};

/// Device features reported by Trezor-family firmware
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirmwareFeatures {
    pub device_id: String,
    pub label: String,
    pub model: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub initialized: bool,
    pub bootloader_mode: bool,
}

impl FirmwareFeatures {
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version, self.minor_version, self.patch_version
        )
    }
}

/// Device found by a Trezor-family binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    pub transport: Transport,
    pub features: FirmwareFeatures,
}

/// Seed initialisation request in the shape Trezor-family bindings take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInit {
    pub word_count: u32,
    pub strength_bits: u32,
    pub passphrase_protection: bool,
    pub pin_protection: bool,
    pub label: String,
    pub language: &'static str,
}

impl From<&InitSettings> for SeedInit {
    fn from(settings: &InitSettings) -> Self {
        Self {
            word_count: settings.word_count.words(),
            strength_bits: settings.word_count.strength_bits(),
            passphrase_protection: settings.passphrase_enabled,
            pin_protection: settings.pin_enabled,
            label: settings.label.clone(),
            language: "english",
        }
    }
}

/// Transaction input with its key path in the binding's own form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInputSpec<P> {
    pub path: P,
    pub prev_txid: String,
    pub prev_index: u32,
    pub amount: u64,
    pub prev_tx_raw: Vec<u8>,
}

/// Transaction output; `change_path` is set when the device should verify it as change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutputSpec<P> {
    pub address: String,
    pub amount: u64,
    pub change_path: Option<P>,
}

/// Convert a signing request into binding-level inputs and outputs
pub(crate) fn tx_specs<P>(
    request: &SignTxRequest,
    convert: impl Fn(&Bip32Path) -> P,
) -> (Vec<TxInputSpec<P>>, Vec<TxOutputSpec<P>>) {
    let inputs = request
        .inputs
        .iter()
        .map(|input| TxInputSpec {
            path: convert(&input.path),
            prev_txid: input.txid.clone(),
            prev_index: input.output_index,
            amount: input.satoshis,
            prev_tx_raw: input.prev_tx_raw.clone(),
        })
        .collect();
    let outputs = request
        .outputs
        .iter()
        .map(|output| TxOutputSpec {
            address: output.address.clone(),
            amount: output.satoshis,
            change_path: output.change_path.as_ref().map(&convert),
        })
        .collect();
    (inputs, outputs)
}

/// A cancel the binding raises instead of reporting leaves the device under its old id
pub(crate) fn settle_lifecycle(
    device_id: &str,
    result: HwResult<LifecycleOutcome>,
) -> HwResult<LifecycleOutcome> {
    match result {
        Err(HwError::Cancelled) => Ok(LifecycleOutcome::cancelled(device_id)),
        other => other,
    }
}

pub(crate) fn path_indices(path: &VendorPath) -> HwResult<Vec<u32>> {
    match path {
        VendorPath::Indices(indices) => Ok(indices.clone()),
        VendorPath::Text(_) => Ok(path.to_bip32()?.indices()),
    }
}

pub(crate) fn path_text(path: &VendorPath) -> HwResult<String> {
    match path {
        VendorPath::Text(text) => Ok(text.clone()),
        VendorPath::Indices(_) => Ok(path.to_bip32()?.to_unprefixed()),
    }
}

/// The adapter for each vendor kind, if one was supplied
#[derive(Clone, Default)]
pub struct AdapterSet {
    trezor: Option<Arc<dyn VendorAdapter>>,
    keepkey: Option<Arc<dyn VendorAdapter>>,
    ledger_nano: Option<Arc<dyn VendorAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under the kind it reports, replacing any previous one
    pub fn with(mut self, adapter: Arc<dyn VendorAdapter>) -> Self {
        let kind = adapter.kind();
        *self.slot_mut(kind) = Some(adapter);
        self
    }

    pub fn contains(&self, kind: VendorKind) -> bool {
        self.slot(kind).is_some()
    }

    pub fn get(&self, kind: VendorKind) -> HwResult<Arc<dyn VendorAdapter>> {
        self.slot(kind).clone().ok_or_else(|| HwError::Internal {
            reason: format!("no adapter registered for {kind}"),
        })
    }

    fn slot(&self, kind: VendorKind) -> &Option<Arc<dyn VendorAdapter>> {
        match kind {
            VendorKind::Trezor => &self.trezor,
            VendorKind::Keepkey => &self.keepkey,
            VendorKind::LedgerNano => &self.ledger_nano,
        }
    }

    fn slot_mut(&mut self, kind: VendorKind) -> &mut Option<Arc<dyn VendorAdapter>> {
        match kind {
            VendorKind::Trezor => &mut self.trezor,
            VendorKind::Keepkey => &mut self.keepkey,
            VendorKind::LedgerNano => &mut self.ledger_nano,
        }
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<VendorKind> = VendorKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect();
        f.debug_struct("AdapterSet").field("kinds", &kinds).finish()
    }
}
