mod derivation_path;
mod device;
mod network;
mod payload;
mod vendor_kind;

pub use derivation_path::{Bip32Path, Bip32PathError, PathForm, VendorPath, HARDENED};
pub use device::{ClientId, DeviceInfo, Transport, TransportKind, TransportSet};
pub use network::{Network, NetworkParams};
pub use payload::{
    AddressAndPubkey, CipherOutput, InitSettings, LifecycleOutcome, PublicNode, SignTxRequest,
    SignedTx, TxOutput, UtxoInput, WordCount, WordCountError,
};
pub use vendor_kind::{Platform, VendorKind};
