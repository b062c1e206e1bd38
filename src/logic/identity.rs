use std::fmt;

use sha2::{Digest, Sha256};

/// Identifier of an HD tree, derived from the public key read at the base path.
///
/// Stays the same when the same seed is loaded on another physical device and
/// changes when a device is wiped and re-seeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HdTreeIdentity(String);

impl HdTreeIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HdTreeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// hex(SHA-256(base public key)) followed by hex of the coin name bytes
pub fn hd_tree_identity(base_public_key: &[u8], coin_name: &str) -> HdTreeIdentity {
    let digest = Sha256::digest(base_public_key);
    HdTreeIdentity(format!(
        "{}{}",
        hex::encode(digest),
        hex::encode(coin_name.as_bytes())
    ))
}
