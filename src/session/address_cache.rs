//! Addresses already read from a device, keyed by seed identity and path

use std::collections::HashMap;

use crate::logic::HdTreeIdentity;
use crate::model::Bip32Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAddress {
    pub address: String,
    /// Id of the matching record in the caller's own store, if it has one
    pub external_id: Option<i64>,
}

#[derive(Debug, Default)]
pub struct AddressCache {
    entries: HashMap<HdTreeIdentity, HashMap<String, CachedAddress>>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &HdTreeIdentity, path: &Bip32Path) -> Option<&CachedAddress> {
        self.entries.get(identity)?.get(&path.to_string())
    }

    pub fn insert(
        &mut self,
        identity: &HdTreeIdentity,
        path: &Bip32Path,
        address: String,
        external_id: Option<i64>,
    ) {
        self.entries.entry(identity.clone()).or_default().insert(
            path.to_string(),
            CachedAddress {
                address,
                external_id,
            },
        );
    }

    /// Drop every entry of a seed that no longer exists
    pub fn evict(&mut self, identity: &HdTreeIdentity) {
        self.entries.remove(identity);
    }

    /// Keep only entries of `identity`
    pub fn retain_only(&mut self, identity: &HdTreeIdentity) {
        self.entries.retain(|key, _| key == identity);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
