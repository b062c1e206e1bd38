//! Read-only configuration consumed by the session core

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Network, Platform, TransportSet, VendorKind};

/// Unicode normalisation applied to passphrases before they reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassphraseEncoding {
    #[default]
    Nfc,
    Nfkd,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HwConfig {
    pub transports: TransportSet,
    pub passphrase_encoding: PassphraseEncoding,
    /// Vendor kind the user chose; `None` accepts whatever is attached
    pub vendor_preference: Option<VendorKind>,
    /// Vendor kinds whose SDKs may be used for enumeration
    pub enabled_vendors: Vec<VendorKind>,
    pub network: Network,
    pub platform: Platform,
    /// Documentation link attached to the "testnet not supported" error
    pub testnet_help_url: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot parse configuration: {reason}")]
    Parse { reason: String },

    #[error("At least one vendor kind must be enabled")]
    NoVendorsEnabled,
}

impl Default for HwConfig {
    fn default() -> Self {
        Self {
            transports: TransportSet::default(),
            passphrase_encoding: PassphraseEncoding::default(),
            vendor_preference: None,
            enabled_vendors: VendorKind::ALL.to_vec(),
            network: Network::default(),
            platform: Platform::current(),
            testnet_help_url: None,
        }
    }
}

impl HwConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: HwConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_vendors.is_empty() {
            return Err(ConfigError::NoVendorsEnabled);
        }
        Ok(())
    }

    /// Vendor kinds to enumerate; narrowed to the preference when one is set
    pub fn vendors_to_enumerate(&self) -> Vec<VendorKind> {
        match self.vendor_preference {
            Some(kind) if self.enabled_vendors.contains(&kind) => vec![kind],
            _ => self.enabled_vendors.clone(),
        }
    }
}
