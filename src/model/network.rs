use serde::{Deserialize, Serialize};

use super::{Bip32Path, HARDENED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

/// Chain constants the session needs to talk to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    /// Coin name as the device firmware knows it
    pub coin_name: &'static str,
    /// BIP44 coin type
    pub coin_type: u32,
    pub p2pkh_version: u8,
    pub p2sh_version: u8,
}

const MAINNET: NetworkParams = NetworkParams {
    coin_name: "Dash",
    coin_type: 5,
    p2pkh_version: 76,
    p2sh_version: 16,
};

const TESTNET: NetworkParams = NetworkParams {
    coin_name: "Dash Testnet",
    coin_type: 1,
    p2pkh_version: 140,
    p2sh_version: 19,
};

impl Network {
    pub fn params(self) -> &'static NetworkParams {
        match self {
            Network::Mainnet => &MAINNET,
            Network::Testnet => &TESTNET,
        }
    }

    pub fn coin_name(self) -> &'static str {
        self.params().coin_name
    }

    /// `44'/<coin type>'`, read once per session to fingerprint the seed
    pub fn base_path(self) -> Bip32Path {
        Bip32Path::from_indices(&[44 | HARDENED, self.params().coin_type | HARDENED])
    }

    /// First receiving address of the first account
    pub fn default_address_path(self) -> Bip32Path {
        self.base_path()
            .join(&Bip32Path::from_indices(&[HARDENED, 0, 0]))
    }
}
