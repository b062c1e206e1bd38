//! Values passed to and returned from device operations

use std::fmt;

use thiserror::Error;

use super::Bip32Path;

/// Public node at a derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicNode {
    pub xpub: String,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAndPubkey {
    pub address: String,
    pub public_key: Vec<u8>,
}

/// Output of a key-value encryption or decryption on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherOutput {
    pub data: Vec<u8>,
    /// Public key of the node the value was bound to
    pub public_key: Vec<u8>,
}

/// Previous output being spent. Built by the transaction layer; passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoInput {
    pub txid: String,
    pub output_index: u32,
    pub satoshis: u64,
    pub path: Bip32Path,
    pub prev_tx_raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub satoshis: u64,
    /// Set when the output pays back to the wallet
    pub change_path: Option<Bip32Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTxRequest {
    pub inputs: Vec<UtxoInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
}

impl SignTxRequest {
    /// Amount leaving the wallet, change outputs excluded
    pub fn total_output_amount(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|output| output.change_path.is_none())
            .map(|output| output.satoshis)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw_tx: Vec<u8>,
    pub total_amount: u64,
}

/// Length of a recovery seed in words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCount {
    Twelve,
    Eighteen,
    TwentyFour,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid word count {count}, expected 12, 18 or 24")]
pub struct WordCountError {
    count: u32,
}

impl WordCount {
    pub fn words(self) -> u32 {
        match self {
            WordCount::Twelve => 12,
            WordCount::Eighteen => 18,
            WordCount::TwentyFour => 24,
        }
    }

    /// Entropy strength in bits for a freshly generated seed
    pub fn strength_bits(self) -> u32 {
        match self {
            WordCount::Twelve => 128,
            WordCount::Eighteen => 192,
            WordCount::TwentyFour => 256,
        }
    }
}

impl TryFrom<u32> for WordCount {
    type Error = WordCountError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        match count {
            12 => Ok(WordCount::Twelve),
            18 => Ok(WordCount::Eighteen),
            24 => Ok(WordCount::TwentyFour),
            _ => Err(WordCountError { count }),
        }
    }
}

impl fmt::Display for WordCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} words", self.words())
    }
}

/// Settings applied when a device is recovered or reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSettings {
    pub word_count: WordCount,
    pub passphrase_enabled: bool,
    pub pin_enabled: bool,
    pub label: String,
}

/// Result of a wipe, recover or reset.
///
/// The device may already have been erased and given a new id when the user cancels, so a
/// cancellation is reported here together with the id the device ended up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOutcome {
    pub device_id: String,
    pub cancelled: bool,
}

impl LifecycleOutcome {
    pub fn completed(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            cancelled: false,
        }
    }

    pub fn cancelled(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            cancelled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_strength() {
        assert_eq!(WordCount::Twelve.strength_bits(), 128);
        assert_eq!(WordCount::Eighteen.strength_bits(), 192);
        assert_eq!(WordCount::TwentyFour.strength_bits(), 256);
    }

    #[test]
    fn test_total_output_amount_skips_change() {
        let request = SignTxRequest {
            inputs: vec![],
            outputs: vec![
                TxOutput {
                    address: "XpayeeAddress".to_string(),
                    satoshis: 150_000,
                    change_path: None,
                },
                TxOutput {
                    address: "XchangeAddress".to_string(),
                    satoshis: 40_000,
                    change_path: Some(Bip32Path::parse("44'/5'/0'/1/0").unwrap()),
                },
            ],
            fee: 226,
        };
        assert_eq!(request.total_output_amount(), 150_000);
    }

    #[test]
    fn test_word_count_from_u32() {
        assert_eq!(WordCount::try_from(18).unwrap(), WordCount::Eighteen);
        let err = WordCount::try_from(15).unwrap_err();
        assert!(err.to_string().contains("15"));
    }
}
