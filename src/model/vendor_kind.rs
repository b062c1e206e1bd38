use std::fmt;

use serde::{Deserialize, Serialize};

use super::PathForm;

/// Supported hardware wallet device families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorKind {
    Trezor,
    Keepkey,
    LedgerNano,
}

impl VendorKind {
    pub const ALL: [VendorKind; 3] = [VendorKind::Trezor, VendorKind::Keepkey, VendorKind::LedgerNano];

    /// Path representation the vendor SDK accepts
    pub fn path_form(self) -> PathForm {
        match self {
            VendorKind::Trezor | VendorKind::Keepkey => PathForm::IndexArray,
            VendorKind::LedgerNano => PathForm::Text,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            VendorKind::Trezor => "Trezor",
            VendorKind::Keepkey => "Keepkey",
            VendorKind::LedgerNano => "Ledger Nano",
        }
    }
}

impl fmt::Display for VendorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Operating system family the process runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    /// Whether the SDKs of two vendor kinds cannot both be loaded in one process.
    ///
    /// On Linux the Trezor and Keepkey bindings register protocol objects under the
    /// same names; once one is loaded the other is unusable until restart.
    pub fn sdks_conflict(self, a: VendorKind, b: VendorKind) -> bool {
        self == Platform::Linux
            && matches!(
                (a, b),
                (VendorKind::Trezor, VendorKind::Keepkey) | (VendorKind::Keepkey, VendorKind::Trezor)
            )
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_forms() {
        assert_eq!(VendorKind::Trezor.path_form(), PathForm::IndexArray);
        assert_eq!(VendorKind::Keepkey.path_form(), PathForm::IndexArray);
        assert_eq!(VendorKind::LedgerNano.path_form(), PathForm::Text);
    }

    #[test]
    fn test_linux_conflict_is_symmetric() {
        let linux = Platform::Linux;
        assert!(linux.sdks_conflict(VendorKind::Trezor, VendorKind::Keepkey));
        assert!(linux.sdks_conflict(VendorKind::Keepkey, VendorKind::Trezor));
        assert!(!linux.sdks_conflict(VendorKind::Trezor, VendorKind::LedgerNano));
        assert!(!linux.sdks_conflict(VendorKind::Trezor, VendorKind::Trezor));
    }

    #[test]
    fn test_no_conflict_elsewhere() {
        for platform in [Platform::MacOs, Platform::Windows, Platform::Other] {
            assert!(!platform.sdks_conflict(VendorKind::Trezor, VendorKind::Keepkey));
        }
    }

    #[test]
    fn test_deserialize_kind() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: VendorKind,
        }
        let parsed: Wrapper = toml::from_str("kind = \"ledger_nano\"").unwrap();
        assert_eq!(parsed.kind, VendorKind::LedgerNano);
    }
}
