use crate::error::HwResult;
use crate::model::Bip32Path;

/// Anything a caller may pass where a derivation path is expected
pub trait IntoBip32Path {
    fn into_bip32_path(self) -> HwResult<Bip32Path>;
}

impl IntoBip32Path for Bip32Path {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(self)
    }
}

impl IntoBip32Path for &Bip32Path {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(self.clone())
    }
}

impl IntoBip32Path for &str {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(Bip32Path::parse(self)?)
    }
}

impl IntoBip32Path for &String {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        self.as_str().into_bip32_path()
    }
}

impl IntoBip32Path for String {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        self.as_str().into_bip32_path()
    }
}

impl IntoBip32Path for &[u32] {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(Bip32Path::from_indices(self))
    }
}

impl<const N: usize> IntoBip32Path for [u32; N] {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(Bip32Path::from_indices(&self))
    }
}

impl IntoBip32Path for Vec<u32> {
    fn into_bip32_path(self) -> HwResult<Bip32Path> {
        Ok(Bip32Path::from_indices(&self))
    }
}
