use std::fmt;

use thiserror::Error;

/// Bit marking a hardened child index
pub const HARDENED: u32 = 0x8000_0000;

/// BIP32 derivation path accepted with or without the `m/` root marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Path(bip32::DerivationPath);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid derivation path '{path}'")]
pub struct Bip32PathError {
    path: String,
    #[source]
    source: bip32::Error,
}

impl Bip32Path {
    /// Parse a human-readable path.
    ///
    /// Surrounding whitespace is trimmed and a leading `m/` (either case) is stripped.
    /// Hardened components may be written as `44'`, `44h` or `44H`.
    pub fn parse(path: &str) -> Result<Self, Bip32PathError> {
        let body = strip_root(path.trim()).replace(['h', 'H'], "'");
        let rooted = if body.is_empty() {
            "m".to_string()
        } else {
            format!("m/{body}")
        };
        let inner = rooted
            .parse::<bip32::DerivationPath>()
            .map_err(|source| Bip32PathError {
                path: path.to_string(),
                source,
            })?;
        Ok(Bip32Path(inner))
    }

    pub fn from_indices(indices: &[u32]) -> Self {
        let mut inner = bip32::DerivationPath::default();
        for index in indices {
            inner.push(bip32::ChildNumber(*index));
        }
        Bip32Path(inner)
    }

    pub fn indices(&self) -> Vec<u32> {
        self.0.iter().map(|child| child.0).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path extended with further components
    pub fn join(&self, tail: &Bip32Path) -> Bip32Path {
        let mut indices = self.indices();
        indices.extend(tail.indices());
        Bip32Path::from_indices(&indices)
    }

    /// Canonical string without the root marker, e.g. `44'/5'/0'/0/0`
    pub fn to_unprefixed(&self) -> String {
        self.indices()
            .iter()
            .map(|index| format_index(*index))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in self.indices() {
            write!(f, "/{}", format_index(index))?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for Bip32Path {
    type Error = Bip32PathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Bip32Path::parse(path)
    }
}

fn strip_root(path: &str) -> &str {
    if path.eq_ignore_ascii_case("m") {
        return "";
    }
    path.strip_prefix("m/")
        .or_else(|| path.strip_prefix("M/"))
        .unwrap_or(path)
}

fn format_index(index: u32) -> String {
    if index & HARDENED != 0 {
        format!("{}'", index & !HARDENED)
    } else {
        index.to_string()
    }
}

/// Form in which a vendor SDK expects derivation paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathForm {
    IndexArray,
    Text,
}

/// Path converted to the form a particular vendor SDK accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorPath {
    Indices(Vec<u32>),
    Text(String),
}

impl VendorPath {
    pub fn new(form: PathForm, path: &Bip32Path) -> Self {
        match form {
            PathForm::IndexArray => VendorPath::Indices(path.indices()),
            PathForm::Text => VendorPath::Text(path.to_unprefixed()),
        }
    }

    /// Back to the generic path, whichever form this one is in
    pub fn to_bip32(&self) -> Result<Bip32Path, Bip32PathError> {
        match self {
            VendorPath::Indices(indices) => Ok(Bip32Path::from_indices(indices)),
            VendorPath::Text(text) => Bip32Path::parse(text),
        }
    }
}
