mod address;
mod identity;

pub use address::validate_address;
pub use identity::{hd_tree_identity, HdTreeIdentity};
