//! Hardware wallet session core
//!
//! Finds attached hardware wallets of the enabled vendor kinds, keeps one session open on
//! the device the user picked and routes device operations through it. Each operation is
//! serialised per client, may be cancelled from the device, and reports one common error
//! taxonomy whatever vendor SDK sits underneath.

pub mod adapters;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logic;
pub mod model;
pub mod ports;
pub mod session;

pub use api::{open_session, open_session_with};
pub use config::{ConfigError, HwConfig, PassphraseEncoding};
pub use dispatch::{IntoBip32Path, OperationDispatcher};
pub use error::{HwError, HwResult};
pub use session::{SessionCoordinator, SessionEvent, SessionIdentity, SessionState};
