//! Device session state: what is attached, what is open, and who holds it

mod address_cache;
mod coordinator;
mod locks;
mod registry;

pub use address_cache::{AddressCache, CachedAddress};
pub use coordinator::{SessionCoordinator, SessionEvent, SessionIdentity, SessionState, PROMPT_DELAY};
pub use locks::{ClientLock, ClientLocks};
pub use registry::{ActiveClient, Device, DeviceRegistry};
