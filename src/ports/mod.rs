//! Ports the session core depends on
//!
//! Vendor bindings and the host's threading model sit behind these traits. The session
//! core only ever talks to them, never to a vendor SDK or a UI toolkit directly.

mod device_selector;
mod task_runner;
mod vendor_adapter;
mod vendor_client;

pub use device_selector::{DeviceSelector, FirstDeviceSelector};
pub use task_runner::{BlockingTaskRunner, TaskPrompt, BUSY_MESSAGE, BUSY_TITLE, CONFIRM_MESSAGE};
pub use vendor_adapter::VendorAdapter;
pub use vendor_client::{DeviceSettings, KeyReader, Signer, ValueCipher, VendorClient};
