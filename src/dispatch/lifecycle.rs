//! Wipe, recover and reset
//!
//! These address a device by id rather than through the session client. The vendor SDK
//! opens its own connection for them, and the device comes back under a new id, so the
//! session is dropped first when it is bound to that device and the device list is reloaded
//! afterwards.
//!
//! A cancel on the device is not an error here: the device may already be erased and
//! re-identified, so the outcome reports it next to the id the device ended up with.

use tracing::{error, info};

use crate::error::{HwError, HwResult};
use crate::model::{InitSettings, LifecycleOutcome};
use crate::ports::{BlockingTaskRunner, TaskPrompt, VendorAdapter};

use super::OperationDispatcher;

impl<R: BlockingTaskRunner> OperationDispatcher<R> {
    /// Erase the device. Cached addresses of its seed are dropped.
    pub fn wipe(&self, device_id: &str) -> HwResult<LifecycleOutcome> {
        self.run_lifecycle("wipe", device_id, true, |adapter| adapter.wipe(device_id))
    }

    /// Restore a seed entered on the device
    pub fn recover(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        self.run_lifecycle("recover", device_id, false, |adapter| {
            adapter.recover(device_id, settings)
        })
    }

    /// Generate a new seed on the device
    pub fn reset(&self, device_id: &str, settings: &InitSettings) -> HwResult<LifecycleOutcome> {
        self.run_lifecycle("reset", device_id, false, |adapter| {
            adapter.reset(device_id, settings)
        })
    }

    fn run_lifecycle<F>(
        &self,
        operation: &'static str,
        device_id: &str,
        evict_cache: bool,
        work: F,
    ) -> HwResult<LifecycleOutcome>
    where
        F: FnOnce(&dyn VendorAdapter) -> HwResult<LifecycleOutcome> + Send,
    {
        let session = self.session();
        let device = session.find_device(device_id)?;
        let adapter = session.adapter(device.kind)?;

        if session.active_device_id().as_deref() == Some(device_id) {
            let identity = session.hd_tree_identity(self.coin()).ok();
            session.disconnect();
            if let Some(identity) = identity.filter(|_| evict_cache) {
                session.address_cache().evict(&identity);
            }
        }

        // The vendor SDK owns the whole exchange; there is nothing to cancel from here.
        let result = session.runner().run_blocking(
            &TaskPrompt::busy(),
            || work(adapter.as_ref()),
            &|| false,
        );
        session.reload_devices();

        match result {
            Ok(outcome) if outcome.cancelled => {
                info!(
                    "{} cancelled on {}, device id is now {}",
                    operation, device_id, outcome.device_id
                );
                Ok(outcome)
            }
            Ok(outcome) => {
                info!(
                    "{} finished on {}, device id is now {}",
                    operation, device_id, outcome.device_id
                );
                Ok(outcome)
            }
            Err(HwError::VendorError { message, .. }) => {
                error!("{} failed on {}: {}", operation, device_id, message);
                Err(HwError::vendor(operation, message))
            }
            Err(e) => Err(e),
        }
    }
}
