//! Entry points for embedding applications

use std::sync::Arc;

use crate::adapters::{AdapterSet, ThreadRunner};
use crate::config::HwConfig;
use crate::dispatch::OperationDispatcher;
use crate::error::HwResult;
use crate::ports::{BlockingTaskRunner, DeviceSelector, FirstDeviceSelector};
use crate::session::{AddressCache, SessionCoordinator};

pub use crate::model::*;

/// Session over `adapters` that runs device calls on worker threads and picks the first
/// device when several are attached
pub fn open_session(
    config: HwConfig,
    adapters: AdapterSet,
) -> HwResult<OperationDispatcher<ThreadRunner>> {
    open_session_with(
        config,
        adapters,
        ThreadRunner::new(),
        Box::new(FirstDeviceSelector),
    )
}

pub fn open_session_with<R: BlockingTaskRunner>(
    config: HwConfig,
    adapters: AdapterSet,
    runner: R,
    selector: Box<dyn DeviceSelector>,
) -> HwResult<OperationDispatcher<R>> {
    let session = SessionCoordinator::new(config, adapters, runner, selector, AddressCache::new())?;
    Ok(OperationDispatcher::new(Arc::new(session)))
}
