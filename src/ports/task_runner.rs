//! Running blocking device calls off the coordinating thread

use std::time::Duration;

use crate::error::HwResult;

pub const BUSY_TITLE: &str = "Hardware wallet";
pub const BUSY_MESSAGE: &str = "Complete the action on your hardware wallet device";
pub const CONFIRM_MESSAGE: &str =
    "Click the confirmation button on your hardware wallet to exit the address display";

/// Text shown while a device call is in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPrompt {
    pub title: String,
    pub message: String,
    /// How long to wait before showing anything
    pub show_delay: Duration,
}

impl TaskPrompt {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            show_delay: Duration::ZERO,
        }
    }

    pub fn busy() -> Self {
        Self::new(BUSY_TITLE, BUSY_MESSAGE)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.show_delay = delay;
        self
    }
}

impl Default for TaskPrompt {
    fn default() -> Self {
        Self::busy()
    }
}

/// Runs `work` to completion while the caller stays responsive to cancellation.
///
/// `cancel_hook` is invoked when the user asks to cancel. It returns `true` when the request
/// reached the device; the runner then keeps waiting for `work` to come back, which it does
/// with `HwError::Cancelled`. `false` means the call cannot be interrupted and the runner keeps
/// waiting as if nothing happened.
pub trait BlockingTaskRunner: Send + Sync {
    fn run_blocking<T, F>(
        &self,
        prompt: &TaskPrompt,
        work: F,
        cancel_hook: &(dyn Fn() -> bool + Sync),
    ) -> HwResult<T>
    where
        T: Send,
        F: FnOnce() -> HwResult<T> + Send;
}
