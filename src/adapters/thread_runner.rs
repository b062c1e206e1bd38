//! `BlockingTaskRunner` implementations
//!
//! `ThreadRunner` moves the device call to a scoped worker thread and keeps the calling
//! thread waiting on a `crossbeam` select over the worker result, cancel requests and the
//! prompt delay. `InlineRunner` runs the call on the caller's thread and cannot cancel.
//!
//! Each task gets its own cancel channel, registered with the runner while the task runs.
//! A cancel request goes to the tasks running at that moment and to no later one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{after, bounded, select, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{HwError, HwResult};
use crate::ports::{BlockingTaskRunner, TaskPrompt};

type TaskSlots = Arc<Mutex<Vec<(u64, Sender<()>)>>>;

/// Requests cancellation of the tasks the owning `ThreadRunner` is waiting on
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tasks: TaskSlots,
}

impl CancelHandle {
    /// Does nothing when no task is running
    pub fn cancel(&self) {
        for (_, tx) in self.tasks.lock().iter() {
            // A request is already pending when the slot is full.
            let _ = tx.try_send(());
        }
    }
}

#[derive(Debug, Default)]
pub struct ThreadRunner {
    tasks: TaskSlots,
    next_task: AtomicU64,
}

impl ThreadRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tasks: Arc::clone(&self.tasks),
        }
    }

    pub fn tasks_in_flight(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Keeps a task's cancel channel registered until the task returns
struct TaskSlot<'a> {
    tasks: &'a TaskSlots,
    id: u64,
}

impl Drop for TaskSlot<'_> {
    fn drop(&mut self) {
        self.tasks.lock().retain(|(id, _)| *id != self.id);
    }
}

impl BlockingTaskRunner for ThreadRunner {
    fn run_blocking<T, F>(
        &self,
        prompt: &TaskPrompt,
        work: F,
        cancel_hook: &(dyn Fn() -> bool + Sync),
    ) -> HwResult<T>
    where
        T: Send,
        F: FnOnce() -> HwResult<T> + Send,
    {
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = bounded(1);
        self.tasks.lock().push((id, cancel_tx));
        let _slot = TaskSlot {
            tasks: &self.tasks,
            id,
        };

        thread::scope(|scope| {
            let (done_tx, done_rx) = bounded::<HwResult<T>>(1);
            let worker = scope.spawn(move || {
                let _ = done_tx.send(work());
            });

            let show_prompt = after(prompt.show_delay);
            let mut cancel_sent = false;
            let outcome = loop {
                select! {
                    recv(done_rx) -> msg => break msg.ok(),
                    recv(cancel_rx) -> _ => {
                        if cancel_sent {
                            continue;
                        }
                        if cancel_hook() {
                            debug!("Cancel request passed to the device");
                            cancel_sent = true;
                        } else {
                            debug!("Device call cannot be cancelled, still waiting");
                        }
                    },
                    recv(show_prompt) -> _ => {
                        info!(title = %prompt.title, "{}", prompt.message);
                    },
                }
            };

            match (worker.join(), outcome) {
                (Ok(()), Some(result)) => result,
                _ => {
                    warn!("Device task terminated without a result");
                    Err(HwError::Internal {
                        reason: "device task panicked".to_string(),
                    })
                }
            }
        })
    }
}

/// Runs the task on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineRunner;

impl BlockingTaskRunner for InlineRunner {
    fn run_blocking<T, F>(
        &self,
        prompt: &TaskPrompt,
        work: F,
        _cancel_hook: &(dyn Fn() -> bool + Sync),
    ) -> HwResult<T>
    where
        T: Send,
        F: FnOnce() -> HwResult<T> + Send,
    {
        debug!(title = %prompt.title, "{}", prompt.message);
        work()
    }
}
