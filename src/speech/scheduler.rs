//! One-shot deferred execution for delayed restarts.

use std::thread;
use std::time::Duration;

use tracing::trace;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task once after a delay.
///
/// Implementations never run the task before `delay` has elapsed.
/// Cancellation is the caller's concern; see `RecognitionAdapter::restart`.
pub trait RestartScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task);
}

/// Sleeps on a dedicated thread per scheduled task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl RestartScheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        trace!(?delay, "scheduling deferred task");
        thread::spawn(move || {
            thread::sleep(delay);
            task();
        });
    }
}
