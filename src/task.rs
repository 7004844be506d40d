//! Cancellable background work: one OS thread per task, joined on drop,
//! delivering a boolean-return progress callback. No shared scheduler or
//! work queue — a simple spawn-then-join-on-drop pool is sufficient here,
//! since this crate has no event loop to host a heavier async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Complete,
    Cancelled,
    ErrorException,
}

/// A cooperative cancellation flag, checked by the worker between records.
/// Cloned into the task closure; `cancel()` is called from any thread.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The outcome of a finished task: its status and, on `Complete`, the
/// value the worker produced.
pub struct TaskResult<T> {
    pub status: TaskStatus,
    pub value: Option<T>,
    pub error: Option<CoreError>,
}

/// A handle to a task running on its own thread. Joining is the only way
/// to retrieve the result; dropping the handle without joining blocks
/// until the worker finishes, same as calling `join()` and discarding the
/// result, so no task is ever silently detached.
pub struct TaskHandle<T> {
    token: CancellationToken,
    join: Option<JoinHandle<TaskResult<T>>>,
}

impl<T> TaskHandle<T> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Blocks until the worker thread finishes and returns its result.
    pub fn join(mut self) -> TaskResult<T> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> TaskResult<T> {
        match self.join.take() {
            Some(join) => join.join().unwrap_or(TaskResult {
                status: TaskStatus::ErrorException,
                value: None,
                error: Some(CoreError::algorithm("task thread panicked")),
            }),
            None => TaskResult {
                status: TaskStatus::ErrorException,
                value: None,
                error: Some(CoreError::algorithm("task was already joined")),
            },
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.join_inner();
        }
    }
}

/// Runs `work` on a dedicated thread. `work` receives a `CancellationToken`
/// it should poll between records and a `progress` callback; calling
/// `progress(fraction)` both reports `fraction` to `on_progress` and
/// returns whether cancellation was requested — by the caller's
/// `on_progress` returning `true`, or by `cancel()` on the returned
/// handle — so `work` can use the single return value as its cue to stop.
/// On `Cancelled`, `on_cancel_cleanup` runs on the worker thread before the
/// task result is reported, to delete any partial output.
pub fn run_task<T, F, P, C>(work: F, on_progress: P, on_cancel_cleanup: C) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken, &mut dyn FnMut(f32) -> bool) -> Result<T, CoreError> + Send + 'static,
    P: Fn(f32) -> bool + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let join = std::thread::spawn(move || {
        let progress_token = worker_token.clone();
        let mut progress = move |f: f32| -> bool { on_progress(f) || progress_token.is_cancelled() };
        match work(&worker_token, &mut progress) {
            Ok(value) => TaskResult {
                status: TaskStatus::Complete,
                value: Some(value),
                error: None,
            },
            Err(CoreError::UserInput(ref msg)) if msg == "cancelled" => {
                on_cancel_cleanup();
                TaskResult {
                    status: TaskStatus::Cancelled,
                    value: None,
                    error: None,
                }
            }
            Err(e) => TaskResult {
                status: TaskStatus::ErrorException,
                value: None,
                error: Some(e),
            },
        }
    });
    TaskHandle {
        token,
        join: Some(join),
    }
}
