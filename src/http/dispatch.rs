use snafu::{OptionExt as _, Snafu};
use tokio::runtime::Handle;

use super::BoxFuture;

/// The pool that runs enqueued calls.
///
/// Each in-flight call is handed over as one task. Implementations should
/// make tasks cheap enough that thousands can be outstanding at once.
pub trait Dispatcher: Send + Sync {
    /// Schedules `task` to run to completion in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be scheduled.
    fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<(), DispatchError>;
}

/// The error returned when a task cannot be scheduled.
#[derive(Debug, Snafu)]
pub enum DispatchError {
    /// No runtime was available to run the task.
    #[snafu(display("No async runtime available to dispatch the call"))]
    NoRuntime,
    /// The dispatcher refused the task.
    #[snafu(display("Dispatcher rejected the call: {reason}"))]
    Rejected {
        /// Why the task was refused.
        reason: String,
    },
}

impl crate::Error for DispatchError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Spawns one tokio task per call.
///
/// Without an explicit handle, tasks are spawned on the runtime that is
/// current when the call is enqueued.
#[derive(Debug, Clone, Default)]
pub struct TaskDispatcher {
    handle: Option<Handle>,
}

impl TaskDispatcher {
    /// Spawns on the current runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns on the given runtime.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Dispatcher for TaskDispatcher {
    fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<(), DispatchError> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => Handle::try_current().ok().context(NoRuntimeSnafu)?,
        };
        drop(handle.spawn(task));
        Ok(())
    }
}
