//! Time-sliced task capability.

use std::fmt;

use crate::error::TaskResult;

/// A job fired once per elapsed slice.
///
/// Tasks hold no scheduling state; everything they need about the slice comes
/// in through the arguments. Implementations must be shareable because the same
/// task object may be registered with a scheduler and inspected elsewhere.
pub trait SliceTask: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Run for the slice that started at `last_slice_start_ms` and lasted
    /// `slice_ms`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler and otherwise ignored.
    fn run(&self, last_slice_start_ms: i64, slice_ms: i64) -> TaskResult;
}

/// Adapts a closure into a [`SliceTask`].
pub struct FnTask<F> {
    name: String,
    f: F,
}

impl<F> FnTask<F>
where
    F: Fn(i64, i64) -> TaskResult + Send + Sync,
{
    /// Wrap `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> SliceTask for FnTask<F>
where
    F: Fn(i64, i64) -> TaskResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, last_slice_start_ms: i64, slice_ms: i64) -> TaskResult {
        (self.f)(last_slice_start_ms, slice_ms)
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;

    #[test]
    fn test_fn_task_passes_arguments() {
        let task = FnTask::new("check", |start, slice| {
            if start == 1_000 && slice == 500 {
                Ok(())
            } else {
                Err(TaskError::failed("unexpected arguments"))
            }
        });
        assert_eq!(task.name(), "check");
        assert!(matches!(task.run(1_000, 500), Ok(())));
        assert!(matches!(task.run(0, 500), Err(TaskError::Failed(_))));
    }
}
