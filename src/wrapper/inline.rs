use super::{TaskWrapper, WrapperContext, WrapperOutcome};
use crate::error::Result;
use crate::task::Task;

/// Performs the task in the current process. Not cancellable.
pub struct InlineWrapper;

impl TaskWrapper for InlineWrapper {
    fn name(&self) -> &str {
        "inline"
    }

    fn run(&self, task: &Task, _context: &WrapperContext) -> Result<WrapperOutcome> {
        let mut task = task.clone();
        task.output().map(WrapperOutcome::Completed)
    }
}
