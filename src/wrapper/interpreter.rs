use super::{launch_failed, run_child, JobFiles, TaskWrapper, WrapperContext, WrapperOutcome};
use crate::error::Result;
use crate::process::ChildCommand;
use crate::task::Task;
use crate::tools;

/// Runs the job with a named interpreter executable (`python`, `python3`).
///
/// The executable comes from `KOMBI_<NAME>_EXECUTABLE` or `PATH` and must
/// accept `exec-job <job.json> <result.json>`.
pub struct InterpreterWrapper {
    name: String,
}

impl InterpreterWrapper {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn command(&self, job: &JobFiles) -> Result<ChildCommand> {
        Ok(ChildCommand::new(tools::executable(&self.name)?).args(job.exec_args()))
    }
}

impl TaskWrapper for InterpreterWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: &Task, context: &WrapperContext) -> Result<WrapperOutcome> {
        let job = JobFiles::create(task)?;
        let command = self
            .command(&job)
            .map_err(|e| launch_failed(&self.name, e))?;
        run_child(&self.name, task, context, job, command)
    }
}
