use super::{run_child, JobFiles, TaskWrapper, WrapperContext, WrapperOutcome};
use crate::error::Result;
use crate::process::ChildCommand;
use crate::task::Task;
use crate::tools;

/// Runs the task in a fresh kombi process.
pub struct SubprocessWrapper;

impl SubprocessWrapper {
    pub(crate) fn command(job: &JobFiles, verbose: bool) -> Result<ChildCommand> {
        let mut command = ChildCommand::new(tools::kombi_executable()?);
        if verbose {
            command = command.arg("--verbose");
        }
        Ok(command.args(job.exec_args()))
    }
}

impl TaskWrapper for SubprocessWrapper {
    fn name(&self) -> &str {
        "subprocess"
    }

    fn run(&self, task: &Task, context: &WrapperContext) -> Result<WrapperOutcome> {
        let job = JobFiles::create(task)?;
        let command = Self::command(&job, context.verbose)?;
        run_child(self.name(), task, context, job, command)
    }
}
