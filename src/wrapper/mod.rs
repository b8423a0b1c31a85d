//! Task wrappers: how a bound task is executed.
//!
//! The `inline` wrapper performs the task in the current process. The other
//! wrappers serialise the task to a job file, launch a child process that
//! runs `exec-job <job.json> <result.json>`, stream its output and read the
//! produced elements back from the result file:
//!
//! - `subprocess`: the kombi executable itself.
//! - `python`, `python3`: an alternate executable resolved through
//!   `KOMBI_PYTHON_EXECUTABLE` / `KOMBI_PYTHON3_EXECUTABLE` or `PATH`.
//! - `user`: the kombi executable launched through `sudo` as the account
//!   named by the `wrapper.user` metadata.
//!
//! Children see `KOMBI_TASKWRAPPER_PARENT_PID`. A non-zero exit becomes
//! [`Error::WrapperFailed`].

mod inline;
mod interpreter;
mod subprocess;
mod user;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::process::ChildCommand;
use crate::task::Task;
use kombi_element::Element;

pub use inline::InlineWrapper;
pub use interpreter::InterpreterWrapper;
pub use subprocess::SubprocessWrapper;
pub use user::{sanitized_env, UserWrapper};

/// Set in every wrapped child to the launching process id.
pub const PARENT_PID_ENV: &str = "KOMBI_TASKWRAPPER_PARENT_PID";

/// How the dispatcher wants a task executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapperContext {
    /// Echo child output instead of logging it.
    pub verbose: bool,
    /// Wait for children; when false they are launched detached.
    pub detach: bool,
}

/// Result of running a task through a wrapper.
#[derive(Debug, Clone)]
pub enum WrapperOutcome {
    /// The task finished and produced these elements.
    Completed(Vec<Element>),
    /// A detached child was launched with this pid.
    Launched(u32),
}

/// Executes tasks.
pub trait TaskWrapper: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Execute `task` with its bindings.
    fn run(&self, task: &Task, context: &WrapperContext) -> Result<WrapperOutcome>;
}

#[derive(Serialize, Deserialize)]
struct JobResult {
    outputs: Vec<Element>,
}

/// Job and result file locations of one wrapped invocation.
///
/// The directory is removed when the value is dropped, unless
/// [`JobFiles::keep`] handed it over to a detached child.
#[derive(Debug)]
pub struct JobFiles {
    pub dir: PathBuf,
    pub job: PathBuf,
    pub result: PathBuf,
    kept: bool,
}

impl JobFiles {
    /// Write `task` to a fresh job directory.
    pub fn create(task: &Task) -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("kombi-job-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&dir)?;
        let files = Self {
            job: dir.join("job.json"),
            result: dir.join("result.json"),
            dir,
            kept: false,
        };
        fs::write(&files.job, serde_json::to_vec_pretty(&task.to_json()?)?)?;
        Ok(files)
    }

    /// Elements written by the child.
    pub fn read_outputs(&self) -> Result<Vec<Element>> {
        read_result(&self.result)
    }

    /// Delete the job directory.
    pub fn cleanup(&self) {
        if !self.dir.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::debug!("Could not remove {}: {}", self.dir.display(), e);
        }
    }

    /// Leave the directory on disk for a child that outlives this value.
    pub fn keep(mut self) -> PathBuf {
        self.kept = true;
        self.dir.clone()
    }

    /// `exec-job <job> <result>` arguments.
    pub fn exec_args(&self) -> Vec<String> {
        vec![
            "exec-job".to_string(),
            self.job.display().to_string(),
            self.result.display().to_string(),
        ]
    }
}

impl Drop for JobFiles {
    fn drop(&mut self) {
        if !self.kept {
            self.cleanup();
        }
    }
}

/// Write a result file.
pub fn write_result(path: &Path, outputs: &[Element]) -> Result<()> {
    let result = JobResult {
        outputs: outputs.to_vec(),
    };
    fs::write(path, serde_json::to_vec_pretty(&result)?)?;
    Ok(())
}

/// Read a result file.
pub fn read_result(path: &Path) -> Result<Vec<Element>> {
    let contents = fs::read(path)
        .map_err(|e| Error::task("exec-job", format!("cannot read {}: {e}", path.display())))?;
    let result: JobResult = serde_json::from_slice(&contents)?;
    Ok(result.outputs)
}

/// Child side of the job protocol: perform the task in `job` and write its
/// outputs to `result`.
pub fn execute_job(job: &Path, result: &Path) -> Result<()> {
    if let Ok(parent) = std::env::var(PARENT_PID_ENV) {
        tracing::debug!("Running job {} for parent pid {}", job.display(), parent);
    }
    let value: serde_json::Value = serde_json::from_slice(&fs::read(job)?)?;
    let mut task = Task::from_json(&value)?;
    let outputs = task.output()?;
    write_result(result, &outputs)
}

fn wrapper_timeout(task: &Task) -> Option<Duration> {
    task.metadata("wrapper.timeout")
        .and_then(serde_json::Value::as_f64)
        .filter(|secs| *secs > 0.0)
        .map(Duration::from_secs_f64)
}

fn launch_failed(wrapper: &str, error: Error) -> Error {
    Error::WrapperFailed {
        wrapper: wrapper.to_string(),
        exit_code: None,
        stderr: error.to_string(),
    }
}

/// Launch `command` for an already written job and collect its outputs.
/// The job directory is removed on every path except a detached launch.
pub(crate) fn run_child(
    wrapper: &str,
    task: &Task,
    context: &WrapperContext,
    job: JobFiles,
    command: ChildCommand,
) -> Result<WrapperOutcome> {
    let command = command
        .env(PARENT_PID_ENV, std::process::id().to_string())
        .echo(context.verbose)
        .timeout(wrapper_timeout(task));

    if context.detach {
        let pid = command
            .spawn_detached()
            .map_err(|e| launch_failed(wrapper, e))?;
        let dir = job.keep();
        tracing::info!("Launched {} job {} as pid {}", wrapper, dir.display(), pid);
        return Ok(WrapperOutcome::Launched(pid));
    }

    let output = command.run().map_err(|e| launch_failed(wrapper, e))?;
    if !output.success() {
        tracing::error!(
            "{} job for {} failed with exit code {:?}",
            wrapper,
            task.kind_name(),
            output.exit_code
        );
        let mut stderr = output.stderr.trim().to_string();
        if output.timed_out {
            stderr = format!("timed out. {stderr}");
        }
        return Err(Error::WrapperFailed {
            wrapper: wrapper.to_string(),
            exit_code: output.exit_code,
            stderr,
        });
    }
    job.read_outputs().map(WrapperOutcome::Completed)
}

/// Name-indexed table of wrappers.
#[derive(Default)]
pub struct WrapperRegistry {
    wrappers: RwLock<BTreeMap<String, Arc<dyn TaskWrapper>>>,
}

impl WrapperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in wrappers.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(InlineWrapper);
        registry.register(SubprocessWrapper);
        registry.register(InterpreterWrapper::new("python"));
        registry.register(InterpreterWrapper::new("python3"));
        registry.register(UserWrapper);
        registry
    }

    /// Register (or replace) a wrapper.
    pub fn register<W: TaskWrapper + 'static>(&self, wrapper: W) {
        tracing::debug!("Registering task wrapper: {}", wrapper.name());
        self.wrappers
            .write()
            .insert(wrapper.name().to_string(), Arc::new(wrapper));
    }

    /// Look up a wrapper.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TaskWrapper>> {
        self.wrappers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::WrapperNotFound(name.to_string()))
    }

    /// Sorted wrapper names.
    pub fn names(&self) -> Vec<String> {
        self.wrappers.read().keys().cloned().collect()
    }
}

/// The process-wide wrapper registry.
pub fn wrappers() -> &'static WrapperRegistry {
    static REGISTRY: OnceLock<WrapperRegistry> = OnceLock::new();
    REGISTRY.get_or_init(WrapperRegistry::with_builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kombi_common::FsPath;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_wrappers() {
        let registry = WrapperRegistry::with_builtin();
        assert_eq!(
            registry.names(),
            vec!["inline", "python", "python3", "subprocess", "user"]
        );
        assert!(matches!(registry.get("ssh"), Err(Error::WrapperNotFound(_))));
    }

    #[test]
    fn test_job_files_and_execute_job() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let target = dir.path().join("copy/a.txt");

        let mut task = Task::create("copy").unwrap();
        task.add(
            Element::create(FsPath::new(&source), None).unwrap(),
            target.display().to_string(),
        );
        let job = JobFiles::create(&task).unwrap();
        assert_eq!(job.exec_args()[0], "exec-job");

        execute_job(&job.job, &job.result).unwrap();
        let outputs = job.read_outputs().unwrap();
        job.cleanup();

        assert_eq!(fs::read_to_string(&target).unwrap(), "data");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].path().unwrap().as_path(), target.as_path());
        assert!(!job.dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_child_removes_job_dir() {
        let task = Task::create("copy").unwrap();
        let job = JobFiles::create(&task).unwrap();
        let dir = job.dir.clone();
        assert!(dir.exists());

        let err = run_child(
            "subprocess",
            &task,
            &WrapperContext::default(),
            job,
            ChildCommand::new("false"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::WrapperFailed { exit_code: Some(1), .. }));
        assert!(!dir.exists());
    }

    #[test]
    fn test_unlaunchable_child_is_wrapper_failure() {
        let task = Task::create("copy").unwrap();
        let job = JobFiles::create(&task).unwrap();
        let dir = job.dir.clone();

        let err = run_child(
            "python3",
            &task,
            &WrapperContext::default(),
            job,
            ChildCommand::new("/does/not/exist/kombi-python3"),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(matches!(
            &err,
            Error::WrapperFailed { wrapper, exit_code: None, .. } if wrapper == "python3"
        ));
        assert!(!dir.exists());
    }

    #[test]
    fn test_kept_job_dir_survives_drop() {
        let task = Task::create("copy").unwrap();
        let dir = JobFiles::create(&task).unwrap().keep();
        assert!(dir.join("job.json").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_timeout_metadata() {
        let mut task = Task::create("copy").unwrap();
        assert_eq!(wrapper_timeout(&task), None);
        task.set_metadata("wrapper.timeout", json!(2.5));
        assert_eq!(wrapper_timeout(&task), Some(Duration::from_millis(2500)));
    }
}
