use std::path::Path;

use super::{run_child, JobFiles, TaskWrapper, WrapperContext, WrapperOutcome};
use crate::error::{Error, Result};
use crate::process::ChildCommand;
use crate::task::Task;
use crate::tools;

const IDENTITY_VARS: &[&str] = &["USER", "USERNAME", "HOME", "LOGNAME"];

fn is_cache_var(name: &str) -> bool {
    name == "XDG_CACHE_HOME" || name.ends_with("_CACHE_DIR") || name.ends_with("_CACHE_PATH")
}

/// Environment for a child running as `user`: identity variables removed,
/// cache locations moved to a per-user subdirectory, everything else kept.
pub fn sanitized_env(
    vars: impl IntoIterator<Item = (String, String)>,
    user: &str,
) -> Vec<(String, String)> {
    vars.into_iter()
        .filter(|(name, _)| !IDENTITY_VARS.contains(&name.as_str()))
        .map(|(name, value)| {
            if is_cache_var(&name) && !value.is_empty() {
                let value = Path::new(&value).join(user).display().to_string();
                (name, value)
            } else {
                (name, value)
            }
        })
        .collect()
}

/// Runs the job as another account through `sudo`.
pub struct UserWrapper;

impl UserWrapper {
    pub(crate) fn command(task: &Task, job: &JobFiles) -> Result<ChildCommand> {
        let user = task
            .metadata_str("wrapper.user")
            .ok_or_else(|| Error::config("the user wrapper needs \"wrapper.user\" metadata"))?;
        Ok(ChildCommand::new(tools::executable("sudo")?)
            .args(["-E", "-u", user.as_str()])
            .arg(tools::kombi_executable()?.display().to_string())
            .args(job.exec_args())
            .env_clear_with(sanitized_env(std::env::vars(), &user)))
    }
}

#[cfg(unix)]
fn share_job_dir(job: &JobFiles) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&job.dir, std::fs::Permissions::from_mode(0o777))?;
    std::fs::set_permissions(&job.job, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn share_job_dir(_job: &JobFiles) -> Result<()> {
    Ok(())
}

impl TaskWrapper for UserWrapper {
    fn name(&self) -> &str {
        "user"
    }

    fn run(&self, task: &Task, context: &WrapperContext) -> Result<WrapperOutcome> {
        let job = JobFiles::create(task)?;
        let command = Self::command(task, &job)?;
        share_job_dir(&job)?;
        run_child(self.name(), task, context, job, command)
    }
}
