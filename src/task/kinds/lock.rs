//! Lock files and the "all unlocked" rendezvous.
//!
//! `lock` drops `<lockDirectory>/<uuid>.lock` per binding and records the
//! file on the outputs as the context variables `lockFile` and
//! `lockDirectory`. `unlock` removes the lock files of its inputs, waits
//! (bounded) until no `*.lock` remains in each directory and then races to
//! create `allunlocked` there. Only the job that creates it emits outputs.

use serde_json::json;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::task::{Options, Task, TaskKind};
use kombi_element::Element;

const LOCK_EXT: &str = "lock";
const RENDEZVOUS_FILE: &str = "allunlocked";
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Creates one lock file per binding.
pub struct LockTask;

impl TaskKind for LockTask {
    fn name(&self) -> &str {
        "lock"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("lockDirectory".into(), json!("{sourceDirectory}"));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let mut outputs = task.default_output();
        for (binding, output) in task.bindings().iter().zip(outputs.iter_mut()) {
            let dir = PathBuf::from(task.binding_option("lockDirectory", binding)?);
            if dir.as_os_str().is_empty() {
                return Err(Error::task(task.kind_name(), "lockDirectory evaluated to an empty path"));
            }
            fs::create_dir_all(&dir)?;
            let lock = dir.join(format!("{}.{LOCK_EXT}", Uuid::new_v4().simple()));
            fs::write(&lock, std::process::id().to_string())?;
            tracing::debug!("Created lock {}", lock.display());

            output.set_var("lockFile", lock.display().to_string(), true);
            output.set_var("lockDirectory", dir.display().to_string(), true);
        }
        Ok(outputs)
    }
}

/// Releases locks and emits outputs from exactly one releasing job.
pub struct UnlockTask;

fn pending_locks(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == LOCK_EXT) {
            count += 1;
        }
    }
    Ok(count)
}

fn wait_until_unlocked(dir: &Path) -> Result<bool> {
    let deadline = Instant::now() + POLL_TIMEOUT;
    loop {
        if pending_locks(dir)? == 0 {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(POLL_PERIOD);
    }
}

/// Atomically claim the rendezvous file. `false` when another job won.
fn claim_rendezvous(dir: &Path) -> Result<bool> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dir.join(RENDEZVOUS_FILE))
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl TaskKind for UnlockTask {
    fn name(&self) -> &str {
        "unlock"
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let mut directories = BTreeSet::new();
        for binding in task.bindings() {
            let element = &binding.element;
            let lock = element.var("lockFile").map_err(Error::from)?.to_string();
            let lock = PathBuf::from(lock);
            match fs::remove_file(&lock) {
                Ok(()) => tracing::debug!("Released lock {}", lock.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            let dir = match element.var("lockDirectory") {
                Ok(dir) => PathBuf::from(dir.to_string()),
                Err(_) => lock.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            directories.insert(dir);
        }

        for dir in &directories {
            if !wait_until_unlocked(dir)? {
                tracing::warn!("Locks remain in {} after {:?}, not the last job", dir.display(), POLL_TIMEOUT);
                return Ok(Vec::new());
            }
            if !claim_rendezvous(dir)? {
                tracing::debug!("Another job already released {}", dir.display());
                return Ok(Vec::new());
            }
        }
        Ok(task.default_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::kinds::testing::file_element;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn locked(dir: &Path, names: &[&str]) -> Vec<Element> {
        let mut task = Task::new(Arc::new(LockTask));
        task.set_option("lockDirectory", json!(dir.join("locks").display().to_string()))
            .unwrap();
        for name in names {
            let path = dir.join(name);
            fs::write(&path, "").unwrap();
            task.add(file_element(&path), "");
        }
        task.output().unwrap()
    }

    #[test]
    fn test_lock_sets_context() {
        let dir = tempdir().unwrap();
        let outputs = locked(dir.path(), &["a.txt", "b.txt"]);
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].is_context_var("lockFile"));
        assert_eq!(pending_locks(&dir.path().join("locks")).unwrap(), 2);
    }

    #[test]
    fn test_single_winner() {
        let dir = tempdir().unwrap();
        let outputs = locked(dir.path(), &["a.txt", "b.txt"]);

        let mut first = Task::new(Arc::new(UnlockTask));
        first.add(outputs[0].clone(), "");
        let mut second = Task::new(Arc::new(UnlockTask));
        second.add(outputs[1].clone(), "");

        // Release the second lock by hand so the first job sees no locks left.
        fs::remove_file(outputs[1].var("lockFile").unwrap().to_string()).unwrap();
        assert_eq!(first.output().unwrap().len(), 1);
        assert!(dir.path().join("locks").join(RENDEZVOUS_FILE).exists());
        assert_eq!(second.output().unwrap().len(), 0);
    }

    #[test]
    fn test_unlock_needs_lock_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "").unwrap();
        let mut task = Task::new(Arc::new(UnlockTask));
        task.add(file_element(&path), "");
        assert!(task.output().unwrap_err().is_resolution());
    }
}
