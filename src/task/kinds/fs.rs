//! Filesystem task kinds.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ensure_parent, source_path, target_path};
use crate::error::{Error, Result};
use crate::task::{Options, Task, TaskKind};
use kombi_element::Element;

/// Copy files or directory trees to their targets.
pub struct CopyTask;

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::task("copy", e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::task("copy", e.to_string()))?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

impl TaskKind for CopyTask {
    fn name(&self) -> &str {
        "copy"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("overwrite".into(), json!(true));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let overwrite = task.option_bool("overwrite")?;
        for binding in task.bindings() {
            let source = source_path(task, binding)?;
            let target = target_path(task, binding)?;
            if target.exists() && !overwrite {
                tracing::debug!("Keeping existing {}", target.display());
                continue;
            }
            tracing::debug!("Copying {} -> {}", source.display(), target.display());
            if source.is_dir() {
                copy_tree(&source, &target)?;
            } else {
                ensure_parent(&target)?;
                fs::copy(&source, &target)?;
            }
        }
        Ok(task.default_output())
    }
}

/// Hard-link files to their targets, replacing existing targets.
pub struct HardlinkTask;

impl TaskKind for HardlinkTask {
    fn name(&self) -> &str {
        "hardlink"
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        for binding in task.bindings() {
            let source = source_path(task, binding)?;
            let target = target_path(task, binding)?;
            ensure_parent(&target)?;
            if target.exists() {
                fs::remove_file(&target)?;
            }
            tracing::debug!("Linking {} -> {}", source.display(), target.display());
            fs::hard_link(&source, &target)?;
        }
        Ok(task.default_output())
    }
}

/// Delete the bound files or directories. Outputs are the inputs.
pub struct RemoveTask;

impl TaskKind for RemoveTask {
    fn name(&self) -> &str {
        "remove"
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        for binding in task.bindings() {
            let path = source_path(task, binding)?;
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            } else {
                tracing::debug!("Nothing to remove at {}", path.display());
            }
        }
        Ok(task.bindings().iter().map(|b| b.element.clone()).collect())
    }
}

/// Create the target directory (or the element's own path when no target
/// is bound).
pub struct CreateDirectoryTask;

impl TaskKind for CreateDirectoryTask {
    fn name(&self) -> &str {
        "createDirectory"
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        for binding in task.bindings() {
            let dir = if binding.target.is_empty() {
                source_path(task, binding)?
            } else {
                PathBuf::from(&binding.target)
            };
            fs::create_dir_all(&dir)?;
        }
        Ok(task.default_output())
    }
}

/// Change permissions of the target (or the element) and, optionally,
/// everything below it.
pub struct ChmodTask;

fn parse_mode(task: &Task, name: &str) -> Result<u32> {
    let raw = task.option_str(name)?;
    u32::from_str_radix(raw.trim(), 8)
        .map_err(|_| Error::task(task.kind_name(), format!("{name} is not an octal mode: {raw}")))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    tracing::warn!("chmod is not supported on this platform, leaving {}", path.display());
    Ok(())
}

impl TaskKind for ChmodTask {
    fn name(&self) -> &str {
        "chmod"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("directoryMode".into(), json!("775"));
        options.insert("fileMode".into(), json!("664"));
        options.insert("recursive".into(), json!(true));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let dir_mode = parse_mode(task, "directoryMode")?;
        let file_mode = parse_mode(task, "fileMode")?;
        let recursive = task.option_bool("recursive")?;
        for binding in task.bindings() {
            let root = if binding.target.is_empty() {
                source_path(task, binding)?
            } else {
                PathBuf::from(&binding.target)
            };
            let walker = WalkDir::new(&root).max_depth(if recursive { usize::MAX } else { 0 });
            for entry in walker {
                let entry = entry.map_err(|e| Error::task("chmod", e.to_string()))?;
                let mode = if entry.file_type().is_dir() { dir_mode } else { file_mode };
                set_mode(entry.path(), mode)?;
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

    #[test]
    fn test_copy_file_and_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("nested/b.txt"), "b").unwrap();

        let mut task = Task::new(Arc::new(CopyTask));
        let out_file = dir.path().join("out/deep/a.txt");
        task.add(file_element(&src.join("a.txt")), out_file.display().to_string());
        let out_tree = dir.path().join("tree");
        task.add(file_element(&src), out_tree.display().to_string());

        let outputs = task.output().unwrap();
        assert_eq!(fs::read_to_string(&out_file).unwrap(), "a");
        assert_eq!(fs::read_to_string(out_tree.join("nested/b.txt")).unwrap(), "b");
        assert_eq!(outputs[0].path().unwrap().as_path(), out_file.as_path());
    }

    #[test]
    fn test_copy_requires_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let mut task = Task::new(Arc::new(CopyTask));
        task.add(file_element(&dir.path().join("a.txt")), "");
        assert!(task.output().is_err());
    }

    #[test]
    fn test_copy_without_overwrite_keeps_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "new").unwrap();
        fs::write(dir.path().join("b.txt"), "old").unwrap();
        let mut task = Task::new(Arc::new(CopyTask));
        task.set_option("overwrite", json!(false)).unwrap();
        task.add(
            file_element(&dir.path().join("a.txt")),
            dir.path().join("b.txt").display().to_string(),
        );
        task.output().unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "old");
    }

    #[test]
    fn test_hardlink_and_remove() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "a").unwrap();
        let link = dir.path().join("links/a.txt");

        let mut task = Task::new(Arc::new(HardlinkTask));
        task.add(file_element(&source), link.display().to_string());
        task.output().unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "a");

        let mut task = Task::new(Arc::new(RemoveTask));
        task.add(file_element(&link), "");
        let outputs = task.output().unwrap();
        assert!(!link.exists());
        assert!(source.exists());
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_create_directory() {
        let dir = tempdir().unwrap();
        let mut task = Task::new(Arc::new(CreateDirectoryTask));
        let target = dir.path().join("a/b/c");
        task.add(file_element(dir.path()), target.display().to_string());
        task.output().unwrap();
        assert!(target.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_chmod() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().join("pub");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();

        let mut task = Task::new(Arc::new(ChmodTask));
        task.set_option("fileMode", json!("640")).unwrap();
        task.add(file_element(&root), "");
        task.output().unwrap();

        let mode = fs::metadata(root.join("a.txt")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        let mode = fs::metadata(&root).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o775);

        task.set_option("fileMode", json!("9z")).unwrap();
        assert!(task.output().is_err());
    }
}
