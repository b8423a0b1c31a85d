//! Built-in task kinds.

mod archive;
mod checksum;
mod exec;
mod fs;
mod lock;
mod write_json;

use std::path::{Path, PathBuf};

use super::{Binding, Task, TaskRegistry};
use crate::error::{Error, Result};

pub use archive::ExtractArchiveTask;
pub use checksum::{sha256_file, ChecksumTask};
pub use exec::ExecTask;
pub use fs::{ChmodTask, CopyTask, CreateDirectoryTask, HardlinkTask, RemoveTask};
pub use lock::{LockTask, UnlockTask};
pub use write_json::WriteJsonTask;

/// Register every built-in task kind.
pub fn register_builtin(registry: &TaskRegistry) {
    registry.register(CopyTask);
    registry.register(HardlinkTask);
    registry.register(RemoveTask);
    registry.register(CreateDirectoryTask);
    registry.register(ChmodTask);
    registry.register(ChecksumTask);
    registry.register(WriteJsonTask);
    registry.register(ExecTask);
    registry.register(ExtractArchiveTask);
    registry.register(LockTask);
    registry.register(UnlockTask);
}

/// Filesystem path of the bound element.
pub(crate) fn source_path(task: &Task, binding: &Binding) -> Result<PathBuf> {
    binding
        .element
        .path()
        .map(|p| p.as_path().to_path_buf())
        .ok_or_else(|| {
            Error::task(
                task.kind_name(),
                format!("{} element has no path", binding.element.kind()),
            )
        })
}

/// The binding's target, which must be set.
pub(crate) fn target_path(task: &Task, binding: &Binding) -> Result<PathBuf> {
    if binding.target.is_empty() {
        return Err(Error::task(
            task.kind_name(),
            format!("no target for {}", binding.element.kind()),
        ));
    }
    Ok(PathBuf::from(&binding.target))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use kombi_common::FsPath;
    use kombi_element::Element;
    use std::path::Path;

    pub fn file_element(path: &Path) -> Element {
        Element::create(FsPath::new(path), None).unwrap()
    }
}
