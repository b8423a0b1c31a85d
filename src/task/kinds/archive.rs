//! Extract archives with the platform tools.

use std::fs;
use std::path::PathBuf;

use super::source_path;
use crate::error::{Error, Result};
use crate::process::ChildCommand;
use crate::task::{Binding, Task, TaskKind};
use crate::tools;
use kombi_common::FsPath;
use kombi_element::{kinds, Element};

/// Extracts `zip`, `tar` and `tarGz` elements into the target directory
/// (the archive's own directory when no target is bound). Outputs are the
/// target directories. Other archive kinds are rejected.
pub struct ExtractArchiveTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zip,
    Tar,
    TarGz,
}

impl Format {
    fn of(element: &Element) -> Result<Self> {
        let registry = kinds();
        let kind = element.kind();
        // tarGz before tar: user kinds may derive from either.
        if registry.is_kind_of(kind, "zip") {
            Ok(Format::Zip)
        } else if registry.is_kind_of(kind, "tarGz") {
            Ok(Format::TarGz)
        } else if registry.is_kind_of(kind, "tar") {
            Ok(Format::Tar)
        } else {
            Err(Error::UnsupportedArchiveType(kind.to_string()))
        }
    }

    fn command(self, archive: &str, dest: &str) -> Result<ChildCommand> {
        Ok(match self {
            Format::Zip => ChildCommand::new(tools::executable("unzip")?)
                .args(["-o", "-q", archive, "-d", dest]),
            Format::Tar => ChildCommand::new(tools::executable("tar")?)
                .args(["-xf", archive, "-C", dest]),
            Format::TarGz => ChildCommand::new(tools::executable("tar")?)
                .args(["-xzf", archive, "-C", dest]),
        })
    }
}

fn destination(task: &Task, binding: &Binding) -> Result<PathBuf> {
    if !binding.target.is_empty() {
        return Ok(PathBuf::from(&binding.target));
    }
    source_path(task, binding)?
        .parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| Error::task(task.kind_name(), "archive has no parent directory"))
}

impl TaskKind for ExtractArchiveTask {
    fn name(&self) -> &str {
        "extractArchive"
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let mut outputs = Vec::with_capacity(task.len());
        for binding in task.bindings() {
            let format = Format::of(&binding.element)?;
            let archive = source_path(task, binding)?;
            let dest = destination(task, binding)?;
            fs::create_dir_all(&dest)?;

            tracing::info!("Extracting {} into {}", archive.display(), dest.display());
            let output = format
                .command(&archive.display().to_string(), &dest.display().to_string())?
                .run()?;
            if !output.success() {
                return Err(Error::task(
                    task.kind_name(),
                    format!("extracting {} failed: {}", archive.display(), output.stderr.trim()),
                ));
            }
            outputs.push(Element::create(FsPath::new(dest), None)?);
        }
        Ok(outputs)
    }
}
