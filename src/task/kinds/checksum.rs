//! Compare source and target contents by SHA-256.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use super::{source_path, target_path};
use crate::error::{Error, Result};
use crate::task::{Options, Task, TaskKind};
use kombi_element::Element;

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Fails with [`Error::ChecksumMatch`] when a target differs from its
/// source.
pub struct ChecksumTask;

impl TaskKind for ChecksumTask {
    fn name(&self) -> &str {
        "checksum"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("ignoreMissingTarget".into(), json!(false));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let ignore_missing = task.option_bool("ignoreMissingTarget")?;
        for binding in task.bindings() {
            let source = source_path(task, binding)?;
            let target = target_path(task, binding)?;
            if !target.exists() {
                if ignore_missing {
                    tracing::debug!("Skipping checksum, {} does not exist", target.display());
                    continue;
                }
                return Err(Error::task(
                    task.kind_name(),
                    format!("target does not exist: {}", target.display()),
                ));
            }
            let source_digest = sha256_file(&source)?;
            let target_digest = sha256_file(&target)?;
            if source_digest != target_digest {
                return Err(Error::ChecksumMatch {
                    source_path: source.display().to_string(),
                    source_digest,
                    target_path: target.display().to_string(),
                    target_digest,
                });
            }
            tracing::debug!("Checksum ok: {} ({})", target.display(), target_digest);
        }
        Ok(task.default_output())
    }
}
