//! Environment and temporary-location procedures.

use std::path::PathBuf;

use super::Procedure;

/// Environment variable overriding the base directory used by `tmp` and `tmpdir`.
pub const TEMP_DIR_ENV: &str = "KOMBI_TEMP_REMOTE_DIR";

pub(super) fn procedures() -> Vec<Procedure> {
    vec![
        Procedure::new("tmp", 0, Some(0), |_| Ok(temp_root().display().to_string())),
        Procedure::new("tmpdir", 0, Some(0), |_| {
            // the name is fresh; the directory itself is left for the caller to create
            let dir = temp_root().join(format!("kombi-{}", uuid::Uuid::new_v4().simple()));
            Ok(dir.display().to_string())
        }),
        Procedure::new("env", 1, Some(1), |args| {
            Ok(std::env::var(&args[0]).unwrap_or_default())
        }),
    ]
}

fn temp_root() -> PathBuf {
    match std::env::var(TEMP_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir(),
    }
}
