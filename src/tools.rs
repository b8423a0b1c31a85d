//! External executable lookup.
//!
//! Every tool kombi launches can be redirected with an environment variable
//! named `KOMBI_<TOOL>_EXECUTABLE`; otherwise the tool is located on `PATH`
//! with [`which::which`].

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Environment variable overriding the kombi executable used by child jobs.
pub const EXECUTABLE_ENV: &str = "KOMBI_EXECUTABLE";

/// Name of the override variable for `tool`.
pub fn override_var(tool: &str) -> String {
    let upper: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("KOMBI_{upper}_EXECUTABLE")
}

/// Resolve the executable for `tool`.
///
/// A set override variable wins even if the path does not exist yet, so a
/// misconfigured override fails loudly when the tool is spawned.
pub fn executable(tool: &str) -> Result<PathBuf> {
    if let Ok(path) = std::env::var(override_var(tool)) {
        if !path.is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }
    }
    which::which(tool).map_err(|_| Error::task(tool, format!("executable not found: {tool}")))
}

/// The kombi binary child jobs are launched with.
pub fn kombi_executable() -> Result<PathBuf> {
    match std::env::var(EXECUTABLE_ENV) {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(std::env::current_exe()?),
    }
}
