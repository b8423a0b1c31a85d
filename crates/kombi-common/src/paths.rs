//! Path abstraction used for discovery.
//!
//! [`FsPath`] adapts a filesystem location to the uniform surface the element
//! registry consumes: base name, parent, existence, size, directory flag and
//! children.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A filesystem-backed location.
///
/// # Examples
///
/// ```
/// use kombi_common::FsPath;
///
/// let path = FsPath::new("/shots/seq/testSeq.0001.exr");
/// assert_eq!(path.name(), "testSeq.0001.exr");
/// assert_eq!(path.parent().unwrap().name(), "seq");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsPath {
    path: PathBuf,
}

impl FsPath {
    /// Wrap a path.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// The underlying path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Base name (last component), empty for roots.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Parent location, if any.
    pub fn parent(&self) -> Option<FsPath> {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(FsPath::new)
    }

    /// Whether the location exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Whether the location is a directory.
    pub fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64> {
        if !self.path.exists() {
            return Err(Error::not_found(self.to_string()));
        }
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Direct children sorted by name. Fails for non-directories.
    pub fn children(&self) -> Result<Vec<FsPath>> {
        if !self.path.is_dir() {
            return Err(Error::not_found(format!("{} is not a directory", self)));
        }
        let mut children = std::fs::read_dir(&self.path)?
            .map(|entry| entry.map(|e| FsPath::new(e.path())))
            .collect::<std::io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children)
    }

    /// Join a relative component.
    pub fn join<P: AsRef<Path>>(&self, child: P) -> FsPath {
        FsPath::new(self.path.join(child))
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&Path> for FsPath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for FsPath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for FsPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl AsRef<Path> for FsPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
