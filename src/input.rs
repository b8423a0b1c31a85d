//! Turning a starting path into input elements.

use kombi_common::FsPath;
use kombi_element::{kinds, Element, Glob};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Elements for a starting path: the file itself, or every non-directory
/// element below a directory in name order.
pub fn collect_elements(path: &Path) -> Result<Vec<Element>> {
    if !path.exists() {
        return Err(Error::load(path.display(), "input path does not exist"));
    }
    let root = Element::create(FsPath::new(path), None)?;
    if !path.is_dir() {
        return Ok(vec![root]);
    }
    let root = Arc::new(root);
    let mut elements = Vec::new();
    for element in Glob::new(&root)? {
        let element = element?;
        if !kinds().is_kind_of(element.kind(), "directory") {
            elements.push(element);
        }
    }
    tracing::debug!("Collected {} elements below {}", elements.len(), path.display());
    Ok(elements)
}
