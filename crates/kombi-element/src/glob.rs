//! Enumerating elements under a directory.

use kombi_common::FsPath;
use regex::Regex;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::element::{Element, ElementInput};
use crate::error::{ElementError, Result};
use crate::registry::{kinds, KindRegistry};

/// Whether a file name may be turned into an element. Names with
/// whitespace, control characters or shell metacharacters are denied.
pub fn is_allowed_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "*?<>|\"".contains(c))
}

/// Lazy, depth-first, name-sorted walk below a directory element.
///
/// # Examples
///
/// ```no_run
/// use kombi_element::{Element, Glob};
/// use std::sync::Arc;
///
/// let root = Arc::new(Element::create("/jobs/show/plates", None)?);
/// for element in Glob::new(&root)?.kinds(["image"]) {
///     println!("{}", element?.kind());
/// }
/// # Ok::<(), kombi_element::ElementError>(())
/// ```
pub struct Glob<'a> {
    registry: &'a KindRegistry,
    walker: walkdir::IntoIter,
    parent: Arc<Element>,
    filter: Vec<String>,
}

impl Glob<'static> {
    /// Walk below `root` classifying with the process-wide registry.
    pub fn new(root: &Arc<Element>) -> Result<Self> {
        Glob::with_registry(root, kinds())
    }
}

impl<'a> Glob<'a> {
    /// Walk below `root` classifying with `registry`.
    pub fn with_registry(root: &Arc<Element>, registry: &'a KindRegistry) -> Result<Self> {
        let path = root
            .path()
            .filter(|p| p.is_directory())
            .ok_or_else(|| {
                ElementError::Common(kombi_common::Error::not_found(format!(
                    "{} element is not a directory",
                    root.kind()
                )))
            })?;
        let walker = WalkDir::new(path.as_path())
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        Ok(Self {
            registry,
            walker,
            parent: root.clone(),
            filter: Vec::new(),
        })
    }

    /// Keep only elements of these kinds (or kinds deriving from them).
    pub fn kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = kinds.into_iter().map(Into::into).collect();
        self
    }

    fn accepted(&self, element: &Element) -> bool {
        self.filter.is_empty()
            || self
                .filter
                .iter()
                .any(|k| self.registry.is_kind_of(element.kind(), k))
    }
}

impl Iterator for Glob<'_> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(ElementError::Io(e.into()))),
            };
            let name = entry.file_name().to_string_lossy();
            if !is_allowed_name(&name) {
                tracing::debug!("Skipping disallowed name: {}", entry.path().display());
                if entry.file_type().is_dir() {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            let input = ElementInput::Path(FsPath::new(entry.path()));
            match self.registry.create(input, None, Some(&self.parent)) {
                Ok(element) if self.accepted(&element) => return Some(Ok(element)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Walk below `root` and collect every element of the given kinds.
pub fn glob(root: &Arc<Element>, kinds: &[&str]) -> Result<Vec<Element>> {
    Glob::new(root)?
        .kinds(kinds.iter().copied())
        .collect()
}

/// Translate a `*`/`?` file name wildcard.
fn wildcard(pattern: &str) -> Result<Regex> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| {
        ElementError::Common(kombi_common::Error::invalid_value(format!(
            "bad wildcard {pattern:?}: {e}"
        )))
    })
}

/// Direct children of `dir` whose names match a wildcard, classified.
pub(crate) fn glob_matching(dir: &FsPath, pattern: &str) -> Result<Vec<Element>> {
    let matcher = wildcard(pattern)?;
    dir.children()?
        .into_iter()
        .filter(|child| {
            let name = child.name();
            is_allowed_name(&name) && matcher.is_match(&name)
        })
        .map(|child| kinds().create(ElementInput::Path(child), None, None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let plates = dir.path().join("plates");
        std::fs::create_dir(&plates).unwrap();
        for f in 1..=3 {
            std::fs::write(plates.join(format!("bg.{f:04}.exr")), b"").unwrap();
        }
        std::fs::write(plates.join("with space.exr"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join("edit.mov"), b"").unwrap();
        dir
    }

    #[test]
    fn test_glob_all() {
        let dir = fixture();
        let root = Arc::new(Element::create(dir.path().to_path_buf(), None).unwrap());
        let found = glob(&root, &[]).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|e| e.var("baseName").unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["edit.mov", "notes.txt", "plates", "bg.0001.exr", "bg.0002.exr", "bg.0003.exr"]
        );
        assert_eq!(found[0].parent().unwrap().kind(), "directory");
    }

    #[test]
    fn test_glob_kind_filter_includes_subtypes() {
        let dir = fixture();
        let root = Arc::new(Element::create(dir.path().to_path_buf(), None).unwrap());
        let images = glob(&root, &["image"]).unwrap();
        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|e| e.kind() == "exr"));
        assert_eq!(glob(&root, &["video", "ascii"]).unwrap().len(), 2);
    }

    #[test]
    fn test_glob_requires_directory() {
        let dir = fixture();
        let file = Arc::new(Element::create(dir.path().join("notes.txt"), None).unwrap());
        assert!(Glob::new(&file).is_err());
    }

    #[test]
    fn test_glob_from_parent() {
        let dir = fixture();
        let frame = Element::create(dir.path().join("plates/bg.0002.exr"), None).unwrap();
        let siblings = frame.glob_from_parent("bg.000?.exr").unwrap();
        assert_eq!(siblings.len(), 3);
        assert!(frame.glob_from_parent("*.mov").unwrap().is_empty());
    }

    #[test]
    fn test_allowed_names() {
        assert!(is_allowed_name("bg.0001.exr"));
        assert!(!is_allowed_name("with space.exr"));
        assert!(!is_allowed_name("tab\tname"));
        assert!(!is_allowed_name("a|b"));
    }
}
