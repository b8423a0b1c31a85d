//! Catch-all kinds.

use crate::element::{Element, ElementInput};
use crate::error::Result;
use crate::registry::ElementKind;

/// Any non-directory path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKind;

impl ElementKind for FileKind {
    fn name(&self) -> &str {
        "file"
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        input.path().is_some_and(|p| !p.is_directory())
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        let Some(path) = input.path() else {
            return Ok(());
        };
        let base_name = path.name();
        let (name, ext) = match base_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_string()),
            _ => (base_name.clone(), String::new()),
        };

        element.set_var("filePath", path.to_string(), false);
        element.set_var("baseName", base_name, false);
        element.set_var("name", name, false);
        element.set_var("ext", ext, false);
        element.set_var(
            "sourceDirectory",
            path.parent().map(|p| p.to_string()).unwrap_or_default(),
            false,
        );
        Ok(())
    }
}

/// Any directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryKind;

impl ElementKind for DirectoryKind {
    fn name(&self) -> &str {
        "directory"
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        input.path().is_some_and(|p| p.is_directory())
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        if let Some(path) = input.path() {
            element.set_var("filePath", path.to_string(), false);
            element.set_var("baseName", path.name(), false);
            element.set_var("name", path.name(), false);
            element.set_var(
                "sourceDirectory",
                path.parent().map(|p| p.to_string()).unwrap_or_default(),
                false,
            );
        }
        Ok(())
    }
}

/// A structured record; its fields become variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashmapKind;

impl ElementKind for HashmapKind {
    fn name(&self) -> &str {
        "hashmap"
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        matches!(input, ElementInput::Map(_))
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        if let ElementInput::Map(vars) = input {
            for (name, value) in vars {
                element.set_var(name.clone(), value.clone(), false);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KindRegistry;
    use kombi_common::{Value, VarMap};
    use tempfile::tempdir;

    #[test]
    fn test_file_vars() {
        let registry = KindRegistry::with_builtin();
        let element = registry
            .create("/jobs/show/notes.bin".into(), None, None)
            .unwrap();
        assert_eq!(element.kind(), "file");
        assert_eq!(element.var("baseName").unwrap(), &Value::from("notes.bin"));
        assert_eq!(element.var("name").unwrap(), &Value::from("notes"));
        assert_eq!(element.var("ext").unwrap(), &Value::from("bin"));
        assert_eq!(
            element.var("sourceDirectory").unwrap(),
            &Value::from("/jobs/show")
        );
    }

    #[test]
    fn test_directory_and_hashmap() {
        let dir = tempdir().unwrap();
        let registry = KindRegistry::with_builtin();
        let element = registry
            .create(dir.path().to_path_buf().into(), None, None)
            .unwrap();
        assert_eq!(element.kind(), "directory");

        let mut record = VarMap::new();
        record.insert("shot".into(), Value::from("sh010"));
        let element = registry.create(record.into(), None, None).unwrap();
        assert_eq!(element.kind(), "hashmap");
        assert_eq!(element.var("shot").unwrap(), &Value::from("sh010"));
        assert!(element.path().is_none());
    }
}
