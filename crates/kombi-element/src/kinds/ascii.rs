//! Structured text kinds.

use kombi_common::Value;

use crate::element::{Element, ElementInput};
use crate::error::Result;
use crate::kinds::has_extension;
use crate::registry::ElementKind;

/// JSON documents. Top-level scalar fields of an object document become
/// variables; other shapes are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKind;

impl ElementKind for JsonKind {
    fn name(&self) -> &str {
        "json"
    }

    fn parent(&self) -> Option<&str> {
        Some("ascii")
    }

    fn test(&self, input: &ElementInput, _parent: Option<&Element>) -> bool {
        has_extension(&input.lower_name(), &["json"])
    }

    fn init(&self, element: &mut Element, input: &ElementInput) -> Result<()> {
        let Some(path) = input.path().filter(|p| p.exists()) else {
            return Ok(());
        };
        let contents = std::fs::read_to_string(path.as_path())?;
        let document: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!("Not reading fields of {}: {}", path, e);
                return Ok(());
            }
        };

        if let serde_json::Value::Object(fields) = document {
            for (name, value) in &fields {
                // reserved variables assigned by the file kind win
                if element.has_var(name) {
                    continue;
                }
                if let Ok(value) = Value::from_json(value) {
                    element.set_var(name.clone(), value, false);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::KindRegistry;
    use kombi_common::Value;
    use tempfile::tempdir;

    #[test]
    fn test_json_fields_become_vars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot.json");
        std::fs::write(
            &path,
            r#"{"shot": "sh010", "frames": 48, "nested": {"a": 1}, "name": "ignored"}"#,
        )
        .unwrap();

        let registry = KindRegistry::with_builtin();
        let element = registry.create(path.into(), None, None).unwrap();
        assert_eq!(element.kind(), "json");
        assert_eq!(element.var("shot").unwrap(), &Value::from("sh010"));
        assert_eq!(element.var("frames").unwrap(), &Value::Int(48));
        assert!(!element.has_var("nested"));
        assert_eq!(element.var("name").unwrap(), &Value::from("shot"));
    }

    #[test]
    fn test_invalid_json_is_still_classified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let element = KindRegistry::with_builtin()
            .create(path.into(), None, None)
            .unwrap();
        assert_eq!(element.kind(), "json");
    }
}
