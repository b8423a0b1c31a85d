//! Write a JSON document per binding.

use serde_json::{json, Value as JsonValue};
use std::fs;

use super::{ensure_parent, target_path};
use crate::error::Result;
use crate::task::{Binding, Options, Task, TaskKind};
use kombi_element::Element;
use kombi_template::{Scope, Template};

/// Writes the `data` option to each target. String leaves of `data` are
/// templates evaluated against the binding's variables.
pub struct WriteJsonTask;

fn render(value: &JsonValue, scope: &Scope) -> Result<JsonValue> {
    Ok(match value {
        JsonValue::String(raw) => JsonValue::String(Template::new(raw.as_str())?.value(scope)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| render(item, scope))
                .collect::<Result<_>>()?,
        ),
        JsonValue::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (key, item) in map {
                rendered.insert(key.clone(), render(item, scope)?);
            }
            JsonValue::Object(rendered)
        }
        other => other.clone(),
    })
}

fn document(task: &Task, binding: &Binding) -> Result<JsonValue> {
    let scope = Scope::with_vars(binding.scope_vars());
    render(task.option("data")?, &scope)
}

impl TaskKind for WriteJsonTask {
    fn name(&self) -> &str {
        "writeJson"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("data".into(), json!({}));
        options.insert("prettyPrint".into(), json!(true));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        let pretty = task.option_bool("prettyPrint")?;
        for binding in task.bindings() {
            let target = target_path(task, binding)?;
            let doc = document(task, binding)?;
            let contents = if pretty {
                serde_json::to_string_pretty(&doc)?
            } else {
                serde_json::to_string(&doc)?
            };
            ensure_parent(&target)?;
            fs::write(&target, contents)?;
            tracing::debug!("Wrote {}", target.display());
        }
        Ok(task.default_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::kinds::testing::file_element;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_write_templated_document() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("plate.exr");
        fs::write(&source, "").unwrap();
        let target = dir.path().join("meta/plate.json");

        let mut task = Task::new(Arc::new(WriteJsonTask));
        task.set_option(
            "data",
            json!({"name": "{name}", "files": ["{baseName}", 3], "nested": {"out": "{target}"}}),
        )
        .unwrap();
        task.set_option("prettyPrint", json!(false)).unwrap();
        task.add(file_element(&source), target.display().to_string());
        task.output().unwrap();

        let written: JsonValue = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(written["name"], "plate");
        assert_eq!(written["files"][0], "plate.exr");
        assert_eq!(written["files"][1], 3);
        assert_eq!(written["nested"]["out"], target.display().to_string());
    }

    #[test]
    fn test_unknown_variable_fails() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "").unwrap();
        let mut task = Task::new(Arc::new(WriteJsonTask));
        task.set_option("data", json!({"x": "{nope}"})).unwrap();
        task.add(file_element(&source), dir.path().join("a.json").display().to_string());
        let err = task.output().unwrap_err();
        assert!(err.is_resolution());
    }
}
