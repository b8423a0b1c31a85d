//! Tasks: a kind, typed options, metadata and element bindings.
//!
//! A [`TaskKind`] declares the options it understands (with default values
//! that fix each option's JSON type) and implements `perform`. A [`Task`] is
//! an instance of a kind plus an ordered list of (element, target) bindings.
//! [`Task::output`] runs the kind and then makes sure context variables of
//! the inputs survive onto the outputs.
//!
//! Reserved metadata keys:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `dispatch.split` | run chunks as independent child invocations |
//! | `dispatch.splitSize` | bindings per chunk |
//! | `dispatch.retryCount` | retries after an execution failure |
//! | `wrapper.name` | wrapper used by the local dispatcher |
//! | `wrapper.user` | target account of the `user` wrapper |
//! | `wrapper.timeout` | wall-clock limit in seconds for wrapped children |
//! | `ui.task.showTaskHolderList` | front-end hint, carried verbatim |

pub mod kinds;
mod registry;

use kombi_common::{FsPath, Value, VarMap};
use kombi_element::Element;
use kombi_template::{Scope, Template};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Error, ErrorCategory, Result};

pub use registry::{task_kinds, PresetKind, TaskRegistry};
pub(crate) use registry::preset_from_config;

/// Option and metadata maps.
pub type Options = serde_json::Map<String, JsonValue>;

/// Behaviour of one task kind.
pub trait TaskKind: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Declared options with their default values.
    fn default_options(&self) -> Options {
        Options::new()
    }

    /// Metadata every new task of this kind starts with.
    fn default_metadata(&self) -> Options {
        Options::new()
    }

    /// Built-in kind this kind ultimately delegates to, for kinds declared
    /// in resource files.
    fn base_name(&self) -> Option<&str> {
        None
    }

    /// Produce output elements for the task's bindings. The default returns
    /// the inputs re-pointed at their targets.
    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        Ok(task.default_output())
    }
}

/// Progress of one binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingStatus {
    #[default]
    Pending,
    Performing,
    Performed,
    Failed,
}

/// An input element and the path computed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub element: Element,
    #[serde(default)]
    pub target: String,
    #[serde(skip)]
    pub status: BindingStatus,
}

impl Binding {
    /// Variables visible to templates evaluated for this binding: the
    /// element's variables plus `target`.
    pub fn scope_vars(&self) -> VarMap {
        let mut vars = self.element.vars().clone();
        vars.insert("target".to_string(), Value::from(self.target.as_str()));
        vars
    }

    fn output_element(&self) -> Element {
        if self.target.is_empty() {
            self.element.clone()
        } else {
            self.element.with_path(FsPath::new(&self.target))
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TaskJson {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(default)]
    options: Options,
    #[serde(default)]
    metadata: Options,
    #[serde(default)]
    bindings: Vec<Binding>,
}

/// An instance of a task kind.
#[derive(Clone)]
pub struct Task {
    kind: Arc<dyn TaskKind>,
    options: Options,
    metadata: Options,
    bindings: Vec<Binding>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind.name())
            .field("options", &self.options)
            .field("metadata", &self.metadata)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.kind.name() == other.kind.name()
            && self.options == other.options
            && self.metadata == other.metadata
            && self.bindings == other.bindings
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "map",
    }
}

fn json_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => kombi_common::value::is_truthy_str(s),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// String form of a scalar option, as templates see it.
pub(crate) fn json_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

impl Task {
    /// A fresh task of `kind` with default options and metadata.
    pub fn new(kind: Arc<dyn TaskKind>) -> Self {
        Self {
            options: kind.default_options(),
            metadata: kind.default_metadata(),
            kind,
            bindings: Vec::new(),
        }
    }

    /// A fresh task of the kind registered under `name`.
    pub fn create(name: &str) -> Result<Self> {
        task_kinds().create(name)
    }

    /// Kind name.
    pub fn kind_name(&self) -> &str {
        self.kind.name()
    }

    /// The kind implementation.
    pub fn kind(&self) -> &Arc<dyn TaskKind> {
        &self.kind
    }

    /// Read an option. Options the kind does not declare are an error.
    pub fn option(&self, name: &str) -> Result<&JsonValue> {
        self.options.get(name).ok_or_else(|| Error::InvalidOption {
            task: self.kind_name().to_string(),
            option: name.to_string(),
        })
    }

    /// Read a string option; scalars are stringified.
    pub fn option_str(&self, name: &str) -> Result<String> {
        self.option(name).map(json_to_string)
    }

    /// Read a boolean option.
    pub fn option_bool(&self, name: &str) -> Result<bool> {
        self.option(name).map(json_truthy)
    }

    /// All options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Set an option. Declared options keep the JSON type of their default;
    /// undeclared options are accepted as-is.
    pub fn set_option(&mut self, name: &str, value: JsonValue) -> Result<()> {
        if let Some(default) = self.kind.default_options().get(name) {
            let expected = json_type(default);
            let given = json_type(&value);
            if expected != "null" && given != expected {
                return Err(Error::InvalidOptionType {
                    task: self.kind_name().to_string(),
                    option: name.to_string(),
                    expected: expected.to_string(),
                    given: given.to_string(),
                });
            }
        }
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    /// Read a metadata entry.
    pub fn metadata(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.get(key)
    }

    /// All metadata.
    pub fn metadata_map(&self) -> &Options {
        &self.metadata
    }

    /// Set a metadata entry.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: JsonValue) {
        self.metadata.insert(key.into(), value);
    }

    /// Whether a metadata entry exists.
    pub fn has_metadata(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// Metadata entry read as a flag.
    pub fn metadata_bool(&self, key: &str) -> bool {
        self.metadata(key).is_some_and(json_truthy)
    }

    /// Metadata entry read as a non-negative integer.
    pub fn metadata_usize(&self, key: &str) -> Option<usize> {
        match self.metadata(key)? {
            JsonValue::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Metadata entry read as a string.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata(key)
            .map(json_to_string)
            .filter(|s| !s.is_empty())
    }

    /// Append a binding.
    pub fn add(&mut self, element: Element, target: impl Into<String>) {
        self.bindings.push(Binding {
            element,
            target: target.into(),
            status: BindingStatus::Pending,
        });
    }

    /// Bound elements in order.
    pub fn elements(&self) -> Vec<&Element> {
        self.bindings.iter().map(|b| &b.element).collect()
    }

    /// Bindings in order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Target bound to `element`.
    pub fn target(&self, element: &Element) -> Result<&str> {
        self.bindings
            .iter()
            .find(|b| &b.element == element)
            .map(|b| b.target.as_str())
            .ok_or_else(|| Error::task(self.kind_name(), "element is not bound to this task"))
    }

    /// Drop every binding.
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    /// A copy bound to the bindings in `range` only.
    pub fn chunk(&self, range: Range<usize>) -> Task {
        let end = range.end.min(self.bindings.len());
        let start = range.start.min(end);
        Task {
            kind: self.kind.clone(),
            options: self.options.clone(),
            metadata: self.metadata.clone(),
            bindings: self.bindings[start..end].to_vec(),
        }
    }

    /// The inputs re-pointed at their targets (inputs without a target are
    /// passed through unchanged).
    pub fn default_output(&self) -> Vec<Element> {
        self.bindings.iter().map(Binding::output_element).collect()
    }

    /// Perform the task and return its outputs.
    ///
    /// Context variables of the inputs are copied onto outputs that do not
    /// set them: pairwise when the task produced one output per input,
    /// otherwise the union of all inputs' context variables.
    pub fn output(&mut self) -> Result<Vec<Element>> {
        for binding in &mut self.bindings {
            binding.status = BindingStatus::Performing;
        }
        let kind = self.kind.clone();
        match kind.perform(self) {
            Ok(mut outputs) => {
                for binding in &mut self.bindings {
                    binding.status = BindingStatus::Performed;
                }
                self.propagate_context(&mut outputs);
                Ok(outputs)
            }
            Err(e) => {
                for binding in &mut self.bindings {
                    binding.status = BindingStatus::Failed;
                }
                Err(e)
            }
        }
    }

    /// Status of every binding, in order.
    pub fn binding_statuses(&self) -> Vec<BindingStatus> {
        self.bindings.iter().map(|b| b.status).collect()
    }

    fn propagate_context(&self, outputs: &mut [Element]) {
        if outputs.len() == self.bindings.len() {
            for (output, binding) in outputs.iter_mut().zip(&self.bindings) {
                copy_context(&binding.element.context_vars(), output);
            }
        } else {
            let mut union = VarMap::new();
            for binding in &self.bindings {
                for (name, value) in binding.element.context_vars() {
                    union.entry(name).or_insert(value);
                }
            }
            for output in outputs.iter_mut() {
                copy_context(&union, output);
            }
        }
    }

    /// Evaluate a string option as a template. The scope holds `element`'s
    /// variables (when given) overlaid with `extra`.
    pub fn template_option(
        &self,
        name: &str,
        element: Option<&Element>,
        extra: &VarMap,
    ) -> Result<String> {
        let raw = self.option_str(name)?;
        let base = element.map(|e| e.vars().clone()).unwrap_or_default();
        let scope = Scope::with_vars(base).layered(extra);
        Ok(Template::new(raw)?.value(&scope)?)
    }

    /// Evaluate a string option as a template for one binding.
    pub fn binding_option(&self, name: &str, binding: &Binding) -> Result<String> {
        let scope = Scope::with_vars(binding.scope_vars());
        Ok(Template::new(self.option_str(name)?)?.value(&scope)?)
    }

    /// JSON form `{kind, options, metadata, bindings}`.
    pub fn to_json(&self) -> Result<JsonValue> {
        let json = TaskJson {
            kind: self.kind_name().to_string(),
            base: self.kind.base_name().map(str::to_string),
            options: self.options.clone(),
            metadata: self.metadata.clone(),
            bindings: self.bindings.clone(),
        };
        Ok(serde_json::to_value(json)?)
    }

    /// Rebuild a task from its JSON form. Options are type-checked against
    /// the kind's declarations.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let json: TaskJson = serde_json::from_value(value.clone())?;
        let mut task = match (task_kinds().get(&json.kind), &json.base) {
            (Ok(kind), _) => Task::new(kind),
            // A preset declared in resources this process has not loaded.
            (Err(_), Some(base)) => Task::new(Arc::new(PresetKind::new(
                json.kind.clone(),
                task_kinds().get(base)?,
                Options::new(),
                Options::new(),
            )?)),
            (Err(e), None) => return Err(e),
        };
        for (name, value) in json.options {
            task.set_option(&name, value)?;
        }
        task.metadata.extend(json.metadata);
        task.bindings = json.bindings;
        Ok(task)
    }
}

fn copy_context(context: &VarMap, output: &mut Element) {
    for (name, value) in context {
        if output.is_context_var(name) {
            continue;
        }
        let value = output.var(name).cloned().unwrap_or_else(|_| value.clone());
        output.set_var(name.clone(), value, true);
    }
}

/// Run `attempt` once, then up to `retries` more times while it fails with
/// an execution error.
pub fn retrying<T>(label: &str, retries: usize, mut attempt: impl FnMut(usize) -> Result<T>) -> Result<T> {
    let mut tries = 0;
    loop {
        match attempt(tries) {
            Ok(value) => return Ok(value),
            Err(e) if tries < retries && e.category() == ErrorCategory::Execution => {
                tries += 1;
                tracing::warn!("{} failed ({}), retry {}/{}", label, e, tries, retries);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct Echo;

    impl TaskKind for Echo {
        fn name(&self) -> &str {
            "echoTest"
        }

        fn default_options(&self) -> Options {
            let mut options = Options::new();
            options.insert("label".into(), json!("{name}_{target}"));
            options.insert("count".into(), json!(1));
            options
        }
    }

    struct Collapse;

    impl TaskKind for Collapse {
        fn name(&self) -> &str {
            "collapseTest"
        }

        fn perform(&self, _task: &Task) -> Result<Vec<Element>> {
            Ok(vec![Element::new("file", Some(FsPath::new("/out/all.txt")))])
        }
    }

    fn element(path: &str, shot: &str) -> Element {
        let mut element = Element::new("file", Some(FsPath::new(path)));
        element.set_var("name", FsPath::new(path).name(), false);
        element.set_var("shot", shot, true);
        element
    }

    #[test]
    fn test_option_typing() {
        let mut task = Task::new(Arc::new(Echo));
        assert_eq!(task.option("count").unwrap(), &json!(1));
        assert_matches!(task.option("missing"), Err(Error::InvalidOption { .. }));
        assert_matches!(
            task.set_option("count", json!("many")),
            Err(Error::InvalidOptionType { .. })
        );
        task.set_option("count", json!(2.5)).unwrap();
        task.set_option("extra", json!([1, 2])).unwrap();
        assert_eq!(task.option("extra").unwrap(), &json!([1, 2]));
    }

    #[test]
    fn test_default_output_applies_targets() {
        let mut task = Task::new(Arc::new(Echo));
        task.add(element("/in/a.exr", "sh010"), "/out/a.exr");
        task.add(element("/in/b.exr", "sh020"), "");

        let outputs = task.output().unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].path().unwrap().to_string(), "/out/a.exr");
        assert_eq!(outputs[0].var("filePath").unwrap(), &Value::from("/out/a.exr"));
        assert_eq!(outputs[1].path().unwrap().to_string(), "/in/b.exr");
        assert!(outputs[0].is_context_var("shot"));
        assert_eq!(task.binding_statuses(), vec![BindingStatus::Performed; 2]);
    }

    #[test]
    fn test_context_union_when_counts_differ() {
        let mut task = Task::new(Arc::new(Collapse));
        task.add(element("/in/a.exr", "sh010"), "");
        let mut other = element("/in/b.exr", "sh020");
        other.set_var("seq", "aa", true);
        task.add(other, "");

        let outputs = task.output().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].var("shot").unwrap(), &Value::from("sh010"));
        assert_eq!(outputs[0].var("seq").unwrap(), &Value::from("aa"));
        assert!(outputs[0].is_context_var("seq"));
    }

    #[test]
    fn test_template_option() {
        let mut task = Task::new(Arc::new(Echo));
        task.add(element("/in/a.exr", "sh010"), "/out/a.exr");
        let binding = &task.bindings()[0];
        assert_eq!(task.binding_option("label", binding).unwrap(), "a.exr_/out/a.exr");

        let mut extra = VarMap::new();
        extra.insert("target".into(), Value::from("x"));
        assert_eq!(
            task.template_option("label", Some(&binding.element), &extra).unwrap(),
            "a.exr_x"
        );
    }

    #[test]
    fn test_chunk_and_target() {
        let mut task = Task::new(Arc::new(Echo));
        for i in 0..5 {
            task.add(element(&format!("/in/{i}.exr"), "sh010"), format!("/out/{i}.exr"));
        }
        let chunk = task.chunk(3..10);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.target(chunk.elements()[0]).unwrap(), "/out/3.exr");
        let stranger = element("/in/zz.exr", "sh010");
        assert!(task.target(&stranger).is_err());
    }

    #[test]
    fn test_retrying_only_retries_execution_errors() {
        let mut calls = 0;
        let result: Result<()> = retrying("t", 2, |_| {
            calls += 1;
            Err(Error::task("t", "boom"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: Result<()> = retrying("t", 2, |_| {
            calls += 1;
            Err(Error::config("bad"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);

        let result = retrying("t", 1, |n| if n == 0 { Err(Error::task("t", "x")) } else { Ok(n) });
        assert_eq!(result.unwrap(), 1);
    }
}
