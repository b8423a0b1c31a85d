//! Task kind registry and preset kinds.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::{Options, Task, TaskKind};
use crate::error::{Error, Result};
use kombi_element::Element;

/// Name-indexed table of task kinds.
#[derive(Default)]
pub struct TaskRegistry {
    kinds: RwLock<BTreeMap<String, Arc<dyn TaskKind>>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry").field("kinds", &self.names()).finish()
    }
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in task kinds.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        super::kinds::register_builtin(&registry);
        registry
    }

    /// Register (or replace) a kind.
    pub fn register<K: TaskKind + 'static>(&self, kind: K) {
        self.register_arc(Arc::new(kind));
    }

    /// Register (or replace) a shared kind.
    pub fn register_arc(&self, kind: Arc<dyn TaskKind>) {
        tracing::debug!("Registering task kind: {}", kind.name());
        self.kinds.write().insert(kind.name().to_string(), kind);
    }

    /// Whether a kind is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.read().contains_key(name)
    }

    /// Look up a kind.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TaskKind>> {
        self.kinds
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TaskTypeNotFound(name.to_string()))
    }

    /// Sorted kind names.
    pub fn names(&self) -> Vec<String> {
        self.kinds.read().keys().cloned().collect()
    }

    /// A new task of the named kind.
    pub fn create(&self, name: &str) -> Result<Task> {
        self.get(name).map(Task::new)
    }
}

/// The process-wide registry, initialised with the built-in kinds.
pub fn task_kinds() -> &'static TaskRegistry {
    static REGISTRY: OnceLock<TaskRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TaskRegistry::with_builtin)
}

/// A named kind that reuses another kind's behaviour with different default
/// options and metadata.
pub struct PresetKind {
    name: String,
    base: Arc<dyn TaskKind>,
    options: Options,
    metadata: Options,
}

impl PresetKind {
    /// Build a preset. Overridden options must match the base's option types.
    pub fn new(
        name: impl Into<String>,
        base: Arc<dyn TaskKind>,
        options: Options,
        metadata: Options,
    ) -> Result<Self> {
        let name = name.into();
        let mut trial = Task::new(base.clone());
        for (key, value) in &options {
            trial.set_option(key, value.clone()).map_err(|e| match e {
                Error::InvalidOptionType {
                    option,
                    expected,
                    given,
                    ..
                } => Error::InvalidOptionType {
                    task: name.clone(),
                    option,
                    expected,
                    given,
                },
                other => other,
            })?;
        }
        Ok(Self {
            name,
            base,
            options,
            metadata,
        })
    }

    /// Name of the kind this preset extends.
    pub fn parent_name(&self) -> &str {
        self.base.name()
    }
}

fn overlay(mut base: Options, top: &Options) -> Options {
    for (key, value) in top {
        base.insert(key.clone(), value.clone());
    }
    base
}

impl TaskKind for PresetKind {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_options(&self) -> Options {
        overlay(self.base.default_options(), &self.options)
    }

    fn default_metadata(&self) -> Options {
        overlay(self.base.default_metadata(), &self.metadata)
    }

    fn base_name(&self) -> Option<&str> {
        Some(self.base.base_name().unwrap_or(self.base.name()))
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        self.base.perform(task)
    }
}

/// Parse a preset declaration `{name, base, options, metadata}`.
pub(crate) fn preset_from_config(value: &JsonValue, registry: &TaskRegistry) -> Result<PresetKind> {
    let name = value
        .get("name")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::config("task kind declaration needs a \"name\""))?;
    let base = value
        .get("base")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::config(format!("task kind {name} needs a \"base\"")))?;
    let section = |key: &str| -> Result<Options> {
        match value.get(key) {
            None => Ok(Options::new()),
            Some(JsonValue::Object(map)) => Ok(map.clone()),
            Some(_) => Err(Error::config(format!("task kind {name}: {key:?} must be a mapping"))),
        }
    };
    PresetKind::new(name, registry.get(base)?, section("options")?, section("metadata")?)
}
