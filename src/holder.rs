//! Task holders: the nodes of a configured task tree.
//!
//! A holder pairs a [`Task`] with a target template, an optional filter
//! template, a [`Status`], variables and child holders. Running a holder
//! binds every admitted input element to the task with its evaluated
//! target, performs the task through a [`TaskRunner`] and feeds the outputs
//! to the children.
//!
//! Variable scoping: a holder's scope is its ancestors' variables overlaid
//! with its own; holder variables in turn override element variables when
//! templates are evaluated. Variables flagged as context variables are also
//! written onto the bound elements so they reach every output.

use kombi_common::{Value, VarMap};
use kombi_element::{group_by_tag, Element};
use kombi_template::{Scope, Template};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::reporter::TaskEvent;
use crate::task::{retrying, Binding, Task};

const CONTEXT_SUFFIX: &str = ".context";

const KNOWN_KEYS: &[&str] = &[
    "type",
    "target",
    "filter",
    "status",
    "vars",
    "tags",
    "metadata",
    "options",
    "tasks",
    "regroupTag",
    "bindings",
];

/// Whether and how a holder executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Perform the task.
    #[default]
    Execute,
    /// Skip the task but pass inputs (re-pointed at their targets) on.
    Bypass,
    /// Drop the holder and its subtree.
    Ignore,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Execute => "execute",
            Status::Bypass => "bypass",
            Status::Ignore => "ignore",
        })
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "execute" => Ok(Status::Execute),
            "bypass" => Ok(Status::Bypass),
            "ignore" => Ok(Status::Ignore),
            other => Err(Error::config(format!(
                "invalid status {other:?} (expected execute, bypass or ignore)"
            ))),
        }
    }
}

/// An element dropped because its filter or target could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skipped {
    /// Task kind of the holder.
    pub task: String,
    /// Element path, or kind for pathless elements.
    pub element: String,
    /// Resolution error message.
    pub error: String,
}

/// Variables visible to a holder: inherited entries overlaid with its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolderScope {
    pub vars: VarMap,
    pub context: BTreeSet<String>,
}

/// Executes the tasks of a holder walk.
pub trait TaskRunner {
    /// Perform `task` (already bound) for `holder`, returning its outputs.
    fn run_task(&mut self, holder: &TaskHolder, task: Task) -> Result<Vec<Element>>;

    /// Whether resolution errors abort the walk.
    fn strict(&self) -> bool {
        false
    }

    /// Record an element skipped because of a resolution error.
    fn skipped(&mut self, skipped: Skipped) {
        tracing::warn!(
            "Skipping {} in {}: {}",
            skipped.element,
            skipped.task,
            skipped.error
        );
    }
}

/// Runs every task in the current process.
#[derive(Debug, Default)]
pub struct InlineRunner {
    strict: bool,
    /// One event per performed task.
    pub events: Vec<TaskEvent>,
    /// Elements skipped on resolution errors.
    pub skipped: Vec<Skipped>,
}

impl InlineRunner {
    /// A runner that aborts on resolution errors when `strict`.
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }
}

impl TaskRunner for InlineRunner {
    fn run_task(&mut self, _holder: &TaskHolder, mut task: Task) -> Result<Vec<Element>> {
        let label = task.kind_name().to_string();
        let retries = task.metadata_usize("dispatch.retryCount").unwrap_or(0);
        let inputs = task.len();
        let started = Instant::now();
        let outputs = retrying(&label, retries, |_| task.output())?;
        self.events.push(TaskEvent {
            task: label,
            inputs,
            outputs: outputs.clone(),
            duration_seconds: started.elapsed().as_secs_f64(),
        });
        Ok(outputs)
    }

    fn strict(&self) -> bool {
        self.strict
    }

    fn skipped(&mut self, skipped: Skipped) {
        tracing::warn!(
            "Skipping {} in {}: {}",
            skipped.element,
            skipped.task,
            skipped.error
        );
        self.skipped.push(skipped);
    }
}

/// One node of a task tree.
#[derive(Debug, Clone)]
pub struct TaskHolder {
    task: Task,
    target: Template,
    filter: Option<Template>,
    status: Status,
    regroup_tag: Option<String>,
    vars: VarMap,
    context_vars: BTreeSet<String>,
    tags: VarMap,
    children: Vec<TaskHolder>,
}

fn describe(element: &Element) -> String {
    element
        .path()
        .map(|p| p.to_string())
        .unwrap_or_else(|| format!("<{}>", element.kind()))
}

impl TaskHolder {
    /// A holder executing `task` with `target` as its target template.
    pub fn new(task: Task, target: Template) -> Self {
        Self {
            task,
            target,
            filter: None,
            status: Status::Execute,
            regroup_tag: None,
            vars: VarMap::new(),
            context_vars: BTreeSet::new(),
            tags: VarMap::new(),
            children: Vec::new(),
        }
    }

    /// The task template (unbound unless restored from a farm job).
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Mutable access to the task, for option and metadata overrides.
    pub fn task_mut(&mut self) -> &mut Task {
        &mut self.task
    }

    /// Target template.
    pub fn target(&self) -> &Template {
        &self.target
    }

    /// Filter template.
    pub fn filter(&self) -> Option<&Template> {
        self.filter.as_ref()
    }

    /// Set the filter template.
    pub fn set_filter(&mut self, filter: Option<Template>) {
        self.filter = filter.filter(|f| !f.is_empty());
    }

    /// Status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Set the status.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Tag used to re-partition outputs before the children run.
    pub fn regroup_tag(&self) -> Option<&str> {
        self.regroup_tag.as_deref()
    }

    /// Set the regroup tag.
    pub fn set_regroup_tag(&mut self, tag: Option<String>) {
        self.regroup_tag = tag.filter(|t| !t.is_empty());
    }

    /// Holder variables.
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Whether `name` is a context variable of this holder.
    pub fn is_context_var(&self, name: &str) -> bool {
        self.context_vars.contains(name)
    }

    /// Set a variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>, is_context: bool) {
        let name = name.into();
        if is_context {
            self.context_vars.insert(name.clone());
        } else {
            self.context_vars.remove(&name);
        }
        self.vars.insert(name, value.into());
    }

    /// Adopt inherited variables this holder does not define itself.
    pub fn inherit(&mut self, scope: &HolderScope) {
        for (name, value) in &scope.vars {
            if !self.vars.contains_key(name) {
                self.vars.insert(name.clone(), value.clone());
                if scope.context.contains(name) {
                    self.context_vars.insert(name.clone());
                }
            }
        }
    }

    /// Holder tags.
    pub fn tags(&self) -> &VarMap {
        &self.tags
    }

    /// Set a tag.
    pub fn set_tag(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.tags.insert(name.into(), value.into());
    }

    /// Child holders.
    pub fn children(&self) -> &[TaskHolder] {
        &self.children
    }

    /// Append a child holder.
    pub fn add_child(&mut self, child: TaskHolder) {
        self.children.push(child);
    }

    /// This holder's scope given what its ancestors provide.
    pub fn scope(&self, inherited: &HolderScope) -> HolderScope {
        let mut scope = inherited.clone();
        for (name, value) in &self.vars {
            scope.vars.insert(name.clone(), value.clone());
            if self.context_vars.contains(name) {
                scope.context.insert(name.clone());
            } else {
                scope.context.remove(name);
            }
        }
        scope
    }

    /// Bind the admitted `elements` to a copy of the task.
    ///
    /// Elements whose filter or target fails to resolve are returned as
    /// [`Skipped`] unless `strict`, in which case the error is raised.
    pub fn prepare(
        &self,
        elements: &[Element],
        scope: &HolderScope,
        strict: bool,
    ) -> Result<(Task, Vec<Skipped>)> {
        let mut task = self.task.clone();
        task.clear_bindings();
        let mut skipped = Vec::new();

        for input in elements {
            let mut element = input.clone();
            for name in &scope.context {
                if let Some(value) = scope.vars.get(name) {
                    element.set_var(name.clone(), value.clone(), true);
                }
            }
            let template_scope = Scope::with_vars(element.vars().clone()).layered(&scope.vars);

            let resolved = self.admit(&template_scope).and_then(|admitted| {
                if admitted {
                    self.target.value(&template_scope).map(Some)
                } else {
                    Ok(None)
                }
            });
            match resolved {
                Ok(Some(target)) => task.add(element, target),
                Ok(None) => tracing::trace!("Filtered out {}", describe(&element)),
                Err(e) => {
                    let e = Error::from(e);
                    if strict || !e.is_resolution() {
                        return Err(e);
                    }
                    skipped.push(Skipped {
                        task: self.task.kind_name().to_string(),
                        element: describe(&element),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok((task, skipped))
    }

    fn admit(&self, scope: &Scope) -> kombi_template::Result<bool> {
        match &self.filter {
            None => Ok(true),
            Some(filter) => Ok(kombi_common::value::is_truthy_str(filter.value(scope)?.trim())),
        }
    }

    /// Split outputs by the regroup tag (one partition when unset).
    pub fn partition(&self, outputs: Vec<Element>) -> Vec<Vec<Element>> {
        match &self.regroup_tag {
            Some(tag) => group_by_tag(outputs, tag),
            None => vec![outputs],
        }
    }

    /// Run the tree in-process.
    pub fn run(&self, elements: &[Element]) -> Result<Vec<Element>> {
        self.run_with(elements, &mut InlineRunner::default())
    }

    /// Run the tree, performing tasks through `runner`.
    pub fn run_with(&self, elements: &[Element], runner: &mut dyn TaskRunner) -> Result<Vec<Element>> {
        self.walk(elements, &HolderScope::default(), runner)
    }

    fn walk(
        &self,
        elements: &[Element],
        inherited: &HolderScope,
        runner: &mut dyn TaskRunner,
    ) -> Result<Vec<Element>> {
        if self.status == Status::Ignore {
            tracing::debug!("Ignoring {} holder", self.task.kind_name());
            return Ok(Vec::new());
        }
        let scope = self.scope(inherited);
        let (task, skipped) = self.prepare(elements, &scope, runner.strict())?;
        for entry in skipped {
            runner.skipped(entry);
        }

        let mut result = Vec::new();
        let outputs = match self.status {
            Status::Bypass => {
                tracing::debug!("Bypassing {} ({} elements)", task.kind_name(), task.len());
                result.extend(task.elements().into_iter().cloned());
                task.default_output()
            }
            _ if task.is_empty() => Vec::new(),
            _ => runner.run_task(self, task)?,
        };
        result.extend(outputs.iter().cloned());

        if !self.children.is_empty() {
            for partition in self.partition(outputs) {
                for child in &self.children {
                    result.extend(child.walk(&partition, &scope, runner)?);
                }
            }
        }
        Ok(result)
    }

    /// Build a holder tree from its configuration mapping.
    pub fn from_config(config: &JsonValue) -> Result<Self> {
        let map = config
            .as_object()
            .ok_or_else(|| Error::config("a task entry must be a mapping"))?;
        let kind = map
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::config("a task entry needs a \"type\""))?;
        if let Some(key) = map.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(Error::config(format!("unknown key {key:?} in {kind} task")));
        }

        let mut task = Task::create(kind)?;
        for (name, value) in object(map.get("options"), kind, "options")? {
            task.set_option(name, value.clone())?;
        }
        for (key, value) in object(map.get("metadata"), kind, "metadata")? {
            task.set_metadata(key.clone(), value.clone());
        }
        if let Some(bindings) = map.get("bindings") {
            let bindings: Vec<Binding> = serde_json::from_value(bindings.clone())?;
            for binding in bindings {
                task.add(binding.element, binding.target);
            }
        }

        let target = match map.get("target") {
            None | Some(JsonValue::Null) => String::new(),
            Some(JsonValue::String(s)) => s.clone(),
            Some(_) => return Err(Error::config(format!("{kind} task: \"target\" must be a string"))),
        };
        let mut holder = TaskHolder::new(task, Template::new(target)?);

        if let Some(filter) = map.get("filter").and_then(JsonValue::as_str) {
            holder.set_filter(Some(Template::new(filter)?));
        }
        if let Some(status) = map.get("status").and_then(JsonValue::as_str) {
            holder.set_status(status.parse()?);
        }
        holder.set_regroup_tag(
            map.get("regroupTag")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        );
        for (key, value) in object(map.get("vars"), kind, "vars")? {
            let (name, is_context) = match key.strip_suffix(CONTEXT_SUFFIX) {
                Some(name) => (name, true),
                None => (key.as_str(), false),
            };
            holder.set_var(name, Value::from_json(value)?, is_context);
        }
        for (key, value) in object(map.get("tags"), kind, "tags")? {
            holder.set_tag(key.clone(), Value::from_json(value)?);
        }
        match map.get("tasks") {
            None | Some(JsonValue::Null) => {}
            Some(JsonValue::Array(children)) => {
                for child in children {
                    holder.add_child(TaskHolder::from_config(child)?);
                }
            }
            Some(_) => return Err(Error::config(format!("{kind} task: \"tasks\" must be a list"))),
        }
        Ok(holder)
    }

    /// Restore a holder from its JSON form (the configuration shape).
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        Self::from_config(value)
    }

    /// JSON form mirroring the configuration, with bindings when bound.
    pub fn to_json(&self) -> Result<JsonValue> {
        let task = self.task.to_json()?;
        let mut vars = serde_json::Map::new();
        for (name, value) in &self.vars {
            let key = if self.context_vars.contains(name) {
                format!("{name}{CONTEXT_SUFFIX}")
            } else {
                name.clone()
            };
            vars.insert(key, value.to_json());
        }
        let tags: serde_json::Map<_, _> = self
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        let children = self
            .children
            .iter()
            .map(TaskHolder::to_json)
            .collect::<Result<Vec<_>>>()?;

        let mut json = json!({
            "type": self.task.kind_name(),
            "target": self.target.raw(),
            "status": self.status.to_string(),
            "vars": vars,
            "tags": tags,
            "options": task["options"],
            "metadata": task["metadata"],
            "tasks": children,
        });
        if let Some(filter) = &self.filter {
            json["filter"] = json!(filter.raw());
        }
        if let Some(tag) = &self.regroup_tag {
            json["regroupTag"] = json!(tag);
        }
        if !self.task.is_empty() {
            json["bindings"] = task["bindings"].clone();
        }
        Ok(json)
    }
}

fn object<'a>(
    value: Option<&'a JsonValue>,
    kind: &str,
    key: &str,
) -> Result<Box<dyn Iterator<Item = (&'a String, &'a JsonValue)> + 'a>> {
    match value {
        None | Some(JsonValue::Null) => Ok(Box::new(std::iter::empty())),
        Some(JsonValue::Object(map)) => Ok(Box::new(map.iter())),
        Some(_) => Err(Error::config(format!("{kind} task: {key:?} must be a mapping"))),
    }
}
