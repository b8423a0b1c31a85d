//! The element record.

use kombi_common::{FsPath, Value, VarMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use crate::error::{ElementError, Result};
use crate::registry::kinds;

/// What an element is created from.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementInput {
    /// A filesystem location.
    Path(FsPath),
    /// A structured record (the `hashmap` kind).
    Map(VarMap),
}

impl ElementInput {
    /// The path, for filesystem inputs.
    pub fn path(&self) -> Option<&FsPath> {
        match self {
            Self::Path(path) => Some(path),
            Self::Map(_) => None,
        }
    }

    /// Lowercased base name, empty for records.
    pub fn lower_name(&self) -> String {
        self.path().map(|p| p.name().to_lowercase()).unwrap_or_default()
    }

    /// Lowercased extension without the dot, empty when there is none.
    pub fn ext(&self) -> String {
        self.path()
            .and_then(|p| p.as_path().extension().map(|e| e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.to_string(),
            Self::Map(vars) => format!("record with {} fields", vars.len()),
        }
    }
}

impl From<FsPath> for ElementInput {
    fn from(path: FsPath) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for ElementInput {
    fn from(path: &str) -> Self {
        Self::Path(FsPath::new(path))
    }
}

impl From<std::path::PathBuf> for ElementInput {
    fn from(path: std::path::PathBuf) -> Self {
        Self::Path(FsPath::new(path))
    }
}

impl From<VarMap> for ElementInput {
    fn from(vars: VarMap) -> Self {
        Self::Map(vars)
    }
}

/// A typed wrapper around a discovered item.
///
/// Elements are built by the kind registry ([`Element::create`]) or restored
/// from their JSON form ([`Element::from_json`]). The parent link is a weak
/// back-reference that is never serialised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    kind: String,
    #[serde(default)]
    path: Option<FsPath>,
    #[serde(default)]
    vars: VarMap,
    #[serde(default)]
    context_vars: BTreeSet<String>,
    #[serde(default)]
    tags: VarMap,
    #[serde(skip)]
    parent: Option<Weak<Element>>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.path == other.path
            && self.vars == other.vars
            && self.context_vars == other.context_vars
            && self.tags == other.tags
    }
}

impl Element {
    /// Classify `input` with the process-wide registry and build the element.
    pub fn create(input: impl Into<ElementInput>, kind_hint: Option<&str>) -> Result<Element> {
        kinds().create(input.into(), kind_hint, None)
    }

    /// An uninitialised element of `kind`. Kinds call this and then fill in
    /// variables and tags.
    pub fn new(kind: impl Into<String>, path: Option<FsPath>) -> Self {
        Self {
            kind: kind.into(),
            path,
            vars: VarMap::new(),
            context_vars: BTreeSet::new(),
            tags: VarMap::new(),
            parent: None,
        }
    }

    /// Kind name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Backing path, if any.
    pub fn path(&self) -> Option<&FsPath> {
        self.path.as_ref()
    }

    /// Read a variable.
    pub fn var(&self, name: &str) -> Result<&Value> {
        self.vars.get(name).ok_or_else(|| ElementError::InvalidVar {
            kind: self.kind.clone(),
            name: name.to_string(),
        })
    }

    /// Whether the variable exists.
    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Set a variable; `is_context` marks it for propagation to outputs.
    ///
    /// Setting an existing context variable without the flag keeps it a
    /// context variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>, is_context: bool) {
        let name = name.into();
        if is_context {
            self.context_vars.insert(name.clone());
        }
        self.vars.insert(name, value.into());
    }

    /// Remove a variable (and its context flag).
    pub fn remove_var(&mut self, name: &str) -> Option<Value> {
        self.context_vars.remove(name);
        self.vars.remove(name)
    }

    /// All variables.
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Variable names, sorted.
    pub fn var_names(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    /// Whether `name` is flagged as a context variable.
    pub fn is_context_var(&self, name: &str) -> bool {
        self.context_vars.contains(name)
    }

    /// Names of context variables.
    pub fn context_var_names(&self) -> &BTreeSet<String> {
        &self.context_vars
    }

    /// Context variables with their values.
    pub fn context_vars(&self) -> VarMap {
        self.context_vars
            .iter()
            .filter_map(|name| self.vars.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    /// Read a tag.
    pub fn tag(&self, name: &str) -> Result<&Value> {
        self.tags.get(name).ok_or_else(|| ElementError::InvalidTag {
            kind: self.kind.clone(),
            name: name.to_string(),
        })
    }

    /// Whether the tag exists.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Set a tag.
    pub fn set_tag(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.tags.insert(name.into(), value.into());
    }

    /// Remove a tag.
    pub fn remove_tag(&mut self, name: &str) -> Option<Value> {
        self.tags.remove(name)
    }

    /// All tags.
    pub fn tags(&self) -> &VarMap {
        &self.tags
    }

    /// The element this one was derived from, while it is still alive.
    pub fn parent(&self) -> Option<Arc<Element>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Record `parent` as this element's origin.
    pub fn set_parent(&mut self, parent: &Arc<Element>) {
        self.parent = Some(Arc::downgrade(parent));
    }

    /// A copy carrying the same variables, context set and tags, pointing at
    /// `path`. The `filePath` variable follows the new path.
    pub fn with_path(&self, path: FsPath) -> Element {
        let mut element = self.clone();
        element.set_var("filePath", path.to_string(), false);
        element.path = Some(path);
        element
    }

    /// JSON form: `{kind, path, vars, contextVars, tags}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Restore an element from its JSON form without re-running
    /// classification. The kind must be registered.
    pub fn from_json(value: &serde_json::Value) -> Result<Element> {
        let element: Element = serde_json::from_value(value.clone())
            .map_err(|e| ElementError::InvalidJson(e.to_string()))?;
        if !kinds().contains(&element.kind) {
            return Err(ElementError::KindNotFound(element.kind));
        }
        Ok(element)
    }

    /// Siblings in the parent directory whose names match `pattern`
    /// (`*` and `?` wildcards), classified.
    pub fn glob_from_parent(&self, pattern: &str) -> Result<Vec<Element>> {
        let dir = match (self.parent(), &self.path) {
            (Some(parent), _) if parent.path.is_some() => parent.path.clone(),
            (_, Some(path)) => path.parent(),
            _ => None,
        };
        let dir = dir.ok_or_else(|| {
            ElementError::init(self.kind.as_str(), "element has no parent location")
        })?;
        crate::glob::glob_matching(&dir, pattern)
    }

    pub(crate) fn describe_input(input: &ElementInput) -> String {
        input.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_missing_var_and_tag() {
        let element = Element::new("file", Some(FsPath::new("/a/b.txt")));
        assert_matches!(element.var("nope"), Err(ElementError::InvalidVar { .. }));
        assert_matches!(element.tag("group"), Err(ElementError::InvalidTag { .. }));
    }

    #[test]
    fn test_context_flag_is_sticky() {
        let mut element = Element::new("file", None);
        element.set_var("shot", "sh010", true);
        element.set_var("shot", "sh020", false);
        assert!(element.is_context_var("shot"));
        assert_eq!(element.context_vars().get("shot"), Some(&Value::from("sh020")));
    }

    #[test]
    fn test_clone_preserves_state() {
        let mut element = Element::new("file", Some(FsPath::new("/a/b.txt")));
        element.set_var("shot", "sh010", true);
        element.set_tag("group", "b.####.txt");
        let copy = element.with_path(FsPath::new("/c/b.txt"));
        assert_eq!(copy.var("filePath").unwrap(), &Value::from("/c/b.txt"));
        assert!(copy.is_context_var("shot"));
        assert!(copy.has_tag("group"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut element = Element::new("file", Some(FsPath::new("/a/b.txt")));
        element.set_var("frame", 12, false);
        element.set_var("shot", "sh010", true);
        element.set_tag("group", "b.####.txt");

        let json = element.to_json();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["contextVars"][0], "shot");

        let restored = Element::from_json(&json).unwrap();
        assert_eq!(restored, element);
        assert!(restored.parent().is_none());
    }

    #[test]
    fn test_from_json_unknown_kind() {
        let json = serde_json::json!({"kind": "noSuchKind", "vars": {}});
        assert_matches!(Element::from_json(&json), Err(ElementError::KindNotFound(_)));
    }

    #[test]
    fn test_parent_is_weak() {
        let parent = Arc::new(Element::new("directory", Some(FsPath::new("/a"))));
        let mut child = Element::new("file", Some(FsPath::new("/a/b.txt")));
        child.set_parent(&parent);
        assert_eq!(child.parent().unwrap().kind(), "directory");
        drop(parent);
        assert!(child.parent().is_none());
    }
}
