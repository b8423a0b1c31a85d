use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Top-level keys of a resource file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ResourceFile {
    pub include: Vec<String>,
    pub procedures: Vec<ProcedureEntry>,
    pub elements: Vec<ElementKindDecl>,
    pub task_kinds: Vec<JsonValue>,
    pub vars: serde_json::Map<String, JsonValue>,
    pub tasks: Vec<JsonValue>,
}

/// A procedure file path or an inline declaration.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProcedureEntry {
    File(String),
    Inline(ProcedureDecl),
}

/// Contents of a procedure file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProcedureFile {
    pub procedures: Vec<ProcedureDecl>,
}

/// A template procedure: `template` evaluated with the call's arguments
/// bound as `arg0`, `arg1`, ...
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ProcedureDecl {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub min_args: usize,
    #[serde(default)]
    pub max_args: Option<usize>,
}

fn default_parent() -> String {
    "file".to_string()
}

/// A user element kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ElementKindDecl {
    pub name: String,
    #[serde(default = "default_parent")]
    pub parent: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub vars: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub tags: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub context_vars: Vec<String>,
}
