//! Resource loading.
//!
//! A resource path is a file or a directory. Directories are walked in
//! lexical order, loading every file with a known extension and skipping
//! entries whose names start with `_` or `.` (those can still be pulled in
//! through `include`). Each file may declare:
//!
//! - `include`: files loaded first, relative to the including file.
//! - `procedures`: template procedures, inline or as procedure files.
//! - `elements`: element kinds narrowing a parent kind with a name pattern.
//! - `taskKinds`: preset task kinds.
//! - `vars`: variables applied to every top-level task holder.
//! - `tasks`: task holder trees.
//!
//! Relative resource paths that do not exist are looked up in the
//! directories listed by `KOMBI_CONFIG_PATH`.

pub mod loader;
mod types;

use kombi_common::{Value, VarMap};
use kombi_element::kinds::PatternKind;
use kombi_template::{procedures, Procedure, Scope, Template};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::holder::{HolderScope, TaskHolder};
use crate::task::{preset_from_config, task_kinds, TaskKind};
use loader::loaders;
use types::{ElementKindDecl, ProcedureDecl, ProcedureEntry, ProcedureFile, ResourceFile};

/// Search path variable for resource files.
pub const CONFIG_PATH_ENV: &str = "KOMBI_CONFIG_PATH";

const CONTEXT_SUFFIX: &str = ".context";

/// Everything a load produced. Kinds and procedures are registered globally;
/// their names are listed here.
#[derive(Debug, Default)]
pub struct Resources {
    /// Loaded files in load order.
    pub files: Vec<PathBuf>,
    /// Top-level holders, with the global variables applied.
    pub holders: Vec<TaskHolder>,
    /// Global variables.
    pub vars: HolderScope,
    pub element_kinds: Vec<String>,
    pub task_kinds: Vec<String>,
    pub procedures: Vec<String>,
}

/// Directories listed in `KOMBI_CONFIG_PATH`.
pub fn search_path() -> Vec<PathBuf> {
    std::env::var(CONFIG_PATH_ENV)
        .map(|value| {
            value
                .split(':')
                .filter(|entry| !entry.is_empty())
                .map(|entry| PathBuf::from(shellexpand::tilde(entry).as_ref()))
                .collect()
        })
        .unwrap_or_default()
}

/// Locate a resource: as given (with `~` expanded) when it exists, else in
/// the search path.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    if expanded.exists() {
        return Ok(expanded);
    }
    if expanded.is_relative() {
        for dir in search_path() {
            let candidate = dir.join(&expanded);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    Err(Error::load(path.display(), "no such file or directory"))
}

/// Load a resource file or directory.
pub fn load(path: &Path) -> Result<Resources> {
    let mut loader = Loader::default();
    loader.load_path(&resolve(path)?)?;
    Ok(loader.finish())
}

/// Load every directory of the search path.
pub fn load_search_path() -> Result<Resources> {
    let mut loader = Loader::default();
    for dir in search_path().iter().filter(|dir| dir.exists()) {
        loader.load_path(dir)?;
    }
    Ok(loader.finish())
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

fn var_map(map: &serde_json::Map<String, JsonValue>) -> Result<VarMap> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), Value::from_json(value)?)))
        .collect()
}

#[derive(Default)]
struct Loader {
    stack: Vec<PathBuf>,
    loaded: BTreeSet<PathBuf>,
    resources: Resources,
}

impl Loader {
    fn load_path(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return self.load_file(path);
        }
        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !is_hidden(&entry.file_name().to_string_lossy())
            });
        for entry in walker {
            let entry = entry.map_err(|e| Error::load(path.display(), e.to_string()))?;
            if entry.file_type().is_file() && loaders().for_path(entry.path()).is_some() {
                self.load_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<JsonValue> {
        let loader = loaders()
            .for_path(path)
            .ok_or_else(|| Error::load(path.display(), "unknown resource format"))?;
        let contents =
            fs::read_to_string(path).map_err(|e| Error::load(path.display(), e.to_string()))?;
        loader
            .parse(&contents)
            .map_err(|e| Error::load(path.display(), e))
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let path = path
            .canonicalize()
            .map_err(|e| Error::load(path.display(), e.to_string()))?;
        if self.stack.contains(&path) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            return Err(Error::IncludeCycle(chain.join(" -> ")));
        }
        if self.loaded.contains(&path) {
            return Ok(());
        }
        tracing::debug!("Loading resource {}", path.display());

        let file: ResourceFile = serde_json::from_value(Self::read(&path)?)
            .map_err(|e| Error::load(path.display(), e.to_string()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        self.stack.push(path.clone());
        let result = self.apply(&path, &base, file);
        self.stack.pop();
        result?;

        self.loaded.insert(path.clone());
        self.resources.files.push(path);
        Ok(())
    }

    fn apply(&mut self, path: &Path, base: &Path, file: ResourceFile) -> Result<()> {
        for include in &file.include {
            let target = base.join(shellexpand::tilde(include).as_ref());
            self.load_path(&target)?;
        }

        for entry in file.procedures {
            match entry {
                ProcedureEntry::Inline(decl) => self.register_procedure(decl)?,
                ProcedureEntry::File(name) => {
                    let target = base.join(shellexpand::tilde(&name).as_ref());
                    let procedures: ProcedureFile = serde_json::from_value(Self::read(&target)?)
                        .map_err(|e| Error::load(target.display(), e.to_string()))?;
                    for decl in procedures.procedures {
                        self.register_procedure(decl)?;
                    }
                }
            }
        }

        if !file.elements.is_empty() {
            kombi_element::kinds().begin_generation();
            for decl in file.elements {
                self.register_element_kind(decl)?;
            }
        }

        for value in &file.task_kinds {
            let preset = preset_from_config(value, task_kinds())?;
            self.resources.task_kinds.push(preset.name().to_string());
            task_kinds().register(preset);
        }

        for (key, value) in &file.vars {
            let (name, is_context) = match key.strip_suffix(CONTEXT_SUFFIX) {
                Some(name) => (name, true),
                None => (key.as_str(), false),
            };
            let vars = &mut self.resources.vars;
            vars.vars.insert(name.to_string(), Value::from_json(value)?);
            if is_context {
                vars.context.insert(name.to_string());
            } else {
                vars.context.remove(name);
            }
        }

        for value in &file.tasks {
            let holder = TaskHolder::from_config(value).map_err(|e| match e {
                Error::Config(message) => Error::load(path.display(), message),
                other => other,
            })?;
            self.resources.holders.push(holder);
        }
        Ok(())
    }

    fn register_procedure(&mut self, decl: ProcedureDecl) -> Result<()> {
        let template = Template::new(&decl.template)?;
        let procedure = Procedure::new(
            decl.name.clone(),
            decl.min_args,
            decl.max_args,
            move |args: &[String]| {
                let mut scope = Scope::new();
                for (index, arg) in args.iter().enumerate() {
                    scope.set_var(format!("arg{index}"), arg.as_str());
                }
                template.value(&scope)
            },
        );
        procedures().register(procedure);
        self.resources.procedures.push(decl.name);
        Ok(())
    }

    fn register_element_kind(&mut self, decl: ElementKindDecl) -> Result<()> {
        if !kombi_element::kinds().contains(&decl.parent) {
            return Err(Error::config(format!(
                "element kind {} extends unknown kind {}",
                decl.name, decl.parent
            )));
        }
        let kind = PatternKind::new(decl.name.clone(), decl.parent, decl.pattern.as_deref())?
            .with_vars(var_map(&decl.vars)?)
            .with_tags(var_map(&decl.tags)?)
            .with_context_vars(decl.context_vars);
        kombi_element::kinds().register(kind);
        self.resources.element_kinds.push(decl.name);
        Ok(())
    }

    fn finish(mut self) -> Resources {
        let scope = self.resources.vars.clone();
        for holder in &mut self.resources.holders {
            holder.inherit(&scope);
        }
        self.resources
    }
}
