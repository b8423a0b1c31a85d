//! Procedure registry and the standard procedures.
//!
//! Procedures are first-class values looked up by name. The process-wide
//! registry returned by [`procedures`] is populated with the standard set on
//! first use; hosts add their own with [`ProcedureRegistry::register`].

mod datetime;
mod math;
mod path;
mod system;
mod text;
mod version;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Result, TemplateError};

pub use system::TEMP_DIR_ENV;
pub use version::VersionPattern;

type Callable = dyn Fn(&[String]) -> Result<String> + Send + Sync;

/// A named callable with an arity range.
#[derive(Clone)]
pub struct Procedure {
    name: String,
    min_args: usize,
    max_args: Option<usize>,
    callable: Arc<Callable>,
}

impl Procedure {
    /// Create a procedure accepting between `min_args` and `max_args`
    /// arguments (`None` for unbounded).
    pub fn new<F>(name: impl Into<String>, min_args: usize, max_args: Option<usize>, f: F) -> Self
    where
        F: Fn(&[String]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_args,
            max_args,
            callable: Arc::new(f),
        }
    }

    /// Procedure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with already-evaluated arguments.
    pub fn call(&self, args: &[String]) -> Result<String> {
        let too_many = self.max_args.is_some_and(|max| args.len() > max);
        if args.len() < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => max.to_string(),
                Some(max) => format!("{}..{}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(TemplateError::InvalidArity {
                name: self.name.clone(),
                expected,
                given: args.len(),
            });
        }
        (self.callable)(args)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

/// Name-indexed table of procedures.
#[derive(Debug, Default)]
pub struct ProcedureRegistry {
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl ProcedureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the standard procedures.
    pub fn with_standard() -> Self {
        let registry = Self::new();
        for procedure in standard_procedures() {
            registry.register(procedure);
        }
        registry
    }

    /// Register (or replace) a procedure.
    pub fn register(&self, procedure: Procedure) {
        tracing::debug!("Registering template procedure: {}", procedure.name());
        self.procedures
            .write()
            .insert(procedure.name().to_string(), procedure);
    }

    /// Look up a procedure by name.
    pub fn get(&self, name: &str) -> Option<Procedure> {
        self.procedures.read().get(name).cloned()
    }

    /// Whether a procedure is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.read().contains_key(name)
    }

    /// Sorted names of all registered procedures.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.procedures.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a procedure by name.
    pub fn call(&self, name: &str, args: &[String]) -> Result<String> {
        // clone out of the lock so procedures may themselves evaluate templates
        let procedure = self
            .get(name)
            .ok_or_else(|| TemplateError::ProcedureNotFound {
                name: name.to_string(),
            })?;
        procedure.call(args)
    }
}

/// The process-wide registry, initialised with the standard procedures.
pub fn procedures() -> &'static ProcedureRegistry {
    static REGISTRY: OnceLock<ProcedureRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ProcedureRegistry::with_standard)
}

fn standard_procedures() -> Vec<Procedure> {
    let mut all = Vec::new();
    all.extend(path::procedures());
    all.extend(version::procedures());
    all.extend(math::procedures());
    all.extend(datetime::procedures());
    all.extend(system::procedures());
    all.extend(text::procedures());
    all
}
