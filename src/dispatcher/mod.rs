//! Dispatchers run a holder tree over input elements.
//!
//! - [`LocalDispatcher`]: walks the tree in this process and executes each
//!   task through a [`TaskWrapper`](crate::wrapper::TaskWrapper), splitting
//!   large tasks into chunks when `dispatch.split` is set.
//! - [`RenderFarmDispatcher`]: turns every holder into a *collapsed* farm
//!   job that, when executed, binds its inputs and submits an *expanded* job
//!   for the task plus collapsed jobs for the children.

mod local;
mod registry;
mod renderfarm;
mod spool;

use kombi_element::Element;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::holder::{Skipped, TaskHolder};

pub use local::LocalDispatcher;
pub use registry::{
    dispatchers, farm_managers, DispatcherFactory, DispatcherRegistry, FarmManagerFactory,
    FarmManagerRegistry,
};
pub use renderfarm::{
    execute_aux, AuxData, FarmJob, FarmManager, JobType, RenderFarmDispatcher, JOB_PROCESSED,
};
pub use spool::{DrainSummary, JobState, SpoolFarm, SpoolJob};

/// Options shared by the dispatchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherOptions {
    /// Wait for wrapped children to finish.
    pub await_execution: bool,
    /// Echo child output.
    pub enable_verbose_output: bool,
    /// Reporter used for task events.
    pub default_reporter: String,
    /// Chunk size overriding the `dispatch.splitSize` metadata.
    pub split_size: Option<usize>,
    /// Abort on resolution errors instead of skipping elements.
    pub strict: bool,
    /// Farm manager used by the render farm dispatcher.
    pub farm_manager: String,
    /// Directory of the spool farm manager.
    pub spool_dir: Option<PathBuf>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            await_execution: true,
            enable_verbose_output: false,
            default_reporter: "columns".to_string(),
            split_size: None,
            strict: false,
            farm_manager: "spool".to_string(),
            spool_dir: None,
        }
    }
}

/// What a dispatch produced.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Launched job handles: pids, farm job ids or local invocation ids.
    pub job_ids: Vec<String>,
    /// Elements produced by awaited work.
    pub outputs: Vec<Element>,
    /// Elements skipped on resolution errors.
    pub skipped: Vec<Skipped>,
}

/// Runs a holder tree.
pub trait Dispatcher {
    /// Registered name.
    fn name(&self) -> &str;

    /// Options in effect.
    fn options(&self) -> &DispatcherOptions;

    /// Run `holder` over `elements`.
    fn dispatch(&mut self, holder: &TaskHolder, elements: &[Element]) -> Result<DispatchReport>;

    /// JSON form `{type, options}`, used by farm jobs to rebuild the dispatcher.
    fn to_json(&self) -> Result<JsonValue> {
        Ok(json!({"type": self.name(), "options": serde_json::to_value(self.options())?}))
    }
}

/// Build a registered dispatcher by name.
pub fn create_dispatcher(name: &str, options: DispatcherOptions) -> Result<Box<dyn Dispatcher>> {
    dispatchers().create(name, options)
}

/// Rebuild a dispatcher from its JSON form.
pub fn dispatcher_from_json(value: &JsonValue) -> Result<Box<dyn Dispatcher>> {
    let name = value
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::config("dispatcher JSON needs a \"type\""))?;
    let options = match value.get("options") {
        Some(options) => serde_json::from_value(options.clone())?,
        None => DispatcherOptions::default(),
    };
    create_dispatcher(name, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_defaults_and_json_names() {
        let options: DispatcherOptions =
            serde_json::from_value(json!({"awaitExecution": false, "splitSize": 3})).unwrap();
        assert!(!options.await_execution);
        assert_eq!(options.split_size, Some(3));
        assert_eq!(options.default_reporter, "columns");
        assert_eq!(options.farm_manager, "spool");
    }

    #[test]
    fn test_unknown_dispatcher() {
        assert!(matches!(
            create_dispatcher("cloud", DispatcherOptions::default()),
            Err(Error::DispatcherNotFound(name)) if name == "cloud"
        ));
    }

    #[test]
    fn test_dispatcher_json_round_trip() {
        let options = DispatcherOptions {
            strict: true,
            ..DispatcherOptions::default()
        };
        let dispatcher = create_dispatcher("local", options.clone()).unwrap();
        let json = dispatcher.to_json().unwrap();
        assert_eq!(json["type"], "local");
        let restored = dispatcher_from_json(&json).unwrap();
        assert_eq!(restored.name(), "local");
        assert_eq!(restored.options(), &options);
    }
}
