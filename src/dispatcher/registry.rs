//! Dispatcher kinds and farm managers by name.
//!
//! Both tables keep registration order. Registering an existing name
//! replaces its factory in place.

use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

use super::renderfarm::spool_dir;
use super::{
    Dispatcher, DispatcherOptions, FarmManager, LocalDispatcher, RenderFarmDispatcher, SpoolFarm,
};
use crate::error::{Error, Result};

/// Builds a dispatcher from its options.
pub type DispatcherFactory =
    Arc<dyn Fn(DispatcherOptions) -> Result<Box<dyn Dispatcher>> + Send + Sync>;

/// Builds a farm manager from the render farm dispatcher's options.
pub type FarmManagerFactory =
    Arc<dyn Fn(&DispatcherOptions) -> Result<Box<dyn FarmManager>> + Send + Sync>;

struct Table<F> {
    entries: RwLock<Vec<(String, F)>>,
}

impl<F> Default for Table<F> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<F: Clone> Table<F> {
    fn insert(&self, name: String, factory: F) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = factory,
            None => entries.push((name, factory)),
        }
    }

    fn get(&self, name: &str) -> Option<F> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, factory)| factory.clone())
    }

    fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Dispatcher kinds in registration order.
#[derive(Default)]
pub struct DispatcherRegistry {
    table: Table<DispatcherFactory>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `local` and `renderFarm`.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("local", |options| {
            Ok(Box::new(LocalDispatcher::new(options)?) as Box<dyn Dispatcher>)
        });
        registry.register("renderFarm", |options| {
            Ok(Box::new(RenderFarmDispatcher::new(options)?) as Box<dyn Dispatcher>)
        });
        registry
    }

    /// Register (or replace) a dispatcher kind.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(DispatcherOptions) -> Result<Box<dyn Dispatcher>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("Registering dispatcher: {}", name);
        self.table.insert(name, Arc::new(factory));
    }

    /// Factory for `name`.
    pub fn get(&self, name: &str) -> Result<DispatcherFactory> {
        self.table
            .get(name)
            .ok_or_else(|| Error::DispatcherNotFound(name.to_string()))
    }

    /// Build the dispatcher `name`.
    pub fn create(&self, name: &str, options: DispatcherOptions) -> Result<Box<dyn Dispatcher>> {
        (self.get(name)?)(options)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.table.names()
    }
}

/// The process-wide dispatcher registry.
pub fn dispatchers() -> &'static DispatcherRegistry {
    static REGISTRY: OnceLock<DispatcherRegistry> = OnceLock::new();
    REGISTRY.get_or_init(DispatcherRegistry::with_builtin)
}

/// Farm managers in registration order.
#[derive(Default)]
pub struct FarmManagerRegistry {
    table: Table<FarmManagerFactory>,
}

impl FarmManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the on-disk `spool` manager.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("spool", |options| {
            Ok(Box::new(SpoolFarm::open(spool_dir(options))?) as Box<dyn FarmManager>)
        });
        registry
    }

    /// Register (or replace) a farm manager.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&DispatcherOptions) -> Result<Box<dyn FarmManager>> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("Registering farm manager: {}", name);
        self.table.insert(name, Arc::new(factory));
    }

    /// Factory for `name`.
    pub fn get(&self, name: &str) -> Result<FarmManagerFactory> {
        self.table
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown farm manager {name:?}")))
    }

    /// Build the manager named by `options.farm_manager`.
    pub fn create(&self, options: &DispatcherOptions) -> Result<Box<dyn FarmManager>> {
        (self.get(&options.farm_manager)?)(options)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.table.names()
    }
}

/// The process-wide farm manager registry.
pub fn farm_managers() -> &'static FarmManagerRegistry {
    static REGISTRY: OnceLock<FarmManagerRegistry> = OnceLock::new();
    REGISTRY.get_or_init(FarmManagerRegistry::with_builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DispatchReport, FarmJob};
    use crate::holder::TaskHolder;
    use kombi_element::Element;
    use tempfile::tempdir;

    struct Recording {
        options: DispatcherOptions,
    }

    impl Dispatcher for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn options(&self) -> &DispatcherOptions {
            &self.options
        }

        fn dispatch(&mut self, _: &TaskHolder, elements: &[Element]) -> Result<DispatchReport> {
            Ok(DispatchReport {
                job_ids: vec![elements.len().to_string()],
                ..DispatchReport::default()
            })
        }
    }

    struct Counting(usize);

    impl FarmManager for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn submit(&mut self, _: FarmJob) -> Result<String> {
            self.0 += 1;
            Ok(format!("c{}", self.0))
        }

        fn extend_dependency_ids(&mut self, _: &str, _: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_order() {
        assert_eq!(dispatchers().names(), vec!["local", "renderFarm"]);
        assert_eq!(farm_managers().names(), vec!["spool"]);
    }

    #[test]
    fn test_register_keeps_insertion_order() {
        let registry = DispatcherRegistry::with_builtin();
        registry.register("recording", |options| {
            Ok(Box::new(Recording { options }) as Box<dyn Dispatcher>)
        });
        registry.register("local", |options| {
            Ok(Box::new(Recording { options }) as Box<dyn Dispatcher>)
        });
        assert_eq!(registry.names(), vec!["local", "renderFarm", "recording"]);

        // Replaced in place.
        let dispatcher = registry.create("local", DispatcherOptions::default()).unwrap();
        assert_eq!(dispatcher.name(), "recording");
        assert!(matches!(
            registry.get("cloud"),
            Err(Error::DispatcherNotFound(name)) if name == "cloud"
        ));
    }

    #[test]
    fn test_farm_manager_lookup() {
        let registry = FarmManagerRegistry::with_builtin();
        registry.register("counting", |_| Ok(Box::new(Counting(0)) as Box<dyn FarmManager>));
        assert_eq!(registry.names(), vec!["spool", "counting"]);

        let dir = tempdir().unwrap();
        let options = DispatcherOptions {
            farm_manager: "counting".to_string(),
            spool_dir: Some(dir.path().to_path_buf()),
            ..DispatcherOptions::default()
        };
        assert_eq!(registry.create(&options).unwrap().name(), "counting");

        let spool = DispatcherOptions {
            spool_dir: Some(dir.path().to_path_buf()),
            ..DispatcherOptions::default()
        };
        assert_eq!(registry.create(&spool).unwrap().name(), "spool");

        let unknown = DispatcherOptions {
            farm_manager: "deadline".to_string(),
            ..DispatcherOptions::default()
        };
        assert!(matches!(registry.create(&unknown), Err(Error::Config(_))));
    }
}
