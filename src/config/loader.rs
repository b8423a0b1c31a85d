//! Resource file formats.
//!
//! A [`ResourceLoader`] turns file contents into the JSON value tree every
//! format shares. The registry picks a loader by file extension.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Parses one resource format.
pub trait ResourceLoader: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// File extensions handled, without the dot.
    fn extensions(&self) -> &[&str];

    /// Parse `contents` into a value tree.
    fn parse(&self, contents: &str) -> std::result::Result<JsonValue, String>;
}

/// `.json` resources.
pub struct JsonLoader;

impl ResourceLoader for JsonLoader {
    fn name(&self) -> &str {
        "json"
    }

    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn parse(&self, contents: &str) -> std::result::Result<JsonValue, String> {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    }
}

/// `.toml` resources.
pub struct TomlLoader;

impl ResourceLoader for TomlLoader {
    fn name(&self) -> &str {
        "toml"
    }

    fn extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn parse(&self, contents: &str) -> std::result::Result<JsonValue, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }
}

/// Loaders indexed by extension. Later registrations win.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: RwLock<Vec<Arc<dyn ResourceLoader>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `json` and `toml` loaders.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(JsonLoader);
        registry.register(TomlLoader);
        registry
    }

    pub fn register<L: ResourceLoader + 'static>(&self, loader: L) {
        tracing::debug!("Registering resource loader: {}", loader.name());
        self.loaders.write().push(Arc::new(loader));
    }

    /// Loader handling `path`'s extension.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn ResourceLoader>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.loaders
            .read()
            .iter()
            .rev()
            .find(|loader| loader.extensions().contains(&ext.as_str()))
            .cloned()
    }

    /// Names of the registered loaders.
    pub fn names(&self) -> Vec<String> {
        self.loaders.read().iter().map(|l| l.name().to_string()).collect()
    }
}

/// The process-wide loader registry.
pub fn loaders() -> &'static LoaderRegistry {
    static REGISTRY: OnceLock<LoaderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(LoaderRegistry::with_builtin)
}
