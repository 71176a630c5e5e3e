//! Engine: model registration over one store
//!
//! The store handle is injected at construction; there is no process-wide
//! connection or model registry. Each [`Engine`] keeps its own name → model
//! map.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kvmodel_core::{Clock, Error, Result, SystemClock};
use kvmodel_storage::Store;
use tracing::info;

use crate::config::EngineConfig;
use crate::model::Model;
use crate::schema::Schema;

/// Registry of models sharing a store, clock and configuration
///
/// # Example
///
/// ```ignore
/// let engine = Engine::new(Arc::new(MemoryStore::new()));
/// let notices = engine.register(notice_schema()?)?;
/// assert!(engine.model("rcnotice").is_some());
/// ```
pub struct Engine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    models: DashMap<String, Model>,
}

impl Engine {
    /// Engine with the default configuration on the system clock
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: Arc::new(EngineConfig::default()),
            models: DashMap::new(),
        }
    }

    /// Engine with an explicit configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` if the configuration is invalid.
    pub fn with_config(store: Arc<dyn Store>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            ..Self::new(store)
        })
    }

    /// Replace the clock; models registered afterwards use it
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a schema and return its model
    ///
    /// # Errors
    ///
    /// `Error::Schema` if a model with the same name is already registered.
    pub fn register(&self, schema: Schema) -> Result<Model> {
        let name = schema.name().to_string();
        match self.models.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::schema(format!(
                "model '{}' is already registered",
                name
            ))),
            Entry::Vacant(slot) => {
                let expiration = schema.expiration();
                let model = Model::new(
                    Arc::clone(&self.store),
                    Arc::new(schema),
                    Arc::clone(&self.clock),
                    Arc::clone(&self.config),
                );
                slot.insert(model.clone());
                info!(
                    target: "kvmodel::engine",
                    model = %name,
                    expire_secs = ?expiration.secs(),
                    "Registered model"
                );
                Ok(model)
            }
        }
    }

    /// Registered model by name
    pub fn model(&self, name: &str) -> Option<Model> {
        self.models.get(name).map(|m| m.value().clone())
    }

    /// Names of all registered models, sorted
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|m| m.key().clone()).collect();
        names.sort();
        names
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared store handle
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("models", &self.model_names())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_core::Attribute;
    use kvmodel_storage::MemoryStore;

    fn schema(name: &str) -> Schema {
        Schema::builder(name)
            .attribute(Attribute::integer("n").indexed())
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let engine = Engine::new(Arc::new(MemoryStore::new()));
        engine.register(schema("b")).unwrap();
        engine.register(schema("a")).unwrap();
        assert_eq!(engine.model_names(), vec!["a", "b"]);
        assert_eq!(engine.model("a").unwrap().name(), "a");
        assert!(engine.model("c").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let engine = Engine::new(Arc::new(MemoryStore::new()));
        engine.register(schema("a")).unwrap();
        let err = engine.register(schema("a")).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            default_limit: 0,
            ..EngineConfig::default()
        };
        assert!(Engine::with_config(Arc::new(MemoryStore::new()), config).is_err());
    }
}
