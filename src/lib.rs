pub mod cli;
pub mod config;
pub mod devlog;
pub mod document;
pub mod errors;
pub mod json;
pub mod logger;
pub mod model;
pub mod query;
pub mod schema;
pub mod types;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub use crate::config::OdmConfig;
pub use crate::document::Document;
pub use crate::errors::DbError;
pub use crate::model::Model;
pub use crate::query::{Cursor, Order, Query, SortArg, SortSpec};
pub use crate::schema::{FieldDef, FieldType, Schema};
pub use crate::types::DocumentId;

/// Registry of models by collection name.
#[derive(Debug, Default)]
pub struct Database {
    config: Arc<OdmConfig>,
    models: RwLock<HashMap<String, Arc<Model>>>,
}

impl Database {
    /// Creates an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: OdmConfig) -> Self {
        Self { config: Arc::new(config), models: RwLock::new(HashMap::new()) }
    }

    #[must_use]
    pub fn config(&self) -> &OdmConfig {
        &self.config
    }

    /// Compiles `schema` into a model registered under `name`.
    ///
    /// # Errors
    /// Returns `DbError::CollectionAlreadyExists` if the name is taken.
    pub fn model(&self, name: &str, schema: Schema) -> Result<Arc<Model>, DbError> {
        let mut models = self.models.write();
        if models.contains_key(name) {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        let model = Arc::new(Model::new(name, schema, Arc::clone(&self.config)));
        models.insert(name.to_string(), Arc::clone(&model));
        log::info!("model registered: {name}");
        Ok(model)
    }

    /// # Errors
    /// Returns `DbError::NoSuchCollection` for unknown names.
    pub fn get_model(&self, name: &str) -> Result<Arc<Model>, DbError> {
        self.models.read().get(name).cloned().ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    /// Unregisters a model. Handles already held stay usable.
    pub fn drop_model(&self, name: &str) -> bool {
        let removed = self.models.write().remove(name).is_some();
        if removed {
            log::info!("model dropped: {name}");
        }
        removed
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lifecycle() {
        let db = Database::new();
        let users = db.model("users", Schema::new()).unwrap();
        db.model("posts", Schema::new()).unwrap();
        assert!(matches!(db.model("users", Schema::new()), Err(DbError::CollectionAlreadyExists(_))));
        assert!(Arc::ptr_eq(&users, &db.get_model("users").unwrap()));
        assert_eq!(db.model_names(), vec!["posts", "users"]);
        assert!(db.drop_model("posts"));
        assert!(!db.drop_model("posts"));
        assert!(matches!(db.get_model("posts"), Err(DbError::NoSuchCollection(_))));
    }

    #[test]
    fn models_share_config() {
        let db = Database::with_config(OdmConfig { max_limit: 3, ..OdmConfig::default() });
        let m = db.model("m", Schema::new()).unwrap();
        assert_eq!(m.config().max_limit, 3);
    }
}
