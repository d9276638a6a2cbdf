//! Named connections and their registry.
//!
//! # Example
//!
//! ```ignore
//! use docorm::prelude::*;
//!
//! let registry = ConnectionRegistry::new();
//! registry.register_model::<User>()?;
//! let connection = registry.init_connection(Arc::new(handle), None)?;
//!
//! let users = connection.repository::<User>()?.get_all(&PathParams::new()).await?;
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    binder::{BinderState, LazyBinder},
    binding::Bindings,
    config::ConnectionOptions,
    error::{OrmError, OrmResult},
    model::Model,
    registry::ModelRegistry,
    repository::Repository,
    sdk::StoreHandle,
};

/// Key used when a connection is registered or looked up without one.
pub const DEFAULT_CONNECTION_KEY: &str = "default";

/// A store handle together with its lazily installed bindings.
#[derive(Debug)]
pub struct Connection {
    key: String,
    options: ConnectionOptions,
    binder: LazyBinder,
    models: Arc<ModelRegistry>,
}

impl Connection {
    pub fn new(
        key: impl Into<String>,
        handle: Arc<dyn StoreHandle>,
        options: ConnectionOptions,
        models: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            key: key.into(),
            binder: LazyBinder::new(handle, options.binding_mode),
            options,
            models,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn binder_state(&self) -> BinderState {
        self.binder.state()
    }

    /// Binds on first call; afterwards returns the installed bindings.
    pub async fn bindings(&self) -> &Bindings {
        self.binder.ensure_bound().await
    }

    /// Returns a repository for `M`, registering the model if needed.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DuplicatePathId`] if another model already owns
    /// `M`'s path identifier.
    pub fn repository<M: Model>(self: &Arc<Self>) -> OrmResult<Repository<M>> {
        self.models.register::<M>()?;
        Ok(Repository::new(self.clone()))
    }
}

/// Owns every named connection and the model registry they share.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    models: Arc<ModelRegistry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Registers a model type.
    pub fn register_model<M: Model>(&self) -> OrmResult<()> {
        self.models.register::<M>()
    }

    /// Registers `handle` under `key` (or [`DEFAULT_CONNECTION_KEY`]) with
    /// default options. Binding happens on the first query.
    pub fn init_connection(&self, handle: Arc<dyn StoreHandle>, key: Option<&str>) -> OrmResult<Arc<Connection>> {
        self.init_connection_with(handle, key, ConnectionOptions::default())
    }

    /// # Errors
    ///
    /// Returns [`OrmError::ConnectionAlreadyExists`] if `key` is taken.
    pub fn init_connection_with(
        &self,
        handle: Arc<dyn StoreHandle>,
        key: Option<&str>,
        options: ConnectionOptions,
    ) -> OrmResult<Arc<Connection>> {
        let key = key.unwrap_or(DEFAULT_CONNECTION_KEY);
        let mut connections = self.write()?;

        if connections.contains_key(key) {
            return Err(OrmError::ConnectionAlreadyExists(key.to_string()));
        }

        let connection = Arc::new(Connection::new(key, handle, options, self.models.clone()));
        connections.insert(key.to_string(), connection.clone());
        log::debug!("initialized connection {key}");

        Ok(connection)
    }

    pub fn connection(&self, key: Option<&str>) -> OrmResult<Arc<Connection>> {
        let key = key.unwrap_or(DEFAULT_CONNECTION_KEY);
        self.connections
            .read()
            .map_err(|_| OrmError::Initialization("connection registry lock poisoned".into()))?
            .get(key)
            .cloned()
            .ok_or_else(|| OrmError::ConnectionNotFound(key.to_string()))
    }

    /// Removes one connection. Queries holding it keep working until dropped.
    pub fn close(&self, key: Option<&str>) -> OrmResult<()> {
        let key = key.unwrap_or(DEFAULT_CONNECTION_KEY);
        self.write()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| OrmError::ConnectionNotFound(key.to_string()))
    }

    /// Removes every connection.
    pub fn clear(&self) -> OrmResult<()> {
        self.write()?.clear();
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .connections
            .read()
            .map(|connections| connections.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn write(&self) -> OrmResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Connection>>>> {
        self.connections
            .write()
            .map_err(|_| OrmError::Initialization("connection registry lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{ClientSdk, HandleCapabilities, ServerSdk};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct NullHandle;

    #[async_trait]
    impl StoreHandle for NullHandle {
        fn capabilities(&self) -> HandleCapabilities {
            HandleCapabilities::default()
        }

        fn chained(&self) -> Option<Arc<dyn ServerSdk>> {
            None
        }

        async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>> {
            Err(OrmError::Initialization("unavailable".into()))
        }
    }

    #[test]
    fn default_key_lifecycle() {
        let registry = ConnectionRegistry::new();
        let connection = registry.init_connection(Arc::new(NullHandle), None).unwrap();

        assert_eq!(connection.key(), DEFAULT_CONNECTION_KEY);
        assert_eq!(connection.binder_state(), BinderState::Unbound);
        assert!(Arc::ptr_eq(&registry.connection(None).unwrap(), &connection));
        assert_eq!(
            registry.init_connection(Arc::new(NullHandle), Some("default")).unwrap_err(),
            OrmError::ConnectionAlreadyExists("default".into())
        );

        registry.init_connection(Arc::new(NullHandle), Some("replica")).unwrap();
        assert_eq!(registry.keys(), vec!["default".to_string(), "replica".to_string()]);

        registry.close(None).unwrap();
        assert_eq!(registry.connection(None).unwrap_err(), OrmError::ConnectionNotFound("default".into()));

        registry.clear().unwrap();
        assert!(registry.keys().is_empty());
    }
}
