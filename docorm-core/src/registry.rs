//! Registry of model descriptors keyed by path identifier.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::RwLock,
};

use crate::{
    error::{OrmError, OrmResult},
    model::{Model, ModelDescriptor},
};

/// Holds every registered model descriptor.
///
/// Path identifiers are unique: registering a second model type under an
/// identifier already taken fails immediately. Registering the same type
/// again is a no-op.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, (TypeId, &'static ModelDescriptor)>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers model `M`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::DuplicatePathId`] if another model type already
    /// uses `M`'s path identifier.
    pub fn register<M: Model>(&self) -> OrmResult<()> {
        let descriptor = M::descriptor();
        let mut models = self
            .models
            .write()
            .map_err(|_| OrmError::Initialization("model registry lock poisoned".into()))?;

        match models.get(descriptor.path_id()) {
            Some((type_id, _)) if *type_id == TypeId::of::<M>() => Ok(()),
            Some(_) => Err(OrmError::DuplicatePathId(descriptor.path_id().to_string())),
            None => {
                log::debug!("registered model {} at {}", descriptor.path_id(), descriptor.template());
                models.insert(descriptor.path_id().to_string(), (TypeId::of::<M>(), descriptor));
                Ok(())
            }
        }
    }

    /// Looks up a descriptor by path identifier.
    pub fn get(&self, path_id: &str) -> Option<&'static ModelDescriptor> {
        self.models
            .read()
            .ok()?
            .get(path_id)
            .map(|(_, descriptor)| *descriptor)
    }

    pub fn is_registered<M: Model>(&self) -> bool {
        self.models
            .read()
            .map(|models| {
                models
                    .get(M::descriptor().path_id())
                    .is_some_and(|(type_id, _)| *type_id == TypeId::of::<M>())
            })
            .unwrap_or(false)
    }

    /// Checks that every relation of every registered model points at a registered model.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::ModelNotRegistered`] naming the first missing target.
    pub fn validate_relations(&self) -> OrmResult<()> {
        let models = self
            .models
            .read()
            .map_err(|_| OrmError::Initialization("model registry lock poisoned".into()))?;

        for (_, descriptor) in models.values() {
            for relation in descriptor.relations() {
                if !models.contains_key(&relation.target) {
                    return Err(OrmError::ModelNotRegistered(format!(
                        "{} (relation {} of {})",
                        relation.target,
                        relation.name,
                        descriptor.path_id()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.models.read().map(|models| models.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
