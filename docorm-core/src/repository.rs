//! Model-level operations on a connection.
//!
//! [`Repository`] resolves collection paths, starts queries and performs
//! single-document reads and writes. [`ModelExt`] exposes the same
//! operations as associated and instance methods on every model.

use async_trait::async_trait;
use bson::{Bson, ser::serialize_to_bson};
use std::{marker::PhantomData, sync::Arc};
use uuid::Uuid;

use crate::{
    connection::Connection,
    error::{OrmError, OrmResult},
    filter::{DOCUMENT_ID_FIELD, FieldOp},
    model::{Model, ModelDescriptor, RelationKind},
    path::{PathParams, document_path},
    query::Query,
};

/// Reads, writes and queries models of type `M`.
pub struct Repository<M: Model> {
    connection: Arc<Connection>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self { connection: self.connection.clone(), _model: PhantomData }
    }
}

impl<M: Model> std::fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model", &M::descriptor().path_id())
            .field("connection", &self.connection.key())
            .finish()
    }
}

impl<M: Model> Repository<M> {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection, _model: PhantomData }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn descriptor(&self) -> &'static ModelDescriptor {
        M::descriptor()
    }

    /// Resolves the collection path for `params`.
    pub fn collection_path(&self, params: &PathParams) -> OrmResult<String> {
        self.descriptor().template().resolve(params)
    }

    fn document_path_of(&self, model: &M, params: &PathParams) -> OrmResult<String> {
        let id = model.id().ok_or_else(|| {
            OrmError::InvalidDocument(format!("{} instance has no id", self.descriptor().path_id()))
        })?;
        let collection = self.collection_path(&model.path_params().merged(params))?;
        Ok(document_path(&collection, id))
    }

    /// Starts a query over the collection `params` resolve to.
    pub fn query(&self, params: &PathParams) -> OrmResult<Query<M>> {
        Ok(Query::new(self.connection.clone(), self.collection_path(params)?))
    }

    /// Starts a collection-group query over every collection named like
    /// this model's. Needs no path parameters.
    pub fn collection_query(&self) -> Query<M> {
        Query::new(self.connection.clone(), self.descriptor().collection_name()).set_collection_group(true)
    }

    pub fn where_(&self, params: &PathParams, field: &str, op: FieldOp, value: impl Into<Bson>) -> OrmResult<Query<M>> {
        Ok(self.query(params)?.where_(field, op, value))
    }

    pub async fn get_all(&self, params: &PathParams) -> OrmResult<Vec<M>> {
        self.query(params)?.get().await
    }

    /// Reads one model by id. A missing document is `Ok(None)`.
    pub async fn find(&self, params: &PathParams, id: &str) -> OrmResult<Option<M>> {
        let path = document_path(&self.collection_path(params)?, id);
        match self.connection.bindings().await.get_doc(&path).await? {
            Some(raw) => Ok(Some(self.descriptor().from_record(&raw)?)),
            None => Ok(None),
        }
    }

    /// Returns the first model matching one comparison.
    pub async fn find_one(&self, params: &PathParams, field: &str, op: FieldOp, value: impl Into<Bson>) -> OrmResult<Option<M>> {
        self.where_(params, field, op, value)?.get_one().await
    }

    /// Writes `model`, replacing the stored document. A model without an id
    /// gets a generated one.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingRequiredField`] before writing anything if
    /// a required field is unset.
    pub async fn save(&self, model: &mut M, params: &PathParams) -> OrmResult<()> {
        let record = self
            .descriptor()
            .to_record(model, self.connection.options().text_index_max_len)?;
        let collection = self.collection_path(&model.path_params().merged(params))?;

        let id = match model.id() {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().simple().to_string();
                model.set_id(id.clone());
                id
            }
        };
        let path = document_path(&collection, &id);

        log::debug!("saving {path}");
        self.connection.bindings().await.set_doc(&path, record, false).await
    }

    /// Replaces `model` with its stored state.
    pub async fn load(&self, model: &mut M, params: &PathParams) -> OrmResult<()> {
        let path = self.document_path_of(model, params)?;
        let raw = self
            .connection
            .bindings()
            .await
            .get_doc(&path)
            .await?
            .ok_or(OrmError::DocumentNotFound(path))?;

        *model = self.descriptor().from_record(&raw)?;
        Ok(())
    }

    /// Writes only `fields` (logical names) of `model`.
    pub async fn update(&self, model: &M, fields: &[&str], params: &PathParams) -> OrmResult<()> {
        let path = self.document_path_of(model, params)?;
        let record = self
            .descriptor()
            .partial_record(model, fields, self.connection.options().text_index_max_len)?;

        self.connection.bindings().await.update_doc(&path, record).await
    }

    pub async fn remove(&self, model: &M, params: &PathParams) -> OrmResult<()> {
        let path = self.document_path_of(model, params)?;
        self.connection.bindings().await.delete_doc(&path).await
    }

    /// Builds the query for relation `name` of `model`.
    ///
    /// Has-one and has-many relations match `R`'s key field against the
    /// model id. Belongs-to matches `R`'s id against the model's key field,
    /// belongs-to-many against every id in the model's key array.
    pub fn related<R: Model>(&self, model: &M, name: &str, params: &PathParams) -> OrmResult<Query<R>> {
        let descriptor = self.descriptor();
        let relation = descriptor.relation(name).ok_or_else(|| {
            OrmError::InvalidDocument(format!("{} has no relation {name}", descriptor.path_id()))
        })?;

        if self.connection.models().get(&relation.target).is_none() {
            return Err(OrmError::ModelNotRegistered(relation.target.clone()));
        }
        if R::descriptor().path_id() != relation.target {
            return Err(OrmError::InvalidDocument(format!(
                "relation {name} targets {}, not {}",
                relation.target,
                R::descriptor().path_id()
            )));
        }

        let target_path = R::descriptor().template().resolve(&model.path_params().merged(params))?;
        let query = Query::<R>::new(self.connection.clone(), target_path);

        match relation.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let id = model.id().ok_or_else(|| {
                    OrmError::InvalidDocument(format!("{} instance has no id", descriptor.path_id()))
                })?;
                let query = query.where_(relation.key.clone(), FieldOp::Eq, id);
                Ok(match relation.kind {
                    RelationKind::HasOne => query.limit(1),
                    _ => query,
                })
            }
            RelationKind::BelongsTo => Ok(query.where_(DOCUMENT_ID_FIELD, FieldOp::Eq, self.key_value(model, &relation.key)?)),
            RelationKind::BelongsToMany => Ok(query.where_(DOCUMENT_ID_FIELD, FieldOp::In, self.key_value(model, &relation.key)?)),
        }
    }

    fn key_value(&self, model: &M, key: &str) -> OrmResult<Bson> {
        let value = match serialize_to_bson(model)? {
            Bson::Document(document) => document.get(key).cloned(),
            _ => None,
        };

        match value {
            None | Some(Bson::Null) => Err(OrmError::InvalidDocument(format!(
                "{} has no value for relation key {key}",
                self.descriptor().path_id()
            ))),
            Some(value) => Ok(value),
        }
    }
}

/// Repository operations as model methods.
///
/// Associated functions take explicit path parameters; instance methods use
/// the model's own.
#[async_trait]
pub trait ModelExt: Model {
    fn repository(connection: &Arc<Connection>) -> OrmResult<Repository<Self>> {
        connection.repository::<Self>()
    }

    fn query(connection: &Arc<Connection>, params: &PathParams) -> OrmResult<Query<Self>> {
        Self::repository(connection)?.query(params)
    }

    fn collection_query(connection: &Arc<Connection>) -> OrmResult<Query<Self>> {
        Ok(Self::repository(connection)?.collection_query())
    }

    fn where_(
        connection: &Arc<Connection>,
        params: &PathParams,
        field: &str,
        op: FieldOp,
        value: Bson,
    ) -> OrmResult<Query<Self>> {
        Self::repository(connection)?.where_(params, field, op, value)
    }

    async fn get_all(connection: &Arc<Connection>, params: &PathParams) -> OrmResult<Vec<Self>> {
        Self::repository(connection)?.get_all(params).await
    }

    async fn find(connection: &Arc<Connection>, params: &PathParams, id: &str) -> OrmResult<Option<Self>> {
        Self::repository(connection)?.find(params, id).await
    }

    async fn find_one(
        connection: &Arc<Connection>,
        params: &PathParams,
        field: &str,
        op: FieldOp,
        value: Bson,
    ) -> OrmResult<Option<Self>> {
        Self::repository(connection)?.find_one(params, field, op, value).await
    }

    async fn save(&mut self, connection: &Arc<Connection>) -> OrmResult<()> {
        Self::repository(connection)?.save(self, &PathParams::new()).await
    }

    async fn load(&mut self, connection: &Arc<Connection>) -> OrmResult<()> {
        Self::repository(connection)?.load(self, &PathParams::new()).await
    }

    async fn update(&self, connection: &Arc<Connection>, fields: &[&str]) -> OrmResult<()> {
        Self::repository(connection)?.update(self, fields, &PathParams::new()).await
    }

    async fn remove(&self, connection: &Arc<Connection>) -> OrmResult<()> {
        Self::repository(connection)?.remove(self, &PathParams::new()).await
    }

    fn related<R: Model>(&self, connection: &Arc<Connection>, name: &str) -> OrmResult<Query<R>> {
        Self::repository(connection)?.related::<R>(self, name, &PathParams::new())
    }
}

impl<M: Model> ModelExt for M {}
