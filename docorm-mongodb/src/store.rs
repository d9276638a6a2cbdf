use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions},
};
use std::sync::Arc;

use docorm_core::{
    document::{RawDocument, SnapshotListener, Subscription},
    error::{OrmError, OrmResult},
    filter::{BoundPosition, DOCUMENT_ID_FIELD, Expr, FieldOp, QueryVisitor, SortDirection},
    path::document_path,
    sdk::{
        ClientSdk, HandleBuilder, HandleCapabilities, QueryTarget, StoreHandle,
        client::{self, ClientQuery, Cursor, QueryConstraint},
        server::{ServerDocument, ServerQuery, ServerSdk},
    },
    value::compare_documents,
};

use crate::{
    query::{MongoQueryTranslator, mongo_field, sort_document},
    sanitizer::ValueSanitizer,
};

fn backend(error: mongodb::error::Error) -> OrmError {
    OrmError::Backend(error.to_string())
}

/// A server-style document store on MongoDB.
///
/// Every store collection path (`orgs/o1/members`) maps to one MongoDB
/// collection of the same (sanitized) name; document ids live in `_id`.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_path: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&ValueSanitizer::sanitize_string(collection_path))
    }

    fn prepare_document(&self, id: &str, data: &Document) -> Document {
        let mut document = ValueSanitizer::sanitize_document(data);
        document.insert("_id", id);
        document
    }

    fn restore_document(&self, collection_path: &str, document: &Document) -> RawDocument {
        let id = match document.get("_id") {
            Some(Bson::String(id)) => id.clone(),
            Some(Bson::ObjectId(id)) => id.to_hex(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let mut data = ValueSanitizer::restore_document(document);
        data.remove("_id");

        RawDocument::new(document_path(collection_path, &id), data)
    }

    /// Collection paths whose last segment is `collection_id`.
    async fn group_collections(&self, collection_id: &str) -> OrmResult<Vec<String>> {
        let suffix = format!("/{collection_id}");
        Ok(self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend)?
            .into_iter()
            .map(|name| ValueSanitizer::restore_string(&name))
            .filter(|name| name == collection_id || name.ends_with(&suffix))
            .collect())
    }

    async fn find(&self, collection_path: &str, query: &ClientQuery) -> OrmResult<Vec<RawDocument>> {
        let orders = query.effective_orders();
        let mut clauses = Vec::new();

        if let Some(filter) = query.filter() {
            clauses.push(filter);
        }
        if let Some(bound) = query.start_bound().and_then(|b| b.to_filter(&orders, BoundPosition::Start)) {
            clauses.push(bound);
        }
        if let Some(bound) = query.end_bound().and_then(|b| b.to_filter(&orders, BoundPosition::End)) {
            clauses.push(bound);
        }

        let mut filters = clauses
            .iter()
            .map(|expr| MongoQueryTranslator.visit_expr(expr))
            .collect::<OrmResult<Vec<Document>>>()?;
        // Ordering on a field drops documents that lack it.
        for sort in orders.iter().filter(|sort| sort.field != DOCUMENT_ID_FIELD) {
            let mut exists = Document::new();
            exists.insert(mongo_field(&sort.field), doc! { "$exists": true });
            filters.push(exists);
        }

        let filter = match filters.len() {
            0 => doc! {},
            1 => filters.remove(0),
            _ => doc! { "$and": filters },
        };

        let mut options = FindOptions::default();
        options.sort = Some(sort_document(&orders));
        options.limit = query.limit().map(|limit| limit as i64);

        Ok(self
            .get_collection(collection_path)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend)?
            .iter()
            .map(|document| self.restore_document(collection_path, document))
            .collect())
    }

    async fn run(&self, query: &ClientQuery) -> OrmResult<Vec<RawDocument>> {
        match query.target() {
            QueryTarget::Collection(path) => self.find(path, query).await,
            QueryTarget::CollectionGroup(id) => {
                let mut documents = Vec::new();
                for path in self.group_collections(id).await? {
                    documents.extend(self.find(&path, query).await?);
                }

                let orders = query.effective_orders();
                documents.sort_by(|a, b| compare_documents(a, b, &orders));
                if let Some(limit) = query.limit() {
                    documents.truncate(limit);
                }
                Ok(documents)
            }
        }
    }

    pub async fn shutdown(self) -> OrmResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

impl ServerSdk for MongoDbStore {
    fn collection(&self, path: &str) -> Box<dyn ServerQuery> {
        Box::new(MongoServerQuery::new(self.clone(), client::collection(path)))
    }

    fn collection_group(&self, collection_id: &str) -> Box<dyn ServerQuery> {
        Box::new(MongoServerQuery::new(self.clone(), client::collection_group(collection_id)))
    }

    fn doc(&self, path: &str) -> Box<dyn ServerDocument> {
        Box::new(MongoServerDocument { store: self.clone(), path: path.to_string() })
    }
}

#[async_trait]
impl StoreHandle for MongoDbStore {
    fn capabilities(&self) -> HandleCapabilities {
        HandleCapabilities { collection: true, document: true, settings: true, serializer: false }
    }

    fn chained(&self) -> Option<Arc<dyn ServerSdk>> {
        Some(Arc::new(self.clone()))
    }

    async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>> {
        Err(OrmError::Unsupported("MongoDB has no client-style SDK".into()))
    }
}

/// A chained query over MongoDB.
#[derive(Debug, Clone)]
pub struct MongoServerQuery {
    store: MongoDbStore,
    target: QueryTarget,
    constraints: Vec<QueryConstraint>,
}

impl MongoServerQuery {
    fn new(store: MongoDbStore, target: QueryTarget) -> Self {
        Self { store, target, constraints: Vec::new() }
    }

    fn push(mut self: Box<Self>, constraint: QueryConstraint) -> Box<dyn ServerQuery> {
        self.constraints.push(constraint);
        self
    }

    fn compose(&self) -> ClientQuery {
        client::query(self.target.clone(), self.constraints.iter().cloned())
    }
}

#[async_trait]
impl ServerQuery for MongoServerQuery {
    fn where_(self: Box<Self>, field: &str, op: FieldOp, value: Bson) -> Box<dyn ServerQuery> {
        self.push(QueryConstraint::Where(Expr::field(field, op, value)))
    }

    fn order_by(self: Box<Self>, field: &str, direction: SortDirection) -> Box<dyn ServerQuery> {
        self.push(client::order_by(field, direction))
    }

    fn limit(self: Box<Self>, limit: usize) -> Box<dyn ServerQuery> {
        self.push(client::limit(limit))
    }

    fn start_at(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery> {
        self.push(client::start_at(Cursor::Values(values)))
    }

    fn start_after(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery> {
        self.push(client::start_after(Cursor::Values(values)))
    }

    fn end_at(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery> {
        self.push(client::end_at(Cursor::Values(values)))
    }

    fn end_before(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery> {
        self.push(client::end_before(Cursor::Values(values)))
    }

    async fn get(&self) -> OrmResult<Vec<RawDocument>> {
        self.store.run(&self.compose()).await
    }

    async fn count(&self) -> OrmResult<u64> {
        let query = self.compose();
        match (query.target(), query.filter(), query.limit()) {
            (QueryTarget::Collection(path), filter, None) if query.orders().is_empty() => {
                let filter = match filter {
                    Some(expr) => MongoQueryTranslator.visit_expr(&expr)?,
                    None => doc! {},
                };
                self.store
                    .get_collection(path)
                    .count_documents(filter)
                    .await
                    .map_err(backend)
            }
            _ => Ok(self.store.run(&query).await?.len() as u64),
        }
    }

    async fn on_snapshot(&self, _listener: SnapshotListener) -> OrmResult<Subscription> {
        Err(OrmError::Unsupported("snapshot listeners are not available on MongoDB".into()))
    }
}

/// A single MongoDB document addressed by store path.
#[derive(Debug, Clone)]
pub struct MongoServerDocument {
    store: MongoDbStore,
    path: String,
}

impl MongoServerDocument {
    fn split(&self) -> OrmResult<(&str, &str)> {
        self.path
            .rsplit_once('/')
            .filter(|(collection, id)| !collection.is_empty() && !id.is_empty())
            .ok_or_else(|| OrmError::InvalidPath(format!("{} is not a document path", self.path)))
    }
}

#[async_trait]
impl ServerDocument for MongoServerDocument {
    async fn get(&self) -> OrmResult<Option<RawDocument>> {
        let (collection, id) = self.split()?;
        Ok(self
            .store
            .get_collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(backend)?
            .map(|document| self.store.restore_document(collection, &document)))
    }

    async fn set(&self, data: Document, merge: bool) -> OrmResult<()> {
        let (collection, id) = self.split()?;
        let collection_handle = self.store.get_collection(collection);

        if merge {
            let mut fields = ValueSanitizer::sanitize_document(&data);
            fields.remove("_id");
            collection_handle
                .update_one(doc! { "_id": id }, doc! { "$set": fields })
                .upsert(true)
                .await
                .map_err(backend)?;
        } else {
            collection_handle
                .replace_one(doc! { "_id": id }, self.store.prepare_document(id, &data))
                .upsert(true)
                .await
                .map_err(backend)?;
        }

        Ok(())
    }

    async fn update(&self, data: Document) -> OrmResult<()> {
        let (collection, id) = self.split()?;
        let result = self
            .store
            .get_collection(collection)
            .update_one(doc! { "_id": id }, doc! { "$set": ValueSanitizer::sanitize_document(&data) })
            .await
            .map_err(backend)?;

        if result.matched_count == 0 {
            return Err(OrmError::DocumentNotFound(self.path.clone()));
        }

        Ok(())
    }

    async fn delete(&self) -> OrmResult<()> {
        let (collection, id) = self.split()?;
        self.store
            .get_collection(collection)
            .delete_one(doc! { "_id": id })
            .await
            .map_err(backend)?;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl HandleBuilder for MongoDbStoreBuilder {
    type Handle = MongoDbStore;

    async fn build(self) -> OrmResult<Self::Handle> {
        log::debug!("connecting to MongoDB database {}", self.database);
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| OrmError::Initialization(e.to_string()))?,
            )
            .map_err(|e| OrmError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
