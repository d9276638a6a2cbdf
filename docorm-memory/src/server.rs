//! Server-style chained surface over an [`InMemoryStore`].
//!
//! Chained handles record plain constraints and compose them into a query
//! only when executed, so a chain can only ever express implicitly AND-ed
//! field comparisons.

use async_trait::async_trait;
use bson::{Bson, Document};

use docorm_core::{
    document::{RawDocument, SnapshotListener, Subscription},
    error::OrmResult,
    filter::{Expr, FieldOp, SortDirection},
    sdk::{
        QueryTarget,
        client::{self, Cursor, QueryConstraint},
        server::{ServerDocument, ServerQuery, ServerSdk},
    },
};

use crate::store::InMemoryStore;

#[derive(Debug, Clone)]
pub struct InMemoryServer {
    store: InMemoryStore,
}

impl InMemoryServer {
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

impl ServerSdk for InMemoryServer {
    fn collection(&self, path: &str) -> Box<dyn ServerQuery> {
        Box::new(InMemoryServerQuery::new(self.store.clone(), client::collection(path)))
    }

    fn collection_group(&self, collection_id: &str) -> Box<dyn ServerQuery> {
        Box::new(InMemoryServerQuery::new(self.store.clone(), client::collection_group(collection_id)))
    }

    fn doc(&self, path: &str) -> Box<dyn ServerDocument> {
        Box::new(InMemoryServerDocument { store: self.store.clone(), path: path.to_string() })
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryServerQuery {
    store: InMemoryStore,
    target: QueryTarget,
    constraints: Vec<QueryConstraint>,
}

impl InMemoryServerQuery {
    fn new(store: InMemoryStore, target: QueryTarget) -> Self {
        Self { store, target, constraints: Vec::new() }
    }

    fn push(mut self: Box<Self>, constraint: QueryConstraint) -> Box<dyn ServerQuery> {
        self.constraints.push(constraint);
        self
    }

    fn compose(&self) -> client::ClientQuery {
        client::query(self.target.clone(), self.constraints.iter().cloned())
    }
}

#[async_trait]
impl ServerQuery for InMemoryServerQuery {
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
        Ok(self.store.run(&self.compose()).await?.len() as u64)
    }

    async fn on_snapshot(&self, listener: SnapshotListener) -> OrmResult<Subscription> {
        self.store.listen(&self.compose(), listener).await
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryServerDocument {
    store: InMemoryStore,
    path: String,
}

#[async_trait]
impl ServerDocument for InMemoryServerDocument {
    async fn get(&self) -> OrmResult<Option<RawDocument>> {
        self.store.get(&self.path).await
    }

    async fn set(&self, data: Document, merge: bool) -> OrmResult<()> {
        self.store.set(&self.path, data, merge).await
    }

    async fn update(&self, data: Document) -> OrmResult<()> {
        self.store.update(&self.path, data).await
    }

    async fn delete(&self) -> OrmResult<()> {
        self.store.delete(&self.path).await
    }
}
