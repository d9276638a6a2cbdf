//! Client-style surface over an [`InMemoryStore`].

use async_trait::async_trait;
use bson::Document;

use docorm_core::{
    document::{RawDocument, SnapshotListener, Subscription},
    error::OrmResult,
    sdk::{ClientQuery, ClientSdk},
};

use crate::store::InMemoryStore;

/// Executes composed client-style queries against an in-memory store.
#[derive(Debug, Clone)]
pub struct InMemoryClient {
    store: InMemoryStore,
}

impl InMemoryClient {
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClientSdk for InMemoryClient {
    async fn get_docs(&self, query: &ClientQuery) -> OrmResult<Vec<RawDocument>> {
        self.store.run(query).await
    }

    async fn get_count_from_server(&self, query: &ClientQuery) -> OrmResult<u64> {
        Ok(self.store.run(query).await?.len() as u64)
    }

    async fn on_snapshot(&self, query: &ClientQuery, listener: SnapshotListener) -> OrmResult<Subscription> {
        self.store.listen(query, listener).await
    }

    async fn get_doc(&self, path: &str) -> OrmResult<Option<RawDocument>> {
        self.store.get(path).await
    }

    async fn set_doc(&self, path: &str, data: Document, merge: bool) -> OrmResult<()> {
        self.store.set(path, data, merge).await
    }

    async fn update_doc(&self, path: &str, data: Document) -> OrmResult<()> {
        self.store.update(path, data).await
    }

    async fn delete_doc(&self, path: &str) -> OrmResult<()> {
        self.store.delete(path).await
    }
}
