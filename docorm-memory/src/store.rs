//! In-memory document storage shared by both SDK surfaces.
//!
//! Documents are kept in a single ordered map keyed by full document path
//! (`orgs/o1/members/m1`), so any depth of subcollection works without extra
//! bookkeeping. Snapshot listeners are re-evaluated after every write and
//! receive the added, modified and removed documents since their last
//! snapshot.

use async_trait::async_trait;
use bson::Document;
use chrono::{DateTime, Utc};
use mea::{mutex::Mutex, rwlock::RwLock};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use docorm_core::{
    document::{ChangeKind, RawChange, RawDocument, RawSnapshot, SnapshotListener, Subscription},
    error::{OrmError, OrmResult},
    filter::{BoundPosition, DOCUMENT_ID_FIELD},
    sdk::{ClientQuery, HandleBuilder, QueryTarget},
    value::compare_documents,
};

use crate::{
    evaluator::DocumentEvaluator,
    handle::{HandleFlavour, InMemoryHandle},
};

#[derive(Debug, Clone)]
struct StoredDocument {
    data: Document,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl StoredDocument {
    fn to_raw(&self, path: &str) -> RawDocument {
        RawDocument::new(path, self.data.clone()).with_times(self.create_time, self.update_time)
    }
}

struct ListenerEntry {
    query: ClientQuery,
    listener: SnapshotListener,
    active: Arc<AtomicBool>,
    last: Vec<RawDocument>,
}

type DocumentMap = BTreeMap<String, StoredDocument>;

/// Thread-safe in-memory document store.
///
/// Cloning is cheap; clones share the same documents and listeners.
#[derive(Clone)]
pub struct InMemoryStore {
    documents: Arc<RwLock<DocumentMap>>,
    listeners: Arc<Mutex<Vec<ListenerEntry>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            documents: Arc::new(RwLock::new(DocumentMap::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Wraps this store in a database handle of the given flavour.
    pub fn handle(&self, flavour: HandleFlavour) -> InMemoryHandle {
        InMemoryHandle::new(self.clone(), flavour)
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn get(&self, path: &str) -> OrmResult<Option<RawDocument>> {
        validate_document_path(path)?;
        Ok(self.documents.read().await.get(path).map(|stored| stored.to_raw(path)))
    }

    pub(crate) async fn set(&self, path: &str, data: Document, merge: bool) -> OrmResult<()> {
        validate_document_path(path)?;
        let now = Utc::now();
        {
            let mut documents = self.documents.write().await;
            match documents.get_mut(path) {
                Some(stored) => {
                    if merge {
                        stored.data.extend(data);
                    } else {
                        stored.data = data;
                    }
                    stored.update_time = now;
                }
                None => {
                    documents.insert(
                        path.to_string(),
                        StoredDocument { data, create_time: now, update_time: now },
                    );
                }
            }
        }
        self.notify().await
    }

    pub(crate) async fn update(&self, path: &str, data: Document) -> OrmResult<()> {
        validate_document_path(path)?;
        {
            let mut documents = self.documents.write().await;
            let stored = documents
                .get_mut(path)
                .ok_or_else(|| OrmError::DocumentNotFound(path.to_string()))?;
            stored.data.extend(data);
            stored.update_time = Utc::now();
        }
        self.notify().await
    }

    /// Deleting a missing document is not an error.
    pub(crate) async fn delete(&self, path: &str) -> OrmResult<()> {
        validate_document_path(path)?;
        let removed = self.documents.write().await.remove(path).is_some();
        if removed {
            self.notify().await?;
        }
        Ok(())
    }

    /// Runs a composed query: target selection, filter, orderings, cursors
    /// and limit, in that order.
    pub(crate) async fn run(&self, query: &ClientQuery) -> OrmResult<Vec<RawDocument>> {
        let documents = self.documents.read().await;
        run_query(&documents, query)
    }

    pub(crate) async fn listen(&self, query: &ClientQuery, listener: SnapshotListener) -> OrmResult<Subscription> {
        let documents = self.run(query).await?;
        let active = Arc::new(AtomicBool::new(true));

        listener(RawSnapshot {
            documents: documents.clone(),
            changes: documents
                .iter()
                .map(|document| RawChange { kind: ChangeKind::Added, document: document.clone() })
                .collect(),
        });

        self.listeners.lock().await.push(ListenerEntry {
            query: query.clone(),
            listener,
            active: active.clone(),
            last: documents,
        });
        log::debug!("registered snapshot listener on {:?}", query.target());

        Ok(Subscription::new(move || active.store(false, Ordering::Release)))
    }

    async fn notify(&self) -> OrmResult<()> {
        let documents = self.documents.read().await;
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|entry| entry.active.load(Ordering::Acquire));

        for entry in listeners.iter_mut() {
            let current = run_query(&documents, &entry.query)?;
            let changes = diff(&entry.last, &current);
            if changes.is_empty() {
                continue;
            }

            log::debug!("delivering {} changes on {:?}", changes.len(), entry.query.target());
            (entry.listener)(RawSnapshot { documents: current.clone(), changes });
            entry.last = current;
        }

        Ok(())
    }
}

fn validate_document_path(path: &str) -> OrmResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(OrmError::InvalidPath(format!("{path} is not a document path")));
    }
    Ok(())
}

fn in_target(document: &RawDocument, target: &QueryTarget) -> bool {
    let collection = document.collection_path();
    match target {
        QueryTarget::Collection(path) => collection == path,
        QueryTarget::CollectionGroup(id) => collection.rsplit('/').next() == Some(id.as_str()),
    }
}

fn run_query(documents: &DocumentMap, query: &ClientQuery) -> OrmResult<Vec<RawDocument>> {
    let filter = query.filter();
    let orders = query.effective_orders();
    let start = query.start_bound().and_then(|bound| bound.to_filter(&orders, BoundPosition::Start));
    let end = query.end_bound().and_then(|bound| bound.to_filter(&orders, BoundPosition::End));

    let mut results: Vec<RawDocument> = documents
        .iter()
        .map(|(path, stored)| stored.to_raw(path))
        .filter(|document| in_target(document, query.target()))
        .filter(|document| {
            orders
                .iter()
                .filter(|sort| sort.field != DOCUMENT_ID_FIELD)
                .all(|sort| document.field(&sort.field).is_some())
        })
        .filter(|document| DocumentEvaluator::matches(document, filter.as_ref()))
        .filter(|document| DocumentEvaluator::matches(document, start.as_ref()))
        .filter(|document| DocumentEvaluator::matches(document, end.as_ref()))
        .collect();

    results.sort_by(|a, b| compare_documents(a, b, &orders));
    if let Some(limit) = query.limit() {
        results.truncate(limit);
    }

    Ok(results)
}

fn diff(previous: &[RawDocument], current: &[RawDocument]) -> Vec<RawChange> {
    let before: HashMap<&str, &RawDocument> = previous.iter().map(|d| (d.path.as_str(), d)).collect();
    let after: HashMap<&str, &RawDocument> = current.iter().map(|d| (d.path.as_str(), d)).collect();
    let mut changes = Vec::new();

    for document in current {
        match before.get(document.path.as_str()) {
            None => changes.push(RawChange { kind: ChangeKind::Added, document: document.clone() }),
            Some(old) if old.data != document.data || old.update_time != document.update_time => {
                changes.push(RawChange { kind: ChangeKind::Modified, document: document.clone() })
            }
            Some(_) => {}
        }
    }
    for document in previous {
        if !after.contains_key(document.path.as_str()) {
            changes.push(RawChange { kind: ChangeKind::Removed, document: document.clone() });
        }
    }

    changes
}

/// Builder for [`InMemoryHandle`]s over a fresh store.
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    flavour: HandleFlavour,
    store: Option<InMemoryStore>,
}

impl InMemoryStoreBuilder {
    pub fn flavour(mut self, flavour: HandleFlavour) -> Self {
        self.flavour = flavour;
        self
    }

    /// Shares an existing store instead of creating one.
    pub fn store(mut self, store: InMemoryStore) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl HandleBuilder for InMemoryStoreBuilder {
    type Handle = InMemoryHandle;

    async fn build(self) -> OrmResult<Self::Handle> {
        Ok(self.store.unwrap_or_default().handle(self.flavour))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docorm_core::{
        filter::{FieldOp, SortDirection},
        sdk::client::{self, Cursor, query, where_},
    };
    use std::sync::Mutex as StdMutex;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, age) in [("a", 30), ("b", 20), ("c", 40), ("d", 20)] {
            store.set(&format!("users/{id}"), doc! { "age": age }, false).await.unwrap();
        }
        store.set("orgs/o1/users/e", doc! { "age": 50 }, false).await.unwrap();
        store.set("users/f", doc! { "name": "no age" }, false).await.unwrap();
        store
    }

    fn ids(documents: &[RawDocument]) -> Vec<&str> {
        documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ordering_excludes_missing_fields_and_breaks_ties_by_id() {
        let store = seeded().await;
        let q = query(client::collection("users"), [client::order_by("age", SortDirection::Asc)]);

        assert_eq!(ids(&store.run(&q).await.unwrap()), vec!["b", "d", "a", "c"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn collection_group_spans_parents() {
        let store = seeded().await;
        let q = query(
            client::collection_group("users"),
            [where_("age", FieldOp::Gte, 40).into()],
        );

        assert_eq!(ids(&store.run(&q).await.unwrap()), vec!["c", "e"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn snapshot_cursor_pages_past_ties() {
        let store = seeded().await;
        let b = store.get("users/b").await.unwrap().unwrap();
        let q = query(
            client::collection("users"),
            [
                client::order_by("age", SortDirection::Asc),
                client::start_after(Cursor::Snapshot(b)),
                client::limit(2),
            ],
        );

        assert_eq!(ids(&store.run(&q).await.unwrap()), vec!["d", "a"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_requires_existing_document() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.update("users/x", doc! { "a": 1 }).await,
            Err(OrmError::DocumentNotFound("users/x".into()))
        );
        assert!(matches!(store.set("users", doc! {}, false).await, Err(OrmError::InvalidPath(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listeners_receive_diffs_until_unsubscribed() {
        let store = seeded().await;
        let seen: Arc<StdMutex<Vec<Vec<(ChangeKind, String)>>>> = Arc::default();
        let sink = seen.clone();

        let q = query(client::collection("users"), [where_("age", FieldOp::Lt, 35).into()]);
        let subscription = store
            .listen(
                &q,
                Arc::new(move |snapshot: RawSnapshot| {
                    sink.lock().unwrap().push(
                        snapshot.changes.into_iter().map(|c| (c.kind, c.document.id)).collect(),
                    );
                }),
            )
            .await
            .unwrap();

        store.set("users/a", doc! { "age": 31 }, false).await.unwrap();
        store.set("users/c", doc! { "age": 10 }, false).await.unwrap();
        store.delete("users/b").await.unwrap();
        store.set("users/z", doc! { "age": 99 }, false).await.unwrap();
        subscription.unsubscribe();
        store.delete("users/d").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].len(), 3);
        assert_eq!(seen[1], vec![(ChangeKind::Modified, "a".to_string())]);
        assert_eq!(seen[2], vec![(ChangeKind::Added, "c".to_string())]);
        assert_eq!(seen[3], vec![(ChangeKind::Removed, "b".to_string())]);
    }
}
