//! Raw records exchanged with the store SDKs and snapshot listener types.
//!
//! A [`RawDocument`] is what either SDK style hands back: the document's path,
//! its identifier and its stored fields (stored names, not logical names).
//! Mapping into model instances happens in [`crate::model`].

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use std::{borrow::Cow, fmt, sync::Arc};

use crate::filter::DOCUMENT_ID_FIELD;

/// A document as returned by the store, before alias translation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    /// The last segment of `path`.
    pub id: String,
    /// Full slash-separated document path (`users/alice/posts/p1`).
    pub path: String,
    /// Stored fields.
    pub data: Document,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl RawDocument {
    /// Creates a raw document, deriving its id from the path.
    pub fn new(path: impl Into<String>, data: Document) -> Self {
        let path = path.into();
        let id = path.rsplit('/').next().unwrap_or_default().to_string();
        Self { id, path, data, create_time: None, update_time: None }
    }

    pub fn with_times(mut self, create_time: DateTime<Utc>, update_time: DateTime<Utc>) -> Self {
        self.create_time = Some(create_time);
        self.update_time = Some(update_time);
        self
    }

    /// Path of the collection containing this document.
    pub fn collection_path(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(collection, _)| collection)
            .unwrap_or_default()
    }

    /// Returns a field value by stored (possibly dotted) name.
    ///
    /// [`DOCUMENT_ID_FIELD`] resolves to the document id.
    pub fn field(&self, name: &str) -> Option<Cow<'_, Bson>> {
        if name == DOCUMENT_ID_FIELD {
            return Some(Cow::Owned(Bson::String(self.id.clone())));
        }
        crate::value::lookup(&self.data, name).map(Cow::Borrowed)
    }
}

/// Kind of change reported to snapshot listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single document change within a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub document: RawDocument,
}

/// A query snapshot delivered by an SDK: the full result set plus the changes
/// since the previous snapshot (every document is `Added` in the first one).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub documents: Vec<RawDocument>,
    pub changes: Vec<RawChange>,
}

/// Callback invoked by an SDK every time a listened query's results change.
pub type SnapshotListener = Arc<dyn Fn(RawSnapshot) + Send + Sync>;

/// Handle returned by snapshot subscriptions.
///
/// Dropping it does not stop the listener; call [`Subscription::unsubscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Stops the listener. No further snapshots are delivered.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn id_and_collection_come_from_path() {
        let document = RawDocument::new("orgs/o1/members/m7", doc! {});
        assert_eq!(document.id, "m7");
        assert_eq!(document.collection_path(), "orgs/o1/members");
        assert_eq!(document.field(DOCUMENT_ID_FIELD).as_deref(), Some(&Bson::String("m7".into())));
    }

    #[test]
    fn unsubscribe_runs_cancel_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let subscription = Subscription::new(move || flag.store(true, Ordering::SeqCst));

        subscription.unsubscribe();
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
