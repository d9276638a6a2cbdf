//! The server-style SDK convention: chained methods on query handles.
//!
//! ```ignore
//! let docs = sdk
//!     .collection("users")
//!     .where_("age", FieldOp::Gt, 18.into())
//!     .order_by("age", SortDirection::Asc)
//!     .limit(10)
//!     .get()
//!     .await?;
//! ```
//!
//! Chained handles have no composite filters: successive `where_` calls are
//! implicitly AND-ed.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    document::{RawDocument, SnapshotListener, Subscription},
    error::OrmResult,
    filter::{FieldOp, SortDirection},
};

/// Entry point of a server-style SDK.
pub trait ServerSdk: Send + Sync + Debug {
    /// Starts a query over a single collection.
    fn collection(&self, path: &str) -> Box<dyn ServerQuery>;

    /// Starts a query over every collection named `collection_id`.
    fn collection_group(&self, collection_id: &str) -> Box<dyn ServerQuery>;

    /// Addresses a single document.
    fn doc(&self, path: &str) -> Box<dyn ServerDocument>;
}

/// A chainable query handle.
#[async_trait]
pub trait ServerQuery: Send + Sync + Debug {
    fn where_(self: Box<Self>, field: &str, op: FieldOp, value: Bson) -> Box<dyn ServerQuery>;
    fn order_by(self: Box<Self>, field: &str, direction: SortDirection) -> Box<dyn ServerQuery>;
    fn limit(self: Box<Self>, limit: usize) -> Box<dyn ServerQuery>;
    fn start_at(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery>;
    fn start_after(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery>;
    fn end_at(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery>;
    fn end_before(self: Box<Self>, values: Vec<Bson>) -> Box<dyn ServerQuery>;

    async fn get(&self) -> OrmResult<Vec<RawDocument>>;
    async fn count(&self) -> OrmResult<u64>;
    async fn on_snapshot(&self, listener: SnapshotListener) -> OrmResult<Subscription>;
}

/// A handle on a single document.
#[async_trait]
pub trait ServerDocument: Send + Sync + Debug {
    async fn get(&self) -> OrmResult<Option<RawDocument>>;
    async fn set(&self, data: Document, merge: bool) -> OrmResult<()>;
    async fn update(&self, data: Document) -> OrmResult<()>;
    async fn delete(&self) -> OrmResult<()>;
}
