//! Store SDK abstractions.
//!
//! Two calling conventions exist for the same underlying document store:
//!
//! - [`client`]: queries are built from free functions (`query`, `where_`,
//!   `or`, ...) and executed through a [`ClientSdk`].
//! - [`server`]: queries are built by chaining methods on handles returned
//!   by a [`ServerSdk`].
//!
//! A connection starts from a [`StoreHandle`], the opaque database handle the
//! application passes in. Its [`HandleCapabilities`] are what the detector
//! inspects to decide which convention to bind to.

pub mod client;
pub mod server;

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::error::OrmResult;

pub use client::{ClientQuery, ClientSdk, Cursor, QueryConstraint, QueryFilterConstraint, QueryTarget};
pub use server::{ServerDocument, ServerQuery, ServerSdk};

/// Which surfaces a database handle exposes.
///
/// A server-style handle has chained collection and document accessors plus
/// at least one of the server-only configuration surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCapabilities {
    /// Chained `collection(path)` accessor.
    pub collection: bool,
    /// Chained `doc(path)` accessor.
    pub document: bool,
    /// Settings surface (`settings(...)`).
    pub settings: bool,
    /// Custom serializer surface.
    pub serializer: bool,
}

/// An opaque database handle supplied by the application.
#[async_trait]
pub trait StoreHandle: Send + Sync + Debug {
    /// Reports the surfaces this handle exposes. Must not perform I/O.
    fn capabilities(&self) -> HandleCapabilities;

    /// The handle's chained surface, if it has one.
    fn chained(&self) -> Option<Arc<dyn ServerSdk>>;

    /// Loads the client-style SDK functions for this handle.
    ///
    /// Invoked at most once per connection, on the first query.
    async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>>;
}

/// Factory trait for creating store handles.
#[async_trait]
pub trait HandleBuilder {
    type Handle: StoreHandle + 'static;

    /// Builds the handle, opening whatever resources it needs.
    async fn build(self) -> OrmResult<Self::Handle>;
}
