//! docorm maps models onto a hierarchical document store reachable through
//! either of two SDK conventions.
//!
//! A *client-style* SDK exposes free functions (`collection`, `where_`,
//! `query`, `get_docs`), a *server-style* SDK exposes chained handles
//! (`collection(..).where_(..).get()`). A connection wraps a store handle
//! and, on first use, detects which convention the handle offers and binds
//! to it once. Models and queries never see the difference: the same
//! [`Query`](query::Query) is materialized into a single nested client query
//! or into one chained query per disjunctive branch.
//!
//! # Quick Start
//!
//! ```ignore
//! use docorm::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Model)]
//! #[model(path_id = "users", path = "users")]
//! pub struct User {
//!     #[model(id)]
//!     #[serde(skip)]
//!     pub id: Option<String>,
//!     #[model(text_index)]
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> OrmResult<()> {
//!     let store = InMemoryStore::new();
//!     let registry = ConnectionRegistry::new();
//!     let connection = registry.init_connection(Arc::new(store.handle(HandleFlavour::Client)), None)?;
//!
//!     let mut user = User { name: "Joe".into(), age: 41, ..Default::default() };
//!     user.save(&connection).await?;
//!
//!     let adults = User::query(&connection, &PathParams::new())?
//!         .where_("age", FieldOp::Gte, 18)
//!         .or_where("name", FieldOp::Eq, "Ann")
//!         .order_by("age", SortDirection::Desc)
//!         .get()
//!         .await?;
//!
//!     let fuzzy = User::query(&connection, &PathParams::new())?
//!         .like("name", "%oe%")
//!         .get()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Stores
//!
//! - [`memory`] - in-process store offering either convention, for development and testing
//! - [`mongodb`] - server-style MongoDB store (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docorm;

pub mod prelude;

pub use docorm_core::{
    binder, binding, config, connection, detect, document, error, filter, model, path, plan, query, registry,
    repository, sdk, value,
};
pub use docorm_macros::Model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory store.
pub mod memory {
    pub use docorm_memory::{HandleFlavour, InMemoryClient, InMemoryHandle, InMemoryServer, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB store.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docorm_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
