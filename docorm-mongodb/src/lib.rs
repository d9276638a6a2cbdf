//! MongoDB store for docorm.
//!
//! [`MongoDbStore`] is a server-style SDK: it exposes chained collection
//! and document handles and has no client-style module to load, so the
//! binder always takes the chained path for it. Each collection path maps
//! to one MongoDB collection and document ids are stored in `_id`.
//!
//! Enable it through the facade's `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! docorm = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docorm::{prelude::*, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017", "app")
//!     .build()
//!     .await?;
//! let registry = ConnectionRegistry::new();
//! let connection = registry.init_connection(Arc::new(store), None)?;
//! ```
//!
//! Snapshot listeners are not available; subscribing through a MongoDB
//! connection fails with [`OrmError::Unsupported`](docorm_core::error::OrmError::Unsupported).

#[allow(unused_extern_crates)]
extern crate self as docorm_mongodb;

pub mod query;
pub mod sanitizer;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder, MongoServerDocument, MongoServerQuery};
