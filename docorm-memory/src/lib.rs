//! In-memory document store for docorm.
//!
//! This crate provides a thread-safe, in-memory store exposing both SDK
//! conventions docorm binds to: a client-style executor
//! ([`InMemoryClient`]) and a server-style chained surface
//! ([`InMemoryServer`]). Database handles ([`InMemoryHandle`]) come in
//! several flavours so every binding outcome can be exercised. It is meant
//! for development and tests.
//!
//! # Features
//!
//! - **Hierarchical paths** - collections nest under documents at any depth
//! - **Full query support** - filters, OR, orderings, cursors, limits, collection groups
//! - **Snapshot listeners** - added, modified and removed diffs after every write
//! - **Timestamps** - create and update times on every document
//!
//! # Quick Start
//!
//! ```ignore
//! use docorm::{prelude::*, memory::{InMemoryStore, HandleFlavour}};
//!
//! let store = InMemoryStore::new();
//! let registry = ConnectionRegistry::new();
//! let connection = registry.init_connection(Arc::new(store.handle(HandleFlavour::Client)), None)?;
//!
//! let mut user = User { name: "Alice".into(), ..Default::default() };
//! user.save(&connection).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docorm_memory;

pub mod client;
pub mod evaluator;
pub mod handle;
pub mod server;
pub mod store;

pub use client::InMemoryClient;
pub use handle::{HandleFlavour, InMemoryHandle};
pub use server::InMemoryServer;
pub use store::{InMemoryStore, InMemoryStoreBuilder};
