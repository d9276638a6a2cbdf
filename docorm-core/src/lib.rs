//! Core of the docorm object mapper for hierarchical document stores.
//!
//! The store is reachable through two SDK conventions, a client-style one
//! built from free functions and a server-style one built from chained
//! methods. This crate hides the difference:
//!
//! - **Models** ([`model`]) - static descriptors, aliases, text indexes and the record mapping
//! - **Paths** ([`path`]) - collection path templates with named parameters
//! - **Filters** ([`filter`]) - store-neutral filter expressions, orderings and cursors
//! - **SDKs** ([`sdk`]) - the two conventions and the store handle abstraction
//! - **Detection and binding** ([`detect`], [`binding`], [`binder`]) - lazy, single-flight choice of convention
//! - **Queries** ([`query`], [`plan`]) - the fluent builder and its materialized plan
//! - **Repositories** ([`repository`]) - model reads, writes and relations
//! - **Connections** ([`connection`], [`config`]) - the registry of named connections
//! - **Error handling** ([`error`]) - the shared error type
//!
//! # Example
//!
//! ```ignore
//! use docorm::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Model)]
//! #[model(path_id = "users", path = "users")]
//! pub struct User {
//!     #[model(id)]
//!     #[serde(skip)]
//!     pub id: Option<String>,
//!     pub name: String,
//! }
//!
//! let registry = ConnectionRegistry::new();
//! let connection = registry.init_connection(handle, None)?;
//! let users = User::query(&connection, &PathParams::new())?
//!     .where_("name", FieldOp::Eq, "Alice")
//!     .get()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docorm_core;

pub mod binder;
pub mod binding;
pub mod config;
pub mod connection;
pub mod detect;
pub mod document;
pub mod error;
pub mod filter;
pub mod model;
pub mod path;
pub mod plan;
pub mod query;
pub mod registry;
pub mod repository;
pub mod sdk;
pub mod value;
