//! The capability table: one installed set of bindings per connection.
//!
//! Every logical query operation maps onto the active SDK convention:
//!
//! | operation        | client-style                 | server-style                     |
//! |------------------|------------------------------|----------------------------------|
//! | filter / AND     | `where_` / `and` constraints | chained `where_` calls           |
//! | OR               | `or` constraint              | DNF expansion (first branch or merge) |
//! | order / cursors  | `order_by`, `start_at`, ...  | chained `order_by`, `start_at`, ... |
//! | limit / count    | `limit`, `get_count_from_server` | chained `limit`, `count`     |
//! | collection group | `collection_group` target    | `collection_group` handle        |
//! | listen           | `on_snapshot`                | chained `on_snapshot`            |
//!
//! Degraded bindings stand in when neither convention could be bound: they use
//! a chained surface if the handle has one, and fail with `Unsupported`
//! otherwise.

use bson::Document;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    config::ServerOrStrategy,
    document::{RawDocument, RawSnapshot, SnapshotListener, Subscription},
    error::{OrmError, OrmResult},
    filter::Sort,
    plan::QueryPlan,
    sdk::{ClientSdk, ServerSdk},
    value::compare_documents,
};

/// Logical operations of the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Filter,
    And,
    Or,
    OrderBy,
    StartAt,
    StartAfter,
    EndAt,
    EndBefore,
    Limit,
    Count,
    CollectionGroup,
    Listen,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::Filter,
        Operation::And,
        Operation::Or,
        Operation::OrderBy,
        Operation::StartAt,
        Operation::StartAfter,
        Operation::EndAt,
        Operation::EndBefore,
        Operation::Limit,
        Operation::Count,
        Operation::CollectionGroup,
        Operation::Listen,
    ];
}

/// How a binding provides an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// Expressed directly in the SDK's convention.
    Native,
    /// Approximated or emulated on top of the SDK.
    Emulated,
    /// Fails with [`OrmError::Unsupported`].
    Unavailable,
}

/// The installed binding table.
#[derive(Clone)]
pub enum Bindings {
    Client(Arc<dyn ClientSdk>),
    Server(Arc<dyn ServerSdk>),
    /// Stand-in bindings, optionally backed by the handle's chained surface.
    Degraded(Option<Arc<dyn ServerSdk>>),
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bindings::Client(sdk) => f.debug_tuple("Client").field(sdk).finish(),
            Bindings::Server(sdk) => f.debug_tuple("Server").field(sdk).finish(),
            Bindings::Degraded(sdk) => f.debug_tuple("Degraded").field(sdk).finish(),
        }
    }
}

impl Bindings {
    pub fn name(&self) -> &'static str {
        match self {
            Bindings::Client(_) => "client",
            Bindings::Server(_) => "server",
            Bindings::Degraded(_) => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Bindings::Degraded(_))
    }

    /// Looks up an operation in the capability table.
    pub fn supports(&self, operation: Operation) -> Support {
        match self {
            Bindings::Client(_) => Support::Native,
            Bindings::Server(_) => match operation {
                Operation::Or => Support::Emulated,
                _ => Support::Native,
            },
            Bindings::Degraded(Some(_)) => Support::Emulated,
            Bindings::Degraded(None) => Support::Unavailable,
        }
    }

    fn chained(&self) -> OrmResult<&Arc<dyn ServerSdk>> {
        match self {
            Bindings::Server(sdk) => Ok(sdk),
            Bindings::Degraded(Some(sdk)) => {
                log::warn!("executing through degraded bindings on the handle's chained surface");
                Ok(sdk)
            }
            Bindings::Degraded(None) => Err(OrmError::Unsupported(
                "no SDK could be bound for this connection".into(),
            )),
            Bindings::Client(_) => Err(OrmError::Unsupported("client bindings have no chained surface".into())),
        }
    }

    /// Runs a plan and returns the raw documents.
    pub async fn fetch(&self, plan: &QueryPlan, strategy: ServerOrStrategy) -> OrmResult<Vec<RawDocument>> {
        log::debug!("executing {plan:?} with {} bindings", self.name());

        if let Bindings::Client(sdk) = self {
            return sdk.get_docs(&plan.to_client_query()).await;
        }

        let sdk = self.chained()?;
        let branches = plan.disjuncts()?;
        let Some(first) = branches.first() else {
            log::debug!("filter has no satisfiable branch; nothing to fetch");
            return Ok(Vec::new());
        };

        if branches.len() > 1 && strategy == ServerOrStrategy::MergeBranches {
            let mut merged: HashMap<String, RawDocument> = HashMap::new();
            for branch in &branches {
                for document in plan.to_server_query(sdk.as_ref(), branch).get().await? {
                    merged.entry(document.path.clone()).or_insert(document);
                }
            }
            let orders = plan.to_client_query().effective_orders();
            return Ok(sort_and_limit(merged.into_values().collect(), &orders, plan.limit));
        }

        if branches.len() > 1 {
            log::warn!(
                "OR filter expands to {} branches; server-style bindings execute only the first",
                branches.len()
            );
        }
        plan.to_server_query(sdk.as_ref(), first).get().await
    }

    /// Counts the documents a plan matches.
    pub async fn count(&self, plan: &QueryPlan, strategy: ServerOrStrategy) -> OrmResult<u64> {
        if let Bindings::Client(sdk) = self {
            return sdk.get_count_from_server(&plan.to_client_query()).await;
        }

        let sdk = self.chained()?;
        let branches = plan.disjuncts()?;
        let Some(first) = branches.first() else {
            return Ok(0);
        };

        if branches.len() > 1 && strategy == ServerOrStrategy::MergeBranches {
            return Ok(self.fetch(plan, strategy).await?.len() as u64);
        }
        if branches.len() > 1 {
            log::warn!(
                "OR filter expands to {} branches; counting only the first",
                branches.len()
            );
        }
        plan.to_server_query(sdk.as_ref(), first).count().await
    }

    /// Subscribes to a plan's results.
    ///
    /// Chained listeners cannot be merged, so under server-style bindings a
    /// disjunctive filter always listens to its first branch only.
    pub async fn listen(&self, plan: &QueryPlan, listener: SnapshotListener) -> OrmResult<Subscription> {
        if let Bindings::Client(sdk) = self {
            return sdk.on_snapshot(&plan.to_client_query(), listener).await;
        }

        let sdk = self.chained()?;
        let branches = plan.disjuncts()?;
        // An empty OR matches nothing and never will.
        let Some(first) = branches.first() else {
            listener(RawSnapshot::default());
            return Ok(Subscription::new(|| {}));
        };
        if branches.len() > 1 {
            log::warn!(
                "OR filter expands to {} branches; listening to the first only",
                branches.len()
            );
        }
        plan.to_server_query(sdk.as_ref(), first).on_snapshot(listener).await
    }

    pub async fn get_doc(&self, path: &str) -> OrmResult<Option<RawDocument>> {
        match self {
            Bindings::Client(sdk) => sdk.get_doc(path).await,
            _ => self.chained()?.doc(path).get().await,
        }
    }

    pub async fn set_doc(&self, path: &str, data: Document, merge: bool) -> OrmResult<()> {
        match self {
            Bindings::Client(sdk) => sdk.set_doc(path, data, merge).await,
            _ => self.chained()?.doc(path).set(data, merge).await,
        }
    }

    pub async fn update_doc(&self, path: &str, data: Document) -> OrmResult<()> {
        match self {
            Bindings::Client(sdk) => sdk.update_doc(path, data).await,
            _ => self.chained()?.doc(path).update(data).await,
        }
    }

    pub async fn delete_doc(&self, path: &str) -> OrmResult<()> {
        match self {
            Bindings::Client(sdk) => sdk.delete_doc(path).await,
            _ => self.chained()?.doc(path).delete().await,
        }
    }
}

fn sort_and_limit(mut documents: Vec<RawDocument>, orders: &[Sort], limit: Option<usize>) -> Vec<RawDocument> {
    documents.sort_by(|a, b| compare_documents(a, b, orders));
    if let Some(limit) = limit {
        documents.truncate(limit);
    }
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crate::filter::SortDirection;

    #[test]
    fn capability_table_per_binding() {
        let degraded = Bindings::Degraded(None);
        assert!(Operation::ALL.iter().all(|op| degraded.supports(*op) == Support::Unavailable));
        assert!(degraded.is_degraded());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn degraded_without_surface_is_unsupported() {
        let bindings = Bindings::Degraded(None);
        let plan = QueryPlan::new(crate::sdk::QueryTarget::Collection("users".into()));

        assert!(matches!(
            bindings.fetch(&plan, ServerOrStrategy::FirstBranch).await,
            Err(OrmError::Unsupported(_))
        ));
        assert!(matches!(bindings.get_doc("users/a").await, Err(OrmError::Unsupported(_))));
    }

    #[test]
    fn merged_results_are_sorted_then_limited() {
        let docs = vec![
            RawDocument::new("users/c", doc! { "age": 3 }),
            RawDocument::new("users/a", doc! { "age": 9 }),
            RawDocument::new("users/b", doc! { "age": 5 }),
        ];

        let out = sort_and_limit(docs, &[Sort::new("age", SortDirection::Desc)], Some(2));
        assert_eq!(out.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
