//! The client-style SDK convention.
//!
//! Queries are values assembled from free functions and composed
//! functionally, then handed to the SDK for execution:
//!
//! ```ignore
//! use docorm::sdk::client::{self, query, where_, or, order_by, limit};
//!
//! let q = query(
//!     client::collection("users"),
//!     [
//!         or(vec![where_("age", FieldOp::Lt, 18), where_("age", FieldOp::Gt, 65)]).into(),
//!         order_by("age", SortDirection::Asc),
//!         limit(10),
//!     ],
//! );
//! let docs = sdk.get_docs(&q).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    document::{RawDocument, SnapshotListener, Subscription},
    error::OrmResult,
    filter::{Bound, DOCUMENT_ID_FIELD, Expr, FieldOp, Sort, SortDirection},
};

/// What a query reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTarget {
    /// A single collection by full path.
    Collection(String),
    /// Every collection with this id, anywhere in the hierarchy.
    CollectionGroup(String),
}

/// A cursor position: explicit values or a document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    Values(Vec<Bson>),
    Snapshot(RawDocument),
}

impl Cursor {
    /// Resolves this cursor into values aligned with `orders`.
    ///
    /// A snapshot contributes its value for each ordering (null when absent).
    pub fn values_for(&self, orders: &[Sort]) -> Vec<Bson> {
        match self {
            Cursor::Values(values) => values.clone(),
            Cursor::Snapshot(document) => orders
                .iter()
                .map(|sort| document.field(&sort.field).map(|v| v.into_owned()).unwrap_or(Bson::Null))
                .collect(),
        }
    }
}

/// A filter constraint, as produced by [`where_`], [`and`] and [`or`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilterConstraint(pub Expr);

/// One constraint passed to [`query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryConstraint {
    Where(Expr),
    OrderBy(Sort),
    Limit(usize),
    StartAt(Cursor),
    StartAfter(Cursor),
    EndAt(Cursor),
    EndBefore(Cursor),
}

impl From<QueryFilterConstraint> for QueryConstraint {
    fn from(filter: QueryFilterConstraint) -> Self {
        QueryConstraint::Where(filter.0)
    }
}

/// A composed client-style query.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientQuery {
    target: QueryTarget,
    constraints: Vec<QueryConstraint>,
}

impl ClientQuery {
    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    pub fn constraints(&self) -> &[QueryConstraint] {
        &self.constraints
    }

    /// All filter constraints combined with AND.
    pub fn filter(&self) -> Option<Expr> {
        let mut filters: Vec<Expr> = self
            .constraints
            .iter()
            .filter_map(|constraint| match constraint {
                QueryConstraint::Where(expr) => Some(expr.clone()),
                _ => None,
            })
            .collect();

        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Expr::And(filters)),
        }
    }

    /// Explicit orderings, in declaration order.
    pub fn orders(&self) -> Vec<Sort> {
        self.constraints
            .iter()
            .filter_map(|constraint| match constraint {
                QueryConstraint::OrderBy(sort) => Some(sort.clone()),
                _ => None,
            })
            .collect()
    }

    /// Explicit orderings followed by the implicit document-id ordering.
    pub fn effective_orders(&self) -> Vec<Sort> {
        let mut orders = self.orders();
        if !orders.iter().any(|sort| sort.field == DOCUMENT_ID_FIELD) {
            let direction = orders.last().map(|sort| sort.direction).unwrap_or(SortDirection::Asc);
            orders.push(Sort::new(DOCUMENT_ID_FIELD, direction));
        }
        orders
    }

    /// The last limit constraint, if any.
    pub fn limit(&self) -> Option<usize> {
        self.constraints.iter().rev().find_map(|constraint| match constraint {
            QueryConstraint::Limit(limit) => Some(*limit),
            _ => None,
        })
    }

    /// The start cursor as a value bound over [`ClientQuery::effective_orders`].
    pub fn start_bound(&self) -> Option<Bound> {
        self.bound(|constraint| match constraint {
            QueryConstraint::StartAt(cursor) => Some((cursor, true)),
            QueryConstraint::StartAfter(cursor) => Some((cursor, false)),
            _ => None,
        })
    }

    /// The end cursor as a value bound over [`ClientQuery::effective_orders`].
    pub fn end_bound(&self) -> Option<Bound> {
        self.bound(|constraint| match constraint {
            QueryConstraint::EndAt(cursor) => Some((cursor, true)),
            QueryConstraint::EndBefore(cursor) => Some((cursor, false)),
            _ => None,
        })
    }

    fn bound(&self, pick: impl Fn(&QueryConstraint) -> Option<(&Cursor, bool)>) -> Option<Bound> {
        let (cursor, inclusive) = self.constraints.iter().rev().find_map(pick)?;
        Some(Bound::new(cursor.values_for(&self.effective_orders()), inclusive))
    }
}

/// Targets a single collection.
pub fn collection(path: impl Into<String>) -> QueryTarget {
    QueryTarget::Collection(path.into())
}

/// Targets every collection named `collection_id`.
pub fn collection_group(collection_id: impl Into<String>) -> QueryTarget {
    QueryTarget::CollectionGroup(collection_id.into())
}

/// A field comparison constraint.
pub fn where_(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> QueryFilterConstraint {
    QueryFilterConstraint(Expr::field(field, op, value))
}

/// A composite constraint matching when every filter matches.
pub fn and(filters: Vec<QueryFilterConstraint>) -> QueryFilterConstraint {
    QueryFilterConstraint(Expr::And(filters.into_iter().map(|f| f.0).collect()))
}

/// A composite constraint matching when any filter matches.
pub fn or(filters: Vec<QueryFilterConstraint>) -> QueryFilterConstraint {
    QueryFilterConstraint(Expr::Or(filters.into_iter().map(|f| f.0).collect()))
}

pub fn order_by(field: impl Into<String>, direction: SortDirection) -> QueryConstraint {
    QueryConstraint::OrderBy(Sort::new(field, direction))
}

pub fn limit(limit: usize) -> QueryConstraint {
    QueryConstraint::Limit(limit)
}

pub fn start_at(cursor: Cursor) -> QueryConstraint {
    QueryConstraint::StartAt(cursor)
}

pub fn start_after(cursor: Cursor) -> QueryConstraint {
    QueryConstraint::StartAfter(cursor)
}

pub fn end_at(cursor: Cursor) -> QueryConstraint {
    QueryConstraint::EndAt(cursor)
}

pub fn end_before(cursor: Cursor) -> QueryConstraint {
    QueryConstraint::EndBefore(cursor)
}

/// Composes a target and constraints into an executable query.
pub fn query(target: QueryTarget, constraints: impl IntoIterator<Item = QueryConstraint>) -> ClientQuery {
    ClientQuery {
        target,
        constraints: constraints.into_iter().collect(),
    }
}

/// Execution surface of a client-style SDK.
///
/// Everything except execution is done with the free functions of this
/// module; implementations only read the composed [`ClientQuery`].
#[async_trait]
pub trait ClientSdk: Send + Sync + Debug {
    /// Runs a query and returns the matching documents.
    async fn get_docs(&self, query: &ClientQuery) -> OrmResult<Vec<RawDocument>>;

    /// Counts matching documents server side.
    async fn get_count_from_server(&self, query: &ClientQuery) -> OrmResult<u64>;

    /// Listens to a query. The listener receives an initial snapshot and one
    /// more every time the results change.
    async fn on_snapshot(&self, query: &ClientQuery, listener: SnapshotListener) -> OrmResult<Subscription>;

    /// Reads one document by path.
    async fn get_doc(&self, path: &str) -> OrmResult<Option<RawDocument>>;

    /// Writes a document, replacing it unless `merge` is set.
    async fn set_doc(&self, path: &str, data: Document, merge: bool) -> OrmResult<()>;

    /// Updates fields of an existing document.
    async fn update_doc(&self, path: &str, data: Document) -> OrmResult<()>;

    async fn delete_doc(&self, path: &str) -> OrmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn composes_constraints_in_order() {
        let q = query(
            collection("users"),
            [
                or(vec![where_("age", FieldOp::Lt, 18), where_("age", FieldOp::Gt, 65)]).into(),
                order_by("age", SortDirection::Asc),
                limit(5),
                limit(10),
            ],
        );

        assert_eq!(q.target(), &QueryTarget::Collection("users".into()));
        assert!(matches!(q.filter(), Some(Expr::Or(ref branches)) if branches.len() == 2));
        assert_eq!(q.limit(), Some(10));
        assert_eq!(
            q.effective_orders(),
            vec![Sort::new("age", SortDirection::Asc), Sort::new(DOCUMENT_ID_FIELD, SortDirection::Asc)]
        );
    }

    #[test]
    fn snapshot_cursor_resolves_against_orders() {
        let snapshot = RawDocument::new("users/u9", doc! { "age": 40 });
        let q = query(
            collection("users"),
            [order_by("age", SortDirection::Desc), start_after(Cursor::Snapshot(snapshot))],
        );

        let bound = q.start_bound().unwrap();
        assert!(!bound.inclusive);
        assert_eq!(bound.values, vec![Bson::Int32(40), Bson::String("u9".into())]);
        assert!(q.end_bound().is_none());
    }
}
