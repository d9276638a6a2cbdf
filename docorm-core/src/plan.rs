//! Materialized query plans.
//!
//! A [`QueryPlan`] is the deterministic, SDK-neutral form of a query: stored
//! field names only, cursors already resolved to values. The active bindings
//! translate it into one of the two SDK conventions.

use crate::{
    filter::{Bound, Expr, FieldFilter, Sort},
    error::OrmResult,
    sdk::{
        QueryTarget,
        client::{self, ClientQuery, Cursor, QueryConstraint},
        server::{ServerQuery, ServerSdk},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub target: QueryTarget,
    pub filter: Option<Expr>,
    /// Orderings, primary first.
    pub orders: Vec<Sort>,
    pub start: Option<Bound>,
    pub end: Option<Bound>,
    pub limit: Option<usize>,
}

impl QueryPlan {
    pub fn new(target: QueryTarget) -> Self {
        Self {
            target,
            filter: None,
            orders: Vec::new(),
            start: None,
            end: None,
            limit: None,
        }
    }

    /// The filter in disjunctive normal form. A plan without a filter has a
    /// single empty disjunct.
    pub fn disjuncts(&self) -> OrmResult<Vec<Vec<FieldFilter>>> {
        match &self.filter {
            Some(filter) => filter.disjuncts(),
            None => Ok(vec![Vec::new()]),
        }
    }

    /// Composes the plan with the client-style free functions.
    pub fn to_client_query(&self) -> ClientQuery {
        let mut constraints = Vec::new();

        if let Some(filter) = &self.filter {
            constraints.push(QueryConstraint::Where(filter.clone()));
        }
        for sort in &self.orders {
            constraints.push(client::order_by(sort.field.clone(), sort.direction));
        }
        if let Some(start) = &self.start {
            let cursor = Cursor::Values(start.values.clone());
            constraints.push(match start.inclusive {
                true => client::start_at(cursor),
                false => client::start_after(cursor),
            });
        }
        if let Some(end) = &self.end {
            let cursor = Cursor::Values(end.values.clone());
            constraints.push(match end.inclusive {
                true => client::end_at(cursor),
                false => client::end_before(cursor),
            });
        }
        if let Some(limit) = self.limit {
            constraints.push(client::limit(limit));
        }

        client::query(self.target.clone(), constraints)
    }

    /// Chains the plan onto a server-style handle, with `branch` as the
    /// implicitly AND-ed filter list.
    pub fn to_server_query(&self, sdk: &dyn ServerSdk, branch: &[FieldFilter]) -> Box<dyn ServerQuery> {
        let mut query = match &self.target {
            QueryTarget::Collection(path) => sdk.collection(path),
            QueryTarget::CollectionGroup(id) => sdk.collection_group(id),
        };

        for filter in branch {
            query = query.where_(&filter.field, filter.op, filter.value.clone());
        }
        for sort in &self.orders {
            query = query.order_by(&sort.field, sort.direction);
        }
        if let Some(start) = &self.start {
            query = match start.inclusive {
                true => query.start_at(start.values.clone()),
                false => query.start_after(start.values.clone()),
            };
        }
        if let Some(end) = &self.end {
            query = match end.inclusive {
                true => query.end_at(end.values.clone()),
                false => query.end_before(end.values.clone()),
            };
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }

        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, SortDirection};

    #[test]
    fn client_query_keeps_plan_order() {
        let mut plan = QueryPlan::new(QueryTarget::Collection("users".into()));
        plan.filter = Some(Filter::or([Filter::eq("a", 1), Filter::eq("a", 2)]));
        plan.orders.push(Sort::new("a", SortDirection::Desc));
        plan.start = Some(Bound::new(vec![5.into()], false));
        plan.limit = Some(3);

        let query = plan.to_client_query();
        assert_eq!(query.filter(), plan.filter);
        assert_eq!(query.orders(), plan.orders);
        assert_eq!(query.limit(), Some(3));
        assert!(matches!(query.constraints()[2], QueryConstraint::StartAfter(Cursor::Values(_))));
    }

    #[test]
    fn empty_filter_is_one_empty_disjunct() {
        let plan = QueryPlan::new(QueryTarget::CollectionGroup("members".into()));
        assert_eq!(plan.disjuncts().unwrap(), vec![Vec::<FieldFilter>::new()]);
    }
}
