//! The fluent query builder and its materializer.
//!
//! A [`Query`] only accumulates intent: filters, the OR group, orderings,
//! cursors and a limit, all in logical field names. Nothing touches the
//! store until a terminal method (`get`, `get_one`, `get_row_list`, `count`,
//! `on`, `on_mode`) runs. The terminal method then
//!
//! 1. ensures the connection is bound,
//! 2. resolves document cursors by reading the referenced documents,
//! 3. builds a [`QueryPlan`] in stored field names,
//! 4. executes it through the active [`Bindings`],
//! 5. maps the raw documents into models.
//!
//! # Example
//!
//! ```ignore
//! let adults = repository
//!     .query(&params)?
//!     .where_("age", FieldOp::Gte, 18)
//!     .or_where("role", FieldOp::Eq, "admin")
//!     .order_by("age", SortDirection::Desc)
//!     .limit(20)
//!     .get()
//!     .await?;
//! ```

use bson::Bson;
use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    binding::{Bindings, Operation, Support},
    connection::Connection,
    document::{ChangeKind, RawDocument, RawSnapshot, Subscription},
    error::{OrmError, OrmResult},
    filter::{Bound, DOCUMENT_ID_FIELD, Expr, FieldOp, Filter, Sort, SortDirection},
    model::{Model, ModelDescriptor, like_fragment},
    path::document_path,
    plan::QueryPlan,
    sdk::QueryTarget,
};

/// Which part of a snapshot a listener registered with [`Query::on_mode`] receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenMode {
    /// The full result set, on every change.
    #[default]
    Value,
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
enum CursorIntent {
    Values { values: Vec<Bson>, inclusive: bool },
    Document { path: String, inclusive: bool },
}

/// A query over model `M`.
pub struct Query<M: Model> {
    connection: Arc<Connection>,
    descriptor: &'static ModelDescriptor,
    collection_path: String,
    collection_group: bool,
    filters: Vec<Expr>,
    or_filters: Vec<Expr>,
    orders: Vec<Sort>,
    start: Option<CursorIntent>,
    end: Option<CursorIntent>,
    limit: Option<usize>,
    error: Option<OrmError>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            descriptor: self.descriptor,
            collection_path: self.collection_path.clone(),
            collection_group: self.collection_group,
            filters: self.filters.clone(),
            or_filters: self.or_filters.clone(),
            orders: self.orders.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            limit: self.limit,
            error: self.error.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.descriptor.path_id())
            .field("collection_path", &self.collection_path)
            .field("collection_group", &self.collection_group)
            .field("filters", &self.filters)
            .field("or_filters", &self.or_filters)
            .field("orders", &self.orders)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<M: Model> Query<M> {
    /// Creates a query over an already resolved collection path.
    pub fn new(connection: Arc<Connection>, collection_path: impl Into<String>) -> Self {
        Self {
            connection,
            descriptor: M::descriptor(),
            collection_path: collection_path.into(),
            collection_group: false,
            filters: Vec::new(),
            or_filters: Vec::new(),
            orders: Vec::new(),
            start: None,
            end: None,
            limit: None,
            error: None,
            _model: PhantomData,
        }
    }

    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    pub fn is_collection_group(&self) -> bool {
        self.collection_group
    }

    /// Adds a field comparison.
    ///
    /// The store has no not-equal operator, so `Ne` is rewritten into
    /// `field < value OR field > value`. Documents missing the field never
    /// match either branch.
    pub fn where_(mut self, field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        self.filters.push(without_not_equal(Expr::field(field, op, value)));
        self
    }

    /// Adds a composite filter expression to the AND group. `Ne` comparisons
    /// inside it are rewritten like in [`Query::where_`].
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(without_not_equal(expr));
        self
    }

    /// Adds a comparison to the OR group.
    pub fn or_where(mut self, field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        self.or_filters.push(without_not_equal(Expr::field(field, op, value)));
        self
    }

    /// Adds a composite filter expression to the OR group.
    pub fn or_filter(mut self, expr: Expr) -> Self {
        self.or_filters.push(without_not_equal(expr));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.orders.push(Sort::new(field, direction));
        self
    }

    /// Limits the number of results. The last call wins.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Case-insensitive pattern match on a text-indexed field.
    ///
    /// `%x%` matches anywhere, `x%` as a prefix, `%x` as a suffix and `x` the
    /// whole value. On fields without a text index this does nothing.
    ///
    /// Stored values are indexed up to the connection's `text_index_max_len`
    /// characters: `%x%` only finds text within the first that many
    /// characters, and `x%` or `%x` patterns longer than that never match.
    /// Whole-value matches work at any length.
    pub fn like(mut self, field: &str, pattern: &str) -> Self {
        let Some(index_field) = self.descriptor.text_index_field(field) else {
            log::debug!("ignoring like on {field}: not text-indexed in {}", self.descriptor.path_id());
            return self;
        };
        match like_fragment(pattern) {
            Some(fragment) => self.filters.push(Filter::array_contains(index_field, fragment)),
            None => log::debug!("ignoring like on {field}: empty pattern {pattern:?}"),
        }
        self
    }

    /// Starts at the given values (inclusive), one per ordering.
    pub fn start_at(mut self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.start = Some(CursorIntent::Values {
            values: values.into_iter().map(Into::into).collect(),
            inclusive: true,
        });
        self
    }

    /// Ends at the given values (inclusive), one per ordering.
    pub fn end_at(mut self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.end = Some(CursorIntent::Values {
            values: values.into_iter().map(Into::into).collect(),
            inclusive: true,
        });
        self
    }

    /// Starts right after `model`'s stored position.
    ///
    /// The document is read when the query runs, so its persisted values
    /// count, not unsaved changes to `model`.
    pub fn start_after(mut self, model: &M) -> Self {
        match self.cursor_path(model) {
            Ok(path) => self.start = Some(CursorIntent::Document { path, inclusive: false }),
            Err(error) => self.error = Some(error),
        }
        self
    }

    /// Ends right before `model`'s stored position.
    pub fn end_before(mut self, model: &M) -> Self {
        match self.cursor_path(model) {
            Ok(path) => self.end = Some(CursorIntent::Document { path, inclusive: false }),
            Err(error) => self.error = Some(error),
        }
        self
    }

    /// Targets every collection sharing this model's collection name.
    pub fn set_collection_group(mut self, collection_group: bool) -> Self {
        self.collection_group = collection_group;
        self
    }

    fn cursor_path(&self, model: &M) -> OrmResult<String> {
        let id = model.id().ok_or_else(|| {
            OrmError::InvalidDocument(format!("cursor {} has no id", self.descriptor.path_id()))
        })?;
        let collection = match self.collection_group {
            true => self.descriptor.template().resolve(&model.path_params())?,
            false => self.collection_path.clone(),
        };
        Ok(document_path(&collection, id))
    }

    /// Ensures bindings and materializes this query into a plan.
    pub async fn plan(&self) -> OrmResult<QueryPlan> {
        let bindings = self.connection.bindings().await;
        self.materialize(bindings).await
    }

    async fn materialize(&self, bindings: &Bindings) -> OrmResult<QueryPlan> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let mut orders = self.stored_orders();
        let by_document = matches!(self.start, Some(CursorIntent::Document { .. }))
            || matches!(self.end, Some(CursorIntent::Document { .. }));
        if by_document && !orders.iter().any(|sort| sort.field == DOCUMENT_ID_FIELD) {
            let direction = orders.last().map(|sort| sort.direction).unwrap_or(SortDirection::Asc);
            orders.push(Sort::new(DOCUMENT_ID_FIELD, direction));
        }

        let start = self.resolve_cursor(self.start.as_ref(), &orders, bindings).await?;
        let end = self.resolve_cursor(self.end.as_ref(), &orders, bindings).await?;

        let plan = self.build_plan(orders, start, end);
        log::debug!("materialized {plan:?}");
        Ok(plan)
    }

    async fn resolve_cursor(
        &self,
        cursor: Option<&CursorIntent>,
        orders: &[Sort],
        bindings: &Bindings,
    ) -> OrmResult<Option<Bound>> {
        match cursor {
            None => Ok(None),
            Some(CursorIntent::Values { values, inclusive }) => Ok(Some(Bound::new(values.clone(), *inclusive))),
            Some(CursorIntent::Document { path, inclusive }) => {
                let document = bindings
                    .get_doc(path)
                    .await?
                    .ok_or_else(|| OrmError::DocumentNotFound(path.clone()))?;
                let values = orders
                    .iter()
                    .map(|sort| document.field(&sort.field).map(|v| v.into_owned()).unwrap_or(Bson::Null))
                    .collect();
                Ok(Some(Bound::new(values, *inclusive)))
            }
        }
    }

    fn stored_orders(&self) -> Vec<Sort> {
        self.orders
            .iter()
            .map(|sort| Sort::new(self.descriptor.stored_name(&sort.field), sort.direction))
            .collect()
    }

    fn stored_filter(&self) -> Option<Expr> {
        let main = match self.filters.len() {
            0 => None,
            1 => Some(self.filters[0].clone()),
            _ => Some(Expr::And(self.filters.clone())),
        };

        let filter = match (main, self.or_filters.len()) {
            (main, 0) => main,
            (None, 1) => Some(self.or_filters[0].clone()),
            (None, _) => Some(Expr::Or(self.or_filters.clone())),
            (Some(_), _) => Some(Expr::And(vec![
                Expr::And(self.filters.clone()),
                Expr::Or(self.or_filters.clone()),
            ])),
        };

        filter.map(|expr| expr.map_fields(&|name| self.descriptor.stored_name(name)))
    }

    fn build_plan(&self, orders: Vec<Sort>, start: Option<Bound>, end: Option<Bound>) -> QueryPlan {
        let target = match self.collection_group {
            true => QueryTarget::CollectionGroup(self.descriptor.collection_name().to_string()),
            false => QueryTarget::Collection(self.collection_path.clone()),
        };

        QueryPlan {
            target,
            filter: self.stored_filter(),
            orders,
            start,
            end,
            limit: self.limit,
        }
    }

    fn require(bindings: &Bindings, operation: Operation) -> OrmResult<()> {
        match bindings.supports(operation) {
            Support::Unavailable => Err(OrmError::Unsupported(format!(
                "{operation:?} with {} bindings",
                bindings.name()
            ))),
            Support::Native | Support::Emulated => Ok(()),
        }
    }

    fn check_target(&self, bindings: &Bindings) -> OrmResult<()> {
        if self.collection_group {
            Self::require(bindings, Operation::CollectionGroup)?;
        }
        Ok(())
    }

    /// Runs the query and returns the raw stored documents.
    pub async fn get_row_list(&self) -> OrmResult<Vec<RawDocument>> {
        let bindings = self.connection.bindings().await;
        self.check_target(bindings)?;
        let plan = self.materialize(bindings).await?;
        bindings.fetch(&plan, self.connection.options().server_or_strategy).await
    }

    /// Runs the query and maps every result into a model.
    pub async fn get(&self) -> OrmResult<Vec<M>> {
        self.get_row_list()
            .await?
            .iter()
            .map(|raw| self.descriptor.from_record(raw))
            .collect()
    }

    /// Runs the query with a limit of one. An empty result is `Ok(None)`.
    pub async fn get_one(&self) -> OrmResult<Option<M>> {
        Ok(self.clone().limit(1).get().await?.into_iter().next())
    }

    /// Counts the matching documents on the store.
    pub async fn count(&self) -> OrmResult<u64> {
        let bindings = self.connection.bindings().await;
        self.check_target(bindings)?;
        Self::require(bindings, Operation::Count)?;
        let plan = self.materialize(bindings).await?;
        bindings.count(&plan, self.connection.options().server_or_strategy).await
    }

    /// Listens to the full result set.
    pub async fn on<F>(&self, listener: F) -> OrmResult<Subscription>
    where
        F: Fn(Vec<M>) + Send + Sync + 'static,
    {
        self.on_mode(ListenMode::Value, listener).await
    }

    /// Listens to one kind of change. For the change modes the listener only
    /// runs when at least one document changed that way.
    pub async fn on_mode<F>(&self, mode: ListenMode, listener: F) -> OrmResult<Subscription>
    where
        F: Fn(Vec<M>) + Send + Sync + 'static,
    {
        let bindings = self.connection.bindings().await;
        self.check_target(bindings)?;
        Self::require(bindings, Operation::Listen)?;
        let plan = self.materialize(bindings).await?;
        let descriptor = self.descriptor;

        let raw_listener = move |snapshot: RawSnapshot| {
            let documents: Vec<&RawDocument> = match mode {
                ListenMode::Value => snapshot.documents.iter().collect(),
                ListenMode::Added => changed(&snapshot, ChangeKind::Added),
                ListenMode::Modified => changed(&snapshot, ChangeKind::Modified),
                ListenMode::Removed => changed(&snapshot, ChangeKind::Removed),
            };
            if mode != ListenMode::Value && documents.is_empty() {
                return;
            }

            let models: Vec<M> = documents
                .into_iter()
                .filter_map(|raw| match descriptor.from_record::<M>(raw) {
                    Ok(model) => Some(model),
                    Err(error) => {
                        log::warn!("skipping {} in snapshot: {error}", raw.path);
                        None
                    }
                })
                .collect();
            listener(models);
        };

        bindings.listen(&plan, Arc::new(raw_listener)).await
    }
}

fn without_not_equal(expr: Expr) -> Expr {
    if !expr.has_not_equal() {
        return expr;
    }
    log::warn!("rewriting != into an OR of < and >; documents without the field never match");
    expr.expand_not_equal()
}

fn changed(snapshot: &RawSnapshot, kind: ChangeKind) -> Vec<&RawDocument> {
    snapshot
        .changes
        .iter()
        .filter(|change| change.kind == kind)
        .map(|change| &change.document)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ConnectionOptions,
        model::FieldDescriptor,
        registry::ModelRegistry,
        sdk::{ClientSdk, HandleCapabilities, ServerSdk, StoreHandle},
    };
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::OnceLock;

    #[derive(Debug)]
    struct NullHandle;

    #[async_trait]
    impl StoreHandle for NullHandle {
        fn capabilities(&self) -> HandleCapabilities {
            HandleCapabilities::default()
        }

        fn chained(&self) -> Option<Arc<dyn ServerSdk>> {
            None
        }

        async fn load_client(&self) -> OrmResult<Arc<dyn ClientSdk>> {
            Err(OrmError::Initialization("unavailable".into()))
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct User {
        #[serde(skip)]
        id: Option<String>,
        name: String,
        age: i32,
    }

    impl Model for User {
        fn descriptor() -> &'static ModelDescriptor {
            static DESCRIPTOR: OnceLock<ModelDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ModelDescriptor::builder("users", "users")
                    .id_field("id")
                    .field(FieldDescriptor::new("name").alias("full_name").text_indexed())
                    .field(FieldDescriptor::new("age"))
                    .build()
                    .unwrap()
            })
        }

        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }
    }

    fn query() -> Query<User> {
        let connection = Connection::new(
            "test",
            Arc::new(NullHandle),
            ConnectionOptions::default(),
            Arc::new(ModelRegistry::new()),
        );
        Query::new(Arc::new(connection), "users")
    }

    fn plan(query: &Query<User>) -> QueryPlan {
        query.build_plan(query.stored_orders(), None, None)
    }

    #[test]
    fn main_and_or_groups_nest() {
        let q = query()
            .where_("age", FieldOp::Gt, 18)
            .or_where("name", FieldOp::Eq, "a")
            .or_where("name", FieldOp::Eq, "b");

        assert_eq!(
            plan(&q).filter,
            Some(Expr::And(vec![
                Expr::And(vec![Expr::field("age", FieldOp::Gt, 18)]),
                Expr::Or(vec![
                    Expr::field("full_name", FieldOp::Eq, "a"),
                    Expr::field("full_name", FieldOp::Eq, "b"),
                ]),
            ]))
        );
    }

    #[test]
    fn single_groups_collapse() {
        assert_eq!(plan(&query().where_("age", FieldOp::Eq, 1)).filter, Some(Expr::field("age", FieldOp::Eq, 1)));
        assert_eq!(
            plan(&query().or_where("age", FieldOp::Eq, 1)).filter,
            Some(Expr::field("age", FieldOp::Eq, 1))
        );
        assert_eq!(plan(&query()).filter, None);
    }

    #[test]
    fn not_equal_becomes_lt_or_gt() {
        let q = query().where_("age", FieldOp::Ne, 30);
        assert_eq!(
            plan(&q).filter,
            Some(Expr::Or(vec![Expr::field("age", FieldOp::Lt, 30), Expr::field("age", FieldOp::Gt, 30)]))
        );
    }

    #[test]
    fn like_only_applies_to_text_indexed_fields() {
        let q = query().like("name", "%OE%");
        assert_eq!(
            plan(&q).filter,
            Some(Expr::field("_text_full_name", FieldOp::ArrayContains, "oe"))
        );
        assert_eq!(plan(&query().like("age", "%1%")).filter, None);
    }

    #[test]
    fn orders_use_stored_names_and_limit_last_wins() {
        let q = query().order_by("name", SortDirection::Desc).limit(5).limit(2);
        let plan = plan(&q);

        assert_eq!(plan.orders, vec![Sort::new("full_name", SortDirection::Desc)]);
        assert_eq!(plan.limit, Some(2));
        assert_eq!(plan.target, QueryTarget::Collection("users".into()));
    }

    #[test]
    fn collection_group_targets_collection_name() {
        let q = query().set_collection_group(true);
        assert_eq!(plan(&q).target, QueryTarget::CollectionGroup("users".into()));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cursor_on_unsaved_model_fails_at_execution() {
        let q = query().start_after(&User::default());
        assert!(matches!(q.plan().await, Err(OrmError::InvalidDocument(_))));
    }
}
