//! Filter expressions, sort specifications and cursor bounds.
//!
//! This module holds the store-neutral vocabulary shared by the query builder,
//! the binding tables and the SDK implementations:
//!
//! - [`FieldOp`] - comparison operators understood by the document store
//! - [`Expr`] - filter expressions combined with `And` / `Or`
//! - [`Filter`] - static helpers for building expressions
//! - [`Sort`] / [`SortDirection`] - ordering
//! - [`Bound`] - pagination cursors expressed as value tuples
//! - [`QueryVisitor`] - visitor used by backends to translate expressions
//!
//! # Example
//!
//! ```ignore
//! use docorm::filter::Filter;
//!
//! let expr = Filter::eq("status", "active")
//!     .and(Filter::gt("age", 18));
//! ```

use bson::Bson;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{OrmError, OrmResult};

/// Name of the pseudo-field that addresses a document's identifier in filters and orderings.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

/// Maximum number of disjunctions a single filter may expand to.
pub const MAX_DISJUNCTIONS: usize = 30;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }
}

/// Field comparison operators for filter expressions.
///
/// `Ne` is part of the vocabulary so callers can express it, but the query
/// builder never hands it to a store: every `Ne` it receives, nested or not,
/// is rewritten as `Lt OR Gt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOp {
    /// Equal to (`==`).
    Eq,
    /// Not equal to (`!=`).
    Ne,
    /// Less than (`<`).
    Lt,
    /// Less than or equal to (`<=`).
    Lte,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal to (`>=`).
    Gte,
    /// Array field contains the value (`array-contains`).
    ArrayContains,
    /// Array field contains any of the values (`array-contains-any`).
    ArrayContainsAny,
    /// Field equals one of the values (`in`).
    In,
    /// Field equals none of the values (`not-in`).
    NotIn,
}

impl FieldOp {
    /// Returns the operator as the document store spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldOp::Eq => "==",
            FieldOp::Ne => "!=",
            FieldOp::Lt => "<",
            FieldOp::Lte => "<=",
            FieldOp::Gt => ">",
            FieldOp::Gte => ">=",
            FieldOp::ArrayContains => "array-contains",
            FieldOp::ArrayContainsAny => "array-contains-any",
            FieldOp::In => "in",
            FieldOp::NotIn => "not-in",
        }
    }
}

impl fmt::Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldOp {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" => FieldOp::Eq,
            "!=" => FieldOp::Ne,
            "<" => FieldOp::Lt,
            "<=" => FieldOp::Lte,
            ">" => FieldOp::Gt,
            ">=" => FieldOp::Gte,
            "array-contains" => FieldOp::ArrayContains,
            "array-contains-any" => FieldOp::ArrayContainsAny,
            "in" => FieldOp::In,
            "not-in" => FieldOp::NotIn,
            other => return Err(OrmError::Unsupported(format!("unknown operator {other}"))),
        })
    }
}

/// A single `field op value` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// The field name to compare.
    pub field: String,
    /// The comparison operator.
    pub op: FieldOp,
    /// The value to compare against.
    pub value: Bson,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Self { field: field.into(), op, value: value.into() }
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`) to build
/// composite predicates. The store has no negation, so neither does this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Field comparison expression.
    Field(FieldFilter),
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Expr::Field(FieldFilter::new(field, op, value))
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Returns a copy of this expression with every field name passed through `rename`.
    pub fn map_fields(&self, rename: &impl Fn(&str) -> String) -> Expr {
        match self {
            Expr::And(exprs) => Expr::And(exprs.iter().map(|e| e.map_fields(rename)).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.iter().map(|e| e.map_fields(rename)).collect()),
            Expr::Field(filter) => Expr::Field(FieldFilter {
                field: rename(&filter.field),
                op: filter.op,
                value: filter.value.clone(),
            }),
        }
    }

    /// Returns `true` if a `Ne` comparison appears anywhere in this expression.
    pub fn has_not_equal(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().any(Expr::has_not_equal),
            Expr::Field(filter) => filter.op == FieldOp::Ne,
        }
    }

    /// Rewrites every `Ne` comparison as `Lt OR Gt`.
    pub fn expand_not_equal(self) -> Expr {
        match self {
            Expr::And(exprs) => Expr::And(exprs.into_iter().map(Expr::expand_not_equal).collect()),
            Expr::Or(exprs) => Expr::Or(exprs.into_iter().map(Expr::expand_not_equal).collect()),
            Expr::Field(filter) if filter.op == FieldOp::Ne => Filter::ne(filter.field, filter.value),
            field => field,
        }
    }

    /// Returns `true` if an `Or` appears anywhere in this expression.
    pub fn has_disjunction(&self) -> bool {
        match self {
            Expr::And(exprs) => exprs.iter().any(Expr::has_disjunction),
            Expr::Or(_) => true,
            Expr::Field(_) => false,
        }
    }

    /// Expands this expression into disjunctive normal form.
    ///
    /// Each inner vector is a conjunction of plain field comparisons; the
    /// expression matches a document iff any conjunction does. Branch order is
    /// preserved, so the first conjunction always comes from the first branch
    /// of every `Or`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::TooManyDisjunctions`] if the expansion exceeds
    /// [`MAX_DISJUNCTIONS`].
    pub fn disjuncts(&self) -> OrmResult<Vec<Vec<FieldFilter>>> {
        let expanded = match self {
            Expr::Field(filter) => vec![vec![filter.clone()]],
            Expr::Or(exprs) => {
                let mut out = Vec::new();
                for expr in exprs {
                    out.extend(expr.disjuncts()?);
                }
                out
            }
            Expr::And(exprs) => {
                let mut out: Vec<Vec<FieldFilter>> = vec![Vec::new()];
                for expr in exprs {
                    let branches = expr.disjuncts()?;
                    let mut next = Vec::with_capacity(out.len() * branches.len());
                    for prefix in &out {
                        for branch in &branches {
                            let mut conj = prefix.clone();
                            conj.extend(branch.iter().cloned());
                            next.push(conj);
                        }
                    }
                    if next.len() > MAX_DISJUNCTIONS {
                        return Err(OrmError::TooManyDisjunctions(next.len(), MAX_DISJUNCTIONS));
                    }
                    out = next;
                }
                out
            }
        };

        if expanded.len() > MAX_DISJUNCTIONS {
            return Err(OrmError::TooManyDisjunctions(expanded.len(), MAX_DISJUNCTIONS));
        }

        Ok(expanded)
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Eq, value)
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lt, value)
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lte, value)
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gt, value)
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gte, value)
    }

    /// Matches documents where the field differs from the value, spelled as
    /// `field < value OR field > value` because the store has no native
    /// inequality.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        let field = field.into();
        let value = value.into();
        Expr::Or(vec![
            Expr::field(field.clone(), FieldOp::Lt, value.clone()),
            Expr::field(field, FieldOp::Gt, value),
        ])
    }

    /// Matches documents whose array field contains the value.
    pub fn array_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::ArrayContains, value)
    }

    /// Matches documents whose array field contains any of the values.
    pub fn array_contains_any(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::ArrayContainsAny, values)
    }

    /// Matches documents whose field equals one of the values.
    pub fn any_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::In, values)
    }

    /// Matches documents whose field equals none of the values.
    pub fn none_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::NotIn, values)
    }

    /// Combines expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines expressions such that any may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Which end of the result window a [`Bound`] limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundPosition {
    Start,
    End,
}

/// A pagination cursor expressed as a tuple of values aligned with the query's orderings.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    /// Cursor values, one per ordering, primary ordering first.
    pub values: Vec<Bson>,
    /// Whether documents equal to the cursor are included (`startAt`/`endAt`).
    pub inclusive: bool,
}

impl Bound {
    pub fn new(values: Vec<Bson>, inclusive: bool) -> Self {
        Self { values, inclusive }
    }

    /// Translates this cursor into an equivalent filter over `orders`.
    ///
    /// The tuple comparison `(o1, o2, ..) > (v1, v2, ..)` is spelled out as
    /// `o1 > v1 OR (o1 == v1 AND o2 > v2) OR ..`, with the comparison flipped
    /// for descending orderings and for end bounds. Only as many orderings as
    /// there are values take part. Returns `None` if nothing constrains.
    pub fn to_filter(&self, orders: &[Sort], position: BoundPosition) -> Option<Expr> {
        let width = self.values.len().min(orders.len());
        if width == 0 {
            return None;
        }

        let mut branches = Vec::with_capacity(width + 1);
        for i in 0..width {
            let mut conj: Vec<Expr> = (0..i)
                .map(|j| Expr::field(orders[j].field.clone(), FieldOp::Eq, self.values[j].clone()))
                .collect();
            let op = match (position, orders[i].direction) {
                (BoundPosition::Start, SortDirection::Asc) | (BoundPosition::End, SortDirection::Desc) => FieldOp::Gt,
                (BoundPosition::Start, SortDirection::Desc) | (BoundPosition::End, SortDirection::Asc) => FieldOp::Lt,
            };
            conj.push(Expr::field(orders[i].field.clone(), op, self.values[i].clone()));
            branches.push(collapse_and(conj));
        }

        if self.inclusive {
            let conj = (0..width)
                .map(|j| Expr::field(orders[j].field.clone(), FieldOp::Eq, self.values[j].clone()))
                .collect();
            branches.push(collapse_and(conj));
        }

        Some(match branches.len() {
            1 => branches.remove(0),
            _ => Expr::Or(branches),
        })
    }
}

fn collapse_and(mut exprs: Vec<Expr>) -> Expr {
    match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    }
}

/// Visitor over [`Expr`] trees, used by backends to evaluate or translate filters.
pub trait QueryVisitor {
    type Output;
    type Error: Into<OrmError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_field(&mut self, filter: &FieldFilter) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Field(filter) => self.visit_field(filter),
        }
    }
}
