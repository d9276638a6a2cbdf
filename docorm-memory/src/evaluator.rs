//! Filter evaluation for in-memory documents.
//!
//! Comparisons follow the document store's rules: values of different types
//! never match, and a document missing the filtered field matches nothing,
//! not even `!=` or `not-in`.

use bson::Bson;
use std::cmp::Ordering;

use docorm_core::{
    document::RawDocument,
    error::{OrmError, OrmResult},
    filter::{Expr, FieldFilter, FieldOp, QueryVisitor},
    value::Comparable,
};

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a RawDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a RawDocument) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> OrmResult<bool> {
        self.visit_expr(expr)
    }

    pub fn matches(document: &RawDocument, expr: Option<&Expr>) -> bool {
        match expr {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr).unwrap_or(false),
            None => true,
        }
    }
}

fn compare(field_value: &Bson, value: &Bson) -> Option<Ordering> {
    Comparable::from(field_value).partial_cmp(&Comparable::from(value))
}

fn contains(array: &Bson, value: &Bson) -> bool {
    match array {
        Bson::Array(items) => items.iter().any(|item| Comparable::from(item) == Comparable::from(value)),
        _ => false,
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = OrmError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&mut self, filter: &FieldFilter) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = self.document.field(&filter.field) else {
            return Ok(false);
        };
        let field_value = field_value.as_ref();
        let value = &filter.value;

        Ok(match filter.op {
            FieldOp::Eq => Comparable::from(field_value) == Comparable::from(value),
            FieldOp::Ne => !matches!(field_value, Bson::Null) && Comparable::from(field_value) != Comparable::from(value),
            FieldOp::Lt => compare(field_value, value) == Some(Ordering::Less),
            FieldOp::Lte => matches!(compare(field_value, value), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::Gt => compare(field_value, value) == Some(Ordering::Greater),
            FieldOp::Gte => matches!(compare(field_value, value), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::ArrayContains => contains(field_value, value),
            FieldOp::ArrayContainsAny => match value {
                Bson::Array(candidates) => candidates.iter().any(|candidate| contains(field_value, candidate)),
                _ => {
                    return Err(OrmError::InvalidDocument(format!(
                        "array-contains-any on {} needs an array",
                        filter.field
                    )));
                }
            },
            FieldOp::In => contains(value, field_value),
            FieldOp::NotIn => !matches!(field_value, Bson::Null) && !contains(value, field_value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docorm_core::filter::{DOCUMENT_ID_FIELD, Filter};

    fn document() -> RawDocument {
        RawDocument::new("users/u1", doc! { "age": 30, "tags": ["a", "b"], "name": "Joe", "nothing": null })
    }

    fn eval(expr: Expr) -> bool {
        DocumentEvaluator::new(&document()).evaluate(&expr).unwrap()
    }

    #[test]
    fn comparisons_are_type_strict() {
        assert!(eval(Filter::gt("age", 18)));
        assert!(eval(Filter::lte("age", 30.0)));
        assert!(!eval(Filter::gt("age", "18")));
        assert!(!eval(Filter::eq("missing", Bson::Null)));
        assert!(eval(Filter::eq("nothing", Bson::Null)));
    }

    #[test]
    fn not_equal_rewrite_agrees_with_native_not_equal() {
        for pivot in [10, 30, 50] {
            let native = eval(Expr::field("age", FieldOp::Ne, pivot));
            assert_eq!(eval(Filter::ne("age", pivot)), native, "pivot {pivot}");
        }
        assert!(!eval(Filter::ne("missing", 1)));
    }

    #[test]
    fn array_and_membership_operators() {
        assert!(eval(Filter::array_contains("tags", "a")));
        assert!(eval(Filter::array_contains_any("tags", vec!["x", "b"])));
        assert!(eval(Filter::any_of("name", vec!["Ann", "Joe"])));
        assert!(!eval(Filter::none_of("name", vec!["Joe"])));
        assert!(eval(Filter::eq(DOCUMENT_ID_FIELD, "u1")));
    }
}
