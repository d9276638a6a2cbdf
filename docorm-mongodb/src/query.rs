//! Translation of filter expressions into MongoDB query documents.

use bson::{Bson, Document, doc};

use docorm_core::{
    error::OrmError,
    filter::{DOCUMENT_ID_FIELD, Expr, FieldFilter, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Stored name of a field in MongoDB. The document id lives in `_id`.
pub(crate) fn mongo_field(field: &str) -> &str {
    if field == DOCUMENT_ID_FIELD { "_id" } else { field }
}

/// Builds the MongoDB sort document for `orders`.
pub(crate) fn sort_document(orders: &[Sort]) -> Document {
    orders
        .iter()
        .map(|sort| {
            let direction = match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (mongo_field(&sort.field).to_string(), Bson::Int32(direction))
        })
        .collect()
}

/// Translates filter expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = OrmError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty $or; match nothing instead.
        if exprs.is_empty() {
            return Ok(doc! { "_id": { "$in": [] } });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_field(&mut self, filter: &FieldFilter) -> Result<Self::Output, Self::Error> {
        let field = mongo_field(&filter.field);
        let value = &filter.value;
        let needs_array = |op: FieldOp| match value {
            Bson::Array(_) => Ok(()),
            _ => Err(OrmError::InvalidDocument(format!("{op} on {} needs an array", filter.field))),
        };

        Ok(doc! {
            field: match filter.op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$exists": true, "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::ArrayContains => doc! { "$elemMatch": { "$eq": value } },
                FieldOp::ArrayContainsAny => {
                    needs_array(filter.op)?;
                    doc! { "$elemMatch": { "$in": value } }
                }
                FieldOp::In => {
                    needs_array(filter.op)?;
                    doc! { "$in": value }
                }
                FieldOp::NotIn => {
                    needs_array(filter.op)?;
                    doc! { "$exists": true, "$nin": value }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docorm_core::filter::Filter;

    #[test]
    fn document_id_maps_to_underscore_id() {
        let translated = MongoQueryTranslator
            .visit_expr(&Filter::and([Filter::eq(DOCUMENT_ID_FIELD, "u1"), Filter::array_contains("tags", "a")]))
            .unwrap();

        assert_eq!(
            translated,
            doc! { "$and": [
                { "_id": { "$eq": "u1" } },
                { "tags": { "$elemMatch": { "$eq": "a" } } },
            ] }
        );
    }

    #[test]
    fn membership_needs_arrays() {
        assert!(MongoQueryTranslator.visit_expr(&Filter::any_of("role", "admin")).is_err());
        assert_eq!(
            sort_document(&[Sort::new("age", SortDirection::Desc), Sort::new(DOCUMENT_ID_FIELD, SortDirection::Desc)]),
            doc! { "age": -1, "_id": -1 }
        );
    }

    #[test]
    fn empty_groups_stay_valid() {
        assert_eq!(MongoQueryTranslator.visit_expr(&Filter::and(Vec::<Expr>::new())).unwrap(), doc! {});
        assert_eq!(
            MongoQueryTranslator.visit_expr(&Filter::or(Vec::<Expr>::new())).unwrap(),
            doc! { "_id": { "$in": [] } }
        );
    }
}
