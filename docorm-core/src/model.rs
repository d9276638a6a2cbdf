//! Model metadata and the record mapping between models and stored documents.
//!
//! Every model type carries a static [`ModelDescriptor`]: its path identifier,
//! collection path template, field table (aliases, required flags, text
//! indexes), id field and relationship declarations. The descriptor drives
//! both directions of the mapping:
//!
//! - [`ModelDescriptor::to_record`] serializes a model with serde, renames
//!   logical field names to stored names, validates required fields and adds
//!   text fragment indexes.
//! - [`ModelDescriptor::from_record`] starts from `M::default()`, overlays
//!   every stored field under its logical name and assigns the document id.
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
//!     #[model(alias = "full_name", required, text_index)]
//!     pub name: String,
//! }
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeSet;

use crate::{
    document::RawDocument,
    error::{OrmError, OrmResult},
    path::{PathParams, PathTemplate},
};

/// Prefix of the stored field holding a text-indexed field's fragments.
pub const TEXT_INDEX_PREFIX: &str = "_text_";

/// Marker wrapped around fragments anchored at the start or end of a value.
pub const TEXT_ANCHOR: &str = "~~~";

/// Core trait implemented by every model type, usually through `#[derive(Model)]`.
pub trait Model: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Returns the model's static metadata.
    fn descriptor() -> &'static ModelDescriptor;

    /// Returns the document id, if the model has been saved or loaded.
    fn id(&self) -> Option<&str>;

    /// Assigns the document id.
    fn set_id(&mut self, id: String);

    /// Returns the path parameters this instance contributes to its collection path.
    fn path_params(&self) -> PathParams {
        PathParams::new()
    }
}

/// Metadata for a single model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Logical (Rust) field name.
    pub name: String,
    /// Name under which the field is stored, if different.
    pub alias: Option<String>,
    /// Whether `save` rejects a missing or null value.
    pub required: bool,
    /// Whether `like` queries are supported through a fragment index.
    pub text_indexed: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alias: None, required: false, text_indexed: false }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn text_indexed(mut self) -> Self {
        self.text_indexed = true;
        self
    }

    pub fn stored_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Kinds of relationship a model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This model stores the id of one target document in `key`.
    BelongsTo,
    /// One target document stores this model's id in `key`.
    HasOne,
    /// Many target documents store this model's id in `key`.
    HasMany,
    /// This model stores an array of target ids in `key`.
    BelongsToMany,
}

/// A relationship declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Path id of the related model.
    pub target: String,
    /// Logical field holding the key: on this model for `BelongsTo` /
    /// `BelongsToMany`, on the target for `HasOne` / `HasMany`.
    pub key: String,
}

impl Relation {
    pub fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>, key: impl Into<String>) -> Self {
        Self { name: name.into(), kind, target: target.into(), key: key.into() }
    }
}

/// Static metadata for a model type. Immutable once built.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    path_id: String,
    template: PathTemplate,
    id_field: Option<String>,
    fields: Vec<FieldDescriptor>,
    relations: Vec<Relation>,
}

impl ModelDescriptor {
    pub fn builder(path_id: impl Into<String>, template: impl Into<String>) -> ModelDescriptorBuilder {
        ModelDescriptorBuilder::new(path_id, template)
    }

    /// Unique identifier of this model across the registry.
    pub fn path_id(&self) -> &str {
        &self.path_id
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn collection_name(&self) -> &str {
        self.template.collection_name()
    }

    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Translates a logical field name (optionally dotted) into its stored name.
    ///
    /// Only the first segment of a dotted path is aliased. Unknown names pass
    /// through unchanged.
    pub fn stored_name(&self, logical: &str) -> String {
        let (head, rest) = match logical.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (logical, None),
        };
        let head = self.field(head).map(FieldDescriptor::stored_name).unwrap_or(head);

        match rest {
            Some(rest) => format!("{head}.{rest}"),
            None => head.to_string(),
        }
    }

    /// Translates a stored field name back into its logical name.
    pub fn logical_name<'a>(&'a self, stored: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|field| field.stored_name() == stored)
            .map(|field| field.name.as_str())
            .unwrap_or(stored)
    }

    /// Name of the fragment index field for a text-indexed logical field.
    pub fn text_index_field(&self, logical: &str) -> Option<String> {
        self.field(logical)
            .filter(|field| field.text_indexed)
            .map(|field| format!("{TEXT_INDEX_PREFIX}{}", field.stored_name()))
    }

    /// Serializes a model into a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Serialization`] if the model does not serialize to
    /// a map and [`OrmError::MissingRequiredField`] if a required field is
    /// missing or null.
    pub fn to_record<M: Model>(&self, model: &M, text_index_max_len: usize) -> OrmResult<Document> {
        let logical = match serialize_to_bson(model)? {
            Bson::Document(document) => document,
            other => {
                return Err(OrmError::Serialization(format!(
                    "model {} serialized to {other:?}, expected a map",
                    self.path_id
                )));
            }
        };

        for field in self.fields.iter().filter(|field| field.required) {
            match logical.get(&field.name) {
                None | Some(Bson::Null) => {
                    return Err(OrmError::MissingRequiredField(self.path_id.clone(), field.name.clone()));
                }
                Some(_) => {}
            }
        }

        let mut record = Document::new();
        for (name, value) in logical {
            if self.id_field.as_deref() == Some(name.as_str()) {
                continue;
            }

            if let Some(index_field) = self.text_index_field(&name) {
                if let Bson::String(text) = &value {
                    record.insert(
                        index_field,
                        Bson::Array(
                            text_fragments(text, text_index_max_len)
                                .into_iter()
                                .map(Bson::String)
                                .collect(),
                        ),
                    );
                }
            }

            record.insert(self.stored_name(&name), value);
        }

        Ok(record)
    }

    /// Serializes only `fields` (logical names) of a model, for partial updates.
    pub fn partial_record<M: Model>(&self, model: &M, fields: &[&str], text_index_max_len: usize) -> OrmResult<Document> {
        let full = self.to_record(model, text_index_max_len)?;
        let mut partial = Document::new();

        for name in fields {
            let stored = self.stored_name(name);
            let value = full.get(&stored).cloned().unwrap_or(Bson::Null);
            partial.insert(stored, value);

            // A cleared or non-text value must drop the stale index too.
            if let Some(index_field) = self.text_index_field(name) {
                let index = full.get(&index_field).cloned().unwrap_or(Bson::Null);
                partial.insert(index_field, index);
            }
        }

        Ok(partial)
    }

    /// Maps a raw document into a model instance.
    pub fn from_record<M: Model>(&self, raw: &RawDocument) -> OrmResult<M> {
        let mut base = match serialize_to_bson(&M::default())? {
            Bson::Document(document) => document,
            _ => Document::new(),
        };

        for (stored, value) in raw.data.iter() {
            if stored.starts_with(TEXT_INDEX_PREFIX) {
                continue;
            }
            base.insert(self.logical_name(stored), value.clone());
        }

        let mut model: M = deserialize_from_bson(Bson::Document(base))?;
        model.set_id(raw.id.clone());

        Ok(model)
    }
}

/// Builder for [`ModelDescriptor`].
#[derive(Debug, Clone)]
pub struct ModelDescriptorBuilder {
    path_id: String,
    template: String,
    id_field: Option<String>,
    fields: Vec<FieldDescriptor>,
    relations: Vec<Relation>,
}

impl ModelDescriptorBuilder {
    pub fn new(path_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            path_id: path_id.into(),
            template: template.into(),
            id_field: None,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Names the logical field holding the document id; it is never stored.
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = Some(name.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// # Errors
    ///
    /// Returns [`OrmError::InvalidPath`] if the template is malformed and
    /// [`OrmError::InvalidDocument`] if two fields share a stored name.
    pub fn build(self) -> OrmResult<ModelDescriptor> {
        let template = PathTemplate::parse(&self.template)?;

        let mut stored = BTreeSet::new();
        for field in &self.fields {
            if !stored.insert(field.stored_name().to_string()) {
                return Err(OrmError::InvalidDocument(format!(
                    "model {} stores two fields as {}",
                    self.path_id,
                    field.stored_name()
                )));
            }
        }

        Ok(ModelDescriptor {
            path_id: self.path_id,
            template,
            id_field: self.id_field,
            fields: self.fields,
            relations: self.relations,
        })
    }
}

/// Computes the fragment index for a text value.
///
/// The index holds the lowercased value wrapped in [`TEXT_ANCHOR`], and,
/// within a window of `max_len` characters, substrings and anchored prefixes
/// taken from the start of the value and anchored suffixes taken from its
/// end. A substring lying past the first `max_len` characters is not indexed.
pub fn text_fragments(value: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = value.to_lowercase().chars().collect();
    let window = chars.len().min(max_len);
    let head = &chars[..window];
    let tail = &chars[chars.len() - window..];
    let mut fragments = BTreeSet::new();

    for start in 0..head.len() {
        for end in (start + 1)..=head.len() {
            let fragment: String = head[start..end].iter().collect();
            if start == 0 {
                fragments.insert(format!("{TEXT_ANCHOR}{fragment}"));
            }
            fragments.insert(fragment);
        }
    }
    for start in 0..tail.len() {
        let suffix: String = tail[start..].iter().collect();
        fragments.insert(format!("{suffix}{TEXT_ANCHOR}"));
    }
    if !chars.is_empty() {
        let whole: String = chars.iter().collect();
        fragments.insert(format!("{TEXT_ANCHOR}{whole}{TEXT_ANCHOR}"));
    }

    fragments.into_iter().collect()
}

/// Translates a `like` pattern into the fragment to look up.
///
/// `%x%` searches anywhere, `x%` a prefix, `%x` a suffix and `x` an exact
/// value. Returns `None` for a pattern with nothing between the wildcards.
pub fn like_fragment(pattern: &str) -> Option<String> {
    let lowered = pattern.to_lowercase();
    let leading = lowered.starts_with('%');
    let trailing = lowered.ends_with('%') && lowered.len() > 1;
    let core = lowered.trim_matches('%');

    if core.is_empty() {
        return None;
    }

    Some(match (leading, trailing) {
        (true, true) => core.to_string(),
        (false, true) => format!("{TEXT_ANCHOR}{core}"),
        (true, false) => format!("{core}{TEXT_ANCHOR}"),
        (false, false) => format!("{TEXT_ANCHOR}{core}{TEXT_ANCHOR}"),
    })
}
