//! Collection path templates such as `orgs/{org_id}/members`.

use std::{collections::BTreeMap, fmt};

use crate::error::{OrmError, OrmResult};

/// Named values substituted into a [`PathTemplate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(BTreeMap<String, String>);

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns these parameters overlaid with `other`; `other` wins on conflicts.
    pub fn merged(&self, other: &PathParams) -> PathParams {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        PathParams(merged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed collection path template.
///
/// Templates alternate collection and document segments and always end in a
/// literal collection name, so they have an odd number of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template like `orgs/{org_id}/members`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidPath`] for empty segments, an even number of
    /// segments, or a parameter in the final position.
    pub fn parse(raw: &str) -> OrmResult<Self> {
        let trimmed = raw.trim_matches('/');
        let mut segments = Vec::new();

        for part in trimmed.split('/') {
            if part.is_empty() {
                return Err(OrmError::InvalidPath(format!("empty segment in {raw}")));
            }
            segments.push(match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                Some(_) => return Err(OrmError::InvalidPath(format!("unnamed parameter in {raw}"))),
                None => Segment::Literal(part.to_string()),
            });
        }

        if segments.len() % 2 == 0 {
            return Err(OrmError::InvalidPath(format!("{raw} does not name a collection")));
        }
        if let Some(Segment::Param(_)) = segments.last() {
            return Err(OrmError::InvalidPath(format!("{raw} must end with a collection name")));
        }

        Ok(Self { raw: trimmed.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the parameters in template order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// The final collection segment, used for collection-group queries.
    pub fn collection_name(&self) -> &str {
        match self.segments.last() {
            Some(Segment::Literal(name)) => name,
            _ => "",
        }
    }

    /// Substitutes `params` into the template.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPathParameter`] if a parameter is absent and
    /// [`OrmError::InvalidPath`] if a value is empty or contains `/`.
    pub fn resolve(&self, params: &PathParams) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => parts.push(literal.as_str()),
                Segment::Param(name) => {
                    let value = params.get(name).ok_or_else(|| OrmError::MissingPathParameter {
                        template: self.raw.clone(),
                        param: name.clone(),
                    })?;
                    if value.is_empty() || value.contains('/') {
                        return Err(OrmError::InvalidPath(format!("invalid value {value:?} for {name}")));
                    }
                    parts.push(value);
                }
            }
        }

        Ok(parts.join("/"))
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Joins a collection path and a document id.
pub fn document_path(collection_path: &str, id: &str) -> String {
    format!("{collection_path}/{id}")
}
