//! Key and collection-name sanitization for MongoDB.
//!
//! MongoDB field names cannot contain dots, dollar signs or null bytes, and
//! collection names cannot contain dollar signs. Offending characters are
//! escaped on the way in and restored on the way out. Values are left
//! untouched so filters compare against what was stored.

use bson::{Bson, Document};

pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively escapes every key of `document`.
    pub(crate) fn sanitize_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(key, value)| (Self::sanitize_string(key), Self::sanitize_value(value)))
            .collect()
    }

    fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.iter().map(Self::sanitize_value).collect()),
            Bson::Document(document) => Bson::Document(Self::sanitize_document(document)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_string(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Inverse of [`ValueSanitizer::sanitize_document`].
    pub(crate) fn restore_document(document: &Document) -> Document {
        document
            .iter()
            .map(|(key, value)| (Self::restore_string(key), Self::restore_value(value)))
            .collect()
    }

    fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items.iter().map(Self::restore_value).collect()),
            Bson::Document(document) => Bson::Document(Self::restore_document(document)),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_string(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}
