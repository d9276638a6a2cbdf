//! Per-connection configuration.
//!
//! ```ignore
//! let options = ConnectionOptions::from_json_str(r#"{ "binding_mode": "prefer_client" }"#)?
//!     .server_or_strategy(ServerOrStrategy::MergeBranches);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::OrmResult;

/// Default length cap for text fragment indexes.
pub const DEFAULT_TEXT_INDEX_MAX_LEN: usize = 64;

/// How the binder chooses between the two SDK conventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    /// Bind server-style when the handle is detected as such, otherwise load
    /// the client SDK, falling back to a second server probe.
    #[default]
    Detect,
    /// Always try the client SDK first.
    PreferClient,
    /// Bind server-style whenever the handle has a chained surface.
    ForceServer,
}

/// How OR filters are executed under server-style bindings, which have no
/// composite filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerOrStrategy {
    /// Only the first disjunct is executed; a warning is logged.
    #[default]
    FirstBranch,
    /// Every disjunct is executed and the results merged, re-sorted and
    /// limited locally.
    MergeBranches,
}

/// Options applied to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub binding_mode: BindingMode,
    pub server_or_strategy: ServerOrStrategy,
    /// Longest text value (in characters) whose fragments are indexed.
    pub text_index_max_len: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            binding_mode: BindingMode::default(),
            server_or_strategy: ServerOrStrategy::default(),
            text_index_max_len: DEFAULT_TEXT_INDEX_MAX_LEN,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> OrmResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn binding_mode(mut self, mode: BindingMode) -> Self {
        self.binding_mode = mode;
        self
    }

    pub fn server_or_strategy(mut self, strategy: ServerOrStrategy) -> Self {
        self.server_or_strategy = strategy;
        self
    }

    pub fn text_index_max_len(mut self, max_len: usize) -> Self {
        self.text_index_max_len = max_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_keys_with_defaults() {
        let options = ConnectionOptions::from_json_str(r#"{ "binding_mode": "force_server" }"#).unwrap();

        assert_eq!(options.binding_mode, BindingMode::ForceServer);
        assert_eq!(options.server_or_strategy, ServerOrStrategy::FirstBranch);
        assert_eq!(options.text_index_max_len, DEFAULT_TEXT_INDEX_MAX_LEN);
    }

    #[test]
    fn unknown_mode_is_a_serialization_error() {
        assert!(matches!(
            ConnectionOptions::from_json_str(r#"{ "binding_mode": "sometimes" }"#),
            Err(crate::error::OrmError::Serialization(_))
        ));
    }
}
