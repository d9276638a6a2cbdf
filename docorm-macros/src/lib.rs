//! Procedural macros for docorm.
//!
//! `#[derive(Model)]` implements `docorm::model::Model` from attributes:
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Model)]
//! #[model(path_id = "members", path = "orgs/{org_id}/members")]
//! #[relation(name = "org", kind = "belongs_to", target = "orgs", key = "org_id")]
//! pub struct Member {
//!     #[model(id)]
//!     #[serde(skip)]
//!     pub id: Option<String>,
//!     #[model(path_param)]
//!     pub org_id: String,
//!     #[model(alias = "full_name", required, text_index)]
//!     pub name: String,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docorm_macros;

use proc_macro::TokenStream;

mod model;

#[proc_macro_derive(Model, attributes(model, relation))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(input.into()).into()
}
