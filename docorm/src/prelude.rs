//! Commonly used types and traits.
//!
//! ```ignore
//! use docorm::prelude::*;
//! ```

pub use docorm_core::{
    binder::BinderState,
    binding::{Bindings, Operation, Support},
    config::{BindingMode, ConnectionOptions, ServerOrStrategy},
    connection::{Connection, ConnectionRegistry},
    detect::{SdkDetector, SdkStyle},
    document::{ChangeKind, RawDocument, Subscription},
    error::{OrmError, OrmResult},
    filter::{Expr, FieldOp, Filter, Sort, SortDirection},
    model::{Model, ModelDescriptor, RelationKind},
    path::PathParams,
    query::{ListenMode, Query},
    repository::{ModelExt, Repository},
    sdk::{HandleBuilder, StoreHandle},
};
pub use docorm_macros::Model;
pub use docorm_memory::HandleFlavour;

pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
