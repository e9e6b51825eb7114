#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod attribute;
pub mod bind;
pub mod dictionary;
pub mod env_options;
mod error;
pub mod lists;
pub mod privilege;

pub use attribute::{Attribute, AttributeKind};
pub use bind::{BindList, BindSpec};
pub use dictionary::{Dictionary, Lookup, Projection, Upsert};
pub use env_options::{EnvOption, EnvOptionSet};
pub use error::DomainError;
pub use lists::{intersect, list_contains, merge_lists, ANY};
pub use privilege::{IdMapping, PrivilegeMode};
