//! Internal implementation modules for `pilot-core`.
//!
//! Callers go through the re-exports in the crate root.

pub mod binds;
pub mod config;
pub mod effects;
pub mod env;
pub mod image;
pub mod jobad;
pub mod launch;
pub mod tooling;
