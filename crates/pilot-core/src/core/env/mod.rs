//! The environment table handed to the sandbox and the policy that shapes
//! it.

pub mod context;
pub mod policy;
