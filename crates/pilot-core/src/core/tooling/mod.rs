//! Error taxonomy and the command outcome envelope.

pub mod errors;
pub mod outcome;
