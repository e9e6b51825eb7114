//! Settings assembled from the environment and the site defaults file.

pub mod settings;

pub use settings::*;
