#![deny(clippy::all, warnings)]

mod core;

pub mod binds {
    pub use crate::core::binds::*;
}

pub mod config {
    pub use crate::core::config::*;
}

pub mod effects {
    pub use crate::core::effects::*;
}

pub mod env {
    pub use crate::core::env::context::*;
    pub use crate::core::env::policy::*;
}

pub mod image {
    pub use crate::core::image::*;
}

pub mod jobad {
    pub use crate::core::jobad::*;
}

pub mod launch {
    pub use crate::core::launch::invocation::*;
    pub use crate::core::launch::locate::*;
    pub use crate::core::launch::probe::*;
    pub use crate::core::launch::*;
}

pub use crate::core::config::{EnvSnapshot, GlobalOptions, Settings, SiteFile};
pub use crate::core::launch::{launch, resolve, LaunchRequest, ResolvedLaunch};
pub use crate::core::tooling::errors::LaunchError;
pub use crate::core::tooling::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};
