use std::path::PathBuf;

use pilot_domain::DomainError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::launch::locate::LocateAttempt;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },
    #[error("no image available for platforms {platforms:?}")]
    NoImageAvailable {
        platforms: String,
        candidates: Vec<String>,
    },
    #[error("image {image} violates restriction {restriction:?}")]
    RestrictionViolation { image: String, restriction: String },
    #[error("image {image} does not exist")]
    ImageNotFound { image: String },
    #[error("invalid invocation: {reason}")]
    InvalidInvocation { reason: &'static str },
    #[error("privilege probe failed: {reason}")]
    ProbeFailed {
        reason: String,
        output: Option<String>,
    },
    #[error("no usable container runtime found")]
    RuntimeNotFound { attempts: Vec<LocateAttempt> },
    #[error("job description unavailable: {message}")]
    JobDescription { message: String },
    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LaunchError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable code for the envelope's `reason` field.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            LaunchError::NotFound { .. } => "not_found",
            LaunchError::ValidationFailed { .. } => "validation_failed",
            LaunchError::NoImageAvailable { .. } => "no_image_available",
            LaunchError::RestrictionViolation { .. } => "restriction_violation",
            LaunchError::ImageNotFound { .. } => "image_not_found",
            LaunchError::InvalidInvocation { .. } => "invalid_invocation",
            LaunchError::ProbeFailed { .. } => "probe_failed",
            LaunchError::RuntimeNotFound { .. } => "runtime_not_found",
            LaunchError::JobDescription { .. } => "job_description",
            LaunchError::Config { .. } => "config",
            LaunchError::Domain(DomainError::EmptyIntersection { .. }) => "empty_intersection",
            LaunchError::Domain(DomainError::NotFound { .. }) => "not_found",
            LaunchError::Domain(_) => "validation_failed",
            LaunchError::Io { .. } => "io",
        }
    }

    /// Configuration-authoring problems the operator can fix, as opposed to
    /// internal failures.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        !matches!(self, LaunchError::Io { .. })
    }

    /// Diagnostic context for operators.
    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = match self {
            LaunchError::NoImageAvailable {
                platforms,
                candidates,
            } => json!({
                "platforms": platforms,
                "candidates": candidates,
                "hint": "add a matching platform or a `default` entry to the image map",
            }),
            LaunchError::RestrictionViolation { image, restriction } => json!({
                "image": image,
                "restriction": restriction,
            }),
            LaunchError::ImageNotFound { image } => json!({ "image": image }),
            LaunchError::ProbeFailed { output, .. } => json!({ "output": output }),
            LaunchError::RuntimeNotFound { attempts } => json!({
                "attempts": attempts,
                "hint": "set PILOT_RUNTIME_PATH to the directory holding apptainer or singularity",
            }),
            LaunchError::Config { path, .. } => json!({ "path": path.display().to_string() }),
            LaunchError::Io { source, .. } => json!({ "error": source.to_string() }),
            _ => json!({}),
        };
        if let Value::Object(map) = &mut details {
            map.insert("reason".to_string(), json!(self.reason()));
        }
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_carry_reason_code() {
        let err = LaunchError::ImageNotFound {
            image: "/img/missing.sif".into(),
        };
        let details = err.details();
        assert_eq!(details["reason"], "image_not_found");
        assert_eq!(details["image"], "/img/missing.sif");
    }

    #[test]
    fn domain_errors_map_to_reasons() {
        let err = LaunchError::from(DomainError::EmptyIntersection {
            left: "a".into(),
            right: "b".into(),
        });
        assert_eq!(err.reason(), "empty_intersection");
        assert!(err.is_user_error());
    }
}
