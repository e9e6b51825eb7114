use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("none of the keys [{}] is present", keys.join(", "))]
    NotFound { keys: Vec<String> },
    #[error("invalid dictionary key {key:?}: keys may not be empty or contain ',' or ':'")]
    InvalidKey { key: String },
    #[error("invalid dictionary value {value:?} for key {key:?}: values may not contain ','")]
    InvalidValue { key: String, value: String },
    #[error("platform lists {left:?} and {right:?} have no common entry")]
    EmptyIntersection { left: String, right: String },
    #[error("invalid bind spec {spec:?}: {reason}")]
    InvalidBindSpec { spec: String, reason: &'static str },
}
