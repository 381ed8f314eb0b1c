use thiserror::Error;

/// Failures surfaced by the cohort resource to the HTTP layer.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The caller is not authenticated.
    #[error("Unauthorized")]
    Unauthorized,

    /// A query parameter could not be parsed.
    #[error("{0}")]
    InvalidParameter(String),

    /// A referenced cohort type, location, attribute type or cohort does not exist.
    #[error("{0}")]
    ObjectNotFound(String),

    /// A request body sets properties that are unknown, missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The resource does not support the requested operation.
    #[error("{0}")]
    OperationNotSupported(String),

    /// The underlying service failed.
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
