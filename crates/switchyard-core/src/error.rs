use thiserror::Error;

use crate::backend::BackendError;
use crate::transition::TransitionError;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("invalid target: {0}")]
    Validation(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("no current profile is set")]
    NoCurrentProfile,

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("service operation failed: {0}")]
    Service(String),

    #[error("import failed: {0}")]
    Import(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SwitchError>;
