use switchyard_core::backend::BackendError;
use switchyard_core::SwitchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MihomoError {
    #[error("invalid controller configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("controller returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] SwitchError),
}

pub type Result<T> = std::result::Result<T, MihomoError>;

impl From<MihomoError> for BackendError {
    fn from(e: MihomoError) -> Self {
        match e {
            MihomoError::Status { .. } | MihomoError::Store(_) => {
                BackendError::Rejected(e.to_string())
            }
            MihomoError::Decode(_) => BackendError::Protocol(e.to_string()),
            MihomoError::Transport(ref inner) if inner.is_decode() => {
                BackendError::Protocol(e.to_string())
            }
            MihomoError::Config(_) | MihomoError::Transport(_) | MihomoError::Io(_) => {
                BackendError::Unreachable(e.to_string())
            }
        }
    }
}

/// Collapse whitespace and cap the length of an error body for messages.
pub(crate) fn sanitize_body(body: &str) -> String {
    const MAX_CHARS: usize = 240;
    let collapsed = body
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > MAX_CHARS {
        let cut: String = collapsed.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        collapsed
    }
}
