use thiserror::Error;

/// Failure talking to the push-delivery service.
#[derive(Debug, Error)]
pub enum PushServiceError {
    #[error("push service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push service rejected registration with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected push service response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("registration failed: {0}")]
    RegistrationFailed(#[from] PushServiceError),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl RegistrationError {
    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::InvalidInput(_) => "invalid_input",
            RegistrationError::RegistrationFailed(_) => "registration_failed",
            RegistrationError::Store(_) => "store",
        }
    }
}
