use carepath_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Errors raised by the consultation pipeline
#[derive(Debug, Error)]
pub enum ConsultError {
    /// Request rejected before any stage work
    #[error("{0}")]
    Validation(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// Session is not in a state that allows the operation
    #[error("{0}")]
    InvalidState(String),

    /// Another run holds the session lease
    #[error("session '{0}' is already running")]
    SessionBusy(String),

    /// No room left for another session
    #[error("session store is full, try again later")]
    StoreFull,

    /// A stage failed and the run was aborted
    #[error("pipeline failed: {0}")]
    Pipeline(String),

    /// The event consumer went away
    #[error("consultation stream closed by client")]
    Cancelled,
}

impl ConsultError {
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl HttpError for ConsultError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) | Self::SessionBusy(_) => StatusCode::CONFLICT,
            Self::StoreFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pipeline(_) | Self::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Validation(_) => "invalid_request_error",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidState(_) => "invalid_session_state",
            Self::SessionBusy(_) => "session_busy",
            Self::StoreFull => "capacity_exceeded",
            Self::Pipeline(_) => "consultation_error",
            Self::Cancelled => "cancelled",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
