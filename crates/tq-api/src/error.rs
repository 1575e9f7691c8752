use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with `{"error": ..}`.
    #[error("api error: {message}")]
    Api { message: String },
    #[error("http error: {status}")]
    Http { status: reqwest::StatusCode },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {message}")]
    Decode { message: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Worth retrying: the service was unreachable or failing, not rejecting.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Http { status } => status.is_server_error(),
            _ => false,
        }
    }
}
