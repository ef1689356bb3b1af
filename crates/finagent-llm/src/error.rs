use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),

    #[error("cannot start HTTP runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response had no message content")]
    EmptyCompletion,
}
