use thiserror::Error;

/// Errors that can occur while building the client.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Host and base path do not form a valid URL.
    #[error("invalid registry URL: {0}")]
    Url(#[from] url::ParseError),
}
