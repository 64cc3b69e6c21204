use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from talking to the model endpoint.
    ///
    /// Transport errors abort the current turn; everything else the loop
    /// produces is a local failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Api { .. })
    }
}
