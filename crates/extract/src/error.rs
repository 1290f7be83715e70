use thiserror::Error;

/// Failure talking to the inference endpoint. Retried by the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to send request to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Inference request failed: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode inference response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Model output that is not valid or repairable JSON.
#[derive(Debug, Clone, Error)]
#[error("model output is not repairable JSON ({} bytes)", .raw.len())]
pub struct ParseFailure {
    /// The original model text, never the cleaned variant
    pub raw: String,
}
