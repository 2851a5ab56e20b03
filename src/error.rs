//! Error handling for the InterLex client.
//!
//! Two layers: `ValidationError` for caller-supplied shapes that are wrong
//! before any network call, and `InterlexError` for everything an operation
//! can surface. Transport failures are retried inside the session layer and
//! only show up here once the retry budget is exhausted.

use thiserror::Error;

/// Main error type for registry operations.
#[derive(Error, Debug)]
pub enum InterlexError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// HTTP 401. Fatal, never retried.
    #[error("api key given is incorrect")]
    Authentication,

    /// The registry returned a structured rejection: an `errormsg` body
    /// field or a non-2xx status outside the retry set. Carries the server
    /// message verbatim.
    #[error("server rejected request (status {status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Network failure or retryable status after the retry budget ran out.
    #[error("transport failed after {attempts} attempts")]
    Transport {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A referenced identifier does not resolve. `role` names which
    /// argument was at fault so callers can self-correct.
    #[error("{role}: {reference} does not exist")]
    EntityNotFound { role: String, reference: String },

    #[error("superclass {reference} does not exist")]
    SuperclassNotFound { reference: String },

    /// A duplicate fact the already-exists reconciliation could not match
    /// back to an existing record.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// 2xx response whose body did not have the promised shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Caller-supplied field shape is wrong. Never sent to the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing key {key} in {context}")]
    MissingKey { key: String, context: String },

    #[error("unexpected key {key} in {context}")]
    UnexpectedKey { key: String, context: String },

    #[error("{context} must be an object")]
    NotAnObject { context: String },

    #[error("entity label cannot be empty")]
    EmptyLabel,

    #[error("synonym literal cannot be empty")]
    EmptySynonymLiteral,

    #[error("identifier cannot be empty")]
    EmptyIdentifier,

    #[error("{value:?} could not be determined as an InterLex identifier")]
    BadIdentifier { value: String },

    #[error("invalid base url {value:?}")]
    BadBaseUrl { value: String },

    #[error("request payload must be a JSON object")]
    PayloadNotObject,

    #[error("no api key has been set")]
    NoApiKey,
}

pub type Result<T> = std::result::Result<T, InterlexError>;
