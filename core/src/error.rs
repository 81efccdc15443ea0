//! Error types for the Custom Types API client.
//!
//! # Design
//! The remote API overloads a handful of status codes, so each failure the
//! caller may want to branch on gets its own variant. Variants produced from
//! a response carry the request URL and, where the API sends one, the body
//! for debugging. Nothing here is retried; cancellation surfaces as
//! `Aborted` and is never folded into another variant.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The client was built without a transport to execute requests.
    #[error("a transport was not provided; pass one to `ClientBuilder::transport`")]
    MissingTransport,

    /// 400: the request body was rejected.
    #[error("invalid payload sent to {url}: {response}")]
    InvalidPayload { url: String, response: String },

    /// 401: the token is not valid for any repository.
    #[error("unauthorized request to {url}")]
    Unauthorized { url: String, response: String },

    /// 403: the token is not valid for this repository.
    #[error("forbidden request to {url}: {}", .message.as_deref().unwrap_or("no message"))]
    Forbidden {
        url: String,
        message: Option<String>,
        response: serde_json::Value,
    },

    /// 409
    #[error("the provided ID is already used at {url}; a unique ID must be provided")]
    Conflict { url: String },

    /// 404, or 422 on updates.
    #[error("an entity with a matching ID could not be found at {url}")]
    NotFound { url: String },

    /// 202 from the bulk endpoint: the changeset would delete documents.
    #[error("the bulk transaction would delete documents; resubmit with `delete_documents` to confirm")]
    BulkTransactionConfirmation {
        url: String,
        response: serde_json::Value,
    },

    /// 403 carrying `details`: too many commands in one changeset.
    #[error("the bulk transaction exceeds the command limit of {url}")]
    BulkTransactionLimit {
        url: String,
        response: serde_json::Value,
    },

    /// Any status the API is not documented to return.
    #[error("an invalid API response was returned from {url} (HTTP {status})")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} was aborted")]
    Aborted { url: String },

    #[error("transport failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("deserialization of the response from {url} failed: {source}")]
    Deserialization {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// URL of the failed request, when the failure happened on the wire.
    pub fn url(&self) -> Option<&str> {
        match self {
            ApiError::InvalidPayload { url, .. }
            | ApiError::Unauthorized { url, .. }
            | ApiError::Forbidden { url, .. }
            | ApiError::Conflict { url }
            | ApiError::NotFound { url }
            | ApiError::BulkTransactionConfirmation { url, .. }
            | ApiError::BulkTransactionLimit { url, .. }
            | ApiError::UnexpectedStatus { url, .. }
            | ApiError::Aborted { url }
            | ApiError::Transport { url, .. }
            | ApiError::Deserialization { url, .. } => Some(url),
            ApiError::MissingTransport | ApiError::Serialization(_) => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ApiError::Aborted { .. })
    }
}
