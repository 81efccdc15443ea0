//! The network capability the client is built on.
//!
//! The core never opens sockets itself. Callers inject a `Transport`, either
//! a type implementing the trait or a plain async closure taking an
//! `HttpRequest`. Non-2xx statuses are not transport errors: the transport
//! must return them as an `HttpResponse` so the client can map them.

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse};

/// The exchange could not produce a response at all.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<F, Fut> Transport for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpResponse, TransportError>> + Send,
{
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (self)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[tokio::test]
    async fn closures_are_transports() {
        let transport = |request: HttpRequest| async move {
            Ok::<_, TransportError>(HttpResponse::new(200, format!("\"{}\"", request.url)))
        };
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "https://example.com/slices".to_string(),
            headers: Vec::new(),
            body: None,
            signal: None,
        };
        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.body, "\"https://example.com/slices\"");
    }

    #[test]
    fn transport_error_displays_message() {
        assert_eq!(TransportError::new("connection reset").to_string(), "connection reset");
    }
}
