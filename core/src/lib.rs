//! Typed client for the Prismic Custom Types API.
//!
//! # Overview
//! Lists, fetches, inserts, updates and removes custom type and shared
//! slice models of a repository, and applies ordered changesets of such
//! operations in one atomic request.
//!
//! # Design
//! - `bulk` holds changesets (`BulkTransaction`, `BulkUpdateTransaction`);
//!   `diff` computes one from a before/after pair of model snapshots.
//! - `CustomTypesClient` splits each call into `build_*` (request as data),
//!   `parse_*` (status mapping) and an async method running the exchange
//!   through an injected `Transport`. The core never opens a socket.
//! - Models are opaque JSON identified by `id`; only the id is typed.
//! - Cancellation goes through `AbortSignal` and surfaces as
//!   `ApiError::Aborted`.

pub mod bulk;
pub mod client;
pub mod diff;
pub mod error;
pub mod http;
pub mod signal;
pub mod transport;
pub mod types;

pub use bulk::{
    Bulk, BulkEndpoint, BulkOperation, BulkTransaction, BulkUpdate, BulkUpdateOperation,
    BulkUpdateTransaction, Change, Operation, OperationType, Transaction,
};
pub use client::{
    BulkOptions, ClientBuilder, ClientConfig, CustomTypesClient, RequestParams, DEFAULT_ENDPOINT,
};
pub use diff::{diff, ModelChange};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use signal::{AbortController, AbortSignal};
pub use transport::{Transport, TransportError};
pub use types::{CustomTypeModel, Model, ModelId, SharedSliceModel, TransactionModels};
