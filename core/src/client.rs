//! Request builder, response parser and executor for the Custom Types API.
//!
//! # Design
//! `CustomTypesClient` holds the repository name, token, endpoint, default
//! headers and the injected `Transport`. It carries no mutable state, so
//! clones share one transport and concurrent calls are independent.
//!
//! Every remote operation is split in three: a `build_*` method producing an
//! `HttpRequest`, a `parse_*` method turning an `HttpResponse` into a result
//! or a typed error, and an async method that runs the exchange through the
//! transport. Hosts that want to do their own I/O can use the first two
//! directly.
//!
//! One network exchange per call. Nothing is retried and no timeout is
//! imposed; callers compose their own with an `AbortSignal`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bulk::{
    Bulk, BulkEndpoint, BulkOperation, BulkUpdate, BulkUpdateOperation, Operation,
};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::signal::AbortSignal;
use crate::transport::Transport;
use crate::types::{CustomTypeModel, SharedSliceModel};

pub const DEFAULT_ENDPOINT: &str = "https://customtypes.prismic.io";

/// Older configurations point at the custom types collection itself.
const LEGACY_ENDPOINT_SUFFIX: &str = "/customtypes";

const CUSTOM_TYPES: &str = "customtypes";
const SLICES: &str = "slices";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Client settings that can be deserialized from a config source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub repository_name: String,
    pub token: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Per-call overrides. Unset fields fall back to the client's settings.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub repository_name: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
    pub signal: Option<AbortSignal>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository_name(mut self, repository_name: impl Into<String>) -> Self {
        self.repository_name = Some(repository_name.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Options for `CustomTypesClient::bulk`.
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Confirm that documents of deleted custom types may be deleted too.
    pub delete_documents: bool,
    pub params: RequestParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase", bound = "")]
struct ChangesBody<'a, E> {
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm_delete_documents: Option<bool>,
    changes: &'a [Operation<E>],
}

pub struct ClientBuilder {
    repository_name: String,
    token: String,
    endpoint: Option<String>,
    headers: Vec<(String, String)>,
    signal: Option<AbortSignal>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(repository_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            token: token.into(),
            endpoint: None,
            headers: Vec::new(),
            signal: None,
            transport: None,
        }
    }

    pub fn from_config(config: ClientConfig) -> Self {
        let mut builder = Self::new(config.repository_name, config.token);
        builder.endpoint = config.endpoint;
        builder.headers = config.headers.into_iter().collect();
        builder
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a header sent with every request. Per-call headers win.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Signal observed by every request that does not bring its own.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Result<CustomTypesClient, ApiError> {
        let transport = self.transport.ok_or(ApiError::MissingTransport)?;
        let endpoint = self
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.is_empty())
            .map_or_else(|| DEFAULT_ENDPOINT.to_string(), normalize_endpoint);

        Ok(CustomTypesClient {
            repository_name: self.repository_name,
            token: self.token,
            endpoint,
            headers: self.headers,
            signal: self.signal,
            transport,
        })
    }
}

/// Client for one repository of the Custom Types API.
#[derive(Clone)]
pub struct CustomTypesClient {
    repository_name: String,
    token: String,
    endpoint: String,
    headers: Vec<(String, String)>,
    signal: Option<AbortSignal>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for CustomTypesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTypesClient")
            .field("repository_name", &self.repository_name)
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl CustomTypesClient {
    pub fn builder(repository_name: impl Into<String>, token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(repository_name, token)
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The normalized API endpoint, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // -----------------------------------------------------------------------
    // Custom types
    // -----------------------------------------------------------------------

    pub fn build_get_all_custom_types(&self, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Get, CUSTOM_TYPES, None, params)
    }

    pub fn build_get_custom_type_by_id(&self, id: &str, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Get, &resource_path(CUSTOM_TYPES, id), None, params)
    }

    pub fn build_insert_custom_type(
        &self,
        custom_type: &CustomTypeModel,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        self.build_post("customtypes/insert", custom_type, params)
    }

    pub fn build_update_custom_type(
        &self,
        custom_type: &CustomTypeModel,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        self.build_post("customtypes/update", custom_type, params)
    }

    pub fn build_remove_custom_type(&self, id: &str, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Delete, &resource_path(CUSTOM_TYPES, id), None, params)
    }

    pub async fn get_all_custom_types(
        &self,
        params: &RequestParams,
    ) -> Result<Vec<CustomTypeModel>, ApiError> {
        self.fetch_json(self.build_get_all_custom_types(params)).await
    }

    pub async fn get_custom_type_by_id(
        &self,
        id: &str,
        params: &RequestParams,
    ) -> Result<CustomTypeModel, ApiError> {
        self.fetch_json(self.build_get_custom_type_by_id(id, params)).await
    }

    /// Insert a new custom type. Resolves with the submitted model.
    pub async fn insert_custom_type(
        &self,
        custom_type: CustomTypeModel,
        params: &RequestParams,
    ) -> Result<CustomTypeModel, ApiError> {
        let request = self.build_insert_custom_type(&custom_type, params)?;
        self.fetch_empty(request).await?;
        Ok(custom_type)
    }

    /// Replace an existing custom type. Resolves with the submitted model.
    pub async fn update_custom_type(
        &self,
        custom_type: CustomTypeModel,
        params: &RequestParams,
    ) -> Result<CustomTypeModel, ApiError> {
        let request = self.build_update_custom_type(&custom_type, params)?;
        self.fetch_empty(request).await?;
        Ok(custom_type)
    }

    pub async fn remove_custom_type(
        &self,
        id: &str,
        params: &RequestParams,
    ) -> Result<String, ApiError> {
        self.fetch_empty(self.build_remove_custom_type(id, params)).await?;
        Ok(id.to_string())
    }

    // -----------------------------------------------------------------------
    // Shared slices
    // -----------------------------------------------------------------------

    pub fn build_get_all_shared_slices(&self, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Get, SLICES, None, params)
    }

    pub fn build_get_shared_slice_by_id(&self, id: &str, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Get, &resource_path(SLICES, id), None, params)
    }

    pub fn build_insert_shared_slice(
        &self,
        slice: &SharedSliceModel,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        self.build_post("slices/insert", slice, params)
    }

    pub fn build_update_shared_slice(
        &self,
        slice: &SharedSliceModel,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        self.build_post("slices/update", slice, params)
    }

    pub fn build_remove_shared_slice(&self, id: &str, params: &RequestParams) -> HttpRequest {
        self.build_request(HttpMethod::Delete, &resource_path(SLICES, id), None, params)
    }

    pub async fn get_all_shared_slices(
        &self,
        params: &RequestParams,
    ) -> Result<Vec<SharedSliceModel>, ApiError> {
        self.fetch_json(self.build_get_all_shared_slices(params)).await
    }

    pub async fn get_shared_slice_by_id(
        &self,
        id: &str,
        params: &RequestParams,
    ) -> Result<SharedSliceModel, ApiError> {
        self.fetch_json(self.build_get_shared_slice_by_id(id, params)).await
    }

    pub async fn insert_shared_slice(
        &self,
        slice: SharedSliceModel,
        params: &RequestParams,
    ) -> Result<SharedSliceModel, ApiError> {
        let request = self.build_insert_shared_slice(&slice, params)?;
        self.fetch_empty(request).await?;
        Ok(slice)
    }

    pub async fn update_shared_slice(
        &self,
        slice: SharedSliceModel,
        params: &RequestParams,
    ) -> Result<SharedSliceModel, ApiError> {
        let request = self.build_update_shared_slice(&slice, params)?;
        self.fetch_empty(request).await?;
        Ok(slice)
    }

    pub async fn remove_shared_slice(
        &self,
        id: &str,
        params: &RequestParams,
    ) -> Result<String, ApiError> {
        self.fetch_empty(self.build_remove_shared_slice(id, params)).await?;
        Ok(id.to_string())
    }

    // -----------------------------------------------------------------------
    // Changesets
    // -----------------------------------------------------------------------

    pub fn build_bulk(
        &self,
        operations: &[BulkOperation],
        options: &BulkOptions,
    ) -> Result<HttpRequest, ApiError> {
        self.build_changes(operations, options.delete_documents, &options.params)
    }

    pub fn build_bulk_update(
        &self,
        operations: &[BulkUpdateOperation],
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        self.build_changes(operations, false, params)
    }

    pub fn parse_bulk(&self, url: &str, response: HttpResponse) -> Result<(), ApiError> {
        parse_changes::<Bulk>(url, response)
    }

    pub fn parse_bulk_update(&self, url: &str, response: HttpResponse) -> Result<(), ApiError> {
        parse_changes::<BulkUpdate>(url, response)
    }

    /// Apply a changeset atomically. Accepts raw operations or a
    /// `BulkTransaction`, and resolves with the submitted operations.
    ///
    /// Fails with `BulkTransactionConfirmation` when the changeset would
    /// delete documents and `options.delete_documents` is unset.
    pub async fn bulk(
        &self,
        operations: impl AsRef<[BulkOperation]>,
        options: &BulkOptions,
    ) -> Result<Vec<BulkOperation>, ApiError> {
        self.submit_changes(operations.as_ref(), options.delete_documents, &options.params)
            .await
    }

    /// Apply a changeset through the `bulk-update` endpoint, which deletes
    /// without asking for confirmation.
    pub async fn bulk_update(
        &self,
        operations: impl AsRef<[BulkUpdateOperation]>,
        params: &RequestParams,
    ) -> Result<Vec<BulkUpdateOperation>, ApiError> {
        self.submit_changes(operations.as_ref(), false, params).await
    }

    // -----------------------------------------------------------------------
    // Response parsing
    // -----------------------------------------------------------------------

    /// Decode a 200 response body; any other status is an error.
    pub fn parse_json<T: DeserializeOwned>(
        &self,
        url: &str,
        response: HttpResponse,
    ) -> Result<T, ApiError> {
        if response.status != 200 {
            return Err(error_for_status(url, response));
        }
        response.json().map_err(|source| ApiError::Deserialization {
            url: url.to_string(),
            source,
        })
    }

    /// Accept a response whose body the caller does not need.
    pub fn parse_empty(&self, url: &str, response: HttpResponse) -> Result<(), ApiError> {
        match response.status {
            200 | 201 | 204 => Ok(()),
            _ => Err(error_for_status(url, response)),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn build_changes<E: BulkEndpoint>(
        &self,
        operations: &[Operation<E>],
        delete_documents: bool,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        let body = ChangesBody {
            confirm_delete_documents: E::CONFIRMS_DOCUMENT_DELETION.then_some(delete_documents),
            changes: operations,
        };
        self.build_post(E::PATH, &body, params)
    }

    async fn submit_changes<E: BulkEndpoint + Clone>(
        &self,
        operations: &[Operation<E>],
        delete_documents: bool,
        params: &RequestParams,
    ) -> Result<Vec<Operation<E>>, ApiError> {
        let request = self.build_changes(operations, delete_documents, params)?;
        let url = request.url.clone();
        let response = self.send(request).await?;
        parse_changes::<E>(&url, response)?;
        info!(endpoint = E::PATH, operations = operations.len(), "changeset accepted");
        Ok(operations.to_vec())
    }

    fn build_post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        params: &RequestParams,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(ApiError::Serialization)?;
        Ok(self.build_request(HttpMethod::Post, path, Some(body), params))
    }

    fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        params: &RequestParams,
    ) -> HttpRequest {
        let endpoint = params
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.is_empty())
            .map_or_else(|| self.endpoint.clone(), normalize_endpoint);
        let repository_name = params
            .repository_name
            .as_deref()
            .filter(|repository_name| !repository_name.is_empty())
            .unwrap_or(&self.repository_name);
        let token = params
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .unwrap_or(&self.token);

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("authorization".to_string(), format!("Bearer {token}"));
        headers.insert("repository".to_string(), repository_name.to_string());
        for (name, value) in self.headers.iter().chain(&params.headers) {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }

        HttpRequest {
            method,
            url: format!("{endpoint}/{path}"),
            headers: headers.into_iter().collect(),
            body,
            signal: params.signal.clone().or_else(|| self.signal.clone()),
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        let url = request.url.clone();
        let response = self.send(request).await?;
        self.parse_json(&url, response)
    }

    async fn fetch_empty(&self, request: HttpRequest) -> Result<(), ApiError> {
        let url = request.url.clone();
        let response = self.send(request).await?;
        self.parse_empty(&url, response)
    }

    /// Run one exchange, racing it against the request's abort signal.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.clone();
        debug!(method = request.method.as_str(), %url, "sending custom types API request");

        let outcome = match request.signal.clone() {
            Some(signal) if signal.is_aborted() => None,
            Some(signal) => tokio::select! {
                biased;
                () = signal.aborted() => None,
                result = self.transport.execute(request) => Some(result),
            },
            None => Some(self.transport.execute(request).await),
        };

        let Some(result) = outcome else {
            debug!(%url, "custom types API request aborted");
            return Err(ApiError::Aborted { url });
        };
        let response = result.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;
        debug!(status = response.status, %url, "custom types API responded");
        Ok(response)
    }
}

/// Interpret a changeset response. 202 and 403-with-details are specific
/// to changeset endpoints and take precedence over the general mapping.
fn parse_changes<E: BulkEndpoint>(url: &str, response: HttpResponse) -> Result<(), ApiError> {
    match response.status {
        200 | 201 | 204 => Ok(()),
        202 if E::CONFIRMS_DOCUMENT_DELETION => {
            warn!(%url, "changeset needs document deletion confirmation");
            Err(ApiError::BulkTransactionConfirmation {
                url: url.to_string(),
                response: response.json().unwrap_or(Value::Null),
            })
        }
        403 => {
            let body: Value = response.json().unwrap_or(Value::Null);
            if body.get("details").is_some() {
                warn!(%url, "changeset exceeds the command limit");
                Err(ApiError::BulkTransactionLimit {
                    url: url.to_string(),
                    response: body,
                })
            } else {
                Err(error_for_status(url, response))
            }
        }
        _ => Err(error_for_status(url, response)),
    }
}

/// Map a non-success status to the matching `ApiError` variant.
fn error_for_status(url: &str, response: HttpResponse) -> ApiError {
    let url = url.to_string();
    warn!(status = response.status, %url, "custom types API request failed");
    match response.status {
        400 => ApiError::InvalidPayload {
            url,
            response: response.body,
        },
        401 => ApiError::Unauthorized {
            url,
            response: response.body,
        },
        403 => {
            let body: Value = response.json().unwrap_or(Value::Null);
            let message = body.get("message").and_then(Value::as_str).map(str::to_string);
            ApiError::Forbidden {
                url,
                message,
                response: body,
            }
        }
        409 => ApiError::Conflict { url },
        404 | 422 => ApiError::NotFound { url },
        status => ApiError::UnexpectedStatus {
            url,
            status,
            body: response.body,
        },
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    trimmed
        .strip_suffix(LEGACY_ENDPOINT_SUFFIX)
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

fn resource_path(collection: &str, id: &str) -> String {
    format!("{collection}/{}", utf8_percent_encode(id, PATH_SEGMENT))
}
