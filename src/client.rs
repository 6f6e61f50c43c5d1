use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::Instrument as _;

use crate::cancel::CancelSignal;
use crate::config::{DEFAULT_BYTE_CAP, QueryConfig};
use crate::consumer::{QueryResult, consume};
use crate::handle::TransferHandle;
use crate::request::{Dialect, QueryBody, TransferRequest};
use crate::source::StreamSource;
use crate::utils::http::{
    MAX_ERROR_BODY_BYTES, api_error_message, build_http_client, default_http_client,
    read_error_body,
};
use crate::{FluxReadError, Result};

/// Runs queries against one server and streams their results back under a
/// byte cap.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
    byte_cap: u64,
    compress: bool,
    dialect: Dialect,
    connect_timeout: Option<Duration>,
    headers: BTreeMap<String, String>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("base_url", &self.base_url)
            .field("byte_cap", &self.byte_cap)
            .field("compress", &self.compress)
            .field("dialect", &self.dialect)
            .field("connect_timeout", &self.connect_timeout)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let compress = cfg!(feature = "gzip");
        Self {
            http: default_http_client(compress),
            base_url: base_url.into(),
            byte_cap: DEFAULT_BYTE_CAP,
            compress,
            dialect: Dialect::default(),
            connect_timeout: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Result<Self> {
        config.validate()?;
        let compress = config.compress && cfg!(feature = "gzip");
        let http = build_http_client(config.connect_timeout(), &config.headers, compress)?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            byte_cap: config.byte_cap,
            compress,
            dialect: config.dialect.clone().unwrap_or_default(),
            connect_timeout: config.connect_timeout(),
            headers: config.headers.clone(),
        })
    }

    /// Sends through `http` as is. Whether bodies are compressed is then up
    /// to that client, so no `accept-encoding` header is added here. A later
    /// [`QueryClient::with_compression`] replaces this client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self.compress = false;
        self
    }

    pub fn with_byte_cap(mut self, byte_cap: u64) -> Self {
        self.byte_cap = byte_cap;
        self
    }

    /// Ask the server for a gzip body. Ignored without the `gzip` feature,
    /// since the body could not be inflated.
    ///
    /// reqwest adds `accept-encoding` on its own whenever gzip is enabled on
    /// the client, so the client is rebuilt to match.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress && cfg!(feature = "gzip");
        self.http = build_http_client(self.connect_timeout, &self.headers, self.compress)
            .unwrap_or_else(|_| default_http_client(self.compress));
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn byte_cap(&self) -> u64 {
        self.byte_cap
    }

    pub fn build_request(
        &self,
        org_id: &str,
        query: impl Into<String>,
        extern_script: Option<Value>,
    ) -> Result<TransferRequest> {
        let body = QueryBody {
            query: query.into(),
            extern_script,
            dialect: self.dialect.clone(),
        };
        TransferRequest::new(&self.base_url, org_id, body, self.compress)
    }

    /// Starts a query and returns immediately.
    ///
    /// The request is sent from a task on the current tokio runtime. Every
    /// failure, including an invalid request or a missing runtime, is
    /// reported through the returned handle.
    pub fn run_query(
        &self,
        org_id: &str,
        query: impl Into<String>,
        extern_script: Option<Value>,
    ) -> TransferHandle {
        let cancel = CancelSignal::new();
        let request = match self.build_request(org_id, query, extern_script) {
            Ok(request) => request,
            Err(err) => return TransferHandle::failed(err, cancel),
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                return TransferHandle::failed(FluxReadError::Runtime(err.to_string()), cancel);
            }
        };

        let span = tracing::info_span!("flux_query", org_id = %org_id, byte_cap = self.byte_cap);
        let task = runtime.spawn(
            execute(self.http.clone(), request, self.byte_cap, cancel.clone()).instrument(span),
        );
        TransferHandle::spawned(task, cancel)
    }
}

async fn execute(
    http: reqwest::Client,
    request: TransferRequest,
    byte_cap: u64,
    cancel: CancelSignal,
) -> Result<QueryResult> {
    let send = request.to_builder(&http)?.send();
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("query cancelled before response headers");
            return Err(FluxReadError::Cancelled);
        }
        response = send => response?,
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FluxReadError::Cancelled),
            body = read_error_body(response, MAX_ERROR_BODY_BYTES) => body,
        };
        let message = api_error_message(&body);
        tracing::debug!(%status, %message, "query rejected");
        return Err(FluxReadError::Api { status, message });
    }

    let outcome = consume(StreamSource::from_response(response), byte_cap, &cancel).await;
    match &outcome {
        Ok(result) => tracing::debug!(
            bytes_read = result.bytes_read,
            truncated = result.truncated,
            "query stream finished"
        ),
        Err(err) => tracing::debug!(error = %err, "query stream failed"),
    }
    outcome
}
