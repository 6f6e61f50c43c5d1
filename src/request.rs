//! Outbound query request.

use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FluxReadError, Result};

pub const QUERY_ENDPOINT: &str = "api/v2/query";

/// Annotation rows the server prepends to each annotated CSV table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotation {
    Group,
    Datatype,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            annotations: vec![Annotation::Group, Annotation::Datatype, Annotation::Default],
        }
    }
}

/// JSON document posted to the query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBody {
    pub query: String,
    /// Pre-parsed script made available to the query, sent as-is.
    #[serde(rename = "extern", default, skip_serializing_if = "Option::is_none")]
    pub extern_script: Option<Value>,
    pub dialect: Dialect,
}

/// A fully built query request. Fields are fixed at construction.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    url: reqwest::Url,
    headers: HeaderMap,
    body: QueryBody,
}

impl TransferRequest {
    pub fn new(
        base_url: &str,
        org_id: &str,
        body: QueryBody,
        accept_gzip: bool,
    ) -> Result<Self> {
        if org_id.trim().is_empty() {
            return Err(FluxReadError::Config("org id must not be empty".to_string()));
        }

        let endpoint = join_endpoint(base_url, QUERY_ENDPOINT);
        let mut url = reqwest::Url::parse(&endpoint).map_err(|err| {
            FluxReadError::Config(format!("invalid base url {base_url:?}: {err}"))
        })?;
        url.query_pairs_mut().append_pair("orgID", org_id);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if accept_gzip {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        }

        Ok(Self { url, headers, body })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    pub fn method(&self) -> reqwest::Method {
        reqwest::Method::POST
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &QueryBody {
        &self.body
    }

    pub(crate) fn to_builder(&self, http: &reqwest::Client) -> Result<reqwest::RequestBuilder> {
        let body = serde_json::to_vec(&self.body)?;
        Ok(http
            .request(self.method(), self.url.clone())
            .headers(self.headers.clone())
            .body(body))
    }
}

pub(crate) fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if base.ends_with(&format!("/{endpoint}")) {
        base.to_string()
    } else {
        format!("{base}/{endpoint}")
    }
}
