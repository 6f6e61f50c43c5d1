use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::{FluxReadError, Result};

pub(crate) const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

pub(crate) fn header_map_from_pairs(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            FluxReadError::Config(format!("invalid http header name {name:?}: {err}"))
        })?;

        let mut header_value = HeaderValue::from_str(value).map_err(|err| {
            FluxReadError::Config(format!("invalid http header value for {name:?}: {err}"))
        })?;
        header_value.set_sensitive(true);

        out.insert(header_name, header_value);
    }
    Ok(out)
}

/// Client for streamed queries. Only the connect phase is bounded; a
/// transfer may run as long as the caller lets it.
pub(crate) fn build_http_client(
    connect_timeout: Option<Duration>,
    headers: &BTreeMap<String, String>,
    gzip: bool,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if !headers.is_empty() {
        builder = builder.default_headers(header_map_from_pairs(headers)?);
    }
    #[cfg(feature = "gzip")]
    {
        builder = builder.gzip(gzip);
    }
    #[cfg(not(feature = "gzip"))]
    let _ = gzip;
    builder.build().map_err(FluxReadError::Http)
}

/// Client without default headers. Only fails if the TLS backend cannot
/// start, in which case reqwest's own default is used.
pub(crate) fn default_http_client(gzip: bool) -> reqwest::Client {
    build_http_client(None, &BTreeMap::new(), gzip).unwrap_or_else(|_| reqwest::Client::new())
}

/// Reads at most `max_bytes` of an error response. Transport errors end the
/// read with whatever arrived so far.
pub(crate) async fn read_error_body(response: reqwest::Response, max_bytes: usize) -> String {
    let mut body = Vec::new();
    let mut truncated = false;

    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        let room = max_bytes.saturating_sub(body.len());
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            truncated = true;
            break;
        }
        body.extend_from_slice(&chunk);
    }
    error_body_text(body, truncated)
}

fn error_body_text(mut body: Vec<u8>, truncated: bool) -> String {
    if !truncated {
        return String::from_utf8_lossy(&body).into_owned();
    }
    // the cut may have split a character
    if let Err(err) = std::str::from_utf8(&body) {
        if err.error_len().is_none() {
            body.truncate(err.valid_up_to());
        }
    }
    let mut text = String::from_utf8_lossy(&body).into_owned();
    text.push_str(" ...(truncated)");
    text
}

/// Picks the `message` out of a server error document, falling back to the
/// raw body.
pub(crate) fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    }

    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.trim().to_string();
    };
    match (parsed.code, parsed.message) {
        (_, Some(message)) if !message.trim().is_empty() => message,
        (Some(code), _) if !code.trim().is_empty() => code,
        _ => body.trim().to_string(),
    }
}
