use std::time::Duration;

use fluxread::{FluxReadError, QueryClient, QueryConfig};
use httpmock::{Method::POST, MockServer};
use serde_json::json;

const CSV: &str = "a,b\nc,d\ne,f\n";

#[tokio::test]
async fn small_result_is_returned_whole() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v2/query")
                .query_param("orgID", "org-1")
                .header("content-type", "application/json")
                .json_body(json!({
                    "query": "from(bucket: \"telegraf\") |> range(start: -1h)",
                    "dialect": {"annotations": ["group", "datatype", "default"]},
                }));
            then.status(200).header("content-type", "text/csv").body(CSV);
        })
        .await;

    let client = QueryClient::new(server.base_url())
        .with_compression(false)
        .with_byte_cap(100);
    let result = client
        .run_query("org-1", "from(bucket: \"telegraf\") |> range(start: -1h)", None)
        .await?;

    mock.assert_async().await;
    assert_eq!(result.text, CSV);
    assert!(!result.truncated);
    assert_eq!(result.bytes_read, 12);
    Ok(())
}

#[tokio::test]
async fn extern_and_dialect_are_posted() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v2/query").json_body(json!({
                "query": "buckets()",
                "extern": {"type": "File", "body": []},
                "dialect": {"annotations": ["datatype"]},
            }));
            then.status(200).body("#datatype,string\n");
        })
        .await;

    let config = QueryConfig::from_toml_str(&format!(
        r#"
base_url = "{}"
compress = false

[dialect]
annotations = ["datatype"]
"#,
        server.base_url()
    ))?;
    let client = QueryClient::from_config(&config)?;
    let result = client
        .run_query(
            "org-1",
            "buckets()",
            Some(json!({"type": "File", "body": []})),
        )
        .await?;

    mock.assert_async().await;
    assert_eq!(result.text, "#datatype,string\n");
    Ok(())
}

#[tokio::test]
async fn large_result_is_cut_at_a_row_boundary() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let body: String = (0..2000).map(|i| format!(",_result,0,{i}\n")).collect();
    let server = MockServer::start_async().await;
    let served = body.clone();
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/api/v2/query");
            then.status(200).body(&served);
        })
        .await;

    let client = QueryClient::new(server.base_url())
        .with_compression(false)
        .with_byte_cap(100);
    let result = client.run_query("org-1", "q", None).await?;

    assert!(result.truncated);
    assert!(result.bytes_read > 100);
    assert!(result.bytes_read <= body.len() as u64);
    assert!(result.text.len() <= 100);
    assert!(result.text.is_empty() || result.text.ends_with('\n'));
    assert!(body.starts_with(&result.text));
    Ok(())
}

#[tokio::test]
async fn config_headers_are_sent() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v2/query")
                .header("authorization", "Token abc");
            then.status(200).body(CSV);
        })
        .await;

    let mut config = QueryConfig::new(server.base_url());
    config
        .headers
        .insert("authorization".to_string(), "Token abc".to_string());
    let result = QueryClient::from_config(&config)?
        .run_query("org-1", "q", None)
        .await?;

    mock.assert_async().await;
    assert_eq!(result.text, CSV);
    Ok(())
}

#[cfg(feature = "gzip")]
#[tokio::test]
async fn compression_is_requested_when_enabled() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v2/query")
                .header("accept-encoding", "gzip");
            then.status(200).body(CSV);
        })
        .await;

    let config = QueryConfig::new(server.base_url());
    let result = QueryClient::from_config(&config)?
        .run_query("org-1", "q", None)
        .await?;

    mock.assert_async().await;
    assert_eq!(result.text, CSV);
    Ok(())
}

#[tokio::test]
async fn disabling_compression_omits_accept_encoding() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    let compressed = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v2/query")
                .header_exists("accept-encoding");
            then.status(200).body("gz\n");
        })
        .await;
    let plain = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v2/query")
                .header_missing("accept-encoding");
            then.status(200).body("plain\n");
        })
        .await;

    let result = QueryClient::new(server.base_url())
        .with_compression(false)
        .run_query("org-1", "q", None)
        .await?;

    assert_eq!(result.text, "plain\n");
    plain.assert_async().await;
    assert_eq!(compressed.hits_async().await, 0);
    Ok(())
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v2/query");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"code":"invalid","message":"error calling function \"range\""}"#);
        })
        .await;

    let err = QueryClient::new(server.base_url())
        .run_query("org-1", "range()", None)
        .await
        .unwrap_err();

    match err {
        FluxReadError::Api { status, message } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "error calling function \"range\"");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancel_before_headers_settles_as_cancelled() {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v2/query");
            then.status(200).body(CSV).delay(Duration::from_secs(10));
        })
        .await;

    let handle = QueryClient::new(server.base_url()).run_query("org-1", "q", None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.result())
        .await
        .expect("cancelled transfer settles promptly");
    assert!(matches!(outcome, Err(FluxReadError::Cancelled)));
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() -> fluxread::Result<()> {
    if fluxread::utils::test_support::should_skip_httpmock() {
        return Ok(());
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v2/query");
            then.status(200).body(CSV);
        })
        .await;

    let handle = QueryClient::new(server.base_url()).run_query("org-1", "q", None);
    let cancel = handle.cancel_handle();
    let result = handle.await?;
    cancel.cancel();

    assert_eq!(result.text, CSV);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0));
    let Ok(listener) = listener else {
        return;
    };
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let err = QueryClient::new(format!("http://{addr}"))
        .run_query("org-1", "q", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FluxReadError::Http(_)), "{err}");
}
