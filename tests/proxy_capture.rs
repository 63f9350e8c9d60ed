//! Configure, proxy and capture through the full HTTP surface.

use std::time::Duration;

use axum::http::StatusCode;

mod common;

use common::{client, next_capture, start_echo_backend, start_interceptor, start_mock_backend};

#[tokio::test]
async fn status_before_configuration() {
    let interceptor = start_interceptor(|_| {}).await;

    let status = interceptor.status().await;
    assert_eq!(status.server_status, "Not configured");
    assert_eq!(
        status.localhost_url,
        format!("http://localhost:{}", interceptor.addr.port())
    );
    assert_eq!(status.zrok_url, "Public URL not available");

    let raw: serde_json::Value = client()
        .get(interceptor.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(raw.get("serverStatus").is_some());
    assert!(raw.get("localhostURL").is_some());
    assert!(raw.get("zrokURL").is_some());
}

#[tokio::test]
async fn unconfigured_proxy_returns_503() {
    let interceptor = start_interceptor(|_| {}).await;

    let res = client().get(interceptor.url("/api/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Proxy not configured");
}

#[tokio::test]
async fn configure_proxies_and_captures_the_exchange() {
    let backend = start_echo_backend().await;
    let interceptor = start_interceptor(|_| {}).await;
    let mut observer = interceptor.observe().await;

    let res = interceptor.configure_port(backend.port()).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/inspector/dashboard");

    let status = interceptor.status().await;
    assert_eq!(status.server_status, "Active");
    assert_eq!(status.localhost_url, format!("http://localhost:{}", backend.port()));

    let res = client()
        .post(interceptor.url("/orders?id=7"))
        .header("user-agent", "capture-test")
        .header("content-type", "application/json")
        .body(r#"{"item":"book"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let echoed = res.text().await.unwrap();
    assert!(echoed.starts_with("POST /orders?id=7 HTTP/1.1"));
    assert!(echoed.contains(r#"{"item":"book"}"#));
    assert!(echoed.to_ascii_lowercase().contains("x-forwarded-for: 127.0.0.1"));
    assert!(echoed
        .to_ascii_lowercase()
        .contains(&format!("host: localhost:{}", backend.port())));

    let capture = next_capture(&mut observer).await;
    let request = &capture["request"];
    let response = &capture["response"];
    assert_eq!(request["id"], response["id"]);
    assert_eq!(request["method"], "POST");
    assert!(request["url"].as_str().unwrap().ends_with("/orders?id=7"));
    assert_eq!(request["body"], r#"{"item":"book"}"#);
    assert_eq!(request["user_agent"], "capture-test");
    assert_eq!(request["headers"]["Content-Type"], "application/json");
    assert_eq!(request["headers"]["User-Agent"], "capture-test");
    assert_eq!(response["headers"]["Content-Type"], "text/plain");
    assert!(request["client_ip"].as_str().unwrap().starts_with("127.0.0.1"));
    assert_eq!(response["status_code"], 200);
    assert_eq!(response["body"].as_str().unwrap(), echoed);
    assert!(request["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn unreachable_port_keeps_previous_configuration() {
    let backend = start_mock_backend("first backend").await;
    let interceptor = start_interceptor(|_| {}).await;
    assert_eq!(
        interceptor.configure_port(backend.port()).await.status(),
        StatusCode::SEE_OTHER
    );

    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let res = interceptor.configure_port(closed_port).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res
        .text()
        .await
        .unwrap()
        .starts_with(&format!("Backend server on port {} is not reachable", closed_port)));

    let status = interceptor.status().await;
    assert_eq!(status.localhost_url, format!("http://localhost:{}", backend.port()));

    let body = client()
        .get(interceptor.url("/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "first backend");
}

#[tokio::test]
async fn reconfigure_switches_backend() {
    let first = start_mock_backend("first").await;
    let second = start_mock_backend("second").await;
    let interceptor = start_interceptor(|_| {}).await;

    interceptor.configure_port(first.port()).await;
    let body = client().get(interceptor.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "first");

    interceptor.configure_port(second.port()).await;
    let body = client().get(interceptor.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "second");
}

#[tokio::test]
async fn malformed_ports_are_rejected() {
    let interceptor = start_interceptor(|_| {}).await;

    let res = interceptor.configure(&[("port", "")]).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "Port is required");

    let res = interceptor.configure(&[("port", "eighty")]).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "Invalid port: eighty");

    assert_eq!(interceptor.status().await.server_status, "Not configured");
}

#[tokio::test]
async fn multipart_configure_form_is_accepted() {
    let backend = start_mock_backend("ok").await;
    let interceptor = start_interceptor(|_| {}).await;

    let boundary = "interceptor-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"port\"\r\n\r\n{port}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"zrok_option\"\r\n\r\npublic\r\n\
         --{b}--\r\n",
        b = boundary,
        port = backend.port()
    );
    let res = client()
        .post(interceptor.url("/configure"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(interceptor.status().await.server_status, "Active");
}

#[tokio::test]
async fn failed_upstream_call_is_502_without_capture() {
    let backend = start_mock_backend("short lived").await;
    let interceptor = start_interceptor(|_| {}).await;
    interceptor.configure_port(backend.port()).await;
    let mut observer = interceptor.observe().await;

    backend.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client().get(interceptor.url("/gone")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Upstream request failed");

    common::assert_no_capture(&mut observer, Duration::from_millis(500)).await;
}

#[tokio::test]
async fn inspector_is_localhost_only() {
    let assets = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(assets.path().join("dashboard")).unwrap();
    std::fs::write(assets.path().join("dashboard/index.html"), "<h1>dashboard</h1>").unwrap();
    std::fs::create_dir_all(assets.path().join("css")).unwrap();
    std::fs::write(assets.path().join("css/site.css"), "body {}").unwrap();

    let static_dir = assets.path().to_path_buf();
    let interceptor = start_interceptor(move |config| config.ui.static_dir = Some(static_dir)).await;

    let res = client()
        .get(interceptor.url("/inspector/dashboard"))
        .header("host", "abc123.share.zrok.io")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        res.text().await.unwrap(),
        "Inspector is only accessible from localhost"
    );

    for path in ["/inspector/dashboard", "/inspector/dashboard/"] {
        let res = client()
            .get(interceptor.url(path))
            .header("host", format!("localhost:{}", interceptor.addr.port()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "{}", path);
        assert_eq!(res.text().await.unwrap(), "<h1>dashboard</h1>");
    }

    let res = client().get(interceptor.url("/static/css/site.css")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "body {}");
}
