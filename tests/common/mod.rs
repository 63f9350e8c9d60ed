//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_interceptor::config::InterceptorConfig;
use api_interceptor::http::{HttpServer, StatusResponse};
use api_interceptor::lifecycle::Shutdown;
use api_interceptor::state::SharedState;
use api_interceptor::tunnel::TunnelSupervisor;
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Observer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tunnel binary name that is never on the search path.
pub const MISSING_TUNNEL_TOOL: &str = "api-interceptor-test-missing-tunnel-tool";

/// A running mock backend. Dropping `task` (or calling `stop`) closes the port.
pub struct MockBackend {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read one HTTP/1.1 request (head plus Content-Length body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Start a backend that answers every request with `handler(raw_request)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, task }
}

/// Backend returning a fixed 200 body.
pub async fn start_mock_backend(response: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { (200, response.to_string()) }).await
}

/// Backend answering with the raw request it received.
pub async fn start_echo_backend() -> MockBackend {
    start_programmable_backend(|request| async move { (200, request) }).await
}

/// An interceptor running on an ephemeral port.
pub struct TestInterceptor {
    pub addr: SocketAddr,
    pub shared: Arc<SharedState>,
    pub supervisor: Arc<TunnelSupervisor>,
    pub shutdown: Arc<Shutdown>,
    pub task: JoinHandle<()>,
}

impl TestInterceptor {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn status(&self) -> StatusResponse {
        client()
            .get(self.url("/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn configure(&self, form: &[(&str, &str)]) -> reqwest::Response {
        client()
            .post(self.url("/configure"))
            .form(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn configure_port(&self, port: u16) -> reqwest::Response {
        self.configure(&[("port", &port.to_string())]).await
    }

    /// Connect an observer and wait until it is registered.
    pub async fn observe(&self) -> Observer {
        let before = self.shared.observers.len();
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", self.addr))
            .await
            .unwrap();
        let shared = self.shared.clone();
        wait_for(Duration::from_secs(5), move || shared.observers.len() > before).await;
        ws
    }
}

/// Start an interceptor. The tunnel tool is absent unless `mutate` says otherwise.
pub async fn start_interceptor<F>(mutate: F) -> TestInterceptor
where
    F: FnOnce(&mut InterceptorConfig),
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = InterceptorConfig::default();
    config.listener.port = addr.port();
    config.tunnel.binary = MISSING_TUNNEL_TOOL.to_string();
    config.health.interval_secs = 1;
    mutate(&mut config);

    let server = HttpServer::new(config).unwrap();
    let shared = server.shared();
    let supervisor = server.supervisor();
    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();

    let task = tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestInterceptor {
        addr,
        shared,
        supervisor,
        shutdown,
        task,
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Poll `/status` until `check` accepts it.
pub async fn wait_for_status<F>(interceptor: &TestInterceptor, timeout: Duration, check: F) -> StatusResponse
where
    F: Fn(&StatusResponse) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = interceptor.status().await;
        if check(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "status never matched, last: {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Next capture on `observer`, skipping keep-alive frames.
pub async fn next_capture(observer: &mut Observer) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), observer.next())
            .await
            .expect("no capture within 5s")
            .expect("observer stream ended")
            .expect("observer read failed");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert nothing but keep-alives arrive on `observer` for `window`.
pub async fn assert_no_capture(observer: &mut Observer, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, observer.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected capture: {}", text.as_str()),
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("observer closed: {:?}", other),
        }
    }
}
