//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use digest_auth::{AuthContext, AuthorizationHeader, HttpMethod};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use auth_proxy::config::ProxyConfig;
use auth_proxy::http::AppState;
use auth_proxy::{HttpServer, Shutdown};

/// A request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }
}

/// What the mock backend answers with.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

/// Handle to a running mock backend.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests().iter().filter(|r| r.method == method).count()
    }

    pub fn last(&self) -> RecordedRequest {
        self.requests().last().cloned().expect("no request recorded")
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Start a programmable mock backend on an ephemeral localhost port.
pub async fn start_programmable_backend<F>(handler: F) -> MockBackend
where
    F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let recorded = requests.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        serve_connection(socket, handler, recorded).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, requests }
}

async fn serve_connection<F>(
    socket: TcpStream,
    handler: Arc<F>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) where
    F: Fn(&RecordedRequest) -> MockResponse,
{
    let mut reader = BufReader::new(socket);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    if length > 0 && reader.read_exact(&mut body).await.is_err() {
        return;
    }

    let request = RecordedRequest {
        method,
        target,
        headers,
        body,
    };
    let response = handler(&request);
    let is_head = request.method == "HEAD";
    recorded.lock().unwrap().push(request);

    let reason = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Mock");
    let mut raw = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
    for (name, value) in &response.headers {
        raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    raw.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));
    if !is_head {
        raw.push_str(&response.body);
    }

    let mut socket = reader.into_inner();
    let _ = socket.write_all(raw.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Nonce a digest mock backend currently issues; rotating it invalidates
/// every answer computed from the previous one.
#[derive(Clone)]
pub struct DigestNonce(Arc<Mutex<String>>);

impl DigestNonce {
    pub fn current(&self) -> String {
        self.0.lock().unwrap().clone()
    }

    pub fn rotate(&self, nonce: &str) {
        *self.0.lock().unwrap() = nonce.to_string();
    }
}

pub fn digest_challenge(realm: &str, nonce: &str) -> String {
    format!("Digest realm=\"{realm}\", nonce=\"{nonce}\", qop=\"auth\"")
}

/// True when `req` carries a Digest answer for `user:password` computed
/// from the current `nonce`.
pub fn digest_answer_is_valid(
    req: &RecordedRequest,
    realm: &str,
    user: &str,
    password: &str,
    nonce: &str,
) -> bool {
    let Some(answer) = req
        .header("authorization")
        .filter(|auth| auth.starts_with("Digest "))
        .and_then(|auth| AuthorizationHeader::parse(auth).ok())
    else {
        return false;
    };
    if answer.username != user || answer.realm != realm || answer.nonce != nonce {
        return false;
    }

    let mut expected = answer.clone();
    let context = AuthContext::new_with_method(
        user,
        password,
        answer.uri.as_str(),
        None::<&[u8]>,
        HttpMethod::from(req.method.as_str()),
    );
    expected.digest(&context);
    expected.response == answer.response
}

/// Backend that challenges with Digest and accepts only correct answers for
/// `user:password` against its current nonce.
pub async fn start_digest_backend(
    realm: &'static str,
    user: &'static str,
    password: &'static str,
) -> (MockBackend, DigestNonce) {
    let nonce = DigestNonce(Arc::new(Mutex::new("dcd98b7102dd2f0e".to_string())));
    let current = nonce.clone();
    let backend = start_programmable_backend(move |req| {
        let nonce = current.current();
        if req.method != "HEAD" && digest_answer_is_valid(req, realm, user, password, &nonce) {
            MockResponse::new(200).body("ok")
        } else {
            MockResponse::new(401).header("WWW-Authenticate", &digest_challenge(realm, &nonce))
        }
    })
    .await;
    (backend, nonce)
}

/// Backend that challenges with Basic and accepts exactly `user:password`.
pub async fn start_basic_backend(
    realm: &'static str,
    user: &'static str,
    password: &'static str,
) -> MockBackend {
    let expected = basic_header(user, password);
    start_programmable_backend(move |req| match req.header("authorization") {
        Some(auth) if auth == expected => MockResponse::new(200)
            .header("Content-Type", "text/plain")
            .body(&format!("hello {user} {}", req.target)),
        _ => MockResponse::new(401).header("WWW-Authenticate", &format!("Basic realm=\"{realm}\"")),
    })
    .await
}

pub fn basic_header(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Proxy config pointing at `backend`.
pub fn proxy_config(backend: &MockBackend) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backend.host = "127.0.0.1".into();
    config.backend.port = backend.port();
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config
}

/// A running proxy and the state its handlers share.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let state = server.state().clone();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningProxy {
        addr,
        state,
        shutdown,
    }
}

pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Log in through the proxy; returns the `name=value` session cookie.
pub async fn login(proxy: &RunningProxy, user: &str, password: &str) -> String {
    let res = test_client()
        .post(proxy.url("/login"))
        .header("Authorization", basic_header(user, password))
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 200, "login should succeed");
    session_cookie(&res).expect("login should set a session cookie")
}

pub fn session_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_owned)
}
