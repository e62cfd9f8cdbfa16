//! Integration test harness for padgate.
//!
//! Every test gets its own gateway and a throwaway stand-in for the editor,
//! both bound to `127.0.0.1:0`. The stand-in records what reaches it so
//! tests can assert on forwarded headers and bodies.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p padgate-integration-tests
//! ```
//!
//! No database or directory server is needed: the gateway runs with a
//! `StaticDirectory`, an `InMemoryAuthorStore` and a memory session store.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{
        Request, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::any,
};
use tokio::net::TcpListener;
use tower_sessions::MemoryStore;
use url::Url;

use padgate::middleware::create_session_layer;
use padgate::test_utils::{InMemoryAuthorStore, StaticDirectory, test_config};
use padgate::{AppState, app};
use padgate_core::AuthorId;

pub use padgate::test_utils;

/// A request as seen by the editor stand-in.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Request method.
    pub method: Method,
    /// Path and query.
    pub uri: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

/// Requests received by the editor stand-in.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    /// Everything received so far, oldest first.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// The most recent request.
    pub fn last(&self) -> Option<Recorded> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn push(&self, recorded: Recorded) {
        self.requests.lock().unwrap().push(recorded);
    }
}

async fn record(State(recorder): State<Recorder>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let path = parts.uri.path().to_string();
    recorder.push(Recorded {
        method: parts.method,
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body,
    });
    format!("editor:{path}").into_response()
}

async fn socket(
    State(recorder): State<Recorder>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Response {
    match upgrade {
        Ok(upgrade) => upgrade.on_upgrade(echo),
        Err(_) => {
            let response = record(State(recorder), request).await;
            let (parts, _) = response.into_parts();
            // Engine.IO acknowledges polling POSTs with "ok"
            Response::from_parts(parts, axum::body::Body::from("ok"))
        }
    }
}

/// Echo every text frame back to the sender.
async fn echo(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(_) | Message::Binary(_) => {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A running gateway in front of a recording editor stand-in.
pub struct TestContext {
    /// HTTP client that keeps the session cookie.
    pub client: reqwest::Client,
    /// Base URL of the gateway.
    pub gateway_url: String,
    /// What reached the editor.
    pub upstream: Recorder,
    /// Author records the gateway writes to.
    pub authors: InMemoryAuthorStore,
    /// Directory behind the gateway.
    pub directory: StaticDirectory,
}

impl TestContext {
    /// Start a gateway with the default cast:
    ///
    /// - `alice` / `secret`, "Alice Q. Example", member of the admin group
    /// - `bob` / `hunter2`, "Bob Builder", no groups
    /// - author token `tok1` -> `a.alice`, `tok2` -> `a.bob`
    pub async fn start() -> Self {
        let directory = StaticDirectory::new()
            .with_user("alice", "secret", "Alice Q. Example")
            .with_user("bob", "hunter2", "Bob Builder")
            .with_groups("alice", &["cn=admin,ou=Groups,dc=corp,dc=test"]);
        let authors = InMemoryAuthorStore::new()
            .with_author("tok1", "a.alice")
            .with_author("tok2", "a.bob");
        Self::start_with(directory, authors).await
    }

    /// Start a gateway with the given collaborators.
    pub async fn start_with(directory: StaticDirectory, authors: InMemoryAuthorStore) -> Self {
        let upstream = Recorder::default();
        let editor = Router::new()
            .route("/socket.io/", any(socket))
            .fallback(record)
            .with_state(upstream.clone());
        let editor_addr = serve(editor).await;

        let config = test_config(Url::parse(&format!("http://{editor_addr}")).unwrap());
        let session_layer = create_session_layer(MemoryStore::default(), &config);
        let state = AppState::new(
            config,
            Arc::new(directory.clone()),
            Arc::new(authors.clone()),
            None,
        )
        .unwrap();
        let gateway_addr = serve(app(state, session_layer)).await;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            gateway_url: format!("http://{gateway_addr}"),
            upstream,
            authors,
            directory,
        }
    }

    /// Absolute gateway URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.gateway_url)
    }

    /// WebSocket URL of the gateway for `path`.
    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{path}", self.gateway_url.replacen("http", "ws", 1))
    }

    /// Wait for the author's display name to be written.
    pub async fn wait_for_display_name(&self, author: &str) -> Option<String> {
        for _ in 0..100 {
            if let Some(name) = self.authors.display_name(&AuthorId::new(author)) {
                return Some(name);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}
