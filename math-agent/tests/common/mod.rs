//! In-process MCP server speaking the HTTP+SSE transport.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;

pub const TOKEN: &str = "good-token";

#[derive(Clone)]
pub struct ServerOptions {
    pub tools: Vec<&'static str>,
    pub fail_calls: bool,
    pub ping_before_result: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tools: vec!["multiply", "add"],
            fail_calls: false,
            ping_before_result: false,
        }
    }
}

#[derive(Default)]
struct Counters {
    streams: AtomicUsize,
    calls: AtomicUsize,
    pongs: AtomicUsize,
}

struct State {
    options: ServerOptions,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
    next_session: AtomicUsize,
    counters: Counters,
}

pub struct McpServer {
    pub addr: SocketAddr,
    state: Arc<State>,
}

impl McpServer {
    pub async fn start(options: ServerOptions) -> Self {
        let state = Arc::new(State {
            options,
            sessions: Mutex::default(),
            next_session: AtomicUsize::new(1),
            counters: Counters::default(),
        });

        let shared = Arc::clone(&state);
        let make = make_service_fn(move |_| {
            let state = Arc::clone(&shared);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle(Arc::clone(&state), req)))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
        let addr = server.local_addr();
        tokio::spawn(server);

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn streams_opened(&self) -> usize {
        self.state.counters.streams.load(Ordering::SeqCst)
    }

    pub fn tool_calls(&self) -> usize {
        self.state.counters.calls.load(Ordering::SeqCst)
    }

    pub fn pongs(&self) -> usize {
        self.state.counters.pongs.load(Ordering::SeqCst)
    }
}

fn authorized(req: &Request<Body>) -> bool {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn status(code: StatusCode) -> Response<Body> {
    Response::builder()
        .status(code)
        .body(Body::empty())
        .unwrap()
}

fn event(kind: &str, data: &str) -> String {
    format!("event: {kind}\ndata: {data}\n\n")
}

async fn handle(state: Arc<State>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if !authorized(&req) {
        return Ok(status(StatusCode::UNAUTHORIZED));
    }

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = match (method, path.as_str()) {
        (Method::GET, "/sse") => open_stream(&state),
        (Method::POST, "/messages") => {
            let session = req
                .uri()
                .query()
                .and_then(|q| q.strip_prefix("session_id="))
                .map(str::to_owned);
            let bytes = hyper::body::to_bytes(req.into_body()).await.unwrap();
            match session {
                Some(session) => accept_message(&state, &session, &bytes),
                None => status(StatusCode::BAD_REQUEST),
            }
        }
        _ => status(StatusCode::NOT_FOUND),
    };
    Ok(response)
}

fn open_stream(state: &Arc<State>) -> Response<Body> {
    state.counters.streams.fetch_add(1, Ordering::SeqCst);
    let session = format!("s{}", state.next_session.fetch_add(1, Ordering::SeqCst));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (mut sender, body) = Body::channel();
    tx.send(event("endpoint", &format!("/messages?session_id={session}")))
        .unwrap();
    state.sessions.lock().unwrap().insert(session, tx);

    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if sender.send_data(Bytes::from(chunk)).await.is_err() {
                break;
            }
        }
    });

    Response::builder()
        .header(CONTENT_TYPE, "text/event-stream")
        .body(body)
        .unwrap()
}

fn accept_message(state: &Arc<State>, session: &str, body: &[u8]) -> Response<Body> {
    let Some(tx) = state.sessions.lock().unwrap().get(session).cloned() else {
        return status(StatusCode::NOT_FOUND);
    };
    let message: Value = serde_json::from_slice(body).unwrap();

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        // A response to one of our pings.
        if message.get("result") == Some(&json!({})) {
            state.counters.pongs.fetch_add(1, Ordering::SeqCst);
        }
        return status(StatusCode::ACCEPTED);
    };
    let Some(id) = message.get("id").cloned() else {
        return status(StatusCode::ACCEPTED);
    };

    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "test-math-server", "version": "0.0.1" },
        }),
        "tools/list" => json!({
            "tools": state
                .options
                .tools
                .iter()
                .map(|name| json!({
                    "name": name,
                    "description": format!("{name} two integers"),
                    "inputSchema": {
                        "type": "object",
                        "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
                        "required": ["a", "b"],
                    },
                }))
                .collect::<Vec<_>>(),
        }),
        "tools/call" => {
            state.counters.calls.fetch_add(1, Ordering::SeqCst);
            if state.options.ping_before_result {
                let ping = json!({ "jsonrpc": "2.0", "id": "srv-ping", "method": "ping" });
                let _ = tx.send(event("message", &ping.to_string()));
            }
            call_tool(&state.options, &params)
        }
        other => {
            let error = json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("unknown method {other}") },
            });
            let _ = tx.send(event("message", &error.to_string()));
            return status(StatusCode::ACCEPTED);
        }
    };

    let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
    let _ = tx.send(event("message", &reply.to_string()));
    status(StatusCode::ACCEPTED)
}

fn call_tool(options: &ServerOptions, params: &Value) -> Value {
    if options.fail_calls {
        return json!({
            "content": [{ "type": "text", "text": "arithmetic unit offline" }],
            "isError": true,
        });
    }
    let a = params["arguments"]["a"].as_i64().unwrap_or_default();
    let b = params["arguments"]["b"].as_i64().unwrap_or_default();
    match params["name"].as_str() {
        Some("add") => json!({
            "content": [{ "type": "text", "text": (a + b).to_string() }],
            "isError": false,
        }),
        Some("multiply") => json!({
            "content": [{ "type": "text", "text": (a * b).to_string() }],
            "structuredContent": { "result": a * b },
        }),
        _ => json!({
            "content": [{ "type": "text", "text": "unknown tool" }],
            "isError": true,
        }),
    }
}
