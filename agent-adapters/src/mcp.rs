//! Model Context Protocol client over the HTTP+SSE transport.
//!
//! A session is one long-lived `GET` on the stream URL plus short `POST`s to
//! the message endpoint announced by the server. Responses travel back over
//! the stream and are matched to waiting requests by id.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agent_primitives::{IdentityToken, ServiceEndpoint};
use async_trait::async_trait;
use hyper::body::HttpBody;
use hyper::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::{Body, Request, StatusCode, Uri};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::http_client::{HyperClient, build_https_client, read_body};
use crate::jsonrpc::{
    IncomingMessage, JsonRpcErrorObject, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, RequestId,
};
use crate::sse::SseDecoder;
use crate::traits::{
    AdapterError, AdapterResult, RemoteToolDescriptor, SessionConnector, ToolSession,
};

/// MCP revision spoken by this client.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";
const EVENT_STREAM: &str = "text/event-stream";

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

/// Settings shared by all sessions opened through an [`SseConnector`].
#[derive(Clone, Debug)]
pub struct SseConfig {
    timeout: Duration,
    client_name: String,
    client_version: String,
}

impl SseConfig {
    /// Creates a configuration identifying the client by name and version.
    #[must_use]
    pub fn new(client_name: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            timeout: Duration::from_secs(30),
            client_name: client_name.into(),
            client_version: client_version.into(),
        }
    }

    /// Bounds each network step (connect, handshake, discovery, call).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-step timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

/// Opens MCP sessions over HTTP+SSE.
#[derive(Clone)]
pub struct SseConnector {
    client: HyperClient,
    config: SseConfig,
}

impl fmt::Debug for SseConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SseConnector {
    /// Creates a connector with its own HTTPS client.
    #[must_use]
    pub fn new(config: SseConfig) -> Self {
        Self {
            client: build_https_client(),
            config,
        }
    }

    async fn open_stream(&self, sse_url: &Url, authorization: &HeaderValue) -> AdapterResult<Body> {
        let uri = to_uri(sse_url)?;
        let request = Request::get(uri)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .header(AUTHORIZATION, authorization.clone())
            .body(Body::empty())
            .map_err(|err| AdapterError::configuration(format!("invalid stream request: {err}")))?;

        let response = timeout(self.config.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::timeout("event stream connect"))?
            .map_err(|err| {
                AdapterError::connection(format!("event stream connect failed: {err}"))
            })?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AdapterError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = read_body(response.into_body()).await.unwrap_or_default();
            return Err(AdapterError::connection(format!(
                "event stream returned {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM) {
            warn!(content_type, "event stream served with unexpected content type");
        }

        Ok(response.into_body())
    }
}

#[async_trait]
impl SessionConnector for SseConnector {
    type Session = SseSession;

    async fn connect(
        &self,
        endpoint: &ServiceEndpoint,
        token: &IdentityToken,
    ) -> AdapterResult<SseSession> {
        let sse_url = endpoint
            .sse_url()
            .map_err(|err| AdapterError::configuration(err.to_string()))?;
        let authorization = HeaderValue::from_str(&token.bearer_header())
            .map_err(|_| AdapterError::configuration("token is not a valid header value"))?;

        debug!(url = %sse_url, "opening event stream");
        let body = self.open_stream(&sse_url, &authorization).await?;

        let pending: Pending = Arc::default();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(
            EventReader {
                client: self.client.clone(),
                authorization: authorization.clone(),
                sse_url,
                pending: Arc::clone(&pending),
                endpoint_tx: Some(endpoint_tx),
                post_uri: None,
                deadline: self.config.timeout,
            }
            .run(body),
        );

        let mut session = SseSession {
            client: self.client.clone(),
            authorization,
            post_uri: Uri::default(),
            pending,
            reader: Some(reader),
            next_id: 1,
            config: self.config.clone(),
        };

        session.post_uri = match timeout(self.config.timeout, endpoint_rx).await {
            Err(_) => return Err(AdapterError::timeout("endpoint announcement")),
            Ok(Err(_)) => {
                return Err(AdapterError::connection(
                    "event stream closed before announcing the message endpoint",
                ));
            }
            Ok(Ok(announced)) => announced?,
        };

        session.initialize().await?;
        info!(endpoint = %endpoint, "MCP session established");
        Ok(session)
    }
}

/// An initialized MCP session. Dropping it closes the event stream.
pub struct SseSession {
    client: HyperClient,
    authorization: HeaderValue,
    post_uri: Uri,
    pending: Pending,
    reader: Option<JoinHandle<()>>,
    next_id: i64,
    config: SseConfig,
}

impl fmt::Debug for SseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseSession")
            .field("post_uri", &self.post_uri)
            .field("open", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

impl SseSession {
    async fn initialize(&mut self) -> AdapterResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.config.client_name,
                "version": self.config.client_version,
            },
        });
        let result = self
            .request("initialize", Some(params))
            .await?
            .map_err(|err| AdapterError::protocol(format!("initialize rejected: {err}")))?;

        let server: InitializeResult = serde_json::from_value(result)
            .map_err(|err| AdapterError::protocol(format!("invalid initialize result: {err}")))?;
        if server.protocol_version != PROTOCOL_VERSION {
            debug!(
                server_version = %server.protocol_version,
                "server negotiated a different protocol revision"
            );
        }
        if let Some(info) = server.server_info {
            debug!(server = %info.name, version = %info.version, "server identified");
        }

        self.post(&JsonRpcNotification::new("notifications/initialized", None))
            .await
    }

    async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> AdapterResult<Result<Value, JsonRpcErrorObject>> {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);

        let request = JsonRpcRequest::new(id.clone(), method, params);
        debug!(%id, method, "sending request");
        if let Err(err) = self.post(&request).await {
            lock(&self.pending).remove(&id);
            return Err(err);
        }

        match timeout(self.config.timeout, rx).await {
            Ok(Ok(response)) => Ok(response.into_result()),
            Ok(Err(_)) => Err(AdapterError::connection(format!(
                "event stream closed while awaiting `{method}`"
            ))),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(AdapterError::timeout(format!("`{method}` request")))
            }
        }
    }

    async fn post<T: serde::Serialize>(&self, message: &T) -> AdapterResult<()> {
        post_message(
            &self.client,
            &self.post_uri,
            &self.authorization,
            message,
            self.config.timeout,
        )
        .await
    }
}

#[async_trait]
impl ToolSession for SseSession {
    async fn list_tools(&mut self) -> AdapterResult<Vec<RemoteToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|cursor| json!({ "cursor": cursor }));
            let result = self
                .request("tools/list", params)
                .await?
                .map_err(|err| AdapterError::protocol(format!("tools/list rejected: {err}")))?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|err| {
                    AdapterError::protocol(format!("invalid tools/list result: {err}"))
                })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if cursor.as_ref() == Some(&next) => {
                    return Err(AdapterError::protocol("tools/list repeated its cursor"));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = tools.len(), "discovered remote tools");
        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> AdapterResult<Value> {
        let params = json!({ "name": name, "arguments": arguments });
        let result = self
            .request("tools/call", Some(params))
            .await?
            .map_err(|err| AdapterError::remote(err.to_string()))?;
        tool_result_value(result)
    }

    fn teardown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            lock(&self.pending).clear();
            info!("MCP session closed");
        }
    }
}

impl Drop for SseSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct EventReader {
    client: HyperClient,
    authorization: HeaderValue,
    sse_url: Url,
    pending: Pending,
    endpoint_tx: Option<oneshot::Sender<AdapterResult<Uri>>>,
    post_uri: Option<Uri>,
    deadline: Duration,
}

impl EventReader {
    async fn run(mut self, mut body: Body) {
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.data().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(error = %err, "event stream read failed");
                    break;
                }
            };

            let events = match decoder.feed(&chunk) {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, "abandoning event stream");
                    break;
                }
            };

            for event in events {
                match event.event_type() {
                    ENDPOINT_EVENT => self.on_endpoint(event.data()),
                    MESSAGE_EVENT => self.on_message(event.data()).await,
                    other => debug!(event = other, "ignoring unknown event type"),
                }
            }
        }

        debug!("event stream ended");
        // Dropping the senders wakes every waiter with a closed-channel error.
        lock(&self.pending).clear();
    }

    fn on_endpoint(&mut self, data: &str) {
        let resolved = resolve_endpoint(&self.sse_url, data);
        if let Ok(uri) = &resolved {
            debug!(endpoint = %uri, "message endpoint announced");
            self.post_uri = Some(uri.clone());
        }
        match self.endpoint_tx.take() {
            Some(tx) => {
                let _ = tx.send(resolved);
            }
            None => warn!("ignoring repeated endpoint announcement"),
        }
    }

    async fn on_message(&self, data: &str) {
        let messages = match IncomingMessage::parse_batch(data) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "dropping malformed server message");
                return;
            }
        };

        for message in messages {
            match message {
                IncomingMessage::Response(response) => {
                    let waiter = lock(&self.pending).remove(response.id());
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => warn!(id = %response.id(), "response for unknown request"),
                    }
                }
                IncomingMessage::Request { id, method, .. } => self.answer(id, &method).await,
                IncomingMessage::Notification { method, .. } => {
                    debug!(method, "server notification");
                }
            }
        }
    }

    /// Answers a server request inline so the post ends with the session.
    async fn answer(&self, id: RequestId, method: &str) {
        let Some(post_uri) = &self.post_uri else {
            warn!(method, "server request before endpoint announcement");
            return;
        };
        let response = if method == "ping" {
            JsonRpcResponse::success(id, json!({}))
        } else {
            JsonRpcResponse::failure(
                id,
                JsonRpcErrorObject {
                    code: METHOD_NOT_FOUND,
                    message: format!("method `{method}` is not supported by this client"),
                    data: None,
                },
            )
        };

        if let Err(err) = post_message(
            &self.client,
            post_uri,
            &self.authorization,
            &response,
            self.deadline,
        )
        .await
        {
            warn!(error = %err, "failed to answer server request");
        }
    }
}

async fn post_message<T: serde::Serialize>(
    client: &HyperClient,
    uri: &Uri,
    authorization: &HeaderValue,
    message: &T,
    deadline: Duration,
) -> AdapterResult<()> {
    let body = serde_json::to_vec(message)
        .map_err(|err| AdapterError::protocol(format!("failed to encode message: {err}")))?;
    let request = Request::post(uri.clone())
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, authorization.clone())
        .body(Body::from(body))
        .map_err(|err| AdapterError::configuration(format!("invalid message request: {err}")))?;

    let response = timeout(deadline, client.request(request))
        .await
        .map_err(|_| AdapterError::timeout("message post"))?
        .map_err(|err| AdapterError::connection(format!("message post failed: {err}")))?;

    let status = response.status();
    let body = read_body(response.into_body()).await?;
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(AdapterError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(AdapterError::connection(format!(
            "message endpoint returned {status}: {}",
            String::from_utf8_lossy(&body)
        )));
    }
    Ok(())
}

/// Resolves the announced message endpoint against the stream URL.
///
/// The endpoint must share the stream's origin so the bearer token is never
/// sent to a different host.
fn resolve_endpoint(sse_url: &Url, announced: &str) -> AdapterResult<Uri> {
    let announced = announced.trim();
    if announced.is_empty() {
        return Err(AdapterError::protocol("empty endpoint announcement"));
    }
    let resolved = sse_url
        .join(announced)
        .map_err(|err| AdapterError::protocol(format!("invalid endpoint `{announced}`: {err}")))?;
    if resolved.origin() != sse_url.origin() {
        return Err(AdapterError::protocol(format!(
            "endpoint `{resolved}` is not on the stream's origin"
        )));
    }
    to_uri(&resolved)
}

fn to_uri(url: &Url) -> AdapterResult<Uri> {
    url.as_str()
        .parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid url `{url}`: {err}")))
}

fn lock(
    pending: &Pending,
) -> std::sync::MutexGuard<'_, HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    #[serde(default, rename = "serverInfo")]
    server_info: Option<ServerInfo>,
}

#[derive(Deserialize)]
struct ServerInfo {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<RemoteToolDescriptor>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default, rename = "structuredContent")]
    structured_content: Option<Value>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

/// Reduces an MCP `tools/call` result to a single value.
///
/// Preference order: `structuredContent.result`, `structuredContent`, the
/// single text item parsed as JSON (or kept as a string), then the raw
/// content list.
///
/// # Errors
///
/// Returns [`AdapterError::Remote`] when the result is flagged `isError` and
/// [`AdapterError::Protocol`] when it is not a call result at all.
pub fn tool_result_value(result: Value) -> AdapterResult<Value> {
    let result: CallToolResult = serde_json::from_value(result)
        .map_err(|err| AdapterError::protocol(format!("invalid tools/call result: {err}")))?;

    let texts: Vec<&str> = result
        .content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();

    if result.is_error {
        let reason = if texts.is_empty() {
            "remote tool reported an error".to_owned()
        } else {
            texts.join("\n")
        };
        return Err(AdapterError::remote(reason));
    }

    if let Some(structured) = result.structured_content {
        return Ok(match structured {
            Value::Object(mut fields) if fields.contains_key("result") => {
                fields.remove("result").unwrap_or(Value::Null)
            }
            other => other,
        });
    }

    if let ([text], 1) = (texts.as_slice(), result.content.len()) {
        return Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String((*text).to_owned())));
    }
    if result.content.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Array(result.content))
}
