//! Client for the telemetry tool server.
//!
//! The server speaks MCP over the streamable HTTP transport. The protocol
//! side (handshake, session id, JSON-RPC envelopes, SSE framing) is handled
//! by `rmcp`; this module supplies the HTTP plumbing on top of the shared
//! `reqwest` client and maps tool listings and tool results into the
//! analyst's own types. The session is opened on first use; a failed
//! handshake is retried on the next call.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Content, Implementation,
    PaginatedRequestParam, ProtocolVersion, RawContent, Tool,
};
use rmcp::service::{RunningService, ServiceError};
use rmcp::transport::common::http_header::{
    EVENT_STREAM_MIME_TYPE, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID, JSON_MIME_TYPE,
};
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpClientTransportConfig, StreamableHttpError,
    StreamableHttpPostResponse,
};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient};
use serde_json::{Map, Value};
use sse_stream::{Sse, SseStream};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{ToolContent, ToolError, ToolExecutor, ToolOutput, ToolRegistry};
use crate::types::{ToolDescriptor, ToolSchema};

type Session = RunningService<RoleClient, AnalystClientHandler>;

pub struct McpClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    session: OnceCell<Session>,
}

#[derive(Clone)]
struct AnalystClientHandler {
    info: ClientInfo,
}

impl ClientHandler for AnalystClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::LATEST,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            icons: None,
            website_url: None,
        },
    }
}

// --- HTTP plumbing for the rmcp transport ---

#[derive(Clone)]
struct TelemetryHttpClient {
    client: reqwest::Client,
}

impl StreamableHttpClient for TelemetryHttpClient {
    type Error = reqwest::Error;

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> Result<BoxStream<'static, Result<Sse, SseError>>, StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .get(uri.as_ref())
            .header(ACCEPT, [EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE].join(", "))
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(last_event_id) = last_event_id {
            request = request.header(HEADER_LAST_EVENT_ID, last_event_id);
        }
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        let response = response.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);
        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) || ct.starts_with(JSON_MIME_TYPE) => {
                Ok(SseStream::from_byte_stream(response.bytes_stream()).boxed())
            }
            _ => Err(StreamableHttpError::UnexpectedContentType(content_type)),
        }
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session: Arc<str>,
        auth_token: Option<String>,
    ) -> Result<(), StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .delete(uri.as_ref())
            .header(HEADER_SESSION_ID, session.as_ref());
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: rmcp::model::ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_token: Option<String>,
    ) -> Result<StreamableHttpPostResponse, StreamableHttpError<Self::Error>> {
        let mut request = self
            .client
            .post(uri.as_ref())
            .header(ACCEPT, [EVENT_STREAM_MIME_TYPE, JSON_MIME_TYPE].join(", "));
        if let Some(session_id) = session_id {
            request = request.header(HEADER_SESSION_ID, session_id.as_ref());
        }
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.json(&message).send().await?.error_for_status()?;
        let status = response.status();
        if matches!(
            status,
            reqwest::StatusCode::ACCEPTED | reqwest::StatusCode::NO_CONTENT
        ) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);

        match content_type.as_deref() {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {
                let events = SseStream::from_byte_stream(response.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(events, session_id))
            }
            Some(ct) if ct.starts_with(JSON_MIME_TYPE) => {
                let message: rmcp::model::ServerJsonRpcMessage = response.json().await?;
                Ok(StreamableHttpPostResponse::Json(message, session_id))
            }
            _ => {
                // Some servers acknowledge notifications with 200 and no body.
                let bytes = response.bytes().await?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(StreamableHttpPostResponse::Accepted);
                }
                match serde_json::from_slice::<rmcp::model::ServerJsonRpcMessage>(&bytes) {
                    Ok(message) => Ok(StreamableHttpPostResponse::Json(message, session_id)),
                    Err(_) => Err(StreamableHttpError::UnexpectedContentType(content_type)),
                }
            }
        }
    }
}

// --- Client ---

impl McpClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            timeout,
            session: OnceCell::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn session(&self) -> Result<&Session, ToolError> {
        self.session.get_or_try_init(|| self.connect()).await
    }

    async fn connect(&self) -> Result<Session, ToolError> {
        let transport = StreamableHttpClientTransport::with_client(
            TelemetryHttpClient {
                client: self.client.clone(),
            },
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );
        let handler = AnalystClientHandler {
            info: client_info(),
        };

        let session = tokio::time::timeout(self.timeout, rmcp::serve_client(handler, transport))
            .await
            .map_err(|_| {
                ToolError::Unavailable(format!(
                    "{}: handshake timed out after {:?}",
                    self.url, self.timeout
                ))
            })?
            .map_err(|e| ToolError::Unavailable(format!("{}: handshake failed: {}", self.url, e)))?;

        debug!(
            url = %self.url,
            server = ?session.peer().peer_info().map(|info| &info.server_info.name),
            "Tool server session initialized"
        );
        Ok(session)
    }

    /// Await one request with the configured timeout.
    async fn bounded<T>(
        &self,
        method: &str,
        request: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ToolError> {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                ToolError::Unavailable(format!(
                    "{}: {} timed out after {:?}",
                    self.url, method, self.timeout
                ))
            })?
            .map_err(|e| service_error(&self.url, e))
    }
}

fn service_error(url: &str, error: ServiceError) -> ToolError {
    match error {
        ServiceError::McpError(error) => ToolError::Rpc {
            code: i64::from(error.code.0),
            message: error.message.to_string(),
        },
        other => ToolError::Unavailable(format!("{}: {}", url, other)),
    }
}

// --- Mapping into analyst types ---

fn descriptor(tool: Tool) -> Result<ToolDescriptor, serde_json::Error> {
    let input_schema = if tool.input_schema.is_empty() {
        None
    } else {
        Some(serde_json::from_value::<ToolSchema>(Value::Object(
            (*tool.input_schema).clone(),
        ))?)
    };
    Ok(ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema,
    })
}

/// Key tools by name, leaving out any whose schema cannot be read.
fn catalog(tools: Vec<Tool>) -> BTreeMap<String, ToolDescriptor> {
    let mut catalog = BTreeMap::new();
    for tool in tools {
        let name = tool.name.to_string();
        match descriptor(tool) {
            Ok(descriptor) => {
                catalog.insert(name, descriptor);
            }
            Err(e) => warn!(tool = %name, error = %e, "Skipping tool with unreadable schema"),
        }
    }
    catalog
}

fn content_block(content: Content) -> ToolContent {
    match content.raw {
        RawContent::Text(text) => ToolContent::Text(text.text),
        RawContent::Image(image) => ToolContent::Other(image.mime_type),
        RawContent::Resource(_) => ToolContent::Other("resource".to_string()),
        RawContent::Audio(audio) => ToolContent::Other(audio.mime_type),
        RawContent::ResourceLink(link) => ToolContent::Other(link.uri),
    }
}

fn tool_output(result: rmcp::model::CallToolResult) -> Result<ToolOutput, ToolError> {
    let mut output = ToolOutput {
        content: result.content.into_iter().map(content_block).collect(),
    };
    if output.content.is_empty() {
        if let Some(value) = result.structured_content {
            output = ToolOutput::text(value.to_string());
        }
    }

    if result.is_error.unwrap_or(false) {
        let message = output.joined_text();
        return Err(ToolError::Execution(if message.is_empty() {
            "tool reported an error".to_string()
        } else {
            message
        }));
    }
    Ok(output)
}

#[async_trait]
impl ToolRegistry for McpClient {
    async fn list_tools(&self) -> Result<BTreeMap<String, ToolDescriptor>, ToolError> {
        let peer = self.session().await?.peer();
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .bounded(
                    "tools/list",
                    peer.list_tools(Some(PaginatedRequestParam { cursor })),
                )
                .await?;
            tools.extend(page.tools);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(catalog(tools))
    }
}

#[async_trait]
impl ToolExecutor for McpClient {
    async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, ToolError> {
        let peer = self.session().await?.peer();
        let result = self
            .bounded(
                "tools/call",
                peer.call_tool(CallToolRequestParam {
                    name: name.to_string().into(),
                    arguments: Some(arguments),
                }),
            )
            .await?;
        tool_output(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::extract::State;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::tools::FunctionCallManager;

    const SESSION: &str = "netspy-session-1";

    fn tool(value: Value) -> Tool {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_catalog_tolerates_odd_descriptors() {
        let tools = vec![
            tool(json!({
                "name": "get_network_summary",
                "description": "Summary",
                "inputSchema": {"type": "object", "properties": {"duration": {"type": "integer", "default": 60}}}
            })),
            tool(json!({
                "name": "list_connections",
                "description": null,
                "inputSchema": {"type": "object", "properties": {"pid": {"type": ["integer", "null"]}}}
            })),
            tool(json!({
                "name": "analyze_patterns",
                "inputSchema": {"type": "object", "properties": {"verbose": true}}
            })),
        ];

        let catalog = catalog(tools);

        assert_eq!(
            catalog.keys().collect::<Vec<_>>(),
            vec!["get_network_summary", "list_connections"]
        );
        let connections = &catalog["list_connections"];
        assert_eq!(connections.description, "");
        let schema = connections.input_schema.as_ref().unwrap();
        assert_eq!(schema.properties["pid"].schema_type.as_deref(), Some("integer"));
    }

    #[test]
    fn test_empty_input_schema_is_no_schema() {
        let descriptor = descriptor(tool(json!({"name": "get_stats", "inputSchema": {}}))).unwrap();
        assert!(descriptor.input_schema.is_none());
    }

    #[test]
    fn test_tool_output_mixed_content() {
        let result: rmcp::model::CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Total: 12"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "text", "text": "Unique destinations: 3"}
            ]
        }))
        .unwrap();

        let output = tool_output(result).unwrap();
        assert_eq!(output.content[1], ToolContent::Other("image/png".to_string()));
        assert_eq!(output.joined_text(), "Total: 12\nUnique destinations: 3");
    }

    #[test]
    fn test_tool_output_error_flag() {
        let result: rmcp::model::CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "eBPF server unreachable"}],
            "isError": true
        }))
        .unwrap();

        let err = tool_output(result).unwrap_err();
        assert_eq!(err.to_string(), "eBPF server unreachable");
    }

    // --- Local tool server ---

    #[derive(Clone, Default)]
    struct TelemetryServer {
        /// Number of initialize requests answered with HTTP 500 first.
        failing_initializes: usize,
        initialize_attempts: Arc<AtomicUsize>,
        sessions_seen: Arc<Mutex<Vec<String>>>,
    }

    fn rpc_result(id: Value, result: Value) -> Response {
        Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
    }

    async fn handle(
        State(server): State<TelemetryServer>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
        let id = body.get("id").cloned().unwrap_or(Value::Null);

        if method == "initialize" {
            let attempt = server.initialize_attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < server.failing_initializes {
                return (StatusCode::INTERNAL_SERVER_ERROR, "warming up").into_response();
            }
            let mut response_headers = HeaderMap::new();
            response_headers.insert("Mcp-Session-Id", HeaderValue::from_static(SESSION));
            let result = json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "netspy-tools", "version": "1.0.0"}
            });
            return (
                StatusCode::OK,
                response_headers,
                Json(json!({"jsonrpc": "2.0", "id": id, "result": result})),
            )
                .into_response();
        }
        if method.starts_with("notifications/") {
            return StatusCode::ACCEPTED.into_response();
        }

        let session = headers
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        server.sessions_seen.lock().unwrap().push(session.clone());
        if session != SESSION {
            return (StatusCode::NOT_FOUND, "unknown session").into_response();
        }

        match method {
            "tools/list" => rpc_result(
                id,
                json!({"tools": [
                    {
                        "name": "get_network_summary",
                        "description": "Summary of recent traffic",
                        "inputSchema": {"type": "object", "properties": {"duration": {"type": "integer", "default": 60}}}
                    },
                    {
                        "name": "list_connections",
                        "description": null,
                        "inputSchema": {"type": "object", "properties": {"pid": {"type": ["integer", "null"]}}}
                    }
                ]}),
            ),
            "tools/call" => match body["params"]["name"].as_str().unwrap_or_default() {
                "get_network_summary" => {
                    let duration = body["params"]["arguments"]["duration"].as_u64().unwrap_or(60);
                    rpc_result(
                        id,
                        json!({"content": [
                            {"type": "text", "text": format!("Window: {}s", duration)},
                            {"type": "text", "text": "Total events: 12"}
                        ]}),
                    )
                }
                "list_connections" => rpc_result(
                    id,
                    json!({"content": [{"type": "text", "text": "eBPF probe detached"}], "isError": true}),
                ),
                other => Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32602, "message": format!("unknown tool: {}", other)}
                }))
                .into_response(),
            },
            _ => rpc_result(id, json!({})),
        }
    }

    async fn serve(server: TelemetryServer) -> SocketAddr {
        let app = Router::new().route("/mcp", post(handle)).with_state(server);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr) -> McpClient {
        McpClient::new(format!("http://{addr}/mcp"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_handshake_list_and_call() {
        let server = TelemetryServer::default();
        let addr = serve(server.clone()).await;
        let client = client(addr);

        let tools = client.list_tools().await.unwrap();
        assert_eq!(
            tools.keys().collect::<Vec<_>>(),
            vec!["get_network_summary", "list_connections"]
        );

        let mut arguments = Map::new();
        arguments.insert("duration".to_string(), json!(300));
        let output = client.execute("get_network_summary", arguments).await.unwrap();
        assert_eq!(output.joined_text(), "Window: 300s\nTotal events: 12");

        let err = client.execute("list_connections", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(ref m) if m == "eBPF probe detached"));

        let err = client.execute("drop_stats", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Rpc { code: -32602, .. }));

        // One handshake, and every later request carried its session id.
        assert_eq!(server.initialize_attempts.load(Ordering::SeqCst), 1);
        let sessions = server.sessions_seen.lock().unwrap();
        assert_eq!(sessions.len(), 4);
        assert!(sessions.iter().all(|s| s == SESSION));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_handshake_is_retried() {
        let server = TelemetryServer {
            failing_initializes: 1,
            ..Default::default()
        };
        let addr = serve(server.clone()).await;
        let client = client(addr);

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(server.initialize_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_discovery_through_the_server() {
        let addr = serve(TelemetryServer::default()).await;
        let client = Arc::new(client(addr));

        let functions = FunctionCallManager::discover(client.as_ref(), client.clone()).await;

        let catalog = functions.catalog();
        let names: Vec<&str> = catalog.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["get_network_summary", "list_connections"]);
        assert_eq!(catalog[1].parameters["properties"]["pid"]["type"], "integer");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_server_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr).list_tools().await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }
}
