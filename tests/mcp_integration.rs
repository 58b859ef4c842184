//! Integration tests for MCP protocol handling.
//!
//! These tests verify the server's JSON-RPC 2.0 handling end to end: message
//! parsing, session gating, tool routing, streaming notifications and the
//! serving loop over an in-memory pipe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use toolhost_mcp::capabilities::{CapabilityRegistry, Feature};
use toolhost_mcp::groups::builtin_registry;
use toolhost_mcp::mcp::dispatch::Notifier;
use toolhost_mcp::mcp::protocol::{parse_message, ErrorCode};
use toolhost_mcp::mcp::{
    Dispatcher, ErrorMapper, McpServer, Message, RequestContext, RequestId, ServerContext,
    ServerInfo, SessionState, StreamingConfig, StreamingEngine,
};

fn context_with(configs: HashMap<String, Value>, production: bool) -> ServerContext {
    ServerContext::new(
        ServerInfo::default(),
        CapabilityRegistry::default(),
        builtin_registry(configs).unwrap(),
        StreamingEngine::new(StreamingConfig::default()),
        ErrorMapper::new(production),
    )
}

fn dispatcher() -> Dispatcher {
    Dispatcher::with_builtin_handlers(Arc::new(context_with(HashMap::new(), true)))
}

async fn initialised_context(dispatcher: &Dispatcher) -> RequestContext {
    let ctx = RequestContext::new(Arc::new(SessionState::new()));
    let init = Message::request(0, "initialize", Some(json!({})));
    dispatcher.dispatch(&ctx, &init).await.unwrap();
    ctx
}

fn envelope_json(envelope: &toolhost_mcp::mcp::Envelope) -> Value {
    serde_json::to_value(envelope).unwrap()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let message = parse_message(json).unwrap();
    assert_eq!(message.method, "initialize");
    assert_eq!(message.id, Some(RequestId::Number(1)));
    assert!(!message.is_notification());
}

#[test]
fn test_parse_tool_route_with_string_id() {
    let json = r#"{"jsonrpc": "2.0", "id": "req-7", "method": "math.add", "params": {"a": 1, "b": 2}}"#;

    let message = parse_message(json).unwrap();
    assert_eq!(message.id, Some(RequestId::String("req-7".to_string())));
    assert_eq!(message.method, "math.add");
}

#[test]
fn test_parse_notification() {
    let message = parse_message(r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#).unwrap();
    assert!(message.is_notification());
}

#[test]
fn test_parse_message_without_id_is_not_a_notification() {
    let message = parse_message(r#"{"method": "ping"}"#).unwrap();
    assert_eq!(message.id, None);
    assert!(!message.is_notification());
}

#[test]
fn test_parse_invalid_json() {
    let rejected = parse_message("not valid json").unwrap_err();
    assert_eq!(rejected.error.code(), ErrorCode::ParseError);
    assert_eq!(rejected.id, None);
}

#[test]
fn test_parse_wrong_version_echoes_id() {
    let rejected = parse_message(r#"{"jsonrpc": "1.0", "id": 9, "method": "ping"}"#).unwrap_err();
    assert_eq!(rejected.error.code(), ErrorCode::InvalidRequest);
    assert_eq!(rejected.id, Some(RequestId::Number(9)));
}

// =============================================================================
// Session Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_methods_before_initialize_are_rejected() {
    let dispatcher = dispatcher();
    let ctx = RequestContext::new(Arc::new(SessionState::new()));

    for method in ["tools/list", "capabilities/list", "math.add"] {
        let envelope = dispatcher
            .handle(&ctx, &Message::request(1, method, None))
            .await
            .unwrap();
        assert_eq!(envelope.error().unwrap().code, -32600, "{method}");
    }
}

#[tokio::test]
async fn test_ungated_methods_work_before_initialize() {
    let dispatcher = dispatcher();
    let ctx = RequestContext::new(Arc::new(SessionState::new()));

    let ping = dispatcher.handle(&ctx, &Message::request(1, "ping", None)).await.unwrap();
    assert_eq!(ping.result(), Some(&json!({})));

    let health = dispatcher.handle(&ctx, &Message::request(2, "health", None)).await.unwrap();
    assert_eq!(health.result().unwrap()["isHealthy"], true);
}

#[tokio::test]
async fn test_initialize_advertises_capabilities() {
    let dispatcher = dispatcher();
    let ctx = RequestContext::new(Arc::new(SessionState::new()));
    let result = dispatcher
        .dispatch(
            &ctx,
            &Message::request(1, "initialize", Some(json!({"clientInfo": {"name": "it", "version": "1"}}))),
        )
        .await
        .unwrap();

    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "toolhost-mcp");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(ctx.session.is_initialized());
}

#[tokio::test]
async fn test_second_initialize_fails() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(2, "initialize", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(envelope.error().unwrap().code, -32600);
    assert!(ctx.session.is_initialized());
}

// =============================================================================
// Tool Routing Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_returns_full_catalog() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let result = dispatcher
        .dispatch(&ctx, &Message::request(1, "tools/list", None))
        .await
        .unwrap();
    let names: Vec<_> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();

    assert_eq!(
        names,
        ["echo.say", "echo.stream", "math.add", "math.divide", "math.sum_series"]
    );
    let add = &result["tools"][2];
    assert_eq!(add["inputSchema"]["type"], "object");
    assert_eq!(add["inputSchema"]["required"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_direct_route_and_tools_call_agree() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let direct = dispatcher
        .dispatch(&ctx, &Message::request(1, "math.add", Some(json!({"a": 2, "b": 3}))))
        .await
        .unwrap();
    let via_call = dispatcher
        .dispatch(
            &ctx,
            &Message::request(
                2,
                "tools/call",
                Some(json!({"name": "math.add", "arguments": {"a": 2, "b": 3}})),
            ),
        )
        .await
        .unwrap();

    assert_eq!(direct, via_call);
    assert!(direct["content"][0]["text"].as_str().unwrap().contains('5'));
}

#[tokio::test]
async fn test_tool_failure_is_a_result_not_an_error() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(1, "math.divide", Some(json!({"a": 1, "b": 0}))))
        .await
        .unwrap();
    let result = envelope.result().unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"].as_str().unwrap().contains("division by zero"));
}

#[tokio::test]
async fn test_unknown_routes() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let no_method = dispatcher
        .handle(&ctx, &Message::request(1, "no_such_method", None))
        .await
        .unwrap();
    assert_eq!(no_method.error().unwrap().code, -32601);

    let no_group = dispatcher
        .handle(&ctx, &Message::request(2, "nogroup.tool", None))
        .await
        .unwrap();
    assert_eq!(no_group.error().unwrap().code, -32603);

    let no_tool = dispatcher
        .handle(&ctx, &Message::request(3, "math.nothing", None))
        .await
        .unwrap();
    assert_eq!(no_tool.error().unwrap().code, -32603);
}

#[tokio::test]
async fn test_production_mode_hides_internal_detail() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(1, "math.nothing", None))
        .await
        .unwrap();
    let json = envelope_json(&envelope);
    assert_eq!(json["error"]["message"], "Internal error");
    assert!(json["error"].get("data").is_none());
}

#[tokio::test]
async fn test_development_mode_exposes_detail() {
    let dispatcher =
        Dispatcher::with_builtin_handlers(Arc::new(context_with(HashMap::new(), false)));
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(1, "math.nothing", None))
        .await
        .unwrap();
    let json = envelope_json(&envelope);
    assert!(json["error"]["data"]["detail"].as_str().unwrap().contains("nothing"));
}

#[tokio::test]
async fn test_invalid_params_are_client_facing() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(1, "math.add", Some(json!({"a": "two"}))))
        .await
        .unwrap();
    let error = envelope.error().unwrap();
    assert_eq!(error.code, -32602);
    assert_ne!(error.message, "Invalid params");
}

#[tokio::test]
async fn test_disabled_tools_capability() {
    let context = ServerContext::new(
        ServerInfo::default(),
        CapabilityRegistry::from_features(&[Feature::Logging]),
        builtin_registry(HashMap::new()).unwrap(),
        StreamingEngine::new(StreamingConfig::default()),
        ErrorMapper::default(),
    );
    let dispatcher = Dispatcher::with_builtin_handlers(Arc::new(context));
    let ctx = initialised_context(&dispatcher).await;

    let envelope = dispatcher
        .handle(&ctx, &Message::request(1, "tools/list", None))
        .await
        .unwrap();
    assert_eq!(envelope.error().unwrap().code, -32601);

    let capabilities = dispatcher
        .dispatch(&ctx, &Message::request(2, "capabilities/list", None))
        .await
        .unwrap();
    assert_eq!(capabilities["tools"], json!([]));
}

// =============================================================================
// Streaming Through the Dispatcher
// =============================================================================

fn chunk_of(line: &str) -> Value {
    let notification: Value = serde_json::from_str(line).unwrap();
    assert_eq!(notification["method"], "notifications/stream/chunk");
    notification["params"]["chunk"].clone()
}

#[tokio::test]
async fn test_tools_stream_sends_chunks_then_summary() {
    let dispatcher = dispatcher();
    let ctx = initialised_context(&dispatcher).await;
    let (tx, mut rx) = mpsc::channel(64);
    let ctx = ctx.with_notifier(Notifier::new(tx));

    let result = dispatcher
        .dispatch(
            &ctx,
            &Message::request(
                5,
                "tools/stream",
                Some(json!({"name": "echo.stream", "arguments": {"message": "a b c"}})),
            ),
        )
        .await
        .unwrap();
    drop(ctx);

    let mut chunks = Vec::new();
    while let Some(line) = rx.recv().await {
        chunks.push(chunk_of(&line));
    }

    assert_eq!(result["chunks"], chunks.len());
    assert_eq!(result["completed"], true);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk["sequenceNumber"], i);
        assert_eq!(chunk["isFinal"], i == chunks.len() - 1);
    }
    let words: Vec<_> = chunks
        .iter()
        .filter(|c| c["type"] == "Content")
        .map(|c| c["content"].clone())
        .collect();
    assert_eq!(words, [json!("a"), json!("b"), json!("c")]);
}

#[tokio::test]
async fn test_cancelled_stream_stops_delivery() {
    let configs = HashMap::from([("echo".to_string(), json!({"delay_ms": 50}))]);
    let dispatcher = Arc::new(Dispatcher::with_builtin_handlers(Arc::new(context_with(
        configs, true,
    ))));
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(64);
    let ctx = initialised_context(&dispatcher)
        .await
        .with_cancel(cancel.clone())
        .with_notifier(Notifier::new(tx));

    let running = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let message = Message::request(
                1,
                "tools/stream",
                Some(json!({"name": "echo.stream", "arguments": {"message": "one two three four five six"}})),
            );
            dispatcher.dispatch(&ctx, &message).await
        })
    };

    let first = chunk_of(&rx.recv().await.unwrap());
    assert_eq!(first["sequenceNumber"], 0);
    cancel.cancel();

    let result = running.await.unwrap().unwrap();
    assert_eq!(result["completed"], false);

    let mut delivered = vec![first];
    while let Some(line) = rx.recv().await {
        delivered.push(chunk_of(&line));
    }
    assert_eq!(result["chunks"], delivered.len());
    assert!(delivered.iter().all(|c| c["isFinal"] == false));
    assert!(delivered.len() < 8);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_client_stream_times_out_and_releases_slot() {
    let server = ServerContext::new(
        ServerInfo::default(),
        CapabilityRegistry::default(),
        builtin_registry(HashMap::new()).unwrap(),
        StreamingEngine::new(StreamingConfig {
            max_duration: Duration::from_secs(5),
            ..StreamingConfig::default()
        }),
        ErrorMapper::new(true),
    );
    let dispatcher = Dispatcher::with_builtin_handlers(Arc::new(server));

    // Room for one notification; the client never reads it.
    let (tx, _stalled) = mpsc::channel(1);
    let ctx = initialised_context(&dispatcher)
        .await
        .with_notifier(Notifier::new(tx));

    let err = dispatcher
        .dispatch(
            &ctx,
            &Message::request(
                9,
                "tools/stream",
                Some(json!({"name": "math.sum_series", "arguments": {"count": 100}})),
            ),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Timeout);
    assert_eq!(err.code().code(), -32001);
    assert_eq!(dispatcher.server().streaming.open_streams(), 0);
}

// =============================================================================
// Serving Loop Tests
// =============================================================================

async fn serve(input: Vec<Value>) -> Vec<Value> {
    let (client, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, mut client_write) = tokio::io::split(client);

    let server = McpServer::from_context(context_with(HashMap::new(), true));
    let serving =
        tokio::spawn(async move { server.serve(BufReader::new(server_read), server_write).await });

    for message in input {
        client_write
            .write_all(format!("{message}\n").as_bytes())
            .await
            .unwrap();
    }
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        out.push(serde_json::from_str(&line).unwrap());
    }
    serving.await.unwrap().unwrap();
    out
}

fn response_for(out: &[Value], id: i64) -> &Value {
    out.iter()
        .find(|v| v["id"] == id && v.get("method").is_none())
        .unwrap_or_else(|| panic!("no response for id {id}"))
}

#[tokio::test]
async fn test_full_session_over_pipe() {
    let out = serve(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "math.add", "params": {"a": 40, "b": 2}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "missing"}),
    ])
    .await;

    assert_eq!(out.len(), 4);
    assert_eq!(response_for(&out, 1)["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response_for(&out, 2)["result"]["tools"].as_array().unwrap().len(), 5);
    assert!(response_for(&out, 3)["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("42"));
    assert_eq!(response_for(&out, 4)["error"]["code"], -32601);
}

#[tokio::test]
async fn test_stream_notifications_precede_final_response() {
    let out = serve(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/stream",
               "params": {"name": "math.sum_series", "arguments": {"count": 4}}}),
    ])
    .await;

    let stream: Vec<_> = out
        .iter()
        .filter(|v| v["method"] == "notifications/stream/chunk")
        .collect();
    assert!(stream.iter().all(|n| n["params"]["requestId"] == 2));

    let final_position = out
        .iter()
        .position(|v| v["id"] == 2 && v.get("method").is_none())
        .unwrap();
    assert_eq!(final_position, out.len() - 1);

    let summary = &out[final_position]["result"];
    assert_eq!(summary["chunks"], stream.len());
    assert_eq!(summary["completed"], true);

    let last = &stream[stream.len() - 1]["params"]["chunk"];
    assert_eq!(last["type"], "Complete");
    assert_eq!(last["content"]["total"], 10);
}

#[tokio::test]
async fn test_request_without_id_gets_null_id_reply() {
    let out = serve(vec![
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "ping"}),
    ])
    .await;

    assert_eq!(out.len(), 2);
    assert!(out.iter().any(|v| v["id"].is_null() && v["result"] == json!({})));
}
