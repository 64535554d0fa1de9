// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The tool IPC server: a local HTTP listener that sandboxed code reaches
//! to invoke host tools. Binds in a background task; `start()` blocks on a
//! readiness probe, `stop()` signals shutdown and joins within a bound.

use crate::domain::execution::ToolTrace;
use crate::domain::tool::{InvocationContext, Tool};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ToolServerError {
    #[error("tool server failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("tool server did not become ready within {0:?}")]
    NotReady(Duration),
}

#[derive(Debug, Deserialize)]
struct ToolCallRequest {
    tool_name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolCallResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct ServerState {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: RwLock<InvocationContext>,
    traces: RwLock<Vec<ToolTrace>>,
}

/// Owns the tool registry, the currently-installed invocation context, and
/// the trace buffer shared by every in-flight tool call.
pub struct ToolExecutionServer {
    state: Arc<ServerState>,
    addr: SocketAddr,
    handle: RwLock<Option<JoinHandle<()>>>,
    shutdown: RwLock<Option<oneshot::Sender<()>>>,
}

impl ToolExecutionServer {
    pub fn new(host: &str, port: u16, tools: Vec<Arc<dyn Tool>>) -> Self {
        let addr: SocketAddr = format!("{host}:{port}").parse().expect("valid bind address");
        let mut by_name = HashMap::new();
        for tool in tools {
            by_name.insert(tool.name().to_string(), tool);
        }
        Self {
            state: Arc::new(ServerState {
                tools: by_name,
                context: RwLock::new(InvocationContext::default()),
                traces: RwLock::new(Vec::new()),
            }),
            addr,
            handle: RwLock::new(None),
            shutdown: RwLock::new(None),
        }
    }

    /// Install the context read by the next batch of tool calls. Called by
    /// the controller before each sandbox execution; not required to be
    /// thread-safe against calls from a still-running prior execution.
    pub fn set_context(&self, context: InvocationContext) {
        *self.state.context.write() = context;
    }

    pub fn clear_traces(&self) {
        self.state.traces.write().clear();
    }

    pub fn traces(&self) -> Vec<ToolTrace> {
        self.state.traces.read().clone()
    }

    /// Bind and serve in a background task, then block until a readiness
    /// probe succeeds. Re-entrant: a second call while already running is
    /// a no-op.
    pub async fn start(&self) -> Result<(), ToolServerError> {
        if self.handle.read().is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|err| ToolServerError::Bind(self.addr, err))?;
        let router = build_router(self.state.clone());
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(err) = result {
                warn!("tool execution server exited with error: {err}");
            }
        });

        *self.handle.write() = Some(handle);
        *self.shutdown.write() = Some(tx);

        self.wait_for_ready().await
    }

    async fn wait_for_ready(&self) -> Result<(), ToolServerError> {
        let deadline = Instant::now() + READINESS_TIMEOUT;
        while Instant::now() < deadline {
            if tokio::net::TcpStream::connect(self.addr).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
        Err(ToolServerError::NotReady(READINESS_TIMEOUT))
    }

    /// Signal shutdown and join the background task.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.write().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.write().take() {
            let _ = handle.await;
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/tool_call", post(handle_tool_call))
        .route("/tool_trace", get(handle_get_traces).delete(handle_clear_traces))
        .route("/health", get(handle_health))
        .route("/tools", get(handle_list_tools))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_tool_call(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ToolCallRequest>,
) -> impl IntoResponse {
    let Some(tool) = state.tools.get(&request.tool_name).cloned() else {
        let trace = ToolTrace {
            tool_name: request.tool_name.clone(),
            args: request.args.clone(),
            result: None,
            error: Some("tool not found".to_string()),
            success: false,
            duration_ms: 0.0,
        };
        state.traces.write().push(trace);
        return (
            StatusCode::NOT_FOUND,
            Json(ToolCallResponse { result: None, success: false, error: Some("tool not found".to_string()) }),
        );
    };

    let context = state.context.read().clone();
    let started = Instant::now();
    let outcome = tool.invoke(request.args.clone(), &context).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    let (status, response, trace) = match outcome {
        Ok(result) => (
            StatusCode::OK,
            ToolCallResponse { result: Some(result.clone()), success: true, error: None },
            ToolTrace {
                tool_name: request.tool_name.clone(),
                args: request.args.clone(),
                result: Some(result),
                error: None,
                success: true,
                duration_ms,
            },
        ),
        Err(err) => {
            let message = err.to_string();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ToolCallResponse { result: None, success: false, error: Some(message.clone()) },
                ToolTrace {
                    tool_name: request.tool_name.clone(),
                    args: request.args.clone(),
                    result: None,
                    error: Some(message),
                    success: false,
                    duration_ms,
                },
            )
        }
    };

    state.traces.write().push(trace);
    (status, Json(response))
}

async fn handle_get_traces(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.traces.read().clone())
}

async fn handle_clear_traces(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.traces.write().clear();
    Json(json!({"status": "cleared"}))
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

async fn handle_list_tools(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.tools.keys().cloned().collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{ToolError, ToolParameter};
    use async_trait::async_trait;
    use tower::ServiceExt;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters(&self) -> &[ToolParameter] {
            &[]
        }
        async fn invoke(
            &self,
            args: serde_json::Value,
            _ctx: &InvocationContext,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(args)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> &[ToolParameter] {
            &[]
        }
        async fn invoke(
            &self,
            _args: serde_json::Value,
            _ctx: &InvocationContext,
        ) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed("boom".to_string()))
        }
    }

    fn test_state() -> Arc<ServerState> {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert("echo".to_string(), Arc::new(EchoTool));
        tools.insert("boom".to_string(), Arc::new(FailingTool));
        Arc::new(ServerState {
            tools,
            context: RwLock::new(InvocationContext::default()),
            traces: RwLock::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let router = build_router(test_state());
        let request = axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_tool_returns_404_and_records_trace() {
        let state = test_state();
        let router = build_router(state.clone());
        let body = serde_json::to_vec(&json!({"tool_name": "missing", "args": {}})).unwrap();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/tool_call")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.traces.read().len(), 1);
        assert!(!state.traces.read()[0].success);
    }

    #[tokio::test]
    async fn tool_error_returns_500_and_records_trace() {
        let state = test_state();
        let router = build_router(state.clone());
        let body = serde_json::to_vec(&json!({"tool_name": "boom", "args": {}})).unwrap();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/tool_call")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.traces.read().len(), 1);
    }

    #[tokio::test]
    async fn successful_call_returns_200_with_result() {
        let state = test_state();
        let router = build_router(state);
        let body = serde_json::to_vec(&json!({"tool_name": "echo", "args": {"x": 1}})).unwrap();
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/tool_call")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tool_trace_delete_clears_buffer() {
        let state = test_state();
        state.traces.write().push(ToolTrace {
            tool_name: "echo".to_string(),
            args: json!({}),
            result: None,
            error: None,
            success: true,
            duration_ms: 1.0,
        });
        let router = build_router(state.clone());
        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri("/tool_trace")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.traces.read().is_empty());
    }

    #[tokio::test]
    async fn tools_endpoint_lists_registered_names() {
        let state = test_state();
        let router = build_router(state);
        let request = axum::http::Request::builder().uri("/tools").body(axum::body::Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
