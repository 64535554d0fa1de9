// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wraps a [`SandboxAdapter`] with import validation, stub injection,
//! trace/final-answer extraction, and optional history replay.

use crate::application::code_synthesizer::{synthesize, FINAL_ANSWER_MARKER, TOOL_TRACE_MARKER};
use crate::domain::allowlist::{validate_imports, Allowlist};
use crate::domain::execution::{ExtendedExecutionResult, ToolTrace};
use crate::domain::sandbox::{SandboxAdapter, SandboxAdapterError, SandboxInput};
use crate::domain::tool::{InvocationContext, ToolDescriptor};
use crate::infrastructure::tool_server::{ToolExecutionServer, ToolServerError};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors from this layer are all fatal to the current invocation: neither
/// kind is recoverable through the controller's retry-budget loop (spec
/// §4.4/§7 — `AdapterUnavailable` "propagates to caller"; an IPC server
/// that refuses to come up is the same kind of backend failure).
#[derive(Debug, Error)]
pub enum ExecutionEngineError {
    #[error(transparent)]
    Sandbox(#[from] SandboxAdapterError),
    #[error(transparent)]
    ToolServer(#[from] ToolServerError),
}

pub struct ExecutionEngine {
    sandbox: Arc<dyn SandboxAdapter>,
    tools: Vec<ToolDescriptor>,
    ipc_url: String,
    tool_server: Arc<ToolExecutionServer>,
}

impl ExecutionEngine {
    pub fn new(
        sandbox: Arc<dyn SandboxAdapter>,
        tools: Vec<ToolDescriptor>,
        ipc_url: String,
        tool_server: Arc<ToolExecutionServer>,
    ) -> Self {
        Self { sandbox, tools, ipc_url, tool_server }
    }

    /// Run one user-submitted snippet. `prior_successful_code`, when
    /// non-empty (stateful mode), is replayed first to restore
    /// in-interpreter state before `code` executes. `context` is installed
    /// on the IPC server before the sandbox call so concurrent tool
    /// invocations see it (spec §4.5 step 2).
    pub async fn execute(
        &self,
        code: &str,
        allowlist: &Allowlist,
        prior_successful_code: &[&str],
        context: InvocationContext,
    ) -> Result<ExtendedExecutionResult, ExecutionEngineError> {
        let violations = validate_imports(code, allowlist);
        if !violations.is_empty() {
            return Ok(ExtendedExecutionResult {
                stderr: violations.join("\n"),
                ..Default::default()
            });
        }

        self.tool_server.start().await?;
        self.tool_server.set_context(context);
        self.tool_server.clear_traces();

        let mut combined = String::new();
        for prior in prior_successful_code {
            combined.push_str(prior);
            combined.push('\n');
        }
        combined.push_str(code);

        let program = synthesize(&combined, &self.tools, &self.ipc_url);
        let output = self
            .sandbox
            .execute(SandboxInput { code: program, ..Default::default() })
            .await?;

        Ok(extract_traces_and_answer(&output.stdout, output.stderr, output.output_files))
    }
}

/// Line-by-line split of stdout into cleaned output, tool traces, and an
/// optional final answer, per the trace/marker contract.
pub fn extract_traces_and_answer(
    stdout: &str,
    stderr: String,
    output_files: std::collections::HashMap<String, Vec<u8>>,
) -> ExtendedExecutionResult {
    let mut clean_lines = Vec::new();
    let mut tool_traces = Vec::new();
    let mut final_answer = None;
    let mut has_final_answer = false;

    for line in stdout.lines() {
        if let Some(payload) = line.strip_prefix(TOOL_TRACE_MARKER) {
            match serde_json::from_str::<Vec<ToolTrace>>(payload) {
                Ok(traces) => tool_traces.extend(traces),
                Err(err) => warn!("failed to decode tool trace line: {err}"),
            }
        } else if let Some(payload) = line.strip_prefix(FINAL_ANSWER_MARKER) {
            let value = serde_json::from_str::<serde_json::Value>(payload)
                .unwrap_or_else(|_| serde_json::Value::String(payload.to_string()));
            final_answer = Some(value);
            has_final_answer = true;
        } else {
            clean_lines.push(line);
        }
    }

    ExtendedExecutionResult {
        clean_stdout: clean_lines.join("\n"),
        stderr,
        output_files,
        tool_traces,
        final_answer,
        has_final_answer,
    }
}
