// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Composition root: wires the tool IPC server, the execution engine, and
//! the ReAct controller into one runnable agent. This is the only place in
//! the crate that constructs a [`ToolExecutionServer`] from host-supplied
//! tools and resolves the address the sandbox must use to reach it.

use crate::application::controller::{ControllerObserver, NoopObserver, ReactController};
use crate::application::execution_engine::ExecutionEngine;
use crate::domain::config::AgentConfig;
use crate::domain::llm::{LlmProvider, Message};
use crate::domain::sandbox::SandboxAdapter;
use crate::domain::state::InvocationState;
use crate::domain::tool::{Tool, ToolDescriptor};
use crate::infrastructure::host_address::build_ipc_url;
use crate::infrastructure::tool_server::{ToolExecutionServer, ToolServerError};
use std::sync::Arc;

/// A fully assembled agent: one tool IPC server, one execution engine, one
/// ReAct controller. Construct with [`Agent::new`], which binds the IPC
/// server immediately so the sandbox can reach it from the first iteration.
pub struct Agent {
    controller: ReactController,
    tool_server: Arc<ToolExecutionServer>,
}

impl Agent {
    /// Bind the tool IPC server on `config.tool_server_host`/
    /// `config.tool_server_port`, resolve the sandbox-reachable URL via
    /// `config.ipc_host_override` (falling back to platform detection),
    /// and wire the execution engine and controller around it.
    pub async fn new(
        config: AgentConfig,
        llm: Arc<dyn LlmProvider>,
        sandbox: Arc<dyn SandboxAdapter>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self, ToolServerError> {
        let descriptors: Vec<ToolDescriptor> =
            tools.iter().map(|tool| ToolDescriptor::from_tool(tool.as_ref())).collect();

        let bind_host = config.tool_server_host.clone().unwrap_or_else(|| "0.0.0.0".to_string());
        let tool_server = Arc::new(ToolExecutionServer::new(&bind_host, config.tool_server_port, tools));
        tool_server.start().await?;

        let ipc_url = build_ipc_url(config.ipc_host_override.as_deref(), config.tool_server_port);
        let engine = ExecutionEngine::new(sandbox, descriptors.clone(), ipc_url, tool_server.clone());
        let controller = ReactController::new(config, llm, engine, descriptors);

        Ok(Self { controller, tool_server })
    }

    /// Run one invocation to completion, as [`ReactController::run`].
    pub async fn run(
        &self,
        initial_messages: Vec<Message>,
        state: InvocationState,
        observer: Arc<dyn ControllerObserver>,
    ) -> (String, InvocationState) {
        self.controller.run(initial_messages, state, observer).await
    }

    /// Run with no progress observer.
    pub async fn run_silent(&self, initial_messages: Vec<Message>, state: InvocationState) -> (String, InvocationState) {
        self.run(initial_messages, state, Arc::new(NoopObserver)).await
    }

    /// Signal the tool IPC server to stop and join its background task.
    pub async fn shutdown(&self) {
        self.tool_server.stop().await;
    }
}
