// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # codeact-runtime
//!
//! Core of a tool-augmented code-execution agent runtime: a ReAct controller
//! that drives an LLM in a generate/execute loop where each "act" is a
//! snippet of code the runtime runs inside an isolated sandbox, with
//! host-provided tools reachable from inside that sandbox through an
//! injected HTTP IPC channel.
//!
//! ## Layer Structure
//!
//! ```text
//! agent.rs       ← composition root: binds the tool server, wires engine + controller
//!     ↓
//! application/   ← code synthesizer, execution engine, ReAct controller
//!     ↓
//! domain/        ← allowlist, tool/sandbox/LLM contracts, execution model, config
//!     ↓
//! infrastructure/← tool IPC server (axum), sandbox-reachable host address resolution
//! ```
//!
//! The LLM provider and the sandbox backend are external collaborators,
//! specified here only as traits (see [`domain::llm::LlmProvider`] and
//! [`domain::sandbox::SandboxAdapter`]). This crate does not ship a
//! concrete implementation of either. [`Agent::new`] is the entry point for
//! an embedding application: it owns the IPC server's lifecycle and resolves
//! its sandbox-reachable address, so callers never construct
//! `ExecutionEngine`/`ToolExecutionServer` by hand.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod agent;

pub use agent::Agent;
pub use domain::config::AgentConfig;
pub use application::controller::ReactController;
