// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The sandbox adapter contract. Implementations (container, remote
//! sandbox, local interpreter) are out of scope for this crate — it
//! depends only on this trait.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct SandboxInput {
    pub code: String,
    pub input_files: HashMap<String, Vec<u8>>,
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub output_files: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Error)]
pub enum SandboxAdapterError {
    #[error("sandbox backend unavailable: {0}")]
    Unavailable(String),
}

/// A single operation: block until the program exits (or the backend's own
/// timeout fires) and return captured stdout/stderr and output files.
/// Returning `Err` signals "interpreter unavailable" — a fatal condition
/// the controller does not attempt to recover from.
#[async_trait]
pub trait SandboxAdapter: Send + Sync {
    async fn execute(&self, input: SandboxInput) -> Result<SandboxOutput, SandboxAdapterError>;
}
