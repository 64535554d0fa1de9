// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution step and tool trace records: the per-call audit trail the
//! controller accumulates in [`crate::domain::state::InvocationState`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// A record of one tool invocation, produced both inside the sandbox
/// (buffered, emitted via the `__TOOL_TRACE__` marker) and authoritatively
/// on the host IPC server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolTrace {
    pub tool_name: String,
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    pub duration_ms: f64,
}

/// Truncated, stable digest of `code`, used only to detect an unchanged
/// replay candidate — it never gates validation or execution behavior.
pub fn compute_code_hash(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    let digest = hasher.finalize();
    let mut hex_string = String::new();
    for byte in digest {
        let _ = write!(hex_string, "{byte:02x}");
    }
    hex_string.truncate(16);
    hex_string
}

/// One sandbox execution that produced a result — possibly an error.
/// `success` is always `stderr.is_empty()`; every appended step upholds
/// that invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub code: String,
    pub code_hash: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub tool_traces: Vec<ToolTrace>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<serde_json::Value>,
}

impl ExecutionStep {
    pub fn new(
        code: String,
        stdout: String,
        stderr: String,
        tool_traces: Vec<ToolTrace>,
        final_answer: Option<serde_json::Value>,
    ) -> Self {
        let code_hash = compute_code_hash(&code);
        let success = stderr.is_empty();
        Self { code, code_hash, stdout, stderr, tool_traces, success, final_answer }
    }
}

/// Extended result of one execution-engine call: the cleaned stdout (trace
/// markers stripped), the raw stderr, extracted tool traces, and an
/// optional final answer.
#[derive(Debug, Clone, Default)]
pub struct ExtendedExecutionResult {
    pub clean_stdout: String,
    pub stderr: String,
    pub output_files: std::collections::HashMap<String, Vec<u8>>,
    pub tool_traces: Vec<ToolTrace>,
    pub final_answer: Option<serde_json::Value>,
    pub has_final_answer: bool,
}

impl ExtendedExecutionResult {
    pub fn success(&self) -> bool {
        self.stderr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_hash_is_stable_and_truncated() {
        let a = compute_code_hash("x = 1");
        let b = compute_code_hash("x = 1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn code_hash_differs_for_different_code() {
        assert_ne!(compute_code_hash("x = 1"), compute_code_hash("x = 2"));
    }

    #[test]
    fn success_mirrors_empty_stderr() {
        let step = ExecutionStep::new("x".into(), "out".into(), String::new(), vec![], None);
        assert!(step.success);
        let failed = ExecutionStep::new("x".into(), String::new(), "boom".into(), vec![], None);
        assert!(!failed.success);
    }
}
