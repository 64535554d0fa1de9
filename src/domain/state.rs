// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The only state persisted between invocations: iteration/error counters
//! and the execution history, serialized as a flat record per spec §6.

use crate::domain::execution::ExecutionStep;
use serde::{Deserialize, Serialize};

/// One entry in the persisted history, a projection of [`ExecutionStep`]
/// that drops `code_hash` (internal bookkeeping, not part of the wire
/// record) and adds the derived `has_final_answer` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub iteration: u32,
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    pub tool_traces: Vec<crate::domain::execution::ToolTrace>,
    pub has_final_answer: bool,
}

impl HistoryEntry {
    pub fn from_step(iteration: u32, step: &ExecutionStep) -> Self {
        Self {
            iteration,
            code: step.code.clone(),
            stdout: step.stdout.clone(),
            stderr: step.stderr.clone(),
            tool_traces: step.tool_traces.clone(),
            has_final_answer: step.final_answer.is_some(),
        }
    }
}

/// Mirrors the original `CodingAgentState`: the only thing carried across
/// invocations of the same agent instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationState {
    pub iteration_count: u32,
    pub error_count: u32,
    pub execution_history: Vec<HistoryEntry>,
}

impl InvocationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful steps only, in history order — the replay set per §4.5.
    pub fn successful_codes(&self) -> Vec<&str> {
        self.execution_history
            .iter()
            .filter(|e| e.stderr.is_empty())
            .map(|e| e.code.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExecutionStep;

    #[test]
    fn successful_codes_skips_failed_steps() {
        let mut state = InvocationState::new();
        let ok = ExecutionStep::new("x = 1".into(), String::new(), String::new(), vec![], None);
        let bad = ExecutionStep::new("import os".into(), String::new(), "denied".into(), vec![], None);
        state.execution_history.push(HistoryEntry::from_step(1, &ok));
        state.execution_history.push(HistoryEntry::from_step(2, &bad));
        assert_eq!(state.successful_codes(), vec!["x = 1"]);
    }
}
