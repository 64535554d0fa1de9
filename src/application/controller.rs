// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The ReAct controller: alternates LLM generation and code execution,
//! feeding each side's output back into the other until a final answer is
//! produced, iterations are exhausted, or the error budget is spent.

use crate::application::code_synthesizer::generate_system_prompt;
use crate::application::execution_engine::ExecutionEngine;
use crate::domain::config::AgentConfig;
use crate::domain::execution::ExecutionStep;
use crate::domain::llm::{LlmProvider, Message};
use crate::domain::state::{HistoryEntry, InvocationState};
use crate::domain::tool::{InvocationContext, ToolDescriptor};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

static TOOL_CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```tool_code\s*\n(.*?)```").unwrap());
static PYTHON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```python\s*\n(.*?)```").unwrap());

/// Observes controller progress. Implementations may log, stream to a UI,
/// or collect telemetry; the controller never depends on the result.
#[async_trait]
pub trait ControllerObserver: Send + Sync {
    async fn on_iteration_start(&self, iteration: u32);
    async fn on_code_executed(&self, iteration: u32, step: &ExecutionStep);
    async fn on_final_answer(&self, final_answer: &str);
}

/// An observer that does nothing; the default when the caller doesn't
/// need progress notifications.
pub struct NoopObserver;

#[async_trait]
impl ControllerObserver for NoopObserver {
    async fn on_iteration_start(&self, _iteration: u32) {}
    async fn on_code_executed(&self, _iteration: u32, _step: &ExecutionStep) {}
    async fn on_final_answer(&self, _final_answer: &str) {}
}

/// Extract the first code block, preferring `tool_code` over `python`.
fn extract_code_block(response: &str) -> Option<String> {
    if let Some(caps) = TOOL_CODE_BLOCK.captures(response) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = PYTHON_BLOCK.captures(response) {
        return Some(caps[1].to_string());
    }
    None
}

fn error_feedback(stderr: &str, code: &str) -> String {
    format!(
        "The previous code failed:\n```\n{code}\n```\nError:\n```\n{stderr}\n```\n\
         Typical causes: an unauthorized import, misuse of a tool's arguments, \
         or a Python syntax error. Fix the code and try again."
    )
}

fn diagnostic_final_answer(last_stderr: &str) -> String {
    format!(
        "I was unable to complete the task: repeated errors occurred and the \
         retry budget was exhausted. The last error was:\n{last_stderr}"
    )
}

const ITERATION_EXHAUSTED_MESSAGE: &str =
    "I was unable to complete the task within the allotted number of iterations.";

fn serialize_final_answer(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub struct ReactController {
    config: AgentConfig,
    llm: Arc<dyn LlmProvider>,
    engine: ExecutionEngine,
    tools: Vec<ToolDescriptor>,
}

impl ReactController {
    pub fn new(
        config: AgentConfig,
        llm: Arc<dyn LlmProvider>,
        engine: ExecutionEngine,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        Self { config, llm, engine, tools }
    }

    /// Run one invocation to completion. `initial_messages` seeds the
    /// message buffer with prior conversation turns; `state` carries the
    /// invocation state across calls for stateful agents.
    pub async fn run(
        &self,
        initial_messages: Vec<Message>,
        mut state: InvocationState,
        observer: Arc<dyn ControllerObserver>,
    ) -> (String, InvocationState) {
        let system_prompt = generate_system_prompt(&self.tools, &self.config.instruction);
        let mut messages = initial_messages;
        let mut final_answer: Option<String> = None;

        while state.iteration_count < self.config.max_iterations {
            state.iteration_count += 1;
            observer.on_iteration_start(state.iteration_count).await;

            let response = match self.llm.generate(&system_prompt, &messages).await {
                Ok(text) => text,
                Err(err) => {
                    warn!("LLM generation failed: {err}");
                    final_answer = Some(format!("LLM generation failed: {err}"));
                    break;
                }
            };

            let Some(code) = extract_code_block(&response) else {
                final_answer = Some(response);
                break;
            };

            let prior_codes = if self.config.stateful { state.successful_codes() } else { Vec::new() };
            let context = InvocationContext {
                execution_id: Some(format!("iteration-{}", state.iteration_count)),
                data: Default::default(),
            };
            let result = match self
                .engine
                .execute(&code, &self.config.authorized_imports, &prior_codes, context)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    // Fatal per spec §4.4/§7 (`AdapterUnavailable`): not
                    // recoverable through the retry-budget loop, so this
                    // terminates the invocation instead of consuming
                    // `error_retry_attempts`.
                    warn!("execution engine failed fatally: {err}");
                    final_answer = Some(format!("The execution backend is unavailable: {err}"));
                    break;
                }
            };

            let step = ExecutionStep::new(
                code.clone(),
                result.clean_stdout.clone(),
                result.stderr.clone(),
                result.tool_traces.clone(),
                result.final_answer.clone(),
            );
            observer.on_code_executed(state.iteration_count, &step).await;
            state
                .execution_history
                .push(HistoryEntry::from_step(state.iteration_count, &step));

            if !step.stderr.is_empty() {
                state.error_count += 1;
                if state.error_count > self.config.error_retry_attempts {
                    final_answer = Some(diagnostic_final_answer(&step.stderr));
                    break;
                }
                messages.push(Message::model(response));
                messages.push(Message::user(error_feedback(&step.stderr, &code)));
                continue;
            }
            state.error_count = 0;

            if let Some(answer) = result.final_answer {
                let text = serialize_final_answer(&answer);
                observer.on_final_answer(&text).await;
                final_answer = Some(text);
                break;
            }

            messages.push(Message::model(response));
            messages.push(Message::user(format!(
                "Code execution result:\n```\n{}\n```",
                result.clean_stdout
            )));
        }

        let final_answer = final_answer.unwrap_or_else(|| {
            info!("iteration cap reached without a final answer");
            ITERATION_EXHAUSTED_MESSAGE.to_string()
        });
        (final_answer, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::AgentConfig;
    use crate::domain::llm::LlmError;
    use crate::domain::sandbox::{SandboxAdapter, SandboxAdapterError, SandboxInput, SandboxOutput};
    use crate::infrastructure::tool_server::ToolExecutionServer;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A fresh, never-started server per test so each one binds its own
    /// port rather than racing another test for the same listener.
    fn test_tool_server(port: u16) -> Arc<ToolExecutionServer> {
        Arc::new(ToolExecutionServer::new("127.0.0.1", port, vec![]))
    }

    struct ScriptedLlm {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self { responses: Mutex::new(responses.into_iter().map(String::from).collect()) }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(&self, _system: &str, _messages: &[Message]) -> Result<String, LlmError> {
            Ok(self.responses.lock().pop_front().expect("scripted response exhausted"))
        }
    }

    /// Echoes the program it receives verbatim as stdout, simulating a real
    /// Python interpreter: the synthesized header/stubs/epilogue are
    /// opaque to this test double, so tool calls never actually happen —
    /// tests exercise the controller's control flow using prints the test
    /// installs directly in its "tool_code" responses instead.
    struct EchoSandbox;

    #[async_trait]
    impl SandboxAdapter for EchoSandbox {
        async fn execute(&self, input: SandboxInput) -> Result<SandboxOutput, SandboxAdapterError> {
            Ok(SandboxOutput { stdout: input.code, stderr: String::new(), output_files: Default::default() })
        }
    }

    /// A sandbox whose stdout is scripted independent of the input code,
    /// used to simulate marker-emitting program output without a real
    /// interpreter.
    struct ScriptedSandbox {
        outputs: Mutex<VecDeque<(String, String)>>,
    }

    impl ScriptedSandbox {
        fn new(outputs: Vec<(&str, &str)>) -> Self {
            Self {
                outputs: Mutex::new(
                    outputs.into_iter().map(|(o, e)| (o.to_string(), e.to_string())).collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl SandboxAdapter for ScriptedSandbox {
        async fn execute(&self, _input: SandboxInput) -> Result<SandboxOutput, SandboxAdapterError> {
            let (stdout, stderr) = self.outputs.lock().pop_front().expect("scripted output exhausted");
            Ok(SandboxOutput { stdout, stderr, output_files: Default::default() })
        }
    }

    fn config() -> AgentConfig {
        AgentConfig::builder("test-model").build().unwrap()
    }

    #[tokio::test]
    async fn happy_path_single_turn() {
        let llm = Arc::new(ScriptedLlm::new(vec!["```tool_code\nfinal_answer(\"x\")\n```"]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![("__FINAL_ANSWER__:x\n__TOOL_TRACE__:[]\n", "")]));
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18761));
        let controller = ReactController::new(config(), llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert_eq!(answer, "x");
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.execution_history.len(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```tool_code\nr = search(query=\"q\"); final_answer(r[\"hit\"])\n```",
        ]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![(
            "__FINAL_ANSWER__:h\n__TOOL_TRACE__:[{\"tool_name\":\"search\",\"args\":{\"query\":\"q\"},\"result\":{\"hit\":\"h\"},\"success\":true,\"duration_ms\":2.0}]\n",
            "",
        )]));
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18762));
        let controller = ReactController::new(config(), llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert_eq!(answer, "h");
        let trace = &state.execution_history[0].tool_traces[0];
        assert_eq!(trace.tool_name, "search");
        assert_eq!(trace.args, serde_json::json!({"query": "q"}));
        assert!(trace.success);
    }

    #[tokio::test]
    async fn error_recovery_resets_error_count() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```tool_code\nimport os\n```",
            "```tool_code\nfinal_answer(1)\n```",
        ]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![("__FINAL_ANSWER__:1\n__TOOL_TRACE__:[]\n", "")]));
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18763));
        let controller = ReactController::new(config(), llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert_eq!(answer, "1");
        assert_eq!(state.error_count, 0);
        assert_eq!(state.execution_history.len(), 2);
        assert!(!state.execution_history[0].stderr.is_empty());
    }

    #[tokio::test]
    async fn retry_exhaustion_produces_diagnostic() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```tool_code\nimport os\n```",
            "```tool_code\nimport os\n```",
            "```tool_code\nimport os\n```",
        ]));
        let sandbox = Arc::new(EchoSandbox);
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18764));
        let cfg = AgentConfig::builder("test-model").error_retry_attempts(2).max_iterations(10).build().unwrap();
        let controller = ReactController::new(cfg, llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert!(answer.contains("Unauthorized import"));
        assert_eq!(state.iteration_count, 3);
    }

    #[tokio::test]
    async fn iteration_cap_exits_with_exhaustion_message() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```tool_code\nx = 1\n```",
            "```tool_code\nx = 2\n```",
            "```tool_code\nx = 3\n```",
        ]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ("__TOOL_TRACE__:[]\n", ""),
            ("__TOOL_TRACE__:[]\n", ""),
            ("__TOOL_TRACE__:[]\n", ""),
        ]));
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18765));
        let cfg = AgentConfig::builder("test-model").max_iterations(3).build().unwrap();
        let controller = ReactController::new(cfg, llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert_eq!(answer, ITERATION_EXHAUSTED_MESSAGE);
        assert_eq!(state.iteration_count, 3);
    }

    #[tokio::test]
    async fn stateful_replay_restores_prior_variable() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            "```tool_code\nx = 40\n```",
            "```tool_code\nfinal_answer(x + 2)\n```",
        ]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ("__TOOL_TRACE__:[]\n", ""),
            ("__FINAL_ANSWER__:42\n__TOOL_TRACE__:[]\n", ""),
        ]));
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18766));
        let cfg = AgentConfig::builder("test-model").stateful(true).build().unwrap();
        let controller = ReactController::new(cfg, llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert_eq!(answer, "42");
        assert_eq!(state.execution_history.len(), 2);
    }

    /// Simulates `AdapterUnavailable`: the backend itself is gone, not the
    /// user's code failing.
    struct UnavailableSandbox;

    #[async_trait]
    impl SandboxAdapter for UnavailableSandbox {
        async fn execute(&self, _input: SandboxInput) -> Result<SandboxOutput, SandboxAdapterError> {
            Err(SandboxAdapterError::Unavailable("backend process exited".to_string()))
        }
    }

    #[tokio::test]
    async fn adapter_unavailable_terminates_without_spending_retry_budget() {
        let llm = Arc::new(ScriptedLlm::new(vec!["```tool_code\nx = 1\n```"]));
        let sandbox = Arc::new(UnavailableSandbox);
        let engine = ExecutionEngine::new(sandbox, vec![], "http://127.0.0.1:8765".to_string(), test_tool_server(18767));
        let cfg = AgentConfig::builder("test-model").error_retry_attempts(2).build().unwrap();
        let controller = ReactController::new(cfg, llm, engine, vec![]);

        let (answer, state) = controller.run(vec![], InvocationState::new(), Arc::new(NoopObserver)).await;

        assert!(answer.contains("execution backend is unavailable"));
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.error_count, 0);
        assert!(state.execution_history.is_empty());
    }
}
