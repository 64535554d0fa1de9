// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool descriptors: named, described units of host work that generated
//! code can call through the IPC channel. The core never constructs a
//! tool — it only receives [`Tool`] trait objects from the embedding
//! application and reads their metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// JSON-Schema-ish parameter type, narrowed to what the code synthesizer
/// needs to pick a readable, language-native type hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array { items: Option<Box<ParameterType>> },
    Object,
    Unknown(String),
}

impl ParameterType {
    pub fn from_json_schema_type(type_name: &str, items: Option<&ParameterType>) -> Self {
        match type_name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array { items: items.map(|t| Box::new(t.clone())) },
            "object" => Self::Object,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Python type hint for stub generation. Purely cosmetic — the
    /// runtime never enforces it.
    pub fn native_hint(&self) -> Option<String> {
        match self {
            Self::String => Some("str".to_string()),
            Self::Integer => Some("int".to_string()),
            Self::Number => Some("float".to_string()),
            Self::Boolean => Some("bool".to_string()),
            Self::Array { items } => Some(match items {
                Some(inner) => format!("list[{}]", inner.native_hint().unwrap_or_else(|| "Any".to_string())),
                None => "list".to_string(),
            }),
            Self::Object => Some("dict".to_string()),
            Self::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub schema_type: ParameterType,
    pub description: String,
    pub required: bool,
}

/// Opaque, host-owned context threaded through a tool invocation. The
/// runtime never inspects its contents; it only installs and swaps it
/// before each sandbox execution (§5: "invocation context ... written
/// before each sandbox execution and read by concurrent tool calls").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationContext {
    pub execution_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// A host-provided unit of work, reachable from inside the sandbox via the
/// synthesized stub bearing its name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> &[ToolParameter];

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Plain-data snapshot of a tool's metadata, detached from its `invoke`
/// implementation. The code synthesizer and system-prompt builder work
/// from these rather than from `&dyn Tool` directly, since they only ever
/// need name/description/schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_hint_parameterizes_on_items() {
        let t = ParameterType::Array { items: Some(Box::new(ParameterType::String)) };
        assert_eq!(t.native_hint().as_deref(), Some("list[str]"));
    }

    #[test]
    fn unknown_type_has_no_hint() {
        let t = ParameterType::Unknown("tensor".into());
        assert_eq!(t.native_hint(), None);
    }
}
