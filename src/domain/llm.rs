// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain interface for the LLM provider. An anti-corruption layer: the
//! controller only ever sees `generate(system, messages) -> text`.
//! Concrete providers (Anthropic, OpenAI, Ollama, ...) are out of scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM network error: {0}")]
    Network(String),
    #[error("LLM provider error: {0}")]
    Provider(String),
}

/// `generate(system, messages) -> text`, requested in single-response
/// mode; the controller consumes only the first response.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, system: &str, messages: &[Message]) -> Result<String, LlmError>;
}
