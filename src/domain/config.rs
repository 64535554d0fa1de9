// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent configuration, validated once at construction so that every
//! downstream component can treat its fields as already-sound invariants.

use crate::domain::allowlist::{default_safe_imports, Allowlist};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iterations must be in 1..=100, got {0}")]
    MaxIterationsOutOfRange(u32),
    #[error("error_retry_attempts must be in 0..=10, got {0}")]
    ErrorRetryAttemptsOutOfRange(u32),
    #[error("tool_server_port must be in 1024..=65535, got {0}")]
    PortOutOfRange(u16),
}

/// Validated-at-construction agent configuration. There is no setter that
/// bypasses [`AgentConfig::new`] / [`AgentConfigBuilder::build`]: once built,
/// every bound in this struct holds for the lifetime of the value.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub instruction: String,
    pub authorized_imports: Allowlist,
    pub max_iterations: u32,
    pub error_retry_attempts: u32,
    pub stateful: bool,
    pub tool_server_host: Option<String>,
    pub tool_server_port: u16,
    pub ipc_host_override: Option<String>,
}

impl AgentConfig {
    pub fn builder(model: impl Into<String>) -> AgentConfigBuilder {
        AgentConfigBuilder::new(model)
    }
}

/// Builder mirroring the field defaults in spec §4.7's configuration table.
pub struct AgentConfigBuilder {
    model: String,
    instruction: String,
    authorized_imports: HashSet<String>,
    max_iterations: u32,
    error_retry_attempts: u32,
    stateful: bool,
    tool_server_host: Option<String>,
    tool_server_port: u16,
    ipc_host_override: Option<String>,
}

impl AgentConfigBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instruction: String::new(),
            authorized_imports: default_safe_imports(),
            max_iterations: 10,
            error_retry_attempts: 2,
            stateful: false,
            tool_server_host: None,
            tool_server_port: 8765,
            ipc_host_override: None,
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn authorized_imports(mut self, imports: HashSet<String>) -> Self {
        self.authorized_imports = imports;
        self
    }

    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn error_retry_attempts(mut self, n: u32) -> Self {
        self.error_retry_attempts = n;
        self
    }

    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    pub fn tool_server_host(mut self, host: impl Into<String>) -> Self {
        self.tool_server_host = Some(host.into());
        self
    }

    pub fn tool_server_port(mut self, port: u16) -> Self {
        self.tool_server_port = port;
        self
    }

    /// Explicit host the sandbox should use to reach the IPC server,
    /// bypassing the platform-default Docker-host guess (spec §4.3
    /// address resolution: "explicit override wins").
    pub fn ipc_host_override(mut self, host: impl Into<String>) -> Self {
        self.ipc_host_override = Some(host.into());
        self
    }

    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        if !(1..=100).contains(&self.max_iterations) {
            return Err(ConfigError::MaxIterationsOutOfRange(self.max_iterations));
        }
        if self.error_retry_attempts > 10 {
            return Err(ConfigError::ErrorRetryAttemptsOutOfRange(self.error_retry_attempts));
        }
        if !(1024..=65535).contains(&self.tool_server_port) {
            return Err(ConfigError::PortOutOfRange(self.tool_server_port));
        }
        Ok(AgentConfig {
            model: self.model,
            instruction: self.instruction,
            authorized_imports: Allowlist::new(self.authorized_imports),
            max_iterations: self.max_iterations,
            error_retry_attempts: self.error_retry_attempts,
            stateful: self.stateful,
            tool_server_host: self.tool_server_host,
            tool_server_port: self.tool_server_port,
            ipc_host_override: self.ipc_host_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = AgentConfig::builder("gemini").build().unwrap();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.error_retry_attempts, 2);
        assert_eq!(cfg.tool_server_port, 8765);
        assert!(!cfg.stateful);
    }

    #[test]
    fn rejects_max_iterations_out_of_range() {
        let err = AgentConfig::builder("m").max_iterations(0).build().unwrap_err();
        assert_eq!(err, ConfigError::MaxIterationsOutOfRange(0));
        let err = AgentConfig::builder("m").max_iterations(101).build().unwrap_err();
        assert_eq!(err, ConfigError::MaxIterationsOutOfRange(101));
    }

    #[test]
    fn rejects_error_retry_attempts_out_of_range() {
        let err = AgentConfig::builder("m").error_retry_attempts(11).build().unwrap_err();
        assert_eq!(err, ConfigError::ErrorRetryAttemptsOutOfRange(11));
    }

    #[test]
    fn rejects_port_out_of_range() {
        let err = AgentConfig::builder("m").tool_server_port(80).build().unwrap_err();
        assert_eq!(err, ConfigError::PortOutOfRange(80));
        let err = AgentConfig::builder("m").tool_server_port(1024).build();
        assert!(err.is_ok());
    }

    #[test]
    fn ipc_host_override_defaults_to_none() {
        let cfg = AgentConfig::builder("m").build().unwrap();
        assert_eq!(cfg.ipc_host_override, None);
        let cfg = AgentConfig::builder("m").ipc_host_override("example.internal").build().unwrap();
        assert_eq!(cfg.ipc_host_override.as_deref(), Some("example.internal"));
    }
}
