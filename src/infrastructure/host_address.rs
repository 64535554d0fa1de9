// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Picks the IPC host address reachable *from inside* the sandbox. Matters
//! only when the sandbox backend is a container; a same-host sandbox can
//! reach the server directly and callers should pass an explicit override
//! in that case.

/// Explicit override always wins; otherwise macOS/Windows Docker Desktop
/// hosts resolve via the loopback alias, and Linux falls back to the
/// default bridge-network gateway address.
pub fn detect_host_address(explicit_override: Option<&str>) -> String {
    if let Some(host) = explicit_override {
        return host.to_string();
    }

    match std::env::consts::OS {
        "macos" | "windows" => "host.docker.internal".to_string(),
        _ => "172.17.0.1".to_string(),
    }
}

/// Build the IPC URL the sandbox must use, e.g. `http://172.17.0.1:8765`.
pub fn build_ipc_url(explicit_override: Option<&str>, port: u16) -> String {
    format!("http://{}:{port}", detect_host_address(explicit_override))
}
