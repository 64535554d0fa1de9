// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod code_synthesizer;
pub mod execution_engine;
pub mod controller;
