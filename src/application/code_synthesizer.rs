// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Synthesizes the self-contained program handed to the sandbox adapter:
//! an IPC-aware header, one stub per tool, the caller's code verbatim, and
//! a trace-marker epilogue. Also renders the developer-facing system
//! prompt from the same tool registry, via Handlebars.

use crate::domain::tool::{ParameterType, ToolDescriptor};
use handlebars::Handlebars;
use serde_json::json;

pub const TOOL_TRACE_MARKER: &str = "__TOOL_TRACE__:";
pub const FINAL_ANSWER_MARKER: &str = "__FINAL_ANSWER__:";

const RUNTIME_HEADER_TEMPLATE: &str = r#"import json as __json
import urllib.request as __urllib_request
import urllib.error as __urllib_error

__IPC_URL = "{{ipc_url}}"
__TOOL_TRACES = []
__FINAL_ANSWER_EMITTED = False


def _call_ipc(tool_name, **kwargs):
    import time as __time
    __start = __time.monotonic()
    __body = __json.dumps({"tool_name": tool_name, "args": kwargs}).encode("utf-8")
    __req = __urllib_request.Request(
        __IPC_URL + "/tool_call",
        data=__body,
        headers={"Content-Type": "application/json"},
        method="POST",
    )
    try:
        with __urllib_request.urlopen(__req, timeout=300) as __resp:
            __payload = __json.loads(__resp.read().decode("utf-8"))
    except __urllib_error.URLError as __exc:
        __TOOL_TRACES.append({
            "tool_name": tool_name,
            "args": kwargs,
            "error": str(__exc),
            "success": False,
            "duration_ms": (__time.monotonic() - __start) * 1000.0,
        })
        raise RuntimeError(f"tool call to {tool_name} failed: {__exc}") from __exc

    __duration_ms = (__time.monotonic() - __start) * 1000.0
    if __payload.get("success"):
        __TOOL_TRACES.append({
            "tool_name": tool_name,
            "args": kwargs,
            "result": __payload.get("result"),
            "success": True,
            "duration_ms": __duration_ms,
        })
        return __payload.get("result")
    __error = __payload.get("error", "unknown tool error")
    __TOOL_TRACES.append({
        "tool_name": tool_name,
        "args": kwargs,
        "error": __error,
        "success": False,
        "duration_ms": __duration_ms,
    })
    raise RuntimeError(f"tool call to {tool_name} failed: {__error}")


def final_answer(x):
    global __FINAL_ANSWER_EMITTED
    if isinstance(x, str):
        print("{{final_answer_marker}}" + x)
    else:
        print("{{final_answer_marker}}" + __json.dumps(x))
    __FINAL_ANSWER_EMITTED = True


def __get_tool_traces():
    return list(__TOOL_TRACES)


def __clear_tool_traces():
    __TOOL_TRACES.clear()
"#;

const TOOL_STUB_TEMPLATE: &str = r#"
def {{name}}({{signature}}):
    """{{description}}
{{#each params}}
    {{name}} ({{type_hint}}{{#unless required}}, optional{{/unless}}): {{description}}
{{/each}}
    """
    __kwargs = {}
{{#each params}}
{{#if required}}
    __kwargs["{{name}}"] = {{name}}
{{else}}
    if {{name}} is not __SENTINEL:
        __kwargs["{{name}}"] = {{name}}
{{/if}}
{{/each}}
    return _call_ipc("{{name}}", **__kwargs)
"#;

const EPILOGUE_TEMPLATE: &str = r#"
print("{{trace_marker}}" + __json.dumps(__get_tool_traces()))
"#;

fn handlebars() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(false);
    hb
}

/// Render the IPC-aware header: constants, `_call_ipc`, `final_answer`,
/// and the trace-buffer accessors.
pub fn generate_runtime_header(ipc_url: &str) -> String {
    handlebars()
        .render_template(
            RUNTIME_HEADER_TEMPLATE,
            &json!({"ipc_url": ipc_url, "final_answer_marker": FINAL_ANSWER_MARKER}),
        )
        .expect("runtime header template is a fixed, valid Handlebars template")
}

/// One stub per tool. Required parameters are positional; optional ones
/// default to a sentinel meaning "omit", so an un-passed optional never
/// reaches `_call_ipc`.
pub fn generate_tool_stubs(tools: &[ToolDescriptor]) -> String {
    let hb = handlebars();
    let mut out = String::from("__SENTINEL = object()\n");
    for tool in tools {
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        for param in &tool.parameters {
            if param.required {
                positional.push(param.name.clone());
            } else {
                keyword.push(format!("{}=__SENTINEL", param.name));
            }
        }
        let signature = positional.into_iter().chain(keyword).collect::<Vec<_>>().join(", ");

        let params: Vec<_> = tool
            .parameters
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "description": p.description,
                    "required": p.required,
                    "type_hint": p.schema_type.native_hint().unwrap_or_else(|| "Any".to_string()),
                })
            })
            .collect();

        let rendered = hb
            .render_template(
                TOOL_STUB_TEMPLATE,
                &json!({
                    "name": tool.name,
                    "description": tool.description,
                    "signature": signature,
                    "params": params,
                }),
            )
            .expect("tool stub template is a fixed, valid Handlebars template");
        out.push_str(&rendered);
    }
    out
}

/// Assemble the full program: header, stubs, the caller's code verbatim,
/// and the trace epilogue.
pub fn synthesize(user_code: &str, tools: &[ToolDescriptor], ipc_url: &str) -> String {
    let header = generate_runtime_header(ipc_url);
    let stubs = generate_tool_stubs(tools);
    let epilogue = handlebars()
        .render_template(EPILOGUE_TEMPLATE, &json!({"trace_marker": TOOL_TRACE_MARKER}))
        .expect("epilogue template is a fixed, valid Handlebars template");

    format!("{header}\n{stubs}\n{user_code}\n{epilogue}")
}

fn required_marker(required: bool) -> &'static str {
    if required {
        "required"
    } else {
        "optional"
    }
}

/// Developer-facing system prompt: task framing, a per-tool section with a
/// required/optional parameter table, worked examples, and the caller's
/// custom instruction. Stable across iterations within one invocation.
pub fn generate_system_prompt(tools: &[ToolDescriptor], custom_instruction: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You solve tasks by writing and running short snippets of code. \
         Write code in a ```tool_code``` fenced block, call the provided tool \
         functions to gather information or take action, and call \
         final_answer(result) exactly once when you have the answer.\n\n",
    );

    if !tools.is_empty() {
        prompt.push_str("## Available tools\n\n");
        for tool in tools {
            prompt.push_str(&format!("### {}\n{}\n\n", tool.name, tool.description));
            if !tool.parameters.is_empty() {
                prompt.push_str("| Parameter | Type | Required | Description |\n");
                prompt.push_str("|---|---|---|---|\n");
                for param in &tool.parameters {
                    prompt.push_str(&format!(
                        "| {} | {} | {} | {} |\n",
                        param.name,
                        param.schema_type.native_hint().unwrap_or_else(|| "Any".to_string()),
                        required_marker(param.required),
                        param.description,
                    ));
                }
                prompt.push('\n');
            }
        }
    }

    prompt.push_str(
        "## Example\n\n\
         ```tool_code\n\
         result = search(query=\"capital of France\")\n\
         final_answer(result[\"hit\"])\n\
         ```\n\n\
         ## Example\n\n\
         ```tool_code\n\
         x = 40\n\
         final_answer(x + 2)\n\
         ```\n\n",
    );

    if !custom_instruction.is_empty() {
        prompt.push_str(custom_instruction);
        prompt.push('\n');
    }

    prompt
}
