// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Import allowlist validation for generated code.
//!
//! Generated code is never trusted with the host's full import surface.
//! Before a snippet reaches the sandbox, every `import` / `from X import Y`
//! statement in it is checked against an allowlist of dotted module-name
//! patterns. A snippet with any import outside the allowlist never reaches
//! the sandbox at all — it is turned into a synthetic failed
//! [`crate::domain::execution::ExecutionStep`] instead.

use std::collections::HashSet;
use thiserror::Error;

/// Errors raised by strict allowlist validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Import validation failed. Unauthorized imports found:\n{}", .0.join("\n"))]
    UnauthorizedImports(Vec<String>),
}

/// Default set of safe imports that are always allowed, mirroring the
/// curated standard-utility set sample agent configurations are expected
/// to augment rather than replace.
pub fn default_safe_imports() -> HashSet<String> {
    [
        "json", "math", "re", "datetime", "collections", "collections.*",
        "itertools", "functools", "operator", "string", "textwrap",
        "unicodedata", "decimal", "fractions", "random", "statistics",
        "typing", "typing.*", "dataclasses", "enum", "abc", "copy",
        "pprint", "reprlib", "numbers", "cmath", "time", "calendar",
        "hashlib", "hmac", "base64", "binascii", "html", "html.*",
        "urllib.parse", "uuid", "struct", "codecs", "locale", "gettext",
        "bisect", "heapq", "array", "weakref", "types", "contextlib",
        "warnings", "traceback", "linecache", "difflib", "graphlib",
        "zoneinfo",
        // Common data-science namespaces, as wildcards.
        "numpy", "numpy.*", "pandas", "pandas.*", "scipy", "scipy.*",
        "matplotlib", "matplotlib.*",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// A set of dotted-name import patterns. Immutable per-execution: a fresh
/// [`Allowlist`] is built for each [`AllowlistValidator`] and never mutated
/// mid-validation.
#[derive(Debug, Clone)]
pub struct Allowlist {
    patterns: HashSet<String>,
}

impl Allowlist {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }

    pub fn default_safe() -> Self {
        Self::new(default_safe_imports())
    }

    pub fn with_additional(mut self, extra: impl IntoIterator<Item = String>) -> Self {
        self.patterns.extend(extra);
        self
    }

    pub fn patterns(&self) -> &HashSet<String> {
        &self.patterns
    }

    /// Check whether a fully-qualified dotted name is permitted.
    ///
    /// Match order, per the three name-matching rules: exact equality,
    /// any wildcard `P.*` pattern whose base `P` is a strict dotted prefix
    /// of `name` (`P.*` admits `P.x` but never bare `P`), and finally any
    /// ancestor `A` of `name` for which `A.*` is itself allowlisted (covers
    /// `collections.abc.Callable` under `collections.*`).
    pub fn is_allowed(&self, name: &str) -> bool {
        if self.patterns.contains(name) {
            return true;
        }

        for pattern in &self.patterns {
            if let Some(base) = pattern.strip_suffix(".*") {
                if name.starts_with(&format!("{base}.")) {
                    return true;
                }
            }
        }

        let parts: Vec<&str> = name.split('.').collect();
        for i in 0..parts.len() {
            let ancestor = parts[..=i].join(".");
            if self.patterns.contains(&format!("{ancestor}.*")) {
                return true;
            }
        }

        false
    }
}

/// A single import statement extracted from source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub module: String,
    pub imported_names: Vec<String>,
    pub line: usize,
    pub is_from_import: bool,
}

/// Extract every import statement from `code`.
///
/// This is a line-oriented scanner, not a full parser: it recognizes
/// `import a[, b][ as c]` and `from M import a[, b][ as c]` (including a
/// parenthesized, multi-line name list), which is everything the allowlist
/// cares about. Anything else in the source is opaque to it. Gross
/// structural damage (unbalanced brackets, a dangling `from` with no
/// matching `import`) is reported as a syntax error rather than silently
/// skipped, matching the "malformed input fails closed" contract.
pub fn extract_imports(code: &str) -> Result<Vec<ImportDescriptor>, String> {
    check_balanced(code)?;

    let mut imports = Vec::new();
    let lines: Vec<&str> = code.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line_no = i + 1;
        let trimmed = lines[i].trim();

        if let Some(rest) = trimmed.strip_prefix("import ") {
            for item in rest.split(',') {
                let module = strip_alias(item.trim());
                if !module.is_empty() {
                    imports.push(ImportDescriptor {
                        module: module.to_string(),
                        imported_names: vec![],
                        line: line_no,
                        is_from_import: false,
                    });
                }
            }
            i += 1;
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("from ") {
            let Some(import_idx) = rest.find(" import ") else {
                return Err(format!("Syntax error in code: dangling 'from' at line {line_no}"));
            };
            let module_raw = rest[..import_idx].trim();
            let module = module_raw.trim_start_matches('.').to_string();

            let mut names_part = rest[import_idx + " import ".len()..].trim().to_string();

            if names_part.starts_with('(') && !names_part.contains(')') {
                let mut j = i + 1;
                loop {
                    if j >= lines.len() {
                        return Err(format!(
                            "Syntax error in code: unterminated from-import starting at line {line_no}"
                        ));
                    }
                    names_part.push(' ');
                    names_part.push_str(lines[j].trim());
                    if lines[j].contains(')') {
                        break;
                    }
                    j += 1;
                }
                i = j;
            }

            let names_part = names_part
                .trim_start_matches('(')
                .trim_end_matches(')')
                .trim_end_matches(',')
                .trim();

            for item in names_part.split(',') {
                let item = item.trim();
                if item.is_empty() {
                    continue;
                }
                let name = strip_alias(item);
                imports.push(ImportDescriptor {
                    module: module.clone(),
                    imported_names: vec![name.to_string()],
                    line: line_no,
                    is_from_import: true,
                });
            }
            i += 1;
            continue;
        }

        i += 1;
    }

    Ok(imports)
}

fn strip_alias(item: &str) -> &str {
    item.split(" as ").next().unwrap_or(item).trim()
}

fn check_balanced(code: &str) -> Result<(), String> {
    let mut depth: i32 = 0;
    for ch in code.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err("Syntax error in code: unbalanced brackets".to_string());
        }
    }
    if depth != 0 {
        return Err("Syntax error in code: unbalanced brackets".to_string());
    }
    Ok(())
}

/// Check whether an import is allowed, matching `from M import N` semantics:
/// permitted if either `M` itself matches, or the assembled `M.N` matches.
pub fn is_import_allowed(import: &ImportDescriptor, allowlist: &Allowlist) -> bool {
    if import.is_from_import {
        import.imported_names.iter().all(|name| {
            let full_name = if import.module.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", import.module, name)
            };
            allowlist.is_allowed(&import.module) || allowlist.is_allowed(&full_name)
        })
    } else {
        allowlist.is_allowed(&import.module)
    }
}

/// Validate every import in `code` against `allowlist`, returning
/// human-readable violation strings (empty if everything is permitted). A
/// syntax error yields exactly one violation describing it, never a panic.
pub fn validate_imports(code: &str, allowlist: &Allowlist) -> Vec<String> {
    let imports = match extract_imports(code) {
        Ok(imports) => imports,
        Err(syntax_error) => return vec![syntax_error],
    };

    let mut violations = Vec::new();
    for import in &imports {
        if import.is_from_import {
            for name in &import.imported_names {
                let full_name = if import.module.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", import.module, name)
                };
                if !(allowlist.is_allowed(&import.module) || allowlist.is_allowed(&full_name)) {
                    violations.push(format!(
                        "Line {}: Unauthorized import \"from {} import {}\"",
                        import.line, import.module, name
                    ));
                }
            }
        } else if !allowlist.is_allowed(&import.module) {
            violations.push(format!(
                "Line {}: Unauthorized import \"{}\"",
                import.line, import.module
            ));
        }
    }
    violations
}

/// Stateful validator reused across many validations against the same
/// allowlist.
#[derive(Debug, Clone)]
pub struct AllowlistValidator {
    allowlist: Allowlist,
}

impl AllowlistValidator {
    pub fn new(allowlist: Allowlist) -> Self {
        Self { allowlist }
    }

    pub fn validate(&self, code: &str) -> Vec<String> {
        validate_imports(code, &self.allowlist)
    }

    pub fn validate_strict(&self, code: &str) -> Result<(), ValidationError> {
        let violations = self.validate(code);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::UnauthorizedImports(violations))
        }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowlist.is_allowed(name)
    }

    pub fn add_allowed_imports(&mut self, imports: impl IntoIterator<Item = String>) {
        self.allowlist = self.allowlist.clone().with_additional(imports);
    }
}
