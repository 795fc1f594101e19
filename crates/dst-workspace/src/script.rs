//! Script input discovery
//!
//! A script's inputs are the variables it assigns a literal to. Assignments
//! whose right-hand side is an expression are computed by the script and
//! are not inputs.
//!
//! Accepted literals:
//! - numbers (`3`, `-2.5`, `1e3`)
//! - quoted text (`'abc'`, `"abc"`)
//! - `true` / `false`
//! - matrices of the above (`[1 2; 3 4]`, `[1, 2, 3]`, `[]`)

use crate::error::ScriptError;
use crate::value::{ArrayValue, Value};
use crate::variable::WorkspaceVariable;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, trace};

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_]*)\s*=\s*(.+?)\s*;?\s*$").expect("assignment pattern compiles")
});

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("number pattern compiles"));

/// Extracts input variables from script text
pub trait ScriptParser: Send + Sync {
    /// Variables assigned a literal, in order of first assignment
    ///
    /// # Errors
    /// Returns `Syntax` if a literal is malformed
    fn parse_inputs(&self, content: &str) -> Result<Vec<WorkspaceVariable>, ScriptError>;

    /// Read a script and extract its inputs
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read
    fn parse_file(&self, path: &Path) -> Result<Vec<WorkspaceVariable>, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScriptError::io_error(path, e))?;
        self.parse_inputs(&content)
    }
}

/// Line-oriented `name = literal` parser
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentScriptParser;

impl AssignmentScriptParser {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ScriptParser for AssignmentScriptParser {
    fn parse_inputs(&self, content: &str) -> Result<Vec<WorkspaceVariable>, ScriptError> {
        let mut seen = HashSet::new();
        let mut inputs = Vec::new();

        for (number, raw_line) in content.lines().enumerate() {
            let line = strip_comment(raw_line);
            let Some(captures) = ASSIGNMENT.captures(line) else {
                continue;
            };
            let name = &captures[1];
            let rhs = &captures[2];

            if seen.contains(name) {
                trace!(name, line = number + 1, "reassignment ignored");
                continue;
            }

            match parse_literal(rhs).map_err(|message| ScriptError::Syntax {
                line: number + 1,
                message,
            })? {
                Some(value) => {
                    seen.insert(name.to_string());
                    inputs.push(WorkspaceVariable::new(name, value));
                }
                None => debug!(name, line = number + 1, "non-literal assignment skipped"),
            }
        }

        Ok(inputs)
    }
}

/// Drop a `%` comment that is not inside a quoted string
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '%') => return &line[..i],
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    line
}

/// `Ok(None)` for expressions, `Err` for malformed literals
fn parse_literal(rhs: &str) -> Result<Option<Value>, String> {
    let rhs = rhs.trim();
    if let Some(inner) = rhs.strip_prefix('[') {
        let Some(inner) = inner.strip_suffix(']') else {
            return Ok(None);
        };
        return parse_matrix(inner);
    }
    Ok(parse_scalar(rhs))
}

fn parse_scalar(token: &str) -> Option<Value> {
    let token = token.trim();
    if NUMBER.is_match(token) {
        return token.parse().ok().map(Value::Number);
    }
    match token {
        "true" => return Some(Value::Boolean(true)),
        "false" => return Some(Value::Boolean(false)),
        _ => {}
    }
    for quote in ['\'', '"'] {
        if let Some(text) = token
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            if !text.contains(quote) {
                return Some(Value::Text(text.to_string()));
            }
        }
    }
    None
}

fn parse_matrix(inner: &str) -> Result<Option<Value>, String> {
    if inner.trim().is_empty() {
        return Ok(Some(Value::Array(ArrayValue::empty(0, 0))));
    }

    let mut rows = Vec::new();
    for row in inner.split(';') {
        if row.trim().is_empty() {
            continue;
        }
        let mut cells = Vec::new();
        for token in row.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            match parse_scalar(token) {
                Some(value) => cells.push(value),
                None => return Ok(None),
            }
        }
        rows.push(cells);
    }

    ArrayValue::from_rows(rows)
        .map(|array| Some(Value::Array(array)))
        .map_err(|e| e.to_string())
}
