// src/script/parser.rs

//! Line parser for job-submission scripts.
//!
//! ```text
//! # comment
//! %define memory_limit 1073741824
//! %inline [raw.txt] [clean.txt] tr -d '\r' < raw.txt > clean.txt
//! @first  echo a
//! @second echo b
//! %dependency second first
//! ```

use regex::Regex;

use crate::errors::{DagError, Result};

/// One meaningful line of a submission script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `%define key [values...]`; no values means a flag.
    Define { key: String, values: Vec<String> },
    /// `%dependency child parent...`
    Dependency { child: String, parents: Vec<String> },
    /// `%inline [inputs] [outputs] code`
    InlineCode {
        inputs: Vec<String>,
        outputs: Vec<String>,
        code: String,
    },
    /// `[@name] command args...`
    Invocation {
        name: Option<String>,
        command: String,
        args: Vec<String>,
    },
}

/// A directive with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    pub line: usize,
    pub directive: Directive,
}

const INLINE_PATTERN: &str = r"^%inline\s*\[([^\[\]]*)\]\s*\[([^\[\]]*)\]\s(.*)$";

/// Parse a whole script. Blank lines, comments and unknown `%` lines are
/// skipped.
pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>> {
    let inline = Regex::new(INLINE_PATTERN).map_err(anyhow::Error::from)?;
    let mut parsed = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if let Some(directive) = parse_line(raw, line, &inline)? {
            parsed.push(ScriptLine { line, directive });
        }
    }
    Ok(parsed)
}

fn invalid(line: usize, message: impl Into<String>) -> DagError {
    DagError::InvalidDirective {
        line,
        message: message.into(),
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_line(raw: &str, line: usize, inline: &Regex) -> Result<Option<Directive>> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = text.strip_prefix('%') {
        let mut tokens = rest.split_whitespace();
        let word = tokens.next().unwrap_or_default();
        return match word {
            "define" => {
                let key = tokens
                    .next()
                    .ok_or_else(|| invalid(line, "expected: %define key [value...]"))?;
                Ok(Some(Directive::Define {
                    key: key.to_string(),
                    values: tokens.map(str::to_string).collect(),
                }))
            }
            "dependency" => {
                let names: Vec<String> = tokens.map(str::to_string).collect();
                let Some((child, parents)) = names.split_first() else {
                    return Err(invalid(line, "expected: %dependency child parent..."));
                };
                if parents.is_empty() {
                    return Err(invalid(line, "expected: %dependency child parent..."));
                }
                Ok(Some(Directive::Dependency {
                    child: child.clone(),
                    parents: parents.to_vec(),
                }))
            }
            "inline" => {
                let caps = inline.captures(text).ok_or_else(|| {
                    invalid(
                        line,
                        "inline code requires an input list, an output list and code",
                    )
                })?;
                let code = caps[3].trim().to_string();
                if code.is_empty() {
                    return Err(invalid(line, "inline code is empty"));
                }
                Ok(Some(Directive::InlineCode {
                    inputs: split_list(&caps[1]),
                    outputs: split_list(&caps[2]),
                    code,
                }))
            }
            _ => Ok(None),
        };
    }

    let mut tokens = text.split_whitespace();
    let mut first = tokens.next().unwrap_or_default();
    let mut name = None;
    if let Some(n) = first.strip_prefix('@') {
        if n.is_empty() {
            return Err(invalid(line, "empty workunit name after '@'"));
        }
        name = Some(n.to_string());
        first = tokens
            .next()
            .ok_or_else(|| invalid(line, "missing command after workunit name"))?;
    }

    Ok(Some(Directive::Invocation {
        name,
        command: first.to_string(),
        args: tokens.map(str::to_string).collect(),
    }))
}
