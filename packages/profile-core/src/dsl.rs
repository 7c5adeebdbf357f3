//! A restricted, line-and-semicolon-oriented parser for control-file
//! source text. It understands exactly the capability calls named for the
//! profile context (`control`/`rule`, `describe`, `title`, `only_if`,
//! `attribute`, `skip_control`/`skip_rule`, `require`, plus the
//! field-setting calls used inside a control body: `impact`, `desc`,
//! `tag`, `ref`). Anything nested inside a `describe ... do ... end` block
//! is captured as opaque source text and handed to [`crate::control::CheckSpec`]
//! unparsed — the resource-expression language itself is out of scope.

use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("unterminated block starting at line {line}")]
    UnterminatedBlock { line: u32 },
    #[error("unterminated string literal starting at line {line}")]
    UnterminatedString { line: u32 },
    #[error("line {line}: expected a call, found {text:?}")]
    NotACall { line: u32, text: String },
    #[error("line {line}: {msg}")]
    Malformed { line: u32, msg: String },
}

/// One statement at the current nesting level.
#[derive(Clone, Debug)]
pub struct Statement {
    pub line: u32,
    pub name: String,
    pub args_text: String,
    pub block: Option<String>,
}

/// Splits `source` into top-level statements, respecting string literals,
/// `do ... end` blocks, and brace blocks so that `;` or newlines inside
/// those constructs do not end a statement early.
pub fn parse_statements(source: &str) -> Result<Vec<Statement>, DslError> {
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut line = 1u32;
    let mut statements = Vec::new();

    while i < chars.len() {
        skip_separators(&chars, &mut i, &mut line);
        if i >= chars.len() {
            break;
        }
        let start_line = line;
        let (stmt_text, new_i, new_line) = scan_statement(&chars, i, line)?;
        i = new_i;
        line = new_line;
        let stmt_text = stmt_text.trim();
        if stmt_text.is_empty() {
            continue;
        }
        statements.push(parse_call(stmt_text, start_line)?);
    }
    Ok(statements)
}

fn skip_separators(chars: &[char], i: &mut usize, line: &mut u32) {
    while *i < chars.len() {
        match chars[*i] {
            ';' => *i += 1,
            '\n' => {
                *i += 1;
                *line += 1;
            }
            c if c.is_whitespace() => *i += 1,
            '#' => {
                while *i < chars.len() && chars[*i] != '\n' {
                    *i += 1;
                }
            }
            _ => break,
        }
    }
}

/// Scans forward from `i` to the end of one statement: a newline or `;`
/// that is not nested inside a string, `do...end`, or `{...}`.
fn scan_statement(
    chars: &[char],
    mut i: usize,
    mut line: u32,
) -> Result<(String, usize, u32), DslError> {
    let start = i;
    let start_line = line;
    let mut depth = 0i32;

    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                let quote = chars[i];
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    if chars[i] == '\n' {
                        line += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(DslError::UnterminatedString { line: start_line });
                }
                i += 1;
            }
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth -= 1;
                i += 1;
            }
            '\n' => {
                if depth <= 0 {
                    return Ok((chars[start..i].iter().collect(), i + 1, line + 1));
                }
                line += 1;
                i += 1;
            }
            ';' => {
                if depth <= 0 {
                    return Ok((chars[start..i].iter().collect(), i + 1, line));
                }
                i += 1;
            }
            _ => {
                if depth <= 0 && word_at(chars, i) == Some("do") {
                    let (end_idx, end_line) = find_matching_end(chars, i, line)?;
                    i = end_idx;
                    line = end_line;
                } else {
                    i += 1;
                }
            }
        }
    }
    Ok((chars[start..i].iter().collect(), i, line))
}

fn word_at<'a>(chars: &'a [char], i: usize) -> Option<&'static str> {
    let boundary_before = i == 0 || !chars[i - 1].is_alphanumeric();
    if !boundary_before {
        return None;
    }
    for word in ["do", "end"] {
        let wc: Vec<char> = word.chars().collect();
        if chars[i..].starts_with(&wc[..]) {
            let after = i + wc.len();
            let boundary_after = after >= chars.len() || !chars[after].is_alphanumeric();
            if boundary_after {
                return Some(if word == "do" { "do" } else { "end" });
            }
        }
    }
    None
}

/// `i` points at the `do` keyword. Returns the index just past the
/// matching `end` keyword, and the updated line number.
fn find_matching_end(chars: &[char], i: usize, mut line: u32) -> Result<(usize, u32), DslError> {
    let start_line = line;
    let mut j = i + 2;
    let mut depth = 1i32;
    while j < chars.len() {
        match chars[j] {
            '\'' | '"' => {
                let quote = chars[j];
                j += 1;
                while j < chars.len() && chars[j] != quote {
                    if chars[j] == '\\' && j + 1 < chars.len() {
                        j += 1;
                    }
                    if chars[j] == '\n' {
                        line += 1;
                    }
                    j += 1;
                }
                j += 1;
            }
            '\n' => {
                line += 1;
                j += 1;
            }
            _ => {
                if let Some(w) = word_at(chars, j) {
                    if w == "do" {
                        depth += 1;
                        j += 2;
                        continue;
                    } else {
                        depth -= 1;
                        if depth == 0 {
                            return Ok((j + 3, line));
                        }
                        j += 3;
                        continue;
                    }
                }
                j += 1;
            }
        }
    }
    Err(DslError::UnterminatedBlock { line: start_line })
}

fn parse_call(stmt: &str, line: u32) -> Result<Statement, DslError> {
    let stmt = stmt.trim();
    let name_end = stmt
        .find(|c: char| !c.is_alphanumeric() && c != '_' && c != '?')
        .unwrap_or(stmt.len());
    if name_end == 0 {
        return Err(DslError::NotACall {
            line,
            text: stmt.to_string(),
        });
    }
    let name = stmt[..name_end].to_string();
    let rest = stmt[name_end..].trim_start();

    // Split off a trailing `do ... end` or `{ ... }` block, if present.
    let (args_part, block) = split_trailing_block(rest);
    let args_part = args_part.trim();
    let args_part = args_part
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(&args_part)
        .trim()
        .to_string();

    Ok(Statement {
        line,
        name,
        args_text: args_part,
        block,
    })
}

fn split_trailing_block(rest: &str) -> (String, Option<String>) {
    let chars: Vec<char> = rest.chars().collect();
    // look for a `do` at top nesting depth followed eventually by `end`.
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\'' || chars[i] == '"' {
            let quote = chars[i];
            i += 1;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            i += 1;
            continue;
        }
        if word_at(&chars, i) == Some("do") {
            if let Ok((end_idx, _)) = find_matching_end(&chars, i, 1) {
                let args: String = chars[..i].iter().collect();
                let body: String = chars[i + 2..end_idx.saturating_sub(3)].iter().collect();
                return (args, Some(body.trim().to_string()));
            }
        }
        if chars[i] == '{' {
            if let Some(close) = matching_brace(&chars, i) {
                let args: String = chars[..i].iter().collect();
                let body: String = chars[i + 1..close].iter().collect();
                return (args, Some(body.trim().to_string()));
            }
        }
        i += 1;
    }
    (rest.to_string(), None)
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut j = open;
    while j < chars.len() {
        match chars[j] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Splits a comma-separated argument list at top-level commas (not inside
/// nested brackets/braces/strings).
pub fn split_top_level_commas(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                let quote = chars[i];
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
            }
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(chars[start..i].iter().collect::<String>().trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let last: String = chars[start..].iter().collect::<String>().trim().to_string();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// Parses a single literal argument value: a quoted string, a bare
/// `key: value` hash entry's value, a number, `true`/`false`, a symbol
/// (`:foo`), or falls back to the raw text as a string.
pub fn parse_literal(raw: &str) -> Json {
    let raw = raw.trim();
    if let Some(inner) = unquote(raw) {
        return Json::String(inner);
    }
    if raw == "true" {
        return Json::Bool(true);
    }
    if raw == "false" {
        return Json::Bool(false);
    }
    if let Some(sym) = raw.strip_prefix(':') {
        return Json::String(sym.to_string());
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Json::Number(num);
        }
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let items = split_top_level_commas(inner)
            .into_iter()
            .map(|p| parse_literal(&p))
            .collect();
        return Json::Array(items);
    }
    Json::String(raw.to_string())
}

/// Parses a Ruby-style option hash argument list, e.g.
/// `nist: "AC-6", severity: 5` into an ordered object.
pub fn parse_hash_args(raw: &str) -> indexmap::IndexMap<String, Json> {
    let mut map = indexmap::IndexMap::new();
    for part in split_top_level_commas(raw) {
        let Some(colon) = find_top_level_colon(&part) else {
            continue;
        };
        let key = part[..colon].trim().trim_matches(':').to_string();
        let value = parse_literal(part[colon + 1..].trim());
        map.insert(key, value);
    }
    map
}

fn find_top_level_colon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_quote = None;
    for (i, &b) in bytes.iter().enumerate() {
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None => {
                if b == b'\'' || b == b'"' {
                    in_quote = Some(b);
                } else if b == b':' && i + 1 < bytes.len() && bytes[i + 1] != b':' {
                    return Some(i);
                }
            }
        }
    }
    None
}

fn unquote(s: &str) -> Option<String> {
    let s = s.trim();
    if s.len() < 2 {
        return None;
    }
    let bytes = s.as_bytes();
    let quote = bytes[0];
    if (quote == b'"' || quote == b'\'') && bytes[bytes.len() - 1] == quote {
        let inner = &s[1..s.len() - 1];
        return Some(inner.replace("\\\"", "\"").replace("\\'", "'"));
    }
    None
}

/// Extracts the single string-literal argument of a call, e.g. `"sshd-01"`
/// from `control "sshd-01"`.
pub fn parse_single_string_arg(args_text: &str) -> Option<String> {
    let first = split_top_level_commas(args_text).into_iter().next()?;
    unquote(&first).or(Some(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolon_statements_split() {
        let stmts = parse_statements("title 'a'; impact 0.5").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].name, "title");
        assert_eq!(stmts[1].name, "impact");
    }

    #[test]
    fn control_with_nested_describe_captures_block() {
        let src = "control 'c1' do; impact 0.7; title 't'; desc 'd'; describe file('/etc/hosts') do; it { should exist }; end; end";
        let stmts = parse_statements(src).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].name, "control");
        let inner = parse_statements(stmts[0].block.as_deref().unwrap()).unwrap();
        assert_eq!(inner.len(), 4);
        assert_eq!(inner[3].name, "describe");
        assert!(inner[3].block.as_deref().unwrap().contains("should exist"));
    }

    #[test]
    fn hash_args_parse_in_order() {
        let h = parse_hash_args("nist: \"AC-6\", severity: 5");
        let keys: Vec<&str> = h.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["nist", "severity"]);
    }

    #[test]
    fn single_string_arg_unquotes() {
        assert_eq!(parse_single_string_arg("\"sshd-01\"").as_deref(), Some("sshd-01"));
    }
}
