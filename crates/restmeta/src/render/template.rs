//! Minimal `{{ ... }}` template language used by metadata strings.
//!
//! Supported actions:
//!
//! - `{{.}}` and field chains `{{.realm}}`, `{{.payload.spec.name}}`
//! - string (`"..."`, `` `...` ``), number, `true`/`false`/`nil` literals
//! - function calls with space-separated arguments (`{{resource_format .}}`)
//!   and pipelines (`{{. | resource_format}}`)
//! - trim markers (`{{- ` / ` -}}`) and comments (`{{/* ... */}}`)
//!
//! Looking up a missing key is an execution error. Control structures
//! (`if`, `range`, ...) and variables are rejected at parse time.

use serde_json::Value;

use crate::error::{Error, Result};

/// Functions callable from templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    ResourceFormat,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "resource_format" => Some(Self::ResourceFormat),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::ResourceFormat => "resource_format",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Dot,
    Field(Vec<String>),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Operand(Operand),
    Call(Function, Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action(Vec<Command>),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`.
    ///
    /// Errors are [`Error::Template`] values describing the first syntax
    /// problem.
    pub(crate) fn parse(source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            let mut text = &rest[..open];
            let mut inner = &rest[open + 2..];
            if has_trim_marker(inner, true) {
                text = text.trim_end();
                inner = &inner[1..];
            }

            let close = action_end(inner)
                .ok_or_else(|| Error::Template("unclosed action".to_string()))?;
            let mut body = &inner[..close];
            let mut after = &inner[close + 2..];
            if has_trim_marker(body, false) {
                body = &body[..body.len() - 1];
                after = after.trim_start();
            }

            if !text.is_empty() {
                nodes.push(Node::Text(text.to_string()));
            }
            if let Some(pipeline) = parse_action(body)? {
                nodes.push(Node::Action(pipeline));
            }
            rest = after;
        }

        if !rest.is_empty() {
            nodes.push(Node::Text(rest.to_string()));
        }
        Ok(Self { nodes })
    }

    /// Render against `scope`; `scope["resourceFormat"]` feeds
    /// `resource_format`.
    pub(crate) fn execute(&self, scope: &Value) -> Result<String> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = eval_pipeline(pipeline, scope)?;
                    write_value(&mut out, &value);
                }
            }
        }
        Ok(out)
    }
}

/// Byte offset of the `}}` closing an action, skipping quoted literals.
fn action_end(inner: &str) -> Option<usize> {
    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// `{{- ` at the start of an action or ` -}}` at its end.
fn has_trim_marker(s: &str, leading: bool) -> bool {
    let bytes = s.as_bytes();
    if leading {
        bytes.first() == Some(&b'-') && bytes.get(1).is_some_and(u8::is_ascii_whitespace)
    } else {
        let n = bytes.len();
        n >= 2 && bytes[n - 1] == b'-' && bytes[n - 2].is_ascii_whitespace()
    }
}

// ---------------------------------------------------------------------------
// Lexing and parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    Field(Vec<String>),
    Ident(String),
    Literal(Value),
    Pipe,
}

fn parse_action(body: &str) -> Result<Option<Vec<Command>>> {
    let trimmed = body.trim();
    if trimmed.starts_with("/*") {
        if trimmed.ends_with("*/") {
            return Ok(None);
        }
        return Err(Error::Template("unclosed comment".to_string()));
    }

    let tokens = lex(trimmed)?;
    if tokens.is_empty() {
        return Err(Error::Template("missing value for command".to_string()));
    }

    let mut pipeline = Vec::new();
    for (idx, group) in tokens.split(|t| *t == Token::Pipe).enumerate() {
        let command = parse_command(group)?;
        if idx > 0 && !matches!(command, Command::Call(..)) {
            return Err(Error::Template(
                "non-function in pipeline after the first command".to_string(),
            ));
        }
        pipeline.push(command);
    }
    Ok(Some(pipeline))
}

fn parse_command(tokens: &[Token]) -> Result<Command> {
    let Some((first, args)) = tokens.split_first() else {
        return Err(Error::Template("missing command in pipeline".to_string()));
    };

    if let Token::Ident(name) = first {
        let function = Function::lookup(name)
            .ok_or_else(|| Error::Template(format!("function {name:?} not defined")))?;
        let args = args.iter().map(operand).collect::<Result<Vec<_>>>()?;
        return Ok(Command::Call(function, args));
    }

    if !args.is_empty() {
        return Err(Error::Template(
            "can't give argument to non-function".to_string(),
        ));
    }
    Ok(Command::Operand(operand(first)?))
}

fn operand(token: &Token) -> Result<Operand> {
    match token {
        Token::Dot => Ok(Operand::Dot),
        Token::Field(path) => Ok(Operand::Field(path.clone())),
        Token::Literal(value) => Ok(Operand::Literal(value.clone())),
        Token::Ident(name) => Err(Error::Template(format!(
            "function {name:?} used as an argument"
        ))),
        Token::Pipe => Err(Error::Template("unexpected \"|\"".to_string())),
    }
}

const KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

fn lex(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '.' => {
                let mut path = Vec::new();
                while i < chars.len() && chars[i] == '.' {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident_char(chars[end]) {
                        end += 1;
                    }
                    if end == start {
                        break;
                    }
                    path.push(chars[start..end].iter().collect());
                    i = end;
                }
                if path.is_empty() {
                    tokens.push(Token::Dot);
                    i += 1;
                } else {
                    tokens.push(Token::Field(path));
                }
            }
            '"' => {
                let (text, next) = lex_quoted(&chars, i)?;
                tokens.push(Token::Literal(Value::String(text)));
                i = next;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or_else(|| Error::Template("unterminated raw quoted string".to_string()))?;
                let text: String = chars[i + 1..i + 1 + end].iter().collect();
                tokens.push(Token::Literal(Value::String(text)));
                i += end + 2;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '_' | '+' | '-')) {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let number: serde_json::Number = raw
                    .parse()
                    .map_err(|_| Error::Template(format!("bad number syntax: {raw:?}")))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "nil" => Token::Literal(Value::Null),
                    kw if KEYWORDS.contains(&kw) => {
                        return Err(Error::Template(format!("unsupported action {kw:?}")));
                    }
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            other => {
                return Err(Error::Template(format!(
                    "unexpected {other:?} in command"
                )));
            }
        }
    }

    Ok(tokens)
}

fn lex_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| Error::Template("unterminated quoted string".to_string()))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(Error::Template("unterminated quoted string".to_string()))
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval_pipeline(pipeline: &[Command], scope: &Value) -> Result<Value> {
    let mut piped: Option<Value> = None;
    for command in pipeline {
        let value = match command {
            Command::Operand(op) => eval_operand(op, scope)?,
            Command::Call(function, args) => {
                let mut values = args
                    .iter()
                    .map(|arg| eval_operand(arg, scope))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(previous) = piped.take() {
                    values.push(previous);
                }
                call(*function, &values, scope)?
            }
        };
        piped = Some(value);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_operand(operand: &Operand, scope: &Value) -> Result<Value> {
    match operand {
        Operand::Dot => Ok(scope.clone()),
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Field(path) => {
            let mut current = scope;
            for name in path {
                current = match current {
                    Value::Object(map) => map.get(name).ok_or_else(|| {
                        Error::Template(format!("map has no entry for key {name:?}"))
                    })?,
                    Value::Null => {
                        return Err(Error::Template(format!(
                            "nil pointer evaluating field {name:?}"
                        )));
                    }
                    other => {
                        return Err(Error::Template(format!(
                            "can't evaluate field {name} in type {}",
                            type_name(other)
                        )));
                    }
                };
            }
            Ok(current.clone())
        }
    }
}

fn call(function: Function, args: &[Value], scope: &Value) -> Result<Value> {
    match function {
        Function::ResourceFormat => {
            let [arg] = args else {
                return Err(Error::Template(format!(
                    "wrong number of args for {}: want 1 got {}",
                    function.name(),
                    args.len()
                )));
            };
            if !matches!(arg, Value::Null | Value::Object(_)) {
                return Err(Error::validation(
                    "resource_format template function expects root scope argument (.)",
                ));
            }
            let configured = scope
                .get("resourceFormat")
                .and_then(Value::as_str)
                .unwrap_or_default();
            crate::format::validate_resource_format(configured).map(Value::String)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Array(_) | Value::Object(_) => out.push_str(&value.to_string()),
    }
}
