/// Domain identifier extraction from a submission's Python config source.
///
/// Two independent extractors composed by ordered fallback:
///
/// 1. [`structured_domain`] tokenizes the source into logical lines, finds
///    class bodies and reads a class-level `domain: <annotation> = <value>`
///    whose value matches one of the accepted [`FieldShape`]s.
/// 2. [`textual_domain`] runs an ordered table of regexes over the raw text.
///
/// The first non-empty result wins. The structured pass is insensitive to
/// whitespace and line breaks; the textual pass still works on sources the
/// tokenizer rejects.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Structured,
    Textual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMatch {
    pub value: String,
    pub strategy: Strategy,
}

/// Try the structured extractor, then the textual one
pub fn extract_domain(source: &str) -> Option<DomainMatch> {
    match structured_domain(source) {
        Ok(Some(value)) => {
            return Some(DomainMatch {
                value,
                strategy: Strategy::Structured,
            })
        }
        Ok(None) => log::debug!("No class-level domain field found, trying textual patterns"),
        Err(e) => log::debug!("Config source not tokenizable ({}), trying textual patterns", e),
    }

    textual_domain(source).map(|value| DomainMatch {
        value,
        strategy: Strategy::Textual,
    })
}

// ---------------------------------------------------------------------------
// Structured extraction

/// Accepted syntactic shapes of the `domain` field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// `domain: str = "maze"`
    Literal,
    /// `domain: str = Field(default="maze", ...)`
    BuilderDefault,
}

/// Tried in order; extend here to accept new shapes
pub const FIELD_SHAPES: &[FieldShape] = &[FieldShape::Literal, FieldShape::BuilderDefault];

impl FieldShape {
    fn extract(&self, value: &[Token]) -> Option<String> {
        match self {
            FieldShape::Literal => string_literal(value),
            FieldShape::BuilderDefault => builder_default(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError(String);

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    /// Plain string literal value; `None` for bytes and f-strings
    Str(Option<String>),
    Number,
    Op(String),
}

impl Token {
    fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(o) if o == op)
    }

    fn is_name(&self, name: &str) -> bool {
        matches!(self, Token::Name(n) if n == name)
    }
}

#[derive(Debug)]
struct LogicalLine {
    indent: usize,
    tokens: Vec<Token>,
}

/// Class-level `domain` field value, if any class declares one
pub fn structured_domain(source: &str) -> Result<Option<String>, SyntaxError> {
    let lines = logical_lines(source)?;

    for (i, line) in lines.iter().enumerate() {
        let is_class_header = line.tokens.first().is_some_and(|t| t.is_name("class"))
            && line.tokens.last().is_some_and(|t| t.is_op(":"));
        if !is_class_header {
            continue;
        }

        let body = &lines[i + 1..];
        let Some(body_indent) = body
            .first()
            .map(|l| l.indent)
            .filter(|indent| *indent > line.indent)
        else {
            continue;
        };

        let found = body
            .iter()
            .take_while(|l| l.indent > line.indent)
            .filter(|l| l.indent == body_indent)
            .find_map(|l| domain_field(&l.tokens));
        if found.is_some() {
            return Ok(found);
        }
    }

    Ok(None)
}

/// `domain : <annotation> = <value>` with an accepted value shape
fn domain_field(tokens: &[Token]) -> Option<String> {
    if tokens.len() < 4 || !tokens[0].is_name("domain") || !tokens[1].is_op(":") {
        return None;
    }

    let mut depth = 0i32;
    let mut eq = None;
    for (i, token) in tokens.iter().enumerate().skip(2) {
        match token {
            Token::Op(o) if matches!(o.as_str(), "(" | "[" | "{") => depth += 1,
            Token::Op(o) if matches!(o.as_str(), ")" | "]" | "}") => depth -= 1,
            Token::Op(o) if o == "=" && depth == 0 => {
                eq = Some(i);
                break;
            }
            _ => {}
        }
    }

    let value = &tokens[eq? + 1..];
    FIELD_SHAPES.iter().find_map(|shape| shape.extract(value))
}

/// One or more adjacent plain string literals, concatenated
fn string_literal(tokens: &[Token]) -> Option<String> {
    if tokens.is_empty() {
        return None;
    }
    let mut value = String::new();
    for token in tokens {
        match token {
            Token::Str(Some(s)) => value.push_str(s),
            _ => return None,
        }
    }
    Some(value)
}

/// `Callee(..., default=<literal>, ...)` where the callee may be dotted
fn builder_default(tokens: &[Token]) -> Option<String> {
    let mut i = 0;
    loop {
        if !matches!(tokens.get(i), Some(Token::Name(_))) {
            return None;
        }
        i += 1;
        if tokens.get(i).is_some_and(|t| t.is_op(".")) {
            i += 1;
        } else {
            break;
        }
    }

    if !tokens.get(i).is_some_and(|t| t.is_op("(")) || !tokens.last()?.is_op(")") {
        return None;
    }
    let args = &tokens[i + 1..tokens.len() - 1];

    let mut depth = 0i32;
    let mut start = 0;
    let mut arguments = Vec::new();
    for (j, token) in args.iter().enumerate() {
        match token {
            Token::Op(o) if matches!(o.as_str(), "(" | "[" | "{") => depth += 1,
            Token::Op(o) if matches!(o.as_str(), ")" | "]" | "}") => depth -= 1,
            Token::Op(o) if o == "," && depth == 0 => {
                arguments.push(&args[start..j]);
                start = j + 1;
            }
            _ => {}
        }
    }
    arguments.push(&args[start..]);

    arguments.into_iter().find_map(|arg| match arg {
        [Token::Name(name), Token::Op(eq), rest @ ..] if name == "default" && eq == "=" => {
            string_literal(rest)
        }
        _ => None,
    })
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const TWO_CHAR_OPS: &[&str] = &[
    "==", "!=", "<=", ">=", "->", ":=", "**", "//", "<<", ">>", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];

/// Split Python source into logical lines of tokens.
///
/// Comments and blank lines are dropped, bracketed continuations and
/// backslash continuations are joined.
fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, SyntaxError> {
    let chars: Vec<char> = source.chars().collect();
    let mut lines = Vec::new();
    let mut tokens: Vec<Token> = Vec::new();
    let mut indent = 0usize;
    let mut depth = 0usize;
    let mut at_line_start = true;
    let mut i = 0usize;

    while i < chars.len() {
        if at_line_start {
            let mut col = 0usize;
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t' || chars[i] == '\x0c') {
                col = if chars[i] == '\t' { (col / 8 + 1) * 8 } else { col + 1 };
                i += 1;
            }
            indent = col;
            at_line_start = false;
            continue;
        }

        let c = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => i += 2,
            '\\' if chars.get(i + 1) == Some(&'\r') && chars.get(i + 2) == Some(&'\n') => i += 3,
            '\n' => {
                i += 1;
                if depth == 0 {
                    if !tokens.is_empty() {
                        lines.push(LogicalLine {
                            indent,
                            tokens: std::mem::take(&mut tokens),
                        });
                    }
                    at_line_start = true;
                }
            }
            ' ' | '\t' | '\r' | '\x0c' => i += 1,
            '"' | '\'' => {
                let (value, next) = read_string(&chars, i, "")?;
                tokens.push(Token::Str(value));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_prefix = word.len() <= 2
                    && word.chars().all(|p| "rRbBuUfF".contains(p))
                    && matches!(chars.get(i), Some('"') | Some('\''));
                if is_prefix {
                    let (value, next) = read_string(&chars, i, &word.to_ascii_lowercase())?;
                    tokens.push(Token::Str(value));
                    i = next;
                } else {
                    tokens.push(Token::Name(word));
                }
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number);
            }
            '(' | '[' | '{' => {
                depth += 1;
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
            ')' | ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SyntaxError(format!("unbalanced '{}'", c)))?;
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let op = THREE_CHAR_OPS
                    .iter()
                    .chain(TWO_CHAR_OPS.iter())
                    .find(|op| rest.starts_with(**op))
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| c.to_string());
                i += op.chars().count();
                tokens.push(Token::Op(op));
            }
        }
    }

    if depth > 0 {
        return Err(SyntaxError("unclosed bracket at end of file".to_string()));
    }
    if !tokens.is_empty() {
        lines.push(LogicalLine { indent, tokens });
    }
    Ok(lines)
}

/// Read a string literal starting at the opening quote.
/// Returns the decoded value (plain strings only) and the index after it.
fn read_string(
    chars: &[char],
    start: usize,
    prefix: &str,
) -> Result<(Option<String>, usize), SyntaxError> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let raw = prefix.contains('r');
    let plain = !prefix.contains('b') && !prefix.contains('f');

    let mut i = start + if triple { 3 } else { 1 };
    let mut value = String::new();

    loop {
        let Some(&c) = chars.get(i) else {
            return Err(SyntaxError("unterminated string literal".to_string()));
        };

        if c == quote {
            if !triple {
                i += 1;
                break;
            }
            if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                i += 3;
                break;
            }
        }

        if c == '\n' && !triple {
            return Err(SyntaxError("unterminated string literal".to_string()));
        }

        if c == '\\' {
            let Some(&next) = chars.get(i + 1) else {
                return Err(SyntaxError("unterminated string literal".to_string()));
            };
            if raw {
                value.push(c);
                value.push(next);
            } else {
                match next {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    '\\' | '\'' | '"' => value.push(next),
                    '\n' => {}
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            i += 2;
            continue;
        }

        value.push(c);
        i += 1;
    }

    Ok((plain.then_some(value), i))
}

// ---------------------------------------------------------------------------
// Textual fallback

/// Ordered textual patterns; the first capture of the first match wins
static TEXTUAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // domain: str = Field(default="maze")
        r#"\bdomain\s*(?::\s*[A-Za-z_][\w\[\]., ]*)?[:=]\s*Field\s*\(\s*default\s*=\s*["']([^"']+)["']"#,
        // domain = "maze" / domain: str = "maze"
        r#"\bdomain\s*(?::\s*[A-Za-z_][\w\[\]., ]*)?[:=]\s*["']([^"']+)["']"#,
    ]
    .iter()
    .filter_map(|p| match Regex::new(p) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("Invalid domain pattern {}: {}", p, e);
            None
        }
    })
    .collect()
});

pub fn textual_domain(source: &str) -> Option<String> {
    TEXTUAL_PATTERNS
        .iter()
        .find_map(|re| re.captures(source))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
