//! Tokenizer for the sandbox language.
//!
//! A small JS-like surface: identifiers, number and string literals,
//! punctuation, and line/block comments. Newlines are emitted as
//! tokens because they terminate statements.

use crate::error::SandboxError;

/// One token with its 1-indexed source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token payload.
    pub kind: TokenKind,
    /// 1-indexed line the token starts on.
    pub line: usize,
}

/// Token payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident(String),
    /// Number literal.
    Num(f64),
    /// String literal (quotes stripped, escapes resolved).
    Str(String),
    /// Punctuation or operator, e.g. `(`, `===`, `&&`.
    Punct(&'static str),
    /// Statement-terminating newline.
    Newline,
}

/// Multi-char operators, longest first so maximal munch works.
const OPERATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "=>",
    "(", ")", "[", "]", "{", "}", ",", ";", ".", "+", "-", "*", "/", "%",
    "<", ">", "=", "!", ":",
];

/// Tokenizes `code`.
///
/// # Errors
///
/// Returns [`SandboxError::Parse`] on unterminated strings or
/// characters outside the language.
pub fn tokenize(code: &str) -> Result<Vec<Token>, SandboxError> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    let mut line = 1usize;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            tokens.push(Token {
                kind: TokenKind::Newline,
                line,
            });
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Line comment
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        // Block comment
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    line += 1;
                }
                i += 1;
            }
            i = (i + 2).min(chars.len());
            continue;
        }

        // String literal
        if c == '"' || c == '\'' || c == '`' {
            let quote = c;
            let start_line = line;
            let mut s = String::new();
            i += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(SandboxError::Parse {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    });
                };
                if ch == quote {
                    i += 1;
                    break;
                }
                if ch == '\n' {
                    if quote != '`' {
                        return Err(SandboxError::Parse {
                            line: start_line,
                            message: "unterminated string literal".to_string(),
                        });
                    }
                    line += 1;
                    s.push('\n');
                    i += 1;
                    continue;
                }
                if ch == '\\' {
                    i += 1;
                    let escaped = chars.get(i).copied().unwrap_or('\\');
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    i += 1;
                    continue;
                }
                s.push(ch);
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Str(s),
                line: start_line,
            });
            continue;
        }

        // Number literal
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| SandboxError::Parse {
                line,
                message: format!("bad number literal {text:?}"),
            })?;
            tokens.push(Token {
                kind: TokenKind::Num(value),
                line,
            });
            continue;
        }

        // Identifier / keyword
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                line,
            });
            continue;
        }

        // Operators, longest match first
        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        let matched = OPERATORS.iter().find(|op| rest.starts_with(**op));
        match matched {
            Some(op) => {
                tokens.push(Token {
                    kind: TokenKind::Punct(op),
                    line,
                });
                i += op.len();
            }
            None => {
                return Err(SandboxError::Parse {
                    line,
                    message: format!("unexpected character {c:?}"),
                });
            }
        }
    }

    Ok(tokens)
}
