//! S-expression source representation.
//!
//! Procedure bodies are s-expressions: atoms (symbols, numbers, quoted
//! strings) and parenthesized lists, with `;` line comments.

use crate::error::ScriptError;

/// One parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bare symbol.
    Sym(String),
    /// A quoted string literal, unescaped.
    Str(String),
    /// A numeric literal, kept as its source text.
    Num(String),
    /// A parenthesized form.
    List(Vec<Expr>),
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Atom(String),
    End,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_blank(&mut self) {
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b';' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn next(&mut self) -> Result<Token, ScriptError> {
        self.skip_blank();
        if self.pos >= self.src.len() {
            return Ok(Token::End);
        }
        match self.src[self.pos] {
            b'(' => {
                self.pos += 1;
                Ok(Token::Open)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::Close)
            }
            b'"' => self.string(),
            _ => self.atom(),
        }
    }

    fn string(&mut self) -> Result<Token, ScriptError> {
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b'"' => {
                    self.pos += 1;
                    return Ok(Token::Str(out));
                }
                b'\\' => {
                    self.pos += 1;
                    let esc = *self
                        .src
                        .get(self.pos)
                        .ok_or_else(|| ScriptError::Compile("unterminated string".into()))?;
                    out.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'"' => '"',
                        b'\\' => '\\',
                        other => {
                            return Err(ScriptError::Compile(format!(
                                "unknown escape \\{}",
                                other as char
                            )))
                        }
                    });
                    self.pos += 1;
                }
                _ => {
                    // Source is valid UTF-8; collect the whole code point.
                    let rest = &self.src[self.pos..];
                    let s = std::str::from_utf8(rest)
                        .map_err(|_| ScriptError::Compile("invalid source encoding".into()))?;
                    let ch = s.chars().next().unwrap_or('\u{fffd}');
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Err(ScriptError::Compile("unterminated string".into()))
    }

    fn atom(&mut self) -> Result<Token, ScriptError> {
        let start = self.pos;
        while self.pos < self.src.len() {
            match self.src[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b'"' | b';' => break,
                _ => self.pos += 1,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| ScriptError::Compile("invalid source encoding".into()))?;
        Ok(Token::Atom(text.to_string()))
    }
}

/// Parse a whole source text into its top-level expressions.
pub fn parse(source: &str) -> Result<Vec<Expr>, ScriptError> {
    let mut lexer = Lexer::new(source);
    let mut stack: Vec<Vec<Expr>> = Vec::new();
    let mut top: Vec<Expr> = Vec::new();
    loop {
        let token = lexer.next()?;
        let expr = match token {
            Token::End => break,
            Token::Open => {
                stack.push(std::mem::take(&mut top));
                continue;
            }
            Token::Close => {
                let done = std::mem::take(&mut top);
                top = stack
                    .pop()
                    .ok_or_else(|| ScriptError::Compile("unmatched ')'".into()))?;
                Expr::List(done)
            }
            Token::Str(s) => Expr::Str(s),
            Token::Atom(a) => {
                if a.parse::<f64>().is_ok() {
                    Expr::Num(a)
                } else {
                    Expr::Sym(a)
                }
            }
        };
        top.push(expr);
    }
    if !stack.is_empty() {
        return Err(ScriptError::Compile("unmatched '('".into()));
    }
    Ok(top)
}
