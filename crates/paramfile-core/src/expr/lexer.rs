//! Tokenizer for snippets.

use crate::exception::Exception;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Statement separator. Only emitted outside brackets.
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
    pub col: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    line: usize,
    line_start: usize,
    depth: usize,
    tokens: Vec<Spanned>,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, Exception> {
    let mut lexer = Lexer {
        chars: src.char_indices().peekable(),
        src,
        line: 1,
        line_start: 0,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn error(&self, pos: usize, message: &str) -> Exception {
        Exception::syntax_error(format!(
            "{message} (line {}, column {})",
            self.line,
            pos - self.line_start + 1
        ))
        .with_attr("lineno", i64::try_from(self.line).unwrap_or(i64::MAX))
    }

    fn push(&mut self, token: Token, pos: usize) {
        self.tokens.push(Spanned {
            token,
            line: self.line,
            col: pos - self.line_start + 1,
        });
    }

    fn next_is(&mut self, c: char) -> bool {
        if self.chars.peek().is_some_and(|&(_, next)| next == c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn run(&mut self) -> Result<(), Exception> {
        while let Some((pos, c)) = self.chars.next() {
            match c {
                '\n' => {
                    if self.depth == 0 {
                        self.push(Token::Newline, pos);
                    }
                    self.line += 1;
                    self.line_start = pos + 1;
                }
                ' ' | '\t' | '\r' => {}
                '\\' if self.chars.peek().is_some_and(|&(_, next)| next == '\n') => {
                    self.chars.next();
                    self.line += 1;
                    self.line_start = pos + 2;
                }
                '#' => {
                    while self.chars.peek().is_some_and(|&(_, next)| next != '\n') {
                        self.chars.next();
                    }
                }
                '(' | '[' | '{' => {
                    self.depth += 1;
                    let token = match c {
                        '(' => Token::LParen,
                        '[' => Token::LBracket,
                        _ => Token::LBrace,
                    };
                    self.push(token, pos);
                }
                ')' | ']' | '}' => {
                    if self.depth == 0 {
                        return Err(self.error(pos, &format!("unmatched '{c}'")));
                    }
                    self.depth -= 1;
                    let token = match c {
                        ')' => Token::RParen,
                        ']' => Token::RBracket,
                        _ => Token::RBrace,
                    };
                    self.push(token, pos);
                }
                ',' => self.push(Token::Comma, pos),
                ':' => self.push(Token::Colon, pos),
                ';' => self.push(Token::Semicolon, pos),
                '+' => self.push(Token::Plus, pos),
                '-' => self.push(Token::Minus, pos),
                '%' => self.push(Token::Percent, pos),
                '*' => {
                    let token = if self.next_is('*') {
                        Token::DoubleStar
                    } else {
                        Token::Star
                    };
                    self.push(token, pos);
                }
                '/' => {
                    let token = if self.next_is('/') {
                        Token::DoubleSlash
                    } else {
                        Token::Slash
                    };
                    self.push(token, pos);
                }
                '=' => {
                    let token = if self.next_is('=') {
                        Token::EqEq
                    } else {
                        Token::Assign
                    };
                    self.push(token, pos);
                }
                '!' => {
                    if !self.next_is('=') {
                        return Err(self.error(pos, "invalid syntax"));
                    }
                    self.push(Token::NotEq, pos);
                }
                '<' => {
                    let token = if self.next_is('=') { Token::Le } else { Token::Lt };
                    self.push(token, pos);
                }
                '>' => {
                    let token = if self.next_is('=') { Token::Ge } else { Token::Gt };
                    self.push(token, pos);
                }
                '\'' | '"' => {
                    let s = self.string(pos, c)?;
                    self.push(Token::Str(s), pos);
                }
                '.' if self.chars.peek().is_some_and(|&(_, next)| next.is_ascii_digit()) => {
                    let token = self.number(pos)?;
                    self.push(token, pos);
                }
                '.' => self.push(Token::Dot, pos),
                c if c.is_ascii_digit() => {
                    let token = self.number(pos)?;
                    self.push(token, pos);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut end = pos + c.len_utf8();
                    while let Some(&(i, next)) = self.chars.peek() {
                        if next.is_alphanumeric() || next == '_' {
                            end = i + next.len_utf8();
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = self.src[pos..end].to_string();
                    self.push(Token::Name(name), pos);
                }
                _ => return Err(self.error(pos, &format!("invalid character '{c}'"))),
            }
        }
        if self.depth > 0 {
            return Err(self.error(self.src.len(), "unexpected end of input"));
        }
        let end = self.src.len();
        self.push(Token::Eof, end);
        Ok(())
    }

    fn number(&mut self, start: usize) -> Result<Token, Exception> {
        let mut end = start + 1;
        let mut is_float = self.src[start..end] == *".";
        while let Some(&(i, c)) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.src[..i].chars().last(), Some('e' | 'E'))
                && is_float;
            if c.is_ascii_digit() || c == '_' || exponent_sign {
                end = i + 1;
            } else if c == '.' && !is_float {
                is_float = true;
                end = i + 1;
            } else if c == 'e' || c == 'E' {
                is_float = true;
                end = i + 1;
            } else {
                break;
            }
            self.chars.next();
        }
        let text = self.src[start..end].replace('_', "");
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(start, &format!("invalid float literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(start, &format!("integer literal '{text}' out of range")))
        }
    }

    fn string(&mut self, start: usize, quote: char) -> Result<String, Exception> {
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(self.error(start, "unterminated string literal"));
            };
            match c {
                c if c == quote => return Ok(out),
                '\n' => return Err(self.error(start, "unterminated string literal")),
                '\\' => {
                    let Some((_, escaped)) = self.chars.next() else {
                        return Err(self.error(start, "unterminated string literal"));
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }
}
