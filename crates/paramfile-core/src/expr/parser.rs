//! Recursive-descent parser producing the snippet AST.

use super::lexer::{tokenize, Spanned, Token};
use crate::exception::Exception;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Const(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Chained comparison: `a < b <= c`.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Assign(Vec<String>, Expr),
    Assert(Expr, Option<Expr>),
    Expr(Expr),
    Pass,
}

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "if", "else", "assert", "pass", "True", "False", "None",
];

/// Parses a single expression. A bare tuple (`1, 2`) becomes a list.
pub(crate) fn parse_expression(src: &str) -> Result<Expr, Exception> {
    let mut parser = Parser::new(src)?;
    parser.skip_newlines();
    let expr = parser.expression_list()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(expr)
}

/// Parses a sequence of statements separated by newlines or semicolons.
pub(crate) fn parse_program(src: &str) -> Result<Vec<Stmt>, Exception> {
    let mut parser = Parser::new(src)?;
    let mut stmts = Vec::new();
    loop {
        while matches!(parser.peek(), Token::Newline | Token::Semicolon) {
            parser.advance();
        }
        if *parser.peek() == Token::Eof {
            return Ok(stmts);
        }
        stmts.push(parser.statement()?);
        match parser.peek() {
            Token::Newline | Token::Semicolon | Token::Eof => {}
            _ => return Err(parser.unexpected()),
        }
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, Exception> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(name) if name == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), Exception> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<(), Exception> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn skip_newlines(&mut self) {
        while *self.peek() == Token::Newline {
            self.advance();
        }
    }

    fn unexpected(&self) -> Exception {
        let spanned = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        let what = match &spanned.token {
            Token::Eof => "unexpected end of input".to_string(),
            Token::Newline => "unexpected end of line".to_string(),
            token => format!("unexpected {token:?}"),
        };
        Exception::syntax_error(format!(
            "invalid syntax: {what} (line {}, column {})",
            spanned.line, spanned.col
        ))
        .with_attr("lineno", i64::try_from(spanned.line).unwrap_or(i64::MAX))
    }

    fn statement(&mut self) -> Result<Stmt, Exception> {
        if self.eat_keyword("pass") {
            return Ok(Stmt::Pass);
        }
        if self.eat_keyword("assert") {
            let test = self.expression()?;
            let message = if self.eat(&Token::Comma) {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::Assert(test, message));
        }

        let first = self.expression_list()?;
        if !self.eat(&Token::Assign) {
            return Ok(Stmt::Expr(first));
        }
        let targets = match first {
            Expr::Name(name) => vec![name],
            Expr::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Expr::Name(name) => Ok(name),
                    _ => Err(Exception::syntax_error("cannot assign to expression")),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(Exception::syntax_error("cannot assign to expression")),
        };
        let value = self.expression_list()?;
        Ok(Stmt::Assign(targets, value))
    }

    /// `a, b, c` at the top level of a statement or expression.
    fn expression_list(&mut self) -> Result<Expr, Exception> {
        let first = self.expression()?;
        if *self.peek() != Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::List(items))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Eof
                | Token::Newline
                | Token::Semicolon
                | Token::Assign
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
        )
    }

    fn expression(&mut self) -> Result<Expr, Exception> {
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let cond = self.or_expr()?;
            if !self.eat_keyword("else") {
                return Err(self.unexpected());
            }
            let otherwise = self.expression()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr, Exception> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, Exception> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, Exception> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        if self.is_keyword("not") && matches!(self.peek_at(1), Token::Name(next) if next == "in") {
            self.advance();
            self.advance();
            return Some(CmpOp::NotIn);
        }
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            Token::Name(name) if name == "in" => CmpOp::In,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, Exception> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, Exception> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, Exception> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr, Exception> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.factor()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, Exception> {
        let base = self.postfix()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, Exception> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Name(attr) => expr = Expr::Attr(Box::new(expr), attr),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected());
                        }
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression_list()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    self.advance();
                    let args = self.sequence(&Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma separated expressions up to `close`, allowing a trailing comma.
    fn sequence(&mut self, close: &Token) -> Result<Vec<Expr>, Exception> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr, Exception> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Const(Value::Int(n)))
            }
            Token::Float(x) => {
                self.advance();
                Ok(Expr::Const(Value::Float(x)))
            }
            Token::Str(s) => {
                self.advance();
                let mut s = s;
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Const(Value::Str(s)))
            }
            Token::Name(name) => {
                let constant = match name.as_str() {
                    "True" | "true" => Some(Value::Bool(true)),
                    "False" | "false" => Some(Value::Bool(false)),
                    "None" | "null" => Some(Value::None),
                    _ => None,
                };
                if let Some(value) = constant {
                    self.advance();
                    return Ok(Expr::Const(value));
                }
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.unexpected());
                }
                self.advance();
                Ok(Expr::Name(name))
            }
            Token::LParen => {
                self.advance();
                if self.eat(&Token::RParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                self.expect(&Token::Comma)?;
                let mut items = vec![first];
                items.extend(self.sequence(&Token::RParen)?);
                Ok(Expr::List(items))
            }
            Token::LBracket => {
                self.advance();
                Ok(Expr::List(self.sequence(&Token::RBracket)?))
            }
            Token::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = self.expression()?;
                    self.expect(&Token::Colon)?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace)?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        let Expr::Binary(BinOp::Add, _, right) = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse_expression("-2 ** 2").unwrap();
        assert!(matches!(expr, Expr::Unary(UnaryOp::Neg, _)));
    }

    #[test]
    fn test_bare_tuple_is_list() {
        assert!(matches!(parse_expression("1, 2").unwrap(), Expr::List(items) if items.len() == 2));
        assert!(matches!(parse_expression("(1,)").unwrap(), Expr::List(items) if items.len() == 1));
        assert!(matches!(parse_expression("(1)").unwrap(), Expr::Const(Value::Int(1))));
    }

    #[test]
    fn test_not_in() {
        let expr = parse_expression("a not in b").unwrap();
        let Expr::Compare(_, rest) = expr else {
            panic!("expected comparison");
        };
        assert_eq!(rest[0].0, CmpOp::NotIn);
    }

    #[test]
    fn test_statements() {
        let stmts = parse_program("a, b = 1, 2\nassert a < b, 'order'; pass").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Stmt::Assign(targets, _) if targets == &["a", "b"]));
        assert!(matches!(&stmts[1], Stmt::Assert(_, Some(_))));
        assert!(matches!(&stmts[2], Stmt::Pass));
    }

    #[test]
    fn test_multiline_literals() {
        let stmts = parse_program("x = {\n  'a': 1,\n  'b': [1,\n 2],\n}\n").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse_expression("1 +").unwrap_err().kind(), "SyntaxError");
        assert_eq!(parse_expression("a b").unwrap_err().kind(), "SyntaxError");
        assert_eq!(parse_program("1 = a").unwrap_err().kind(), "SyntaxError");
        assert_eq!(parse_expression("x = 1").unwrap_err().kind(), "SyntaxError");
    }
}
