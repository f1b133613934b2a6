//! Precedence-climbing parser for the schema expression language.
//!
//! Binding strength, loosest first:
//!
//! ```text
//! ┌───────┬──────────────────────────┬───────────────┐
//! │ Level │ Operators                │ Associativity │
//! ├───────┼──────────────────────────┼───────────────┤
//! │ 1     │ ? :                      │ right         │
//! │ 2     │ or                       │ left          │
//! │ 3     │ and                      │ left          │
//! │ 4     │ not (prefix)             │ -             │
//! │ 5     │ == != < <= > >=          │ left          │
//! │ 6     │ |                        │ left          │
//! │ 7     │ ^                        │ left          │
//! │ 8     │ &                        │ left          │
//! │ 9     │ << >>                    │ left          │
//! │ 10    │ + -                      │ left          │
//! │ 11    │ * / %                    │ left          │
//! │ 12    │ - ~ (prefix)             │ -             │
//! │ 13    │ .member .as<T> [i] call  │ left          │
//! └───────┴──────────────────────────┴───────────────┘
//! ```

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::{Token, tokenize};

/// Parse failure with the byte offset where it was detected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

/// Parse a complete expression.
///
/// # Errors
///
/// [`ParseError`] if the text does not lex, does not parse, or has
/// trailing tokens.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src).map_err(|e| ParseError {
        offset: e.offset,
        message: e.message,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let expr = parser.ternary()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.error(format!("unexpected {tok:?}"))),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

fn binary_op(tok: &Token) -> Option<(BinaryOp, u8)> {
    Some(match tok {
        Token::Ident(word) if word == "or" => (BinaryOp::Or, 2),
        Token::Ident(word) if word == "and" => (BinaryOp::And, 3),
        Token::EqEq => (BinaryOp::Eq, 5),
        Token::NotEq => (BinaryOp::Ne, 5),
        Token::Lt => (BinaryOp::Lt, 5),
        Token::Le => (BinaryOp::Le, 5),
        Token::Gt => (BinaryOp::Gt, 5),
        Token::Ge => (BinaryOp::Ge, 5),
        Token::Pipe => (BinaryOp::BitOr, 6),
        Token::Caret => (BinaryOp::BitXor, 7),
        Token::Amp => (BinaryOp::BitAnd, 8),
        Token::Shl => (BinaryOp::Shl, 9),
        Token::Shr => (BinaryOp::Shr, 9),
        Token::Plus => (BinaryOp::Add, 10),
        Token::Minus => (BinaryOp::Sub, 10),
        Token::Star => (BinaryOp::Mul, 11),
        Token::Slash => (BinaryOp::Div, 11),
        Token::Percent => (BinaryOp::Rem, 11),
        _ => return None,
    })
}

const NOT_LEVEL: u8 = 4;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}")))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.binary(2)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.ternary()?;
        self.expect(&Token::Colon)?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary(&mut self, min_level: u8) -> Result<Expr, ParseError> {
        let mut lhs = if min_level <= NOT_LEVEL
            && matches!(self.peek(), Some(Token::Ident(w)) if w == "not")
        {
            self.pos += 1;
            Expr::Unary(UnaryOp::Not, Box::new(self.binary(NOT_LEVEL)?))
        } else {
            self.unary()?
        };
        while let Some((op, level)) = self.peek().and_then(binary_op) {
            if level < min_level {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Tilde) => UnaryOp::BitNot,
            Some(Token::Ident(w)) if w == "not" => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.ident()?;
                if name == "as" && self.eat(&Token::Lt) {
                    let mut ty = self.ident()?;
                    while self.eat(&Token::DoubleColon) {
                        ty.push_str("::");
                        ty.push_str(&self.ident()?);
                    }
                    self.expect(&Token::Gt)?;
                    expr = Expr::Cast(Box::new(expr), ty);
                } else if self.eat(&Token::LParen) {
                    let args = self.list(&Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), name, args);
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn list(&mut self, close: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.ternary()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.bump() else {
            return Err(self.error("unexpected end of expression"));
        };
        Ok(match tok {
            Token::Int(v) => Expr::Int(v),
            Token::Float(v) => Expr::Float(v),
            Token::Str(s) => Expr::Str(s),
            Token::Ident(word) if word == "true" => Expr::Bool(true),
            Token::Ident(word) if word == "false" => Expr::Bool(false),
            Token::Ident(word) => {
                if self.peek() == Some(&Token::DoubleColon) {
                    let mut path = vec![word];
                    while self.eat(&Token::DoubleColon) {
                        path.push(self.ident()?);
                    }
                    Expr::EnumRef { path }
                } else {
                    Expr::Name(word)
                }
            }
            Token::LParen => {
                let inner = self.ternary()?;
                self.expect(&Token::RParen)?;
                inner
            }
            Token::LBracket => Expr::Array(self.list(&Token::RBracket)?),
            other => {
                self.pos -= 1;
                return Err(self.error(format!("unexpected {other:?}")));
            }
        })
    }
}
