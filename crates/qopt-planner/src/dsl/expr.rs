//! Infix expression strings of the plan DSL.
//!
//! `t1.a = 3 and b in (1, 2)`, `count(distinct b) as n`, `a desc`. The text is
//! tokenized and parsed with binding powers into an unresolved [`Ast`]; names
//! are bound to columns later, against the scope of the operator's input.

use std::fmt;

use qopt_core::error::{Error, Result};
use qopt_core::expr::{BinOp, UnaryOp};
use qopt_core::types::Scalar;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    As,
    Asc,
    Desc,
    Distinct,
    True,
    False,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) | Token::Number(s) => write!(f, "{}", s),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "is" => Token::Is,
        "null" => Token::Null,
        "as" => Token::As,
        "asc" => Token::Asc,
        "desc" => Token::Desc,
        "distinct" => Token::Distinct,
        "true" => Token::True,
        "false" => Token::False,
        _ => return None,
    })
}

pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(keyword(&word).unwrap_or(Token::Ident(word)));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
            continue;
        }
        if c == '\'' || c == '"' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err(Error::Plan(format!("unterminated string in `{}`", text)));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('<', Some('>')) | ('!', Some('=')) => (Token::Neq, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('=', _) => (Token::Eq, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('*', _) => (Token::Star, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => return Err(Error::Plan(format!("unexpected character `{}` in `{}`", c, text))),
        };
        tokens.push(token);
        i += width;
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Parsed, not yet name-resolved expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Ident {
        qualifier: Option<String>,
        name: String,
    },
    Literal(Scalar),
    Binary {
        op: BinOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Ast>,
    },
    InList {
        expr: Box<Ast>,
        list: Vec<Ast>,
        negated: bool,
    },
    /// `f(args)`, `f(distinct args)` or `count(*)`.
    Call {
        name: String,
        distinct: bool,
        star: bool,
        args: Vec<Ast>,
    },
}

/// An expression with its optional `as` name.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub ast: Ast,
    pub alias: Option<String>,
    pub desc: bool,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    text: String,
}

impl Parser {
    pub fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            text: text.to_string(),
        })
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn error(&self, what: &str) -> Error {
        Error::Plan(format!("{} at `{}` in `{}`", what, self.current(), self.text))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if *self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", expected)))
        }
    }

    fn consume_if(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    /// The whole text as one expression.
    pub fn parse_expression(mut self) -> Result<Ast> {
        let ast = self.parse_expr_bp(0)?;
        self.expect(Token::Eof)?;
        Ok(ast)
    }

    /// `expr [as name]` or `expr [asc|desc]`.
    pub fn parse_item(mut self) -> Result<Item> {
        let ast = self.parse_expr_bp(0)?;
        let mut item = Item {
            ast,
            alias: None,
            desc: false,
        };
        if self.consume_if(&Token::As) {
            match self.current().clone() {
                Token::Ident(name) => {
                    self.advance();
                    item.alias = Some(name);
                }
                _ => return Err(self.error("expected a name after `as`")),
            }
        } else if self.consume_if(&Token::Desc) {
            item.desc = true;
        } else {
            self.consume_if(&Token::Asc);
        }
        self.expect(Token::Eof)?;
        Ok(item)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Ast> {
        let mut lhs = self.parse_prefix()?;
        while let Some((l_bp, r_bp)) = self.infix_binding_power() {
            if l_bp < min_bp {
                break;
            }
            lhs = self.parse_infix(lhs, r_bp)?;
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Ast> {
        match self.current().clone() {
            Token::Number(n) => {
                self.advance();
                Scalar::parse_literal(&n)
                    .map(Ast::Literal)
                    .ok_or_else(|| self.error("invalid number"))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Ast::Literal(Scalar::Str(s)))
            }
            Token::True | Token::False => {
                let value = *self.current() == Token::True;
                self.advance();
                Ok(Ast::Literal(Scalar::Bool(value)))
            }
            Token::Null => {
                self.advance();
                Ok(Ast::Literal(Scalar::Null))
            }
            Token::Minus => {
                self.advance();
                let arg = self.parse_expr_bp(11)?;
                Ok(match arg {
                    Ast::Literal(Scalar::I64(v)) => Ast::Literal(Scalar::I64(-v)),
                    Ast::Literal(Scalar::F64(v)) => Ast::Literal(Scalar::F64(-v)),
                    other => Ast::Unary {
                        op: UnaryOp::Neg,
                        arg: Box::new(other),
                    },
                })
            }
            Token::Not => {
                self.advance();
                let arg = self.parse_expr_bp(5)?;
                Ok(Ast::Unary {
                    op: UnaryOp::Not,
                    arg: Box::new(arg),
                })
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr_bp(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                if self.consume_if(&Token::LParen) {
                    return self.parse_call(name);
                }
                if self.consume_if(&Token::Dot) {
                    return match self.current().clone() {
                        Token::Ident(column) => {
                            self.advance();
                            Ok(Ast::Ident {
                                qualifier: Some(name),
                                name: column,
                            })
                        }
                        _ => Err(self.error("expected a column name after `.`")),
                    };
                }
                Ok(Ast::Ident {
                    qualifier: None,
                    name,
                })
            }
            _ => Err(self.error("unexpected token")),
        }
    }

    /// Arguments of `name(`; the opening parenthesis is consumed.
    fn parse_call(&mut self, name: String) -> Result<Ast> {
        let distinct = self.consume_if(&Token::Distinct);
        if self.consume_if(&Token::Star) {
            self.expect(Token::RParen)?;
            return Ok(Ast::Call {
                name,
                distinct,
                star: true,
                args: Vec::new(),
            });
        }
        let mut args = Vec::new();
        if !self.consume_if(&Token::RParen) {
            loop {
                args.push(self.parse_expr_bp(0)?);
                if self.consume_if(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        Ok(Ast::Call {
            name,
            distinct,
            star: false,
            args,
        })
    }

    fn parse_infix(&mut self, left: Ast, r_bp: u8) -> Result<Ast> {
        let op = match self.current() {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Mod,
            Token::Eq => BinOp::Eq,
            Token::Neq => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::And => BinOp::And,
            Token::Or => BinOp::Or,
            Token::Is => return self.parse_is(left),
            Token::In => {
                self.advance();
                return self.parse_in(left, false);
            }
            Token::Not => {
                self.advance();
                self.expect(Token::In)?;
                return self.parse_in(left, true);
            }
            _ => return Err(self.error("expected an operator")),
        };
        self.advance();
        let right = self.parse_expr_bp(r_bp)?;
        Ok(Ast::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `x is [not] null`.
    fn parse_is(&mut self, left: Ast) -> Result<Ast> {
        self.advance();
        let negated = self.consume_if(&Token::Not);
        self.expect(Token::Null)?;
        let is_null = Ast::Unary {
            op: UnaryOp::IsNull,
            arg: Box::new(left),
        };
        Ok(if negated {
            Ast::Unary {
                op: UnaryOp::Not,
                arg: Box::new(is_null),
            }
        } else {
            is_null
        })
    }

    fn parse_in(&mut self, left: Ast, negated: bool) -> Result<Ast> {
        self.expect(Token::LParen)?;
        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr_bp(0)?);
            if self.consume_if(&Token::RParen) {
                break;
            }
            self.expect(Token::Comma)?;
        }
        Ok(Ast::InList {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn infix_binding_power(&self) -> Option<(u8, u8)> {
        match self.current() {
            Token::Or => Some((1, 2)),
            Token::And => Some((3, 4)),
            Token::Eq | Token::Neq | Token::Lt | Token::Gt | Token::Le | Token::Ge => Some((7, 8)),
            Token::In | Token::Is => Some((7, 8)),
            Token::Not if *self.peek() == Token::In => Some((7, 8)),
            Token::Plus | Token::Minus => Some((9, 10)),
            Token::Star | Token::Slash | Token::Percent => Some((11, 12)),
            _ => None,
        }
    }
}

pub fn parse_expression(text: &str) -> Result<Ast> {
    Parser::new(text)?.parse_expression()
}

pub fn parse_item(text: &str) -> Result<Item> {
    Parser::new(text)?.parse_item()
}
