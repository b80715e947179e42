//! Recursive descent parser turning rule tokens into an expression tree.

use super::lexer::{Spanned, Token, tokenize};
use crate::error::RuleError;

/// Deepest nesting of parentheses, brackets, calls, `not` and unary `-`
/// accepted in one rule. Parsing and evaluation both recurse per level.
pub const MAX_NESTING: usize = 128;

/// Longest rule accepted, in tokens. Operator chains like `a + b + c` build a
/// tree as deep as they are long, so this also bounds evaluation depth.
pub const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NotEq,
    In,
    NotIn,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

/// Parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` evaluates as `a < b and b <= c`, with `b` evaluated once.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Call(String, Vec<Expr>),
}

/// Parse a complete rule expression.
pub fn parse(input: &str) -> Result<Expr, RuleError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: input.chars().count(),
        depth: 0,
    };
    if tokens.is_empty() {
        return Err(parser.error("Empty expression"));
    }
    if tokens.len() > MAX_TOKENS {
        parser.pos = MAX_TOKENS;
        return Err(parser.error(format!(
            "Expression longer than {} tokens",
            MAX_TOKENS
        )));
    }
    let expr = parser.parse_or()?;
    if parser.pos < tokens.len() {
        return Err(parser.error(format!(
            "Unexpected token: {:?}",
            tokens[parser.pos].token
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.pos).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> RuleError {
        RuleError::Parse {
            message: message.into(),
            position: self.position(),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), RuleError> {
        if self.eat(&token) {
            Ok(())
        } else if self.peek().is_none() {
            Err(self.error(format!("Unexpected end of expression, expected {}", what)))
        } else {
            Err(self.error(format!("Expected {}", what)))
        }
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, RuleError>,
    ) -> Result<T, RuleError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("Expression nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, RuleError> {
        self.nested(Self::parse_or_chain)
    }

    // or = and ('or' and)*
    fn parse_or_chain(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and = not ('and' not)*
    fn parse_and(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // not = 'not' not | comparison
    fn parse_not(&mut self) -> Result<Expr, RuleError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    // comparison = additive (cmp_op additive)*
    fn parse_comparison(&mut self) -> Result<Expr, RuleError> {
        let first = self.parse_additive()?;
        let mut chain = Vec::new();
        while let Some(op) = self.compare_op() {
            let right = self.parse_additive()?;
            chain.push((op, right));
        }
        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    /// Consume a comparison operator if one is next.
    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek()? {
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::In => CompareOp::In,
            Token::Not if self.peek_at(1) == Some(&Token::In) => {
                self.pos += 1;
                CompareOp::NotIn
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    // additive = term (('+' | '-') term)*
    fn parse_additive(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // unary = '-' unary | postfix
    fn parse_unary(&mut self) -> Result<Expr, RuleError> {
        if self.eat(&Token::Minus) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    // postfix = primary ('[' expr ']' | '.' IDENT)*
    fn parse_postfix(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let index = self.parse_or()?;
                self.expect(Token::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::Dot) {
                match self.peek() {
                    Some(Token::Ident(name)) => {
                        self.pos += 1;
                        expr = Expr::Member(Box::new(expr), name.clone());
                    }
                    _ => return Err(self.error("Expected attribute name after '.'")),
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, RuleError> {
        let Some(token) = self.peek() else {
            return Err(self.error("Unexpected end of expression"));
        };
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(*n))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Str(s.clone()))
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            Token::Ident(name) => {
                self.pos += 1;
                if self.eat(&Token::LParen) {
                    let args = self.parse_list(Token::RParen, "')'")?;
                    Ok(Expr::Call(name.clone(), args))
                } else {
                    Ok(Expr::Var(name.clone()))
                }
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.pos += 1;
                let items = self.parse_list(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            other => Err(self.error(format!("Unexpected token: {:?}", other))),
        }
    }

    /// Comma separated expressions up to `close`, which is consumed.
    fn parse_list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, RuleError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}
