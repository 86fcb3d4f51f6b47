//! Recursive-descent parser over the bridge compiler's token stream.
//!
//! Precedence is fixed and shallow (`+`/`-` below `*`/`/` below postfix
//! call/index), which is all the surface syntax the six end-to-end
//! scenarios need — this is not meant to grow into a full-language grammar.

use super::ast::{BinOp, Expr, Stmt};
use super::lexer::Token;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {0}, found {1}")]
    Expected(String, String),
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::Expected(format!("{expected:?}"), format!("{:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(ParseError::Expected("identifier".into(), format!("{other:?}"))),
        }
    }

    pub fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while *self.peek() != Token::Eof {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// Entry point for `Context::compile_expr`: a single expression, not
    /// terminated by a semicolon.
    pub fn parse_expr_entry(&mut self) -> Result<Expr, ParseError> {
        self.parse_expr()
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while *self.peek() != Token::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Token::Var => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(&Token::Assign)?;
                let expr = self.parse_expr()?;
                self.expect(&Token::Semi)?;
                Ok(Stmt::Var(name, expr))
            }
            Token::Return => {
                self.advance();
                if *self.peek() == Token::Semi {
                    self.advance();
                    return Ok(Stmt::Return(None));
                }
                let expr = self.parse_expr()?;
                self.expect(&Token::Semi)?;
                Ok(Stmt::Return(Some(expr)))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&Token::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Token::Minus => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_postfix()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    let rhs = self.parse_postfix()?;
                    lhs = Expr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                }
                Token::Slash => {
                    self.advance();
                    let rhs = self.parse_postfix()?;
                    lhs = Expr::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if *self.peek() == Token::Comma {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    loop {
                        items.push(self.parse_expr()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::Sizeof => {
                self.expect(&Token::LParen)?;
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Sizeof(Box::new(expr)))
            }
            Token::Fn => {
                self.expect(&Token::LParen)?;
                let mut params = Vec::new();
                if *self.peek() != Token::RParen {
                    loop {
                        params.push(self.expect_ident()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen)?;
                let body = self.parse_block()?;
                Ok(Expr::Fn(params, body))
            }
            other => Err(ParseError::Expected("expression".into(), format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;

    fn parse(src: &str) -> Vec<Stmt> {
        let tokens = Lexer::tokenize(src).unwrap();
        Parser::new(&tokens).parse_program().unwrap()
    }

    #[test]
    fn parses_var_and_return() {
        let stmts = parse("var a = 1 + 2 * 3; return a;");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::Var(ref name, _) if name == "a"));
        assert!(matches!(stmts[1], Stmt::Return(Some(_))));
    }

    #[test]
    fn parses_call_and_closure() {
        let stmts = parse("var f = fn(x) { return x * x; }; print(f(7));");
        assert_eq!(stmts.len(), 2);
        match &stmts[0] {
            Stmt::Var(name, Expr::Fn(params, body)) => {
                assert_eq!(name, "f");
                assert_eq!(params, &["x".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_indexing_and_sizeof() {
        let stmts = parse("print(sizeof(a)); print(a[0]);");
        assert_eq!(stmts.len(), 2);
    }
}
