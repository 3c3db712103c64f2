// Script dialect syntax
// Statements and expressions of the built-in guest engine, parsed from the
// host scanner's tokens. Words the host does not reserve (`var`, `function`,
// `return`, ...) are matched on identifier tokens.

use crate::ast::BinaryOp;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::polyglot::engine::{GuestException, GuestValue};
use std::sync::Arc;

const RESERVED: &[&str] = &[
    "var", "function", "return", "throw", "this", "export", "null", "undefined",
];

#[derive(Debug)]
pub(crate) enum Stmt {
    Var { name: String, init: Option<Expr> },
    Expr(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    /// Define `name` and publish it to the context's exports
    Export { name: String, value: Expr },
}

#[derive(Debug)]
pub(crate) enum Expr {
    Literal(GuestValue),
    Ident(String),
    This,
    Assign { name: String, value: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Logical { and: bool, left: Box<Expr>, right: Box<Expr> },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Array(Vec<Expr>),
    Function(Arc<FunctionDecl>),
}

#[derive(Debug)]
pub(crate) struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

type ParseResult<T> = Result<T, GuestException>;

pub(crate) fn parse(source: &str) -> ParseResult<Vec<Stmt>> {
    let tokens = Scanner::new(source, "<script>")
        .scan_tokens()
        .map_err(|e| {
            GuestException::new(format!(
                "SyntaxError: {} (line {})",
                e.message, e.span.start.line
            ))
        })?;
    let mut parser = ScriptParser { tokens, current: 0 };
    let mut program = Vec::new();
    loop {
        while parser.match_token(&TokenKind::Semicolon) {}
        if parser.is_at_end() {
            break;
        }
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct ScriptParser {
    tokens: Vec<Token>,
    current: usize,
}

impl ScriptParser {
    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.peek().is_word("var") || self.check(&TokenKind::Let) {
            self.advance();
            let name = self.identifier("variable name")?;
            let init = if self.match_token(&TokenKind::Equal) {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::Var { name, init });
        }
        if self.peek().is_word("function") && self.next_is_identifier() {
            let decl = self.function()?;
            let name = decl.name.clone().unwrap_or_default();
            return Ok(Stmt::Var {
                name,
                init: Some(Expr::Function(Arc::new(decl))),
            });
        }
        if self.peek().is_word("return") {
            self.advance();
            if self.check(&TokenKind::Semicolon)
                || self.check(&TokenKind::RightBrace)
                || self.is_at_end()
            {
                return Ok(Stmt::Return(None));
            }
            return Ok(Stmt::Return(Some(self.expression()?)));
        }
        if self.peek().is_word("throw") {
            self.advance();
            return Ok(Stmt::Throw(self.expression()?));
        }
        if self.peek().is_word("export") {
            self.advance();
            return self.export();
        }
        if self.match_token(&TokenKind::If) {
            return self.if_statement();
        }
        if self.check(&TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        Ok(Stmt::Expr(self.expression()?))
    }

    fn export(&mut self) -> ParseResult<Stmt> {
        if self.peek().is_word("function") {
            let decl = self.function()?;
            let name = decl
                .name
                .clone()
                .ok_or_else(|| self.error("exported function needs a name"))?;
            return Ok(Stmt::Export {
                name,
                value: Expr::Function(Arc::new(decl)),
            });
        }
        if self.peek().is_word("var") || self.check(&TokenKind::Let) {
            self.advance();
            let name = self.identifier("exported name")?;
            self.consume(&TokenKind::Equal, "'=' after exported name")?;
            let value = self.expression()?;
            return Ok(Stmt::Export { name, value });
        }
        Err(self.error("expected 'function' or 'var' after 'export'"))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(&TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(&TokenKind::RightParen, "')' after condition")?;
        let then_branch = self.branch()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.branch()?)
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn branch(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.check(&TokenKind::LeftBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.consume(&TokenKind::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        loop {
            while self.match_token(&TokenKind::Semicolon) {}
            if self.check(&TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            statements.push(self.statement()?);
        }
        self.consume(&TokenKind::RightBrace, "'}'")?;
        Ok(statements)
    }

    /// `function [name](params) { body }`
    fn function(&mut self) -> ParseResult<FunctionDecl> {
        self.advance();
        let name = if self.next_is_identifier_here() {
            Some(self.identifier("function name")?)
        } else {
            None
        };
        self.consume(&TokenKind::LeftParen, "'(' before parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.identifier("parameter name")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "')' after parameters")?;
        let body = self.block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        if self.next_is_assignment() {
            let name = self.identifier("assignment target")?;
            self.advance();
            let value = self.expression()?;
            return Ok(Expr::Assign {
                name,
                value: Box::new(value),
            });
        }
        self.or()
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut left = self.and()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.and()?;
            left = Expr::Logical {
                and: false,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut left = self.binary_level(0)?;
        while self.match_token(&TokenKind::And) {
            let right = self.binary_level(0)?;
            left = Expr::Logical {
                and: true,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Precedence climbing over equality, comparison, term and factor
    fn binary_level(&mut self, level: usize) -> ParseResult<Expr> {
        if level == 4 {
            return self.unary();
        }
        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = self.binary_op(level) {
            self.advance();
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_op(&self, level: usize) -> Option<BinaryOp> {
        let op = match (level, &self.peek().kind) {
            (0, TokenKind::EqualEqual) => BinaryOp::Equal,
            (0, TokenKind::BangEqual) => BinaryOp::NotEqual,
            (1, TokenKind::Less) => BinaryOp::Less,
            (1, TokenKind::LessEqual) => BinaryOp::LessEqual,
            (1, TokenKind::Greater) => BinaryOp::Greater,
            (1, TokenKind::GreaterEqual) => BinaryOp::GreaterEqual,
            (2, TokenKind::Plus) => BinaryOp::Add,
            (2, TokenKind::Minus) => BinaryOp::Sub,
            (3, TokenKind::Star) => BinaryOp::Mul,
            (3, TokenKind::Slash) => BinaryOp::Div,
            (3, TokenKind::Percent) => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.match_token(&TokenKind::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        while self.match_token(&TokenKind::LeftParen) {
            let args = self.list(&TokenKind::RightParen)?;
            expr = Expr::Call {
                callee: Box::new(expr),
                args,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        if token.is_word("function") {
            return Ok(Expr::Function(Arc::new(self.function()?)));
        }
        if token.is_word("this") {
            self.advance();
            return Ok(Expr::This);
        }
        if token.is_word("null") || token.is_word("undefined") {
            self.advance();
            return Ok(Expr::Literal(GuestValue::Null));
        }

        let expr = match token.kind {
            TokenKind::Integer(n) => Expr::Literal(GuestValue::Integer(n)),
            TokenKind::Number(n) => Expr::Literal(GuestValue::Number(n)),
            TokenKind::String(s) | TokenKind::RawString(s) => Expr::Literal(GuestValue::text(&s)),
            TokenKind::True => Expr::Literal(GuestValue::Boolean(true)),
            TokenKind::False => Expr::Literal(GuestValue::Boolean(false)),
            TokenKind::Identifier(name) if !RESERVED.contains(&name.as_str()) => Expr::Ident(name),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(&TokenKind::RightParen, "')'")?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => {
                self.advance();
                return Ok(Expr::Array(self.list(&TokenKind::RightBracket)?));
            }
            _ => return Err(self.error(&format!("unexpected token '{}'", token.lexeme))),
        };
        self.advance();
        Ok(expr)
    }

    fn list(&mut self, closing: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if !self.check(closing) {
            loop {
                items.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(closing, &format!("'{}'", closing))?;
        Ok(items)
    }

    fn identifier(&mut self, what: &str) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("expected {}", what))),
        }
    }

    fn next_is_identifier(&self) -> bool {
        matches!(
            self.tokens.get(self.current + 1).map(|t| &t.kind),
            Some(TokenKind::Identifier(_))
        )
    }

    fn next_is_identifier_here(&self) -> bool {
        matches!(
            &self.peek().kind,
            TokenKind::Identifier(name) if !RESERVED.contains(&name.as_str())
        )
    }

    fn next_is_assignment(&self) -> bool {
        self.next_is_identifier_here()
            && matches!(
                self.tokens.get(self.current + 1).map(|t| &t.kind),
                Some(TokenKind::Equal)
            )
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_eof()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, what: &str) -> ParseResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn error(&self, message: &str) -> GuestException {
        let token = self.peek();
        GuestException::new(format!(
            "SyntaxError: {} at line {}, column {}",
            message, token.span.start.line, token.span.start.column
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_parses_to_var_and_completion() {
        let shell = "var poly_tala_eval=function(a,b){\nreturn a + b;\n};poly_tala_eval";
        let program = parse(shell).unwrap();
        assert_eq!(program.len(), 2);
        assert!(matches!(
            &program[0],
            Stmt::Var { name, init: Some(Expr::Function(_)) } if name == "poly_tala_eval"
        ));
        assert!(matches!(&program[1], Stmt::Expr(Expr::Ident(name)) if name == "poly_tala_eval"));
    }

    #[test]
    fn syntax_errors_are_guest_exceptions() {
        let err = parse("var = 3").unwrap_err();
        assert!(err.message.starts_with("SyntaxError"));
    }

    #[test]
    fn export_function_needs_a_name() {
        assert!(parse("export function (a) { return a }").is_err());
        assert!(parse("export function twice(a) { return a * 2 }").is_ok());
    }
}
