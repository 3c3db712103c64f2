// Tala Parser
// Recursive descent parser that turns tokens into an AST arena and resolves
// every variable reference to a frame pointer while it goes

use crate::ast::{Ast, BinaryOp, LogicalOp, NodeId, NodeKind, UnaryOp};
use crate::builtins::Builtin;
use crate::error::{ErrorKind, Span, TalaError, TalaResult};
use crate::instrument::Tags;
use crate::lexer::{Scanner, Token, TokenKind};
use crate::polyglot::PolyglotContext;
use crate::vm::scope::LocalScope;
use crate::vm::value::Value;
use std::sync::Arc;

/// Scan and parse `source` with `scope` as the outermost scope
pub fn parse_source(
    source: &str,
    file: &str,
    scope: Arc<LocalScope>,
    polyglot: Arc<PolyglotContext>,
) -> TalaResult<Ast> {
    let tokens = Scanner::new(source, file).scan_tokens()?;
    Parser::new(tokens, file, source, scope, polyglot).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    file: String,
    source: String,
    ast: Ast,
    scopes: Vec<Arc<LocalScope>>,
    polyglot: Arc<PolyglotContext>,
}

impl Parser {
    pub fn new(
        tokens: Vec<Token>,
        file: impl Into<String>,
        source: impl Into<String>,
        scope: Arc<LocalScope>,
        polyglot: Arc<PolyglotContext>,
    ) -> Self {
        let file = file.into();
        let source = source.into();
        Self {
            tokens,
            current: 0,
            ast: Ast::new(file.clone(), source.clone()),
            file,
            source,
            scopes: vec![scope],
            polyglot,
        }
    }

    /// Parse the whole token stream into a tree whose root is a block
    pub fn parse(mut self) -> TalaResult<Ast> {
        let start = self.peek().span;
        let statements = self.statements(None)?;
        let span = start.to(self.previous_span());
        let root = self.ast.push(NodeKind::Block(statements), span, Tags::ROOT);
        self.ast.set_root(root);
        Ok(self.ast)
    }

    // ==================== Statements ====================

    fn statements(&mut self, closing: Option<&TokenKind>) -> TalaResult<Vec<NodeId>> {
        let mut statements = Vec::new();
        loop {
            while self.match_token(&TokenKind::Semicolon) {}

            if self.is_at_end() {
                if closing.is_some() {
                    return Err(self
                        .error("Expected '}' to close block")
                        .with_help("Every '{' needs a matching '}'"));
                }
                break;
            }
            if let Some(closing) = closing {
                if self.check(closing) {
                    break;
                }
            }

            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn statement(&mut self) -> TalaResult<NodeId> {
        if self.check(&TokenKind::Let) {
            self.let_declaration()
        } else {
            self.expression()
        }
    }

    fn let_declaration(&mut self) -> TalaResult<NodeId> {
        let start = self.advance().span;
        let name = self.consume_identifier("Expected variable name after 'let'")?;
        self.consume(&TokenKind::Equal, "Expected '=' after variable name")
            .map_err(|e| e.with_help("Declare variables with 'let name = value'"))?;

        let scope = self.scope().clone();
        // A function literal sees its own name, so recursion resolves
        let (slot, value) = if self.check(&TokenKind::Fn) {
            let slot = scope.declare(&name);
            (slot, self.function(Some(name.clone()))?)
        } else {
            let value = self.expression()?;
            (scope.declare(&name), value)
        };

        let span = start.to(self.ast.node(value).span);
        Ok(self
            .ast
            .push(NodeKind::Let { name, slot, value }, span, Tags::NONE))
    }

    // ==================== Expressions ====================

    fn expression(&mut self) -> TalaResult<NodeId> {
        self.or()
    }

    fn or(&mut self) -> TalaResult<NodeId> {
        let mut left = self.and()?;
        while self.match_token(&TokenKind::Or) {
            let right = self.and()?;
            left = self.logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> TalaResult<NodeId> {
        let mut left = self.equality()?;
        while self.match_token(&TokenKind::And) {
            let right = self.equality()?;
            left = self.logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> TalaResult<NodeId> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> TalaResult<NodeId> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> TalaResult<NodeId> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> TalaResult<NodeId> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> TalaResult<NodeId> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.call(),
        };
        let start = self.advance().span;
        let operand = self.unary()?;
        let span = start.to(self.ast.node(operand).span);
        Ok(self
            .ast
            .push(NodeKind::Unary { op, operand }, span, Tags::EXPRESSION))
    }

    fn call(&mut self) -> TalaResult<NodeId> {
        let mut callee = self.primary()?;
        while self.match_token(&TokenKind::LeftParen) {
            let args = self.arguments(&TokenKind::RightParen, "Expected ')' after arguments")?;
            let span = self.ast.node(callee).span.to(self.previous_span());
            callee = self.ast.push(
                NodeKind::Call { callee, args },
                span,
                Tags::EXPRESSION | Tags::CALL,
            );
        }
        Ok(callee)
    }

    fn primary(&mut self) -> TalaResult<NodeId> {
        let token = self.peek().clone();
        let literal = match &token.kind {
            TokenKind::Integer(n) => Some(Value::Integer(*n)),
            TokenKind::Number(n) => Some(Value::Number(*n)),
            TokenKind::String(s) | TokenKind::RawString(s) => Some(Value::text(s)),
            TokenKind::True => Some(Value::Boolean(true)),
            TokenKind::False => Some(Value::Boolean(false)),
            TokenKind::Nothing => Some(Value::Nothing),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(self
                .ast
                .push(NodeKind::Literal(value), token.span, Tags::EXPRESSION));
        }

        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                self.variable(name, token.span)
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let items =
                    self.arguments(&TokenKind::RightBracket, "Expected ']' after array items")?;
                let span = token.span.to(self.previous_span());
                Ok(self.ast.push(NodeKind::Array(items), span, Tags::EXPRESSION))
            }
            TokenKind::LeftBrace => self.block(),
            TokenKind::If => self.if_expression(),
            TokenKind::Fn => self.function(None),
            TokenKind::Foreign => self.foreign(),
            TokenKind::Breakpoint => self.breakpoint(),
            TokenKind::Eof => Err(self.error("Unexpected end of input")),
            other => Err(self.error(&format!("Expected expression, found '{}'", other))),
        }
    }

    fn variable(&mut self, name: String, span: Span) -> TalaResult<NodeId> {
        if let Some(pointer) = self.scope().resolve(&name) {
            return Ok(self
                .ast
                .push(NodeKind::Read { name, pointer }, span, Tags::EXPRESSION));
        }
        if let Some(builtin) = Builtin::from_name(&name) {
            return Ok(self
                .ast
                .push(NodeKind::Builtin(builtin), span, Tags::EXPRESSION));
        }
        Err(TalaError::name_error(
            format!("Undefined variable '{}'", name),
            span,
            &self.file,
        )
        .with_source(&self.source)
        .with_help(format!("Declare it first with 'let {} = ...'", name)))
    }

    fn block(&mut self) -> TalaResult<NodeId> {
        let start = self
            .consume(&TokenKind::LeftBrace, "Expected '{' to start block")?
            .span;
        let statements = self.statements(Some(&TokenKind::RightBrace))?;
        self.consume(&TokenKind::RightBrace, "Expected '}' after block")?;
        let span = start.to(self.previous_span());
        Ok(self
            .ast
            .push(NodeKind::Block(statements), span, Tags::EXPRESSION))
    }

    fn if_expression(&mut self) -> TalaResult<NodeId> {
        let start = self.advance().span;
        let condition = self.expression()?;
        let then_branch = self.block()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(self.if_expression()?)
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        let span = start.to(self.previous_span());
        Ok(self.ast.push(
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
            Tags::EXPRESSION,
        ))
    }

    fn function(&mut self, name: Option<String>) -> TalaResult<NodeId> {
        let start = self.advance().span;
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'fn'")?;
        let params = self.parameters("Expected parameter name")?;

        let scope = self.scope().child();
        for param in &params {
            scope.declare(param);
        }

        self.scopes.push(scope.clone());
        let body = self.block();
        self.scopes.pop();
        let body = body?;

        let span = start.to(self.previous_span());
        Ok(self.ast.push(
            NodeKind::Function {
                name,
                arity: params.len(),
                body,
                scope,
            },
            span,
            Tags::EXPRESSION,
        ))
    }

    /// `foreign <language>(<params>) "<source>"`
    fn foreign(&mut self) -> TalaResult<NodeId> {
        let start = self.advance().span;
        let tag_span = self.peek().span;
        let language = self.consume_identifier("Expected language tag after 'foreign'")?;
        self.consume(&TokenKind::LeftParen, "Expected '(' after language tag")?;
        let params = self.parameters("Expected foreign parameter name")?;

        let text = match &self.peek().kind {
            TokenKind::String(s) | TokenKind::RawString(s) => s.clone(),
            _ => {
                return Err(self
                    .error("Expected foreign source text")
                    .with_help("Write the guest code as a string, e.g. \"\"\"return a + b\"\"\""))
            }
        };
        self.advance();

        let site = self
            .polyglot
            .build_call_site(&language, &text, params)
            .map_err(|e| {
                TalaError::new(ErrorKind::ConfigurationError, e.to_string(), tag_span, &self.file)
                    .with_source(&self.source)
                    .with_help(format!(
                        "Registered languages: {}",
                        self.polyglot.language_tags().join(", ")
                    ))
            })?;

        let span = start.to(self.previous_span());
        Ok(self
            .ast
            .push(NodeKind::Foreign(site), span, Tags::EXPRESSION))
    }

    fn breakpoint(&mut self) -> TalaResult<NodeId> {
        let start = self.advance().span;
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'breakpoint'")?;
        self.consume(&TokenKind::RightParen, "Expected ')' after 'breakpoint('")?;
        let span = start.to(self.previous_span());
        let scope = self.scope().clone();
        Ok(self.ast.push(
            NodeKind::Breakpoint { scope },
            span,
            Tags::EXPRESSION | Tags::CALL | Tags::ALWAYS_HALT,
        ))
    }

    // ==================== Helpers ====================

    fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        let span = self.ast.node(left).span.to(self.ast.node(right).span);
        self.ast
            .push(NodeKind::Binary { op, left, right }, span, Tags::EXPRESSION)
    }

    fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> NodeId {
        let span = self.ast.node(left).span.to(self.ast.node(right).span);
        self.ast
            .push(NodeKind::Logical { op, left, right }, span, Tags::EXPRESSION)
    }

    /// Comma separated expressions up to `closing`, which is consumed
    fn arguments(&mut self, closing: &TokenKind, message: &str) -> TalaResult<Vec<NodeId>> {
        let mut items = Vec::new();
        if !self.check(closing) {
            loop {
                items.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(closing, message)?;
        Ok(items)
    }

    /// Comma separated names up to and including `)`
    fn parameters(&mut self, message: &str) -> TalaResult<Vec<String>> {
        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let span = self.peek().span;
                let name = self.consume_identifier(message)?;
                if params.contains(&name) {
                    return Err(TalaError::syntax_error(
                        format!("Duplicate parameter '{}'", name),
                        span,
                        &self.file,
                    )
                    .with_source(&self.source));
                }
                params.push(name);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn scope(&self) -> &Arc<LocalScope> {
        // The stack starts with the outermost scope and is never emptied
        &self.scopes[self.scopes.len() - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn previous_span(&self) -> Span {
        if self.current == 0 {
            self.peek().span
        } else {
            self.previous().span
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
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

    fn consume(&mut self, kind: &TokenKind, message: &str) -> TalaResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> TalaResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(message)),
        }
    }

    fn error(&self, message: &str) -> TalaError {
        let token = self.peek();
        TalaError::syntax_error(message, token.span, &self.file).with_source(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    fn parse(source: &str) -> TalaResult<Ast> {
        parse_source(
            source,
            "test.tala",
            LocalScope::root(),
            Arc::new(PolyglotContext::new()),
        )
    }

    fn root_statements(ast: &Ast) -> Vec<&Node> {
        let root = ast.root().expect("root");
        match &ast.node(root).kind {
            NodeKind::Block(stmts) => stmts.iter().map(|id| ast.node(*id)).collect(),
            _ => panic!("root is not a block"),
        }
    }

    #[test]
    fn lets_resolve_to_slots() {
        let ast = parse("let a = 1; let b = a").unwrap();
        let stmts = root_statements(&ast);
        assert_eq!(stmts.len(), 2);
        match &stmts[1].kind {
            NodeKind::Let { slot, value, .. } => {
                assert_eq!(*slot, 1);
                match &ast.node(*value).kind {
                    NodeKind::Read { name, pointer } => {
                        assert_eq!(name, "a");
                        assert_eq!((pointer.parent_level, pointer.slot), (0, 0));
                    }
                    _ => panic!("expected a read"),
                }
            }
            _ => panic!("expected a let"),
        }
    }

    #[test]
    fn recursive_functions_see_their_own_name() {
        assert!(parse("let f = fn(n) { if n < 1 { 0 } else { f(n - 1) } }").is_ok());
    }

    #[test]
    fn non_function_let_does_not_see_itself() {
        let err = parse("let x = x + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(err.message, "Undefined variable 'x'");
    }

    #[test]
    fn breakpoints_are_tagged_always_halt() {
        let ast = parse("let x = 1\nbreakpoint()").unwrap();
        let stmts = root_statements(&ast);
        assert!(stmts[1].is_breakpoint());
        assert!(stmts[1].tags.contains(Tags::ALWAYS_HALT));
        assert_eq!(stmts[1].scope().map(|s| s.slot_count()), Some(1));
    }

    #[test]
    fn unknown_foreign_language_is_a_configuration_error() {
        let err = parse("let f = foreign cobol(a) \"ADD A\"").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationError);
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let err = parse("fn(a, a) { a }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn unclosed_block_reports_help() {
        let err = parse("if true { 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.help.is_some());
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let ast = parse("1 + 2 * 3").unwrap();
        let stmts = root_statements(&ast);
        match &stmts[0].kind {
            NodeKind::Binary { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    ast.node(*right).kind,
                    NodeKind::Binary { op: BinaryOp::Mul, .. }
                ));
            }
            _ => panic!("expected a binary node"),
        }
    }
}
