/*!
 * Parser
 * Recursive descent over the token stream
 *
 * Precedence, loosest first: lambda, conditional, `or`, `and`, `not`,
 * comparisons, `+ -`, `* / // %`, unary minus, `**`, postfix.
 */

use super::ast::{BinaryOp, Expr, FunctionDef, ParamDef, Stmt, UnaryOp};
use super::error::{ScriptError, ScriptResult};
use super::lexer::{tokenize, Token, TokenKind};
use crate::protocol::Value;
use std::mem::discriminant;
use std::sync::Arc;

/// Parse a block of statements
pub fn parse_program(source: &str) -> ScriptResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, source).parse_program()
}

/// Parse a single expression
pub fn parse_expression(source: &str) -> ScriptResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, source);
    parser.skip_newlines();
    let expr = parser.parse_expr()?;
    parser.skip_newlines();
    if !parser.at_end() {
        return Err(parser.error("Unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
        }
    }

    fn parse_program(&mut self) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.at_end() {
            stmts.push(self.parse_stmt()?);
            if !self.at_end() && !self.check(&TokenKind::Newline) && !self.check(&TokenKind::Semicolon)
            {
                return Err(self.error("Expected end of statement"));
            }
            self.skip_separators();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ScriptResult<Stmt> {
        if self.check(&TokenKind::Def) {
            return self.parse_def();
        }
        if self.matches(&TokenKind::Import) {
            let module = self.parse_dotted_name()?;
            let alias = self.parse_alias()?;
            return Ok(Stmt::Import { module, alias });
        }
        if self.matches(&TokenKind::From) {
            let module = self.parse_dotted_name()?;
            self.expect(&TokenKind::Import, "Expected 'import' after module name")?;
            let name = self.expect_ident("Expected name to import")?;
            let alias = self.parse_alias()?;
            return Ok(Stmt::FromImport {
                module,
                name,
                alias,
            });
        }
        if let TokenKind::Ident(name) = &self.current().kind {
            if matches!(self.peek(1).kind, TokenKind::Assign) {
                let target = name.clone();
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                return Ok(Stmt::Assign { target, value });
            }
        }
        if self.check(&TokenKind::Return) {
            return Err(self.error("'return' outside function"));
        }
        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse_def(&mut self) -> ScriptResult<Stmt> {
        let start = self.current().start;
        self.advance();
        let name = self.expect_ident("Expected function name after 'def'")?;
        self.expect(&TokenKind::LParen, "Expected '(' after function name")?;
        let params = self.parse_params(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen, "Expected ')' after parameters")?;
        self.expect(&TokenKind::Colon, "Expected ':' after function signature")?;
        self.skip_newlines();
        self.matches(&TokenKind::Return);
        let body = self.parse_expr()?;
        let end = self.previous().end;

        Ok(Stmt::Def(Arc::new(FunctionDef {
            name: Some(name),
            params,
            body,
            source: Some(Arc::from(&self.source[start..end])),
        })))
    }

    fn parse_params(&mut self, terminator: &TokenKind) -> ScriptResult<Vec<ParamDef>> {
        let mut params: Vec<ParamDef> = Vec::new();
        if self.check(terminator) {
            return Ok(params);
        }
        loop {
            let name = self.expect_ident("Expected parameter name")?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.error(&format!("Duplicate parameter '{}'", name)));
            }
            let default = if self.matches(&TokenKind::Assign) {
                Some(self.parse_conditional()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error("Non-default parameter follows default parameter"));
            }
            params.push(ParamDef { name, default });
            if !self.matches(&TokenKind::Comma) || self.check(terminator) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_dotted_name(&mut self) -> ScriptResult<String> {
        let mut name = self.expect_ident("Expected module name")?;
        while self.matches(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_ident("Expected name after '.'")?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self) -> ScriptResult<Option<String>> {
        if self.matches(&TokenKind::As) {
            Ok(Some(self.expect_ident("Expected name after 'as'")?))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> ScriptResult<Expr> {
        if self.matches(&TokenKind::Lambda) {
            let params = self.parse_params(&TokenKind::Colon)?;
            self.expect(&TokenKind::Colon, "Expected ':' after lambda parameters")?;
            let body = self.parse_expr()?;
            return Ok(Expr::Lambda(Arc::new(FunctionDef {
                name: None,
                params,
                body,
                source: None,
            })));
        }
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> ScriptResult<Expr> {
        let then = self.parse_or()?;
        if self.matches(&TokenKind::If) {
            let condition = self.parse_or()?;
            self.expect(&TokenKind::Else, "Expected 'else' in conditional expression")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn parse_or(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.matches(&TokenKind::Or) {
            let right = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_not()?;
        while self.matches(&TokenKind::And) {
            let right = self.parse_not()?;
            expr = Expr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> ScriptResult<Expr> {
        if self.matches(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::BangEqual => BinaryOp::NotEq,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::LtEq,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::GtEq,
                TokenKind::In => BinaryOp::In,
                TokenKind::Not if matches!(self.peek(1).kind, TokenKind::In) => {
                    self.advance();
                    BinaryOp::NotIn
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ScriptResult<Expr> {
        if self.matches(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.matches(&TokenKind::Plus) {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ScriptResult<Expr> {
        let base = self.parse_postfix()?;
        if self.matches(&TokenKind::DoubleStar) {
            // Right associative and binds tighter than a unary minus on the left
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.matches(&TokenKind::Dot) {
                let name = self.expect_ident("Expected attribute name after '.'")?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else if self.matches(&TokenKind::LParen) {
                let (args, kwargs) = self.parse_call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.matches(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ScriptResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let keyword = match &self.current().kind {
                TokenKind::Ident(name) if matches!(self.peek(1).kind, TokenKind::Assign) => {
                    Some(name.clone())
                }
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(&format!("Keyword argument repeated: '{}'", name)));
                }
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("Positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "Expected ')' after arguments")?;
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> ScriptResult<Expr> {
        let token = self.current().clone();
        let expr = match token.kind {
            TokenKind::Int(i) => Expr::Literal(Value::Int(i)),
            TokenKind::Float(f) => Expr::Literal(Value::Float(f)),
            TokenKind::Str(s) => {
                // Adjacent literals concatenate
                let mut text = s;
                while let TokenKind::Str(next) = &self.peek(1).kind {
                    text.push_str(next);
                    self.advance();
                }
                Expr::Literal(Value::Str(text))
            }
            TokenKind::True => Expr::Literal(Value::Bool(true)),
            TokenKind::False => Expr::Literal(Value::Bool(false)),
            TokenKind::None => Expr::Literal(Value::None),
            TokenKind::Ident(name) => Expr::Name(name),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "Expected ')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "Expected ']' after list items")?;
                return Ok(Expr::List(items));
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&TokenKind::Colon, "Expected ':' after dict key")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "Expected '}' after dict entries")?;
                return Ok(Expr::Dict(entries));
            }
            TokenKind::Eof => return Err(self.error("Unexpected end of input")),
            _ => return Err(self.error("Expected expression")),
        };
        self.advance();
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn peek(&self, ahead: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + ahead).min(last)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.current().kind) == discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> ScriptResult<()> {
        if self.matches(kind) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_ident(&mut self, message: &str) -> ScriptResult<String> {
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(message))
        }
    }

    fn skip_newlines(&mut self) {
        while self.matches(&TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.matches(&TokenKind::Newline) || self.matches(&TokenKind::Semicolon) {}
    }

    fn error(&self, message: &str) -> ScriptError {
        let token = self.current();
        ScriptError::syntax(message, token.line, token.col)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
