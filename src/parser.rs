use crate::ast::{next_expr_id, Expr, FunctionDecl, LiteralValue, Program, Stmt};
use crate::error::{Span, SprigError};
use crate::lexer::{Literal, Token, TokenType};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<SprigError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parses the whole token stream. A grammar mismatch inside one
    /// declaration is recorded and the parser synchronizes to the next
    /// statement boundary, so independent mistakes each get reported.
    pub fn parse(mut self) -> Result<Program, Vec<SprigError>> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            Err(self.errors)
        }
    }

    /* --- Declarations and statements --- */

    fn declaration(&mut self) -> Result<Stmt, SprigError> {
        if self.match_token(TokenType::Class) {
            self.class_declaration()
        } else if self.match_token(TokenType::Def) {
            let decl = self.function("function")?;
            Ok(Stmt::Function { decl })
        } else if self.match_token(TokenType::Let) {
            self.var_declaration()
        } else {
            self.statement()
        }
    }

    fn class_declaration(&mut self) -> Result<Stmt, SprigError> {
        let name = self.consume(TokenType::Identifier, "Expected class name.")?.clone();

        let superclass = if self.match_token(TokenType::Less) {
            let superclass_name = self
                .consume(TokenType::Identifier, "Expected superclass name.")?
                .clone();
            Some(Expr::Variable {
                name: superclass_name,
                id: next_expr_id(),
            })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expected '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            self.consume(TokenType::Def, "Expected 'def' before method declaration.")?;
            methods.push(self.function("method")?);
        }

        self.consume(TokenType::RightBrace, "Expected '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn function(&mut self, kind: &str) -> Result<Rc<FunctionDecl>, SprigError> {
        let name = self
            .consume_msg(TokenType::Identifier, format!("Expected {} name.", kind))?
            .clone();
        self.consume_msg(
            TokenType::LeftParen,
            format!("Expected '(' after {} name.", kind),
        )?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                params.push(
                    self.consume(TokenType::Identifier, "Expected parameter name.")?
                        .clone(),
                );
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expected ')' after parameters.")?;

        self.consume_msg(
            TokenType::LeftBrace,
            format!("Expected '{{' before {} body.", kind),
        )?;
        let body = self.block()?;

        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn var_declaration(&mut self) -> Result<Stmt, SprigError> {
        let name = self
            .consume(TokenType::Identifier, "Expected variable name.")?
            .clone();

        let initializer = if self.match_token(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expected ';' after variable declaration.")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn statement(&mut self) -> Result<Stmt, SprigError> {
        if self.match_token(TokenType::Exit) {
            return self.exit_statement();
        }
        if self.match_token(TokenType::For) {
            return self.for_statement();
        }
        if self.match_token(TokenType::Foreach) {
            return self.foreach_statement();
        }
        if self.match_token(TokenType::If) {
            return self.if_statement();
        }
        if self.match_token(TokenType::Next) {
            return self.next_statement();
        }
        if self.match_token(TokenType::Print) {
            return self.print_statement();
        }
        if self.match_token(TokenType::Return) {
            return self.return_statement();
        }
        if self.match_token(TokenType::While) {
            return self.while_statement();
        }
        if self.match_token(TokenType::LeftBrace) {
            return Ok(Stmt::Block {
                statements: self.block()?,
            });
        }

        self.expression_statement()
    }

    fn exit_statement(&mut self) -> Result<Stmt, SprigError> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expected ';' after statement.")?;
        Ok(Stmt::Exit { keyword })
    }

    fn next_statement(&mut self) -> Result<Stmt, SprigError> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expected ';' after statement.")?;
        Ok(Stmt::Next { keyword })
    }

    /// `for` is desugared at parse time: the increment clause rides on the
    /// While node so the evaluator can run it after every iteration.
    fn for_statement(&mut self) -> Result<Stmt, SprigError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'for'.")?;

        let initializer = if self.match_token(TokenType::Semicolon) {
            None
        } else if self.match_token(TokenType::Let) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expected ')' after for clauses.")?;

        let body = self.statement()?;

        let condition = condition.unwrap_or(Expr::Literal {
            value: LiteralValue::Bool(true),
        });
        let body = Stmt::While {
            condition,
            body: Box::new(body),
            increment,
        };

        Ok(match initializer {
            Some(initializer) => Stmt::Block {
                statements: vec![initializer, body],
            },
            None => body,
        })
    }

    fn foreach_statement(&mut self) -> Result<Stmt, SprigError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'foreach'.")?;

        let iterator = if self.match_token(TokenType::Let) && self.match_token(TokenType::Identifier)
        {
            self.previous().clone()
        } else {
            return Err(self.error_at_current("Expected variable initializer (for iterator)"));
        };
        self.consume(TokenType::Semicolon, "Expected ';' after variable initializer.")?;

        let iterable_name = self.peek().clone();
        let iterable = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after iterable.")?;

        let mut index = None;
        if !self.check(TokenType::RightParen)
            && self.match_token(TokenType::Let)
            && self.match_token(TokenType::Identifier)
        {
            index = Some(self.previous().clone());
        }
        self.consume(TokenType::RightParen, "Expected ')' after foreach clauses.")?;

        let body = self.statement()?;

        Ok(Stmt::Foreach {
            iterator,
            iterable,
            iterable_name,
            index,
            body: Box::new(body),
        })
    }

    fn if_statement(&mut self) -> Result<Stmt, SprigError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn print_statement(&mut self) -> Result<Stmt, SprigError> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after value.")?;
        Ok(Stmt::Print { expr })
    }

    fn return_statement(&mut self) -> Result<Stmt, SprigError> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expected ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> Result<Stmt, SprigError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after condition.")?;
        let body = self.statement()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
            increment: None,
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, SprigError> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after expression.")?;
        Ok(Stmt::Expression { expr })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SprigError> {
        let mut statements = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' at end of block.",
            "Blocks must be closed with '}' after the opening '{'.".to_string(),
        )?;
        Ok(statements)
    }

    /* --- Expressions --- */

    fn expression(&mut self) -> Result<Expr, SprigError> {
        if self.match_token(TokenType::LeftBracket) {
            return self.set_literal();
        }

        self.increment()
    }

    fn set_literal(&mut self) -> Result<Expr, SprigError> {
        let bracket = self.previous().clone();
        let mut elements = Vec::new();

        // A comma arms the next element slot; a double comma lands the
        // element parse on the stray comma and errors there.
        let mut last = false;
        while !self.check(TokenType::RightBracket) && !self.is_at_end() {
            if !last {
                elements.push(self.expression()?);
                last = true;
            }
            if self.match_token(TokenType::Comma) {
                last = false;
            } else if last {
                break;
            }
        }

        self.consume(TokenType::RightBracket, "Expected ']' at end of set.")?;
        Ok(Expr::SetLiteral { bracket, elements })
    }

    fn increment(&mut self) -> Result<Expr, SprigError> {
        let expr = self.assignment()?;

        if self.match_any(&[
            TokenType::PlusPlus,
            TokenType::MinusMinus,
            TokenType::PlusPlusPlus,
            TokenType::MinusMinusMinus,
        ]) {
            let operator = self.previous().clone();
            let rooted_index = index_base(&expr).is_some();

            return Ok(match expr {
                Expr::Variable { name, .. } => Expr::Increment {
                    name,
                    operator,
                    id: next_expr_id(),
                },
                Expr::Index { .. } if rooted_index => {
                    let (name, depth) = flatten_index(expr);
                    Expr::IndexIncrement {
                        name,
                        depth,
                        operator,
                        id: next_expr_id(),
                    }
                }
                other => {
                    // Reported without aborting the statement
                    self.report(&operator, "Invalid increment target.");
                    other
                }
            });
        }

        Ok(expr)
    }

    fn assignment(&mut self) -> Result<Expr, SprigError> {
        let expr = self.or()?;

        if self.match_token(TokenType::Equal) {
            let equals = self.previous().clone();
            let value = self.expression()?;
            let rooted_index = index_base(&expr).is_some();

            return Ok(match expr {
                Expr::Variable { name, .. } => Expr::Assign {
                    name,
                    value: Box::new(value),
                    id: next_expr_id(),
                },
                Expr::Get { object, name } => Expr::PropertySet {
                    object,
                    name,
                    value: Box::new(value),
                },
                Expr::Index { .. } if rooted_index => {
                    let (name, depth) = flatten_index(expr);
                    Expr::IndexAssign {
                        name,
                        depth,
                        value: Box::new(value),
                        id: next_expr_id(),
                    }
                }
                other => {
                    self.report(&equals, "Invalid assignment target.");
                    other
                }
            });
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.and()?;

        while self.match_token(TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.equality()?;

        while self.match_token(TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.comparison()?;

        while self.match_any(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.term()?;

        while self.match_any(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.factor()?;

        while self.match_any(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.unary()?;

        while self.match_any(&[TokenType::Slash, TokenType::Star, TokenType::Percent]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, SprigError> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.index()?;

        loop {
            if self.match_token(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(TokenType::Dot) {
                let name = self
                    .consume(TokenType::Identifier, "Expected property name after '.'.")?
                    .clone();
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, SprigError> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self
            .consume_with_help(
                TokenType::RightParen,
                "Expected ')' after arguments.",
                "Calls must be closed with ')' after the arguments.".to_string(),
            )?
            .clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    /// Index chains bind directly to primaries: `a[0].b()` parses, while
    /// `a.b[0]` does not.
    fn index(&mut self) -> Result<Expr, SprigError> {
        let mut expr = self.primary()?;

        let base = match &expr {
            Expr::Variable { name, .. } => Some(name.clone()),
            _ => None,
        };

        while self.match_token(TokenType::LeftBracket) {
            let location = self.expression()?;
            let bracket = self
                .consume(TokenType::RightBracket, "Expected ']' after index.")?
                .clone();
            expr = Expr::Index {
                object: Box::new(expr),
                base: base.clone(),
                bracket,
                location: Box::new(location),
            };
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, SprigError> {
        if self.is_at_end() {
            return Err(self.error_at_current("Expected expression."));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::False => Ok(Expr::Literal {
                value: LiteralValue::Bool(false),
            }),
            TokenType::True => Ok(Expr::Literal {
                value: LiteralValue::Bool(true),
            }),
            TokenType::Nil => Ok(Expr::Literal {
                value: LiteralValue::Nil,
            }),
            TokenType::Number => {
                let value = match &token.literal {
                    Some(Literal::Number(n)) => *n,
                    _ => 0.0,
                };
                Ok(Expr::Literal {
                    value: LiteralValue::Number(value),
                })
            }
            TokenType::String => {
                let value = match &token.literal {
                    Some(Literal::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                Ok(Expr::Literal {
                    value: LiteralValue::Str(value),
                })
            }
            TokenType::This => Ok(Expr::This {
                keyword: token,
                id: next_expr_id(),
            }),
            TokenType::Super => {
                self.consume(TokenType::Dot, "Expected '.' after 'super'.")?;
                let method = self
                    .consume(TokenType::Identifier, "Expected superclass method name.")?
                    .clone();
                Ok(Expr::Super {
                    keyword: token,
                    method,
                    id: next_expr_id(),
                })
            }
            TokenType::Identifier => Ok(Expr::Variable {
                name: token,
                id: next_expr_id(),
            }),
            TokenType::LeftParen => {
                let expr = self.expression()?;
                self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')' after expression.",
                    "Every opening parenthesis '(' needs a matching ')'.".to_string(),
                )?;
                Ok(Expr::Grouping {
                    expr: Box::new(expr),
                })
            }
            _ => Err(self.error_at(
                &token,
                format!("Expected expression, found '{}'.", token.lexeme),
            )),
        }
    }

    /* --- Token traversal --- */

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(*token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == token_type
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, SprigError> {
        self.consume_msg(token_type, message.to_string())
    }

    fn consume_msg(&mut self, token_type: TokenType, message: String) -> Result<&Token, SprigError> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(&message))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<&Token, SprigError> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message).with_help(help))
        }
    }

    /* --- Error handling --- */

    fn error_at(&self, token: &Token, message: String) -> SprigError {
        SprigError::parse_error(token.span.clone(), token.line, message)
    }

    fn error_at_current(&self, message: &str) -> SprigError {
        // At EOF, anchor on the end of the last real token instead
        let span = if self.is_at_end() && self.current > 0 {
            Span::single(self.tokens[self.current - 1].span.end)
        } else {
            self.peek().span.clone()
        };
        SprigError::parse_error(span, self.peek().line, message.to_string())
    }

    fn report(&mut self, token: &Token, message: &str) {
        let error = self.error_at(token, message.to_string());
        self.errors.push(error);
    }

    /// Discards tokens until a statement boundary, bounding the cascade of
    /// errors one mistake can produce.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Def
                | TokenType::Let
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }

            self.advance();
        }
    }
}

/// Base variable of an index chain, if the chain is rooted at one.
fn index_base(expr: &Expr) -> Option<&Token> {
    match expr {
        Expr::Index { base, .. } => base.as_ref(),
        _ => None,
    }
}

/// Collapses a nested index chain into its base name and the stack of
/// index expressions, outermost location first (the original parse order
/// for assignment and increment targets).
fn flatten_index(expr: Expr) -> (Token, Vec<Expr>) {
    let mut depth = Vec::new();
    let mut current = expr;

    loop {
        match current {
            Expr::Index {
                object,
                base,
                location,
                ..
            } => {
                depth.push(*location);
                match *object {
                    inner @ Expr::Index { .. } => current = inner,
                    _ => {
                        // Guarded by index_base before flattening
                        let name = base.expect("index chain without a base variable");
                        return (name, depth);
                    }
                }
            }
            _ => unreachable!("flatten_index called on a non-index expression"),
        }
    }
}
