//! Recursive-descent parser with operator precedence and
//! statement-boundary error recovery.
//!
//! Nodes are allocated from the `bumpalo::Bump` the caller owns for the
//! duration of one `Interpreter::run`; see `ast.rs` for why.

use bumpalo::Bump;
use thiserror::Error;

use crate::ast::{BinOp, Expr, ExprKind, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("[line {line}] expected {expected}, found {found}")]
    Expected { expected: String, found: String, line: usize },
    #[error("[line {line}] invalid assignment target")]
    InvalidAssignTarget { line: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    arena: &'a Bump,
    pub errors: Vec<ParseError>,
}

const SYNC_KEYWORDS: &[TokenKind] = &[
    TokenKind::Class,
    TokenKind::Function,
    TokenKind::Var,
    TokenKind::For,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Print,
    TokenKind::Now,
];

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, arena: &'a Bump) -> Self {
        Self { tokens, current: 0, arena, errors: Vec::new() }
    }

    pub fn parse(mut self) -> (Program<'a>, Vec<ParseError>) {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Some(stmt) => statements.push(stmt),
                None => {}
            }
        }
        (Program { statements }, self.errors)
    }

    // ---- token stream helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let found = format!("{}", self.peek().kind);
            let line = self.peek().line;
            Err(ParseError::Expected { expected: expected.to_string(), found, line })
        }
    }

    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if SYNC_KEYWORDS.contains(&self.peek().kind) {
                return;
            }
            self.advance();
        }
    }

    fn alloc_expr(&self, kind: ExprKind<'a>, line: usize) -> &'a Expr<'a> {
        self.arena.alloc(Expr { kind, line })
    }

    fn alloc_stmt(&self, kind: StmtKind<'a>, line: usize) -> &'a Stmt<'a> {
        self.arena.alloc(Stmt { kind, line })
    }

    // ---- declarations ----

    fn declaration(&mut self) -> Option<&'a Stmt<'a>> {
        let result = if self.match_token(&[TokenKind::Var]) {
            self.var_decl()
        } else if self.match_token(&[TokenKind::Struct]) {
            self.struct_decl()
        } else if self.match_token(&[TokenKind::Class]) {
            self.class_decl()
        } else {
            self.statement()
        };
        match result {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                None
            }
        }
    }

    fn var_decl(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();

        if self.check(TokenKind::LeftBracket) {
            self.advance();
            return self.array_tail(name, line);
        }
        if self.check(TokenKind::LeftBrace) {
            self.advance();
            return self.map_tail(name, line);
        }

        let mut names = vec![name];
        while self.match_token(&[TokenKind::Comma]) {
            names.push(self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone());
        }
        let initializer = if self.match_token(&[TokenKind::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Declaration { names, initializer }, line))
    }

    fn array_tail(&mut self, name: String, line: usize) -> Result<&'a Stmt<'a>, ParseError> {
        self.consume(TokenKind::RightBracket, "']'")?;
        let mut elements = Vec::new();
        if self.match_token(&[TokenKind::Equal]) {
            self.consume(TokenKind::LeftBracket, "'['")?;
            if !self.check(TokenKind::RightBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBracket, "']'")?;
        }
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Array { name, elements }, line))
    }

    fn map_tail(&mut self, name: String, line: usize) -> Result<&'a Stmt<'a>, ParseError> {
        self.consume(TokenKind::RightBrace, "'}'")?;
        let mut entries = Vec::new();
        if self.match_token(&[TokenKind::Equal]) {
            self.consume(TokenKind::LeftBrace, "'{'")?;
            if !self.check(TokenKind::RightBrace) {
                loop {
                    let key = self.expression()?;
                    self.consume(TokenKind::Colon, "':'")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBrace, "'}'")?;
        }
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Map { name, entries }, line))
    }

    fn struct_decl(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
        self.consume(TokenKind::LeftBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut defaults = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            self.consume(TokenKind::Var, "'var'")?;
            let field_line = self.previous().line;
            let field_name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
            let default = if self.match_token(&[TokenKind::Equal]) {
                self.expression()?
            } else {
                self.alloc_expr(ExprKind::NilLit, field_line)
            };
            self.consume(TokenKind::Semicolon, "';'")?;
            fields.push(field_name);
            defaults.push(default);
        }
        self.consume(TokenKind::RightBrace, "'}'")?;
        self.match_token(&[TokenKind::Semicolon]);
        Ok(self.alloc_stmt(StmtKind::Struct { name, fields, defaults }, line))
    }

    fn class_decl(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
        if self.match_token(&[TokenKind::LeftBrace]) {
            let mut depth = 1;
            while depth > 0 && !self.is_at_end() {
                if self.match_token(&[TokenKind::LeftBrace]) {
                    depth += 1;
                } else if self.match_token(&[TokenKind::RightBrace]) {
                    depth -= 1;
                } else {
                    self.advance();
                }
            }
        } else {
            self.consume(TokenKind::Semicolon, "';'")?;
        }
        Ok(self.alloc_stmt(StmtKind::Class { name }, line))
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        if self.match_token(&[TokenKind::Function]) {
            self.function_decl()
        } else if self.match_token(&[TokenKind::If]) {
            self.if_stmt()
        } else if self.match_token(&[TokenKind::Switch]) {
            self.switch_stmt()
        } else if self.match_token(&[TokenKind::Return]) {
            self.return_stmt()
        } else if self.match_token(&[TokenKind::Break]) {
            let line = self.previous().line;
            self.consume(TokenKind::Semicolon, "';'")?;
            Ok(self.alloc_stmt(StmtKind::Break, line))
        } else if self.match_token(&[TokenKind::Continue]) {
            let line = self.previous().line;
            self.consume(TokenKind::Semicolon, "';'")?;
            Ok(self.alloc_stmt(StmtKind::Continue, line))
        } else if self.match_token(&[TokenKind::While]) {
            self.while_stmt()
        } else if self.match_token(&[TokenKind::Do]) {
            self.do_stmt()
        } else if self.match_token(&[TokenKind::For]) {
            self.for_stmt()
        } else if self.match_token(&[TokenKind::From]) {
            self.from_stmt()
        } else if self.match_token(&[TokenKind::Print]) {
            self.print_stmt()
        } else if self.match_token(&[TokenKind::LeftBrace]) {
            self.block_stmt()
        } else {
            self.expr_stmt()
        }
    }

    fn function_decl(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
        self.consume(TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone());
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')'")?;
        self.consume(TokenKind::LeftBrace, "'{'")?;
        let body = self.block_stmt()?;
        Ok(self.alloc_stmt(StmtKind::Function { name, params, body }, line))
    }

    fn if_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        let then_branch = self.statement()?;
        let mut elifs = Vec::new();
        while self.match_token(&[TokenKind::Elif]) {
            self.consume(TokenKind::LeftParen, "'('")?;
            let elif_cond = self.expression()?;
            self.consume(TokenKind::RightParen, "')'")?;
            let elif_body = self.statement()?;
            elifs.push((elif_cond, elif_body));
        }
        let else_branch = if self.match_token(&[TokenKind::Else]) {
            Some(self.statement()?)
        } else {
            None
        };
        Ok(self.alloc_stmt(StmtKind::If { cond, then_branch, elifs, else_branch }, line))
    }

    fn switch_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        self.consume(TokenKind::LeftBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if self.match_token(&[TokenKind::Case]) {
                let case_line = self.previous().line;
                let label = self.expression()?;
                self.consume(TokenKind::Colon, "':'")?;
                let body = self.case_body(case_line)?;
                cases.push((label, body));
            } else if self.match_token(&[TokenKind::Default]) {
                let default_line = self.previous().line;
                self.consume(TokenKind::Colon, "':'")?;
                default = Some(self.case_body(default_line)?);
            } else {
                let found = format!("{}", self.peek().kind);
                let err_line = self.peek().line;
                return Err(ParseError::Expected { expected: "'case' or 'default'".into(), found, line: err_line });
            }
        }
        self.consume(TokenKind::RightBrace, "'}'")?;
        Ok(self.alloc_stmt(StmtKind::Switch { cond, cases, default }, line))
    }

    fn case_body(&mut self, line: usize) -> Result<&'a Stmt<'a>, ParseError> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::Case) && !self.check(TokenKind::Default) && !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        Ok(self.alloc_stmt(StmtKind::Block(statements), line))
    }

    fn return_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let value = if !self.check(TokenKind::Semicolon) { Some(self.expression()?) } else { None };
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Return(value), line))
    }

    fn while_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        let body = self.statement()?;
        Ok(self.alloc_stmt(StmtKind::While { cond, body }, line))
    }

    fn do_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let body = self.statement()?;
        self.consume(TokenKind::While, "'while'")?;
        self.consume(TokenKind::LeftParen, "'('")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Do { cond, body }, line))
    }

    fn for_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        let init = if self.match_token(&[TokenKind::Semicolon]) {
            None
        } else if self.match_token(&[TokenKind::Var]) {
            Some(self.var_decl()?)
        } else {
            Some(self.expr_stmt()?)
        };
        let cond = if !self.check(TokenKind::Semicolon) { Some(self.expression()?) } else { None };
        self.consume(TokenKind::Semicolon, "';'")?;
        let increment = if !self.check(TokenKind::RightParen) { Some(self.expression()?) } else { None };
        self.consume(TokenKind::RightParen, "')'")?;
        let body = self.statement()?;
        Ok(self.alloc_stmt(StmtKind::For { init, cond, increment, body }, line))
    }

    /// `from (var item : arrayExpr) body` — for-each, binding `item`
    /// fresh on each iteration from a snapshot of `arrayExpr` (see
    /// DESIGN.md).
    fn from_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        self.consume(TokenKind::Var, "'var'")?;
        let var_name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
        self.consume(TokenKind::Colon, "':'")?;
        let array = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        let body = self.statement()?;
        Ok(self.alloc_stmt(StmtKind::From { var_name, array, body }, line))
    }

    fn print_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "'('")?;
        let expr = self.expression()?;
        self.consume(TokenKind::RightParen, "')'")?;
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Print(expr), line))
    }

    fn block_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.previous().line;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenKind::RightBrace, "'}'")?;
        Ok(self.alloc_stmt(StmtKind::Block(statements), line))
    }

    fn expr_stmt(&mut self) -> Result<&'a Stmt<'a>, ParseError> {
        let line = self.peek().line;
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "';'")?;
        Ok(self.alloc_stmt(StmtKind::Expression(expr), line))
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let expr = self.logical_or()?;

        const ASSIGN_OPS: &[TokenKind] =
            &[TokenKind::Equal, TokenKind::PlusEqual, TokenKind::MinusEqual, TokenKind::StarEqual, TokenKind::SlashEqual];
        if self.match_token(ASSIGN_OPS) {
            let op_token = self.previous().kind;
            let line = self.previous().line;
            let value = self.assignment()?;
            let rhs = self.desugar_compound(expr, op_token, value, line);
            return match &expr.kind {
                ExprKind::Variable(name) => Ok(self.alloc_expr(ExprKind::Assign(name.clone(), rhs), line)),
                ExprKind::Get { object, name } => {
                    Ok(self.alloc_expr(ExprKind::Set { object, name: name.clone(), value: rhs }, line))
                }
                _ => Err(ParseError::InvalidAssignTarget { line }),
            };
        }
        Ok(expr)
    }

    /// Compound assignment desugars to `target = target op rhs`
    /// §4.1). Plain `=` just returns `rhs` unchanged.
    fn desugar_compound(&self, target: &'a Expr<'a>, op: TokenKind, rhs: &'a Expr<'a>, line: usize) -> &'a Expr<'a> {
        let bin_op = match op {
            TokenKind::PlusEqual => BinOp::Add,
            TokenKind::MinusEqual => BinOp::Sub,
            TokenKind::StarEqual => BinOp::Mul,
            TokenKind::SlashEqual => BinOp::Div,
            _ => return rhs,
        };
        self.alloc_expr(ExprKind::Binary(target, bin_op, rhs), line)
    }

    fn logical_or(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.logical_and()?;
        while self.match_token(&[TokenKind::Or]) {
            let line = self.previous().line;
            let right = self.logical_and()?;
            expr = self.alloc_expr(ExprKind::Logical(expr, LogicalOp::Or, right), line);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.logical_xor()?;
        while self.match_token(&[TokenKind::And]) {
            let line = self.previous().line;
            let right = self.logical_xor()?;
            expr = self.alloc_expr(ExprKind::Logical(expr, LogicalOp::And, right), line);
        }
        Ok(expr)
    }

    fn logical_xor(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.equality()?;
        while self.match_token(&[TokenKind::Xor]) {
            let line = self.previous().line;
            let right = self.equality()?;
            expr = self.alloc_expr(ExprKind::Logical(expr, LogicalOp::Xor, right), line);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.comparison()?;
        while self.match_token(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = BinOp::from_token(self.previous().kind).expect("equality token");
            let line = self.previous().line;
            let right = self.comparison()?;
            expr = self.alloc_expr(ExprKind::Binary(expr, op, right), line);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.term()?;
        while self.match_token(&[TokenKind::Less, TokenKind::LessEqual, TokenKind::Greater, TokenKind::GreaterEqual]) {
            let op = BinOp::from_token(self.previous().kind).expect("comparison token");
            let line = self.previous().line;
            let right = self.term()?;
            expr = self.alloc_expr(ExprKind::Binary(expr, op, right), line);
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.factor()?;
        while self.match_token(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = BinOp::from_token(self.previous().kind).expect("term token");
            let line = self.previous().line;
            let right = self.factor()?;
            expr = self.alloc_expr(ExprKind::Binary(expr, op, right), line);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.unary()?;
        while self.match_token(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = BinOp::from_token(self.previous().kind).expect("factor token");
            let line = self.previous().line;
            let right = self.unary()?;
            expr = self.alloc_expr(ExprKind::Binary(expr, op, right), line);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        if self.match_token(&[TokenKind::Bang, TokenKind::Minus, TokenKind::PlusPlus, TokenKind::MinusMinus]) {
            let kind = self.previous().kind;
            let line = self.previous().line;
            let op = match kind {
                TokenKind::Bang => UnaryOp::Not,
                TokenKind::Minus => UnaryOp::Negate,
                TokenKind::PlusPlus => UnaryOp::Increment,
                TokenKind::MinusMinus => UnaryOp::Decrement,
                _ => unreachable!(),
            };
            let operand = self.unary()?;
            return Ok(self.alloc_expr(ExprKind::Unary(op, operand, true), line));
        }
        self.call()
    }

    fn call(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.match_token(&[TokenKind::LeftParen]) {
                let line = self.previous().line;
                let args = self.arguments()?;
                self.consume(TokenKind::RightParen, "')'")?;
                let name = match &expr.kind {
                    ExprKind::Variable(n) => n.clone(),
                    _ => String::new(),
                };
                expr = self.alloc_expr(ExprKind::Call { callee: expr, name, args }, line);
            } else if self.match_token(&[TokenKind::Dot]) {
                let line = self.previous().line;
                let name = self.consume(TokenKind::Identifier, "identifier")?.lexeme.clone();
                if self.match_token(&[TokenKind::LeftParen]) {
                    let args = self.arguments()?;
                    self.consume(TokenKind::RightParen, "')'")?;
                    expr = self.alloc_expr(ExprKind::GetDef { object: expr, name, args }, line);
                } else {
                    expr = self.alloc_expr(ExprKind::Get { object: expr, name }, line);
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<&'a Expr<'a>>, ParseError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<&'a Expr<'a>, ParseError> {
        let line = self.peek().line;
        if self.match_token(&[TokenKind::Number]) {
            let literal = self.previous().literal.clone();
            let value: f64 = literal.parse().unwrap_or(0.0);
            return Ok(self.alloc_expr(ExprKind::NumberLit(value), line));
        }
        if self.match_token(&[TokenKind::String]) {
            let literal = self.previous().literal.clone();
            return Ok(self.alloc_expr(ExprKind::StringLit(literal), line));
        }
        if self.match_token(&[TokenKind::True]) {
            return Ok(self.alloc_expr(ExprKind::NumberLit(1.0), line));
        }
        if self.match_token(&[TokenKind::False]) {
            return Ok(self.alloc_expr(ExprKind::NumberLit(0.0), line));
        }
        if self.match_token(&[TokenKind::Nil]) {
            return Ok(self.alloc_expr(ExprKind::NilLit, line));
        }
        if self.match_token(&[TokenKind::Now]) {
            return Ok(self.alloc_expr(ExprKind::Now, line));
        }
        if self.match_token(&[TokenKind::Identifier]) {
            let name = self.previous().lexeme.clone();
            if self.match_token(&[TokenKind::PlusPlus, TokenKind::MinusMinus]) {
                let kind = self.previous().kind;
                let op = if kind == TokenKind::PlusPlus { UnaryOp::Increment } else { UnaryOp::Decrement };
                let var = self.alloc_expr(ExprKind::Variable(name), line);
                return Ok(self.alloc_expr(ExprKind::Unary(op, var, false), line));
            }
            return Ok(self.alloc_expr(ExprKind::Variable(name), line));
        }
        if self.match_token(&[TokenKind::LeftParen]) {
            let inner = self.expression()?;
            self.consume(TokenKind::RightParen, "')'")?;
            return Ok(self.alloc_expr(ExprKind::Grouping(inner), line));
        }
        let found = format!("{}", self.peek().kind);
        Err(ParseError::Expected { expected: "expression".into(), found, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(source: &str) -> (Program<'static>, Vec<ParseError>) {
        let arena = Bump::new();
        // Safety of lifetime: the arena outlives the returned `Program`
        // only for the duration of the test function, which is all
        // these tests need.
        let arena: &'static Bump = Box::leak(Box::new(arena));
        let tokens = lex(source).expect("lexable");
        Parser::new(tokens, arena).parse()
    }

    #[test]
    fn panic_mode_recovers_at_the_next_statement_boundary() {
        let (program, errors) = parse("var x = ; var y = 2;");
        assert_eq!(errors.len(), 1, "the malformed declaration should report exactly one error");
        assert_eq!(program.statements.len(), 1, "only the recovered 'var y = 2;' survives");
        match &program.statements[0].kind {
            StmtKind::Declaration { names, .. } => assert_eq!(names, &["y".to_string()]),
            other => panic!("expected a Declaration statement, got {other:?}"),
        }
    }

    #[test]
    fn panic_mode_resumes_at_a_sync_keyword_without_a_semicolon() {
        // No closing ')' before the next 'print' keyword: synchronize()
        // must stop at the keyword rather than run off past it.
        let (program, errors) = parse("if (true print(\"after\");");
        assert!(!errors.is_empty());
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].kind {
            StmtKind::Print(_) => {}
            other => panic!("expected the recovered 'print' statement, got {other:?}"),
        }
    }

    #[test]
    fn from_requires_the_var_keyword_and_colon_form() {
        let (_program, errors) = parse("from (item : xs) { }");
        assert!(!errors.is_empty(), "a bare identifier before ':' is not the documented 'var IDENT :' form");
    }

    #[test]
    fn from_var_colon_form_parses_into_a_from_statement() {
        let (program, errors) = parse("var xs[] = [1, 2]; from (var item : xs) { }");
        assert!(errors.is_empty());
        match &program.statements[1].kind {
            StmtKind::From { var_name, .. } => assert_eq!(var_name, "item"),
            other => panic!("expected a From statement, got {other:?}"),
        }
    }

    #[test]
    fn struct_field_default_is_optional_and_defaults_to_nil() {
        let (program, errors) = parse("struct P { var x; var y = 2; }");
        assert!(errors.is_empty());
        match &program.statements[0].kind {
            StmtKind::Struct { fields, defaults, .. } => {
                assert_eq!(fields, &["x".to_string(), "y".to_string()]);
                assert!(matches!(defaults[0].kind, ExprKind::NilLit));
                assert!(matches!(defaults[1].kind, ExprKind::NumberLit(n) if n == 2.0));
            }
            other => panic!("expected a Struct statement, got {other:?}"),
        }
    }

    #[test]
    fn compound_assign_desugars_to_binary_self_op() {
        let (program, errors) = parse("x += 1;");
        assert!(errors.is_empty());
        match &program.statements[0].kind {
            StmtKind::Expression(expr) => match &expr.kind {
                ExprKind::Assign(name, rhs) => {
                    assert_eq!(name, "x");
                    assert!(matches!(rhs.kind, ExprKind::Binary(_, BinOp::Add, _)));
                }
                other => panic!("expected an Assign expression, got {other:?}"),
            },
            other => panic!("expected an Expression statement, got {other:?}"),
        }
    }
}
