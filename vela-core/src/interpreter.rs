//! The tree-walking evaluator — the part of this crate that
//! actually runs a program.
//!
//! Non-local transfer (`return`/`break`/`continue`) is modeled as a
//! `Flow` value threaded back through every `exec_*` call instead of a
//! host-language exception: a fatal
//! `RuntimeError` still unwinds through `?`, but a loop exit or function
//! return is just an `Ok(Flow::Break)` the caller pattern-matches on.

use std::cell::RefCell;
use std::rc::Rc;

use bumpalo::Bump;
use indexmap::IndexMap;

use crate::ast::{BinOp, Expr, ExprKind, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use crate::env::Environment;
use crate::error::{Diagnostic, RuntimeError, Severity};
use crate::io::{PrintSink, StdoutSink};
use crate::lexer::lex;
use crate::native::{Context, Literal, NativeFn};
use crate::parser::Parser;
use crate::value::{ArrayData, FunctionData, MapData, MapKey, StructData, Value};

/// Non-local control transfer. `Normal` means "fell off the end";
/// everything else unwinds to the nearest handler that understands it
/// (a loop for `Break`/`Continue`, a function call for `Return`).
#[derive(Debug)]
enum Flow<'a> {
    Normal,
    Return(Value<'a>),
    Break,
    Continue,
}

/// A registered `struct` shape: field order plus the defaults evaluated
/// once at declaration time. Kept separate from `Environment` because a
/// struct name and a variable name live in different namespaces — `P(3,
/// 4)` constructs regardless of whether `P` also happens to be bound to
/// a value somewhere in scope.
struct StructTemplate<'a> {
    type_name: String,
    fields: Vec<String>,
    defaults: Vec<Value<'a>>,
}

/// Drives one program's evaluation. Borrows a `Bump` the embedder owns
/// for exactly as long as it needs AST nodes to stay valid — typically
/// one file, one process, one `Interpreter`. See DESIGN.md for why the
/// arena isn't owned by `Interpreter` itself.
pub struct Interpreter<'a> {
    arena: &'a Bump,
    env: Environment<'a>,
    structs: IndexMap<String, Rc<StructTemplate<'a>>>,
    loop_depth: usize,
    sink: Box<dyn PrintSink>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> Interpreter<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            arena,
            env: Environment::new(),
            structs: IndexMap::new(),
            loop_depth: 0,
            sink: Box::new(StdoutSink),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_sink(arena: &'a Bump, sink: Box<dyn PrintSink>) -> Self {
        let mut me = Self::new(arena);
        me.sink = sink;
        me
    }

    /// Installs a native function, callable from script code under
    /// `name`. Re-registering a name already bound is fatal, matching
    /// the redefinition rule everywhere else in the global scope.
    pub fn register(
        &mut self,
        name: &str,
        func: impl Fn(&mut Context, usize) -> Literal + 'static,
    ) -> Result<(), RuntimeError> {
        let native = Value::Native(Rc::new(NativeFn::new(name, func)));
        if !self.env.define_global(name, native) {
            return Err(RuntimeError::Redefinition { name: name.to_string(), line: 0 });
        }
        Ok(())
    }

    /// Releases accumulated evaluator state (globals, struct templates,
    /// diagnostics) so the same `Interpreter` can run a fresh program.
    /// The arena itself is the caller's to drop.
    pub fn clear(&mut self) {
        self.env = Environment::new();
        self.structs.clear();
        self.loop_depth = 0;
        self.diagnostics.clear();
    }

    /// Lexes, parses, and executes `source`. Returns `true` on a clean
    /// run, `false` if lexing hit a fatal error or evaluation of the
    /// (possibly recovered) Program root hit a fatal error — in every
    /// case the failure has already been emitted as a `Diagnostic` via
    /// `tracing`. A recovered `ParseError` (one `synchronize()` absorbed
    /// short of losing the Program root) does not by itself fail the
    /// run, per spec.md §4.1: "Errors fail the parse overall only if
    /// the Program root itself cannot be built."
    pub fn run(&mut self, source: &str) -> bool {
        let tokens = match lex(source) {
            Ok(tokens) => tokens,
            Err(err) => {
                self.error(err.to_string(), None);
                return false;
            }
        };

        let parser = Parser::new(tokens, self.arena);
        let (program, parse_errors) = parser.parse();
        for err in parse_errors {
            self.error(err.to_string(), None);
        }

        match self.exec_program(&program) {
            Ok(()) => true,
            Err(err) => {
                let line = err.line();
                self.error(err.to_string(), Some(line));
                false
            }
        }
    }

    fn exec_program(&mut self, program: &Program<'a>) -> Result<(), RuntimeError> {
        self.exec_statements(&program.statements)?;
        Ok(())
    }

    fn warn(&mut self, message: impl Into<String>, line: usize) {
        let diag = Diagnostic::new(Severity::Warning, message, Some(line));
        diag.emit();
        self.diagnostics.push(diag);
    }

    fn info(&mut self, message: impl Into<String>, line: usize) {
        let diag = Diagnostic::new(Severity::Info, message, Some(line));
        diag.emit();
        self.diagnostics.push(diag);
    }

    fn error(&mut self, message: impl Into<String>, line: Option<usize>) {
        let diag = Diagnostic::new(Severity::Error, message, line);
        diag.emit();
        self.diagnostics.push(diag);
    }

    // ---- statement execution ----

    fn exec_statements(&mut self, statements: &[&'a Stmt<'a>]) -> Result<Flow<'a>, RuntimeError> {
        for stmt in statements {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, statements: &[&'a Stmt<'a>]) -> Result<Flow<'a>, RuntimeError> {
        let saved = self.env.push_scope();
        let result = self.exec_statements(statements);
        self.env.pop_to(saved);
        result
    }

    fn exec_stmt(&mut self, stmt: &'a Stmt<'a>) -> Result<Flow<'a>, RuntimeError> {
        match &stmt.kind {
            StmtKind::Block(statements) => self.exec_block(statements),

            StmtKind::Expression(expr) => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }

            StmtKind::Declaration { names, initializer } => {
                let value = match initializer {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Nil,
                };
                for name in names {
                    if !self.env.define(name, value.clone_kind_preserving()) {
                        return Err(RuntimeError::Redefinition { name: name.clone(), line: stmt.line });
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::If { cond, then_branch, elifs, else_branch } => {
                if self.eval_expr(cond)?.is_truthy() {
                    return self.exec_stmt(then_branch);
                }
                for (elif_cond, elif_body) in elifs {
                    if self.eval_expr(elif_cond)?.is_truthy() {
                        return self.exec_stmt(elif_body);
                    }
                }
                match else_branch {
                    Some(branch) => self.exec_stmt(branch),
                    None => Ok(Flow::Normal),
                }
            }

            StmtKind::While { cond, body } => {
                self.loop_depth += 1;
                let result = self.run_while(cond, body);
                self.loop_depth -= 1;
                result
            }

            StmtKind::Do { cond, body } => {
                self.loop_depth += 1;
                let result = self.run_do(cond, body);
                self.loop_depth -= 1;
                result
            }

            StmtKind::For { init, cond, increment, body } => {
                self.loop_depth += 1;
                let result = self.run_for(*init, *cond, *increment, body);
                self.loop_depth -= 1;
                result
            }

            StmtKind::From { var_name, array, body } => {
                self.loop_depth += 1;
                let result = self.run_from(var_name, array, body, stmt.line);
                self.loop_depth -= 1;
                result
            }

            StmtKind::Switch { cond, cases, default } => {
                let value = self.eval_expr(cond)?;
                for (label, body) in cases {
                    let label_value = self.eval_expr(label)?;
                    if switch_matches(&value, &label_value) {
                        return self.exec_stmt(body);
                    }
                }
                match default {
                    Some(body) => self.exec_stmt(body),
                    None => Ok(Flow::Normal),
                }
            }

            StmtKind::Return(value) => {
                let v = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(v))
            }

            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.warn("'break' outside a loop has no effect", stmt.line);
                    Ok(Flow::Normal)
                } else {
                    Ok(Flow::Break)
                }
            }

            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.warn("'continue' outside a loop has no effect", stmt.line);
                    Ok(Flow::Normal)
                } else {
                    Ok(Flow::Continue)
                }
            }

            StmtKind::Print(expr) => {
                let value = self.eval_expr(expr)?;
                let rendered = value.to_string();
                self.sink.print_line(&rendered);
                Ok(Flow::Normal)
            }

            StmtKind::Function { name, params, body } => {
                let func = Value::Function(Rc::new(FunctionData {
                    name: name.clone(),
                    params: params.clone(),
                    body,
                }));
                if !self.env.define_global(name, func) {
                    return Err(RuntimeError::Redefinition { name: name.clone(), line: stmt.line });
                }
                Ok(Flow::Normal)
            }

            StmtKind::Struct { name, fields, defaults } => {
                let mut default_values = Vec::with_capacity(defaults.len());
                for default in defaults {
                    default_values.push(self.eval_expr(default)?);
                }
                if self.structs.contains_key(name) {
                    self.info(format!("struct '{name}' already defined, keeping the first definition"), stmt.line);
                } else {
                    self.structs.insert(
                        name.clone(),
                        Rc::new(StructTemplate { type_name: name.clone(), fields: fields.clone(), defaults: default_values }),
                    );
                }
                Ok(Flow::Normal)
            }

            StmtKind::Class { .. } => Ok(Flow::Normal),

            StmtKind::Array { name, elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element)?);
                }
                let array = Value::Array(Rc::new(RefCell::new(ArrayData { name: name.clone(), elements: values })));
                if !self.env.define(name, array) {
                    return Err(RuntimeError::Redefinition { name: name.clone(), line: stmt.line });
                }
                Ok(Flow::Normal)
            }

            StmtKind::Map { name, entries } => {
                let mut map = IndexMap::new();
                for (key_expr, value_expr) in entries {
                    let key = self.eval_map_key(key_expr)?;
                    let value = self.eval_expr(value_expr)?;
                    map.insert(key, value);
                }
                let map_value = Value::Map(Rc::new(RefCell::new(MapData { name: name.clone(), entries: map })));
                if !self.env.define(name, map_value) {
                    return Err(RuntimeError::Redefinition { name: name.clone(), line: stmt.line });
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn run_while(&mut self, cond: &'a Expr<'a>, body: &'a Stmt<'a>) -> Result<Flow<'a>, RuntimeError> {
        loop {
            if !self.eval_expr(cond)?.is_truthy() {
                return Ok(Flow::Normal);
            }
            match self.exec_stmt(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
    }

    fn run_do(&mut self, cond: &'a Expr<'a>, body: &'a Stmt<'a>) -> Result<Flow<'a>, RuntimeError> {
        loop {
            match self.exec_stmt(body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if !self.eval_expr(cond)?.is_truthy() {
                return Ok(Flow::Normal);
            }
        }
    }

    fn run_for(
        &mut self,
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        increment: Option<&'a Expr<'a>>,
        body: &'a Stmt<'a>,
    ) -> Result<Flow<'a>, RuntimeError> {
        let saved = self.env.push_scope();
        let result = (|| {
            if let Some(init_stmt) = init {
                self.exec_stmt(init_stmt)?;
            }
            loop {
                if let Some(c) = cond {
                    if !self.eval_expr(c)?.is_truthy() {
                        break;
                    }
                }
                match self.exec_stmt(body)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
                if let Some(inc) = increment {
                    self.eval_expr(inc)?;
                }
            }
            Ok(Flow::Normal)
        })();
        self.env.pop_to(saved);
        result
    }

    fn run_from(
        &mut self,
        var_name: &str,
        array: &'a Expr<'a>,
        body: &'a Stmt<'a>,
        line: usize,
    ) -> Result<Flow<'a>, RuntimeError> {
        let array_value = self.eval_expr(array)?;
        let array = match array_value {
            Value::Array(a) => a,
            other => {
                return Err(RuntimeError::Type {
                    message: format!("'from' requires an array, found {}", other.type_name()),
                    line,
                })
            }
        };
        let elements: Vec<Value<'a>> = array.borrow().elements.clone();
        let saved = self.env.push_scope();
        self.env.define(var_name, Value::Nil);
        let mut flow = Flow::Normal;
        for element in elements {
            self.env.set(var_name, element);
            match self.exec_stmt(body) {
                Ok(Flow::Break) => break,
                Ok(Flow::Return(v)) => {
                    flow = Flow::Return(v);
                    break;
                }
                Ok(Flow::Normal) | Ok(Flow::Continue) => {}
                Err(err) => {
                    self.env.pop_to(saved);
                    return Err(err);
                }
            }
        }
        self.env.pop_to(saved);
        Ok(flow)
    }

    fn eval_map_key(&mut self, expr: &'a Expr<'a>) -> Result<MapKey, RuntimeError> {
        let value = self.eval_expr(expr)?;
        match value {
            Value::Number(n) => Ok(MapKey::Number(n)),
            Value::String(s) => Ok(MapKey::String(s)),
            other => Err(RuntimeError::Type {
                message: format!("map key must be a number or string, found {}", other.type_name()),
                line: expr.line,
            }),
        }
    }

    // ---- expression evaluation ----

    fn eval_expr(&mut self, expr: &'a Expr<'a>) -> Result<Value<'a>, RuntimeError> {
        match &expr.kind {
            ExprKind::Empty => Ok(Value::Nil),
            ExprKind::NumberLit(n) => Ok(Value::Number(*n)),
            ExprKind::StringLit(s) => Ok(Value::String(s.clone())),
            ExprKind::NilLit => Ok(Value::Nil),
            ExprKind::Now => Ok(Value::Number(now_seconds())),
            ExprKind::Grouping(inner) => self.eval_expr(*inner),

            ExprKind::Variable(name) => self
                .env
                .get(name)
                .ok_or_else(|| RuntimeError::Name { name: name.clone(), line: expr.line }),

            ExprKind::Unary(op, operand, is_prefix) => self.eval_unary(*op, *operand, *is_prefix, expr.line),

            ExprKind::Binary(left, op, right) => self.eval_binary(*left, *op, *right, expr.line),

            ExprKind::Logical(left, op, right) => self.eval_logical(*left, *op, *right),

            ExprKind::Assign(name, value_expr) => {
                let value = self.eval_expr(*value_expr)?;
                self.env.assign(name, value, expr.line)
            }

            ExprKind::Call { callee, name, args } => self.eval_call(*callee, name, args, expr.line),

            ExprKind::Get { object, name } => self.eval_get(*object, name, expr.line),

            ExprKind::GetDef { object, name, args } => self.eval_get_def(*object, name, args, expr.line),

            ExprKind::Set { object, name, value } => self.eval_set(*object, name, *value, expr.line),
        }
    }

    fn eval_unary(
        &mut self,
        op: UnaryOp,
        operand: &'a Expr<'a>,
        is_prefix: bool,
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        match op {
            UnaryOp::Not => {
                let value = self.eval_expr(operand)?;
                match value {
                    Value::Number(n) => Ok(Value::Number(bool_to_num(n == 0.0))),
                    other => {
                        self.warn(format!("[UNARY] '!' requires a number, found {}", other.type_name()), line);
                        Ok(Value::Nil)
                    }
                }
            }
            UnaryOp::Negate => {
                let value = self.eval_expr(operand)?;
                match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => {
                        self.warn(format!("[UNARY] '-' requires a number, found {}", other.type_name()), line);
                        Ok(Value::Nil)
                    }
                }
            }
            UnaryOp::Increment | UnaryOp::Decrement => {
                let name = match &operand.kind {
                    ExprKind::Variable(name) => name.clone(),
                    _ => {
                        self.warn("increment/decrement target must be a variable", line);
                        return Ok(Value::Nil);
                    }
                };
                let current =
                    self.env.get(&name).ok_or_else(|| RuntimeError::Name { name: name.clone(), line })?;
                let n = match current {
                    Value::Number(n) => n,
                    other => {
                        self.warn(format!("cannot increment/decrement a {}", other.type_name()), line);
                        return Ok(Value::Nil);
                    }
                };
                let delta = if op == UnaryOp::Increment { 1.0 } else { -1.0 };
                let updated = n + delta;
                self.env.set(&name, Value::Number(updated));
                Ok(Value::Number(if is_prefix { updated } else { n }))
            }
        }
    }

    fn eval_binary(
        &mut self,
        left: &'a Expr<'a>,
        op: BinOp,
        right: &'a Expr<'a>,
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        let lv = self.eval_expr(left)?;
        let rv = self.eval_expr(right)?;
        use BinOp::*;
        let result = match (op, &lv, &rv) {
            (Add, Value::Number(a), Value::Number(b)) => Some(Value::Number(a + b)),
            (Add, Value::String(a), Value::String(b)) => Some(Value::String(format!("{a}{b}"))),
            (Add, Value::String(a), Value::Number(b)) => Some(Value::String(format!("{a}{}", crate::value::format_number(*b)))),
            (Add, Value::Number(a), Value::String(b)) => Some(Value::String(format!("{}{b}", crate::value::format_number(*a)))),

            (Sub, Value::Number(a), Value::Number(b)) => Some(Value::Number(a - b)),
            (Mul, Value::Number(a), Value::Number(b)) => Some(Value::Number(a * b)),

            (Div, Value::Number(a), Value::Number(b)) => {
                if *b == 0.0 {
                    return Err(RuntimeError::Domain { message: "division by zero".into(), line });
                }
                Some(Value::Number(a / b))
            }
            (Mod, Value::Number(a), Value::Number(b)) => {
                if *b == 0.0 {
                    return Err(RuntimeError::Domain { message: "division by zero".into(), line });
                }
                Some(Value::Number(a % b))
            }

            (Less, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a < b))),
            (LessEqual, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a <= b))),
            (Greater, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a > b))),
            (GreaterEqual, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a >= b))),

            (Equal, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a == b))),
            (Equal, Value::String(a), Value::String(b)) => Some(Value::Number(bool_to_num(a == b))),
            (Equal, _, _) => Some(Value::Number(bool_to_num(false))),
            (NotEqual, Value::Number(a), Value::Number(b)) => Some(Value::Number(bool_to_num(a != b))),
            (NotEqual, Value::String(a), Value::String(b)) => Some(Value::Number(bool_to_num(a != b))),
            (NotEqual, _, _) => Some(Value::Number(bool_to_num(true))),

            _ => None,
        };
        match result {
            Some(value) => Ok(value),
            None => {
                self.warn(format!("[BINARY] Unknown operator for {} and {}", lv.type_name(), rv.type_name()), line);
                Ok(Value::Nil)
            }
        }
    }

    fn eval_logical(&mut self, left: &'a Expr<'a>, op: LogicalOp, right: &'a Expr<'a>) -> Result<Value<'a>, RuntimeError> {
        match op {
            LogicalOp::Or => {
                let l = self.eval_expr(left)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval_expr(right)
                }
            }
            LogicalOp::And => {
                let l = self.eval_expr(left)?;
                if !l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval_expr(right)
                }
            }
            // This operator's original behavior was
            // suspiciously `or`-shaped; implemented here as a real
            // exclusive-or (see DESIGN.md).
            LogicalOp::Xor => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                Ok(Value::Number(bool_to_num(l.is_truthy() != r.is_truthy())))
            }
        }
    }

    fn eval_call(
        &mut self,
        callee: &'a Expr<'a>,
        name: &str,
        args: &'a [&'a Expr<'a>],
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        if let Some(template) = self.structs.get(name).cloned() {
            return self.construct_struct(&template, args, line);
        }

        let callee_value = self.eval_expr(callee)?;
        match callee_value {
            Value::Native(native) => {
                let mut ctx = Context::new();
                for arg in args {
                    let value = self.eval_expr(arg)?;
                    ctx.push(value_to_literal(&value));
                }
                let argc = ctx.argc();
                let result = (native.func)(&mut ctx, argc);
                Ok(literal_to_value(result))
            }
            Value::Function(func) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                self.call_function(&func, values, line)
            }
            other => Err(RuntimeError::Type {
                message: format!("'{}' is not callable ({})", name, other.type_name()),
                line,
            }),
        }
    }

    fn construct_struct(
        &mut self,
        template: &StructTemplate<'a>,
        args: &'a [&'a Expr<'a>],
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        let mut fields = IndexMap::new();
        for (i, field_name) in template.fields.iter().enumerate() {
            let value = if i < args.len() {
                self.eval_expr(args[i])?
            } else {
                template.defaults[i].clone()
            };
            fields.insert(field_name.clone(), value);
        }
        if args.len() > template.fields.len() {
            self.warn(
                format!(
                    "struct '{}' constructor called with {} arguments, expected at most {}",
                    template.type_name,
                    args.len(),
                    template.fields.len()
                ),
                line,
            );
            for extra in &args[template.fields.len()..] {
                self.eval_expr(extra)?;
            }
        }
        Ok(Value::Struct(Rc::new(RefCell::new(StructData { type_name: template.type_name.clone(), fields }))))
    }

    fn call_function(
        &mut self,
        func: &Rc<FunctionData<'a>>,
        values: Vec<Value<'a>>,
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        if values.len() != func.params.len() {
            return Err(RuntimeError::Arity { expected: func.params.len(), found: values.len(), line });
        }
        let body_statements = match &func.body.kind {
            StmtKind::Block(statements) => statements,
            _ => unreachable!("function body is always parsed as a block"),
        };
        let saved = self.env.push_scope();
        for (param, value) in func.params.iter().zip(values) {
            self.env.define(param, value);
        }
        let outer_depth = std::mem::replace(&mut self.loop_depth, 0);
        let result = self.exec_statements(body_statements);
        self.loop_depth = outer_depth;
        self.env.pop_to(saved);
        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::Nil),
        }
    }

    /// Invokes a callable `Value` with already-evaluated arguments; used
    /// by `Array.foreach`/`Map.foreach` callbacks.
    fn invoke_value(&mut self, callee: &Value<'a>, args: Vec<Value<'a>>, line: usize) -> Result<Value<'a>, RuntimeError> {
        match callee {
            Value::Function(func) => self.call_function(func, args, line),
            Value::Native(native) => {
                let mut ctx = Context::new();
                for arg in &args {
                    ctx.push(value_to_literal(arg));
                }
                let argc = ctx.argc();
                let result = (native.func)(&mut ctx, argc);
                Ok(literal_to_value(result))
            }
            other => Err(RuntimeError::Type { message: format!("'{}' is not callable", other.type_name()), line }),
        }
    }

    fn eval_get(&mut self, object: &'a Expr<'a>, name: &str, line: usize) -> Result<Value<'a>, RuntimeError> {
        let obj = self.eval_expr(object)?;
        match obj {
            Value::Struct(s) => {
                let s = s.borrow();
                match s.fields.get(name) {
                    Some(value) => Ok(value.clone()),
                    None => {
                        self.warn(format!("struct '{}' has no field '{}'", s.type_name, name), line);
                        Ok(Value::Nil)
                    }
                }
            }
            Value::Array(_) => {
                self.warn(format!("field access '.{name}' on an array is reserved; use '.at(i)'"), line);
                Ok(Value::Nil)
            }
            other => {
                self.warn(format!("cannot get field '{}' on {}", name, other.type_name()), line);
                Ok(Value::Nil)
            }
        }
    }

    fn eval_set(&mut self, object: &'a Expr<'a>, name: &str, value_expr: &'a Expr<'a>, line: usize) -> Result<Value<'a>, RuntimeError> {
        let obj = self.eval_expr(object)?;
        let value = self.eval_expr(value_expr)?;
        match obj {
            Value::Struct(s) => {
                let mut s = s.borrow_mut();
                if s.fields.contains_key(name) {
                    s.fields.insert(name.to_string(), value.clone_kind_preserving());
                } else {
                    self.warn(format!("struct '{}' has no field '{}'", s.type_name, name), line);
                }
            }
            other => self.warn(format!("cannot set field '{}' on {}", name, other.type_name()), line),
        }
        Ok(value)
    }

    fn eval_get_def(
        &mut self,
        object: &'a Expr<'a>,
        name: &str,
        args: &'a [&'a Expr<'a>],
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        let obj = self.eval_expr(object)?;
        let method = name.to_ascii_lowercase();
        match obj {
            Value::Array(array) => self.call_array_method(&array, &method, args, line),
            Value::Map(map) => self.call_map_method(&map, &method, args, line),
            other => Err(RuntimeError::Type { message: format!("'{}' has no method '{}'", other.type_name(), name), line }),
        }
    }

    fn index_arg(&mut self, args: &'a [&'a Expr<'a>], pos: usize, line: usize) -> Result<usize, RuntimeError> {
        let expr = args
            .get(pos)
            .copied()
            .ok_or(RuntimeError::Arity { expected: pos + 1, found: args.len(), line })?;
        match self.eval_expr(expr)? {
            Value::Number(n) if n >= 0.0 => Ok(n as usize),
            Value::Number(_) => Err(RuntimeError::Domain { message: "array index must be non-negative".into(), line }),
            other => Err(RuntimeError::Type { message: format!("expected a number index, found {}", other.type_name()), line }),
        }
    }

    fn call_array_method(
        &mut self,
        array: &Rc<RefCell<ArrayData<'a>>>,
        method: &str,
        args: &'a [&'a Expr<'a>],
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        match method {
            "push" => {
                for arg in args {
                    let value = self.eval_expr(arg)?;
                    array.borrow_mut().elements.push(value);
                }
                Ok(Value::Nil)
            }
            "pop" => Ok(array.borrow_mut().elements.pop().unwrap_or(Value::Nil)),
            "size" => Ok(Value::Number(array.borrow().elements.len() as f64)),
            "at" => {
                let idx = self.index_arg(args, 0, line)?;
                let a = array.borrow();
                a.elements.get(idx).cloned().ok_or_else(|| RuntimeError::Domain {
                    message: format!("array index {idx} out of bounds (len {})", a.elements.len()),
                    line,
                })
            }
            "set" => {
                let idx = self.index_arg(args, 0, line)?;
                let value_expr = args.get(1).copied().ok_or(RuntimeError::Arity { expected: 2, found: args.len(), line })?;
                let value = self.eval_expr(value_expr)?;
                let mut a = array.borrow_mut();
                if idx >= a.elements.len() {
                    return Err(RuntimeError::Domain {
                        message: format!("array index {idx} out of bounds (len {})", a.elements.len()),
                        line,
                    });
                }
                a.elements[idx] = value;
                Ok(Value::Nil)
            }
            "remove" => {
                let idx = self.index_arg(args, 0, line)?;
                let mut a = array.borrow_mut();
                if idx >= a.elements.len() {
                    return Err(RuntimeError::Domain {
                        message: format!("array index {idx} out of bounds (len {})", a.elements.len()),
                        line,
                    });
                }
                Ok(a.elements.remove(idx))
            }
            "clear" => {
                array.borrow_mut().elements.clear();
                Ok(Value::Nil)
            }
            "foreach" => {
                let callback_expr = args.first().copied().ok_or(RuntimeError::Arity { expected: 1, found: 0, line })?;
                let callback = self.eval_expr(callback_expr)?;
                let elements: Vec<Value<'a>> = array.borrow().elements.clone();
                for element in elements {
                    self.invoke_value(&callback, vec![element], line)?;
                }
                Ok(Value::Nil)
            }
            _ => Err(RuntimeError::Type { message: format!("array has no method '{method}'"), line }),
        }
    }

    fn call_map_method(
        &mut self,
        map: &Rc<RefCell<MapData<'a>>>,
        method: &str,
        args: &'a [&'a Expr<'a>],
        line: usize,
    ) -> Result<Value<'a>, RuntimeError> {
        match method {
            "size" => Ok(Value::Number(map.borrow().entries.len() as f64)),
            "set" => {
                let key_expr = args.first().copied().ok_or(RuntimeError::Arity { expected: 2, found: args.len(), line })?;
                let key = self.eval_map_key(key_expr)?;
                let value_expr = args.get(1).copied().ok_or(RuntimeError::Arity { expected: 2, found: args.len(), line })?;
                let value = self.eval_expr(value_expr)?;
                map.borrow_mut().entries.insert(key, value);
                Ok(Value::Nil)
            }
            "find" => {
                let key_expr = args.first().copied().ok_or(RuntimeError::Arity { expected: 1, found: 0, line })?;
                let key = self.eval_map_key(key_expr)?;
                Ok(map.borrow().entries.get(&key).cloned().unwrap_or(Value::Nil))
            }
            "erase" => {
                let key_expr = args.first().copied().ok_or(RuntimeError::Arity { expected: 1, found: 0, line })?;
                let key = self.eval_map_key(key_expr)?;
                map.borrow_mut().entries.shift_remove(&key);
                Ok(Value::Nil)
            }
            "clear" => {
                map.borrow_mut().entries.clear();
                Ok(Value::Nil)
            }
            "foreach" => {
                let callback_expr = args.first().copied().ok_or(RuntimeError::Arity { expected: 1, found: 0, line })?;
                let callback = self.eval_expr(callback_expr)?;
                let entries: Vec<(MapKey, Value<'a>)> = map.borrow().entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                for (key, value) in entries {
                    let key_value = match key {
                        MapKey::Number(n) => Value::Number(n),
                        MapKey::String(s) => Value::String(s),
                    };
                    self.invoke_value(&callback, vec![key_value, value], line)?;
                }
                Ok(Value::Nil)
            }
            _ => Err(RuntimeError::Type { message: format!("map has no method '{method}'"), line }),
        }
    }
}

fn bool_to_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Switch case matching: `Number == Number` or `String ==
/// String`; any other kind pairing never matches, including a label
/// that happens to compare structurally equal across kinds.
fn switch_matches(value: &Value, label: &Value) -> bool {
    match (value, label) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn now_seconds() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Only Number/String/Nil cross the native bridge (see `native.rs`'s
/// `Literal`); a function, native, struct, array, or map argument has
/// no `Literal` representation and is marshalled as `Nil` rather than
/// silently stringified.
fn value_to_literal(value: &Value) -> Literal {
    match value {
        Value::Nil => Literal::Nil,
        Value::Number(n) => Literal::Number(*n),
        Value::String(s) => Literal::String(s.clone()),
        Value::Function(_) | Value::Native(_) | Value::Struct(_) | Value::Array(_) | Value::Map(_) => Literal::Nil,
    }
}

fn literal_to_value<'a>(literal: Literal) -> Value<'a> {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Number(n) => Value::Number(n),
        Literal::String(s) => Value::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectSink;

    #[test]
    fn arithmetic_and_print() {
        let arena = Bump::new();
        let sink = CollectSink::default();
        let mut interp = Interpreter::with_sink(&arena, Box::new(sink.clone()));
        let ok = interp.run("var x = 2 + 3 * 4; print(x);");
        assert!(ok);
        assert_eq!(sink.lines(), vec!["14".to_string()]);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("var x = 1 / 0;");
        assert!(!ok);
    }

    #[test]
    fn undefined_name_is_fatal() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("print(unknownThing);");
        assert!(!ok);
    }

    #[test]
    fn functions_return_values() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run(
            "function add(a, b) { return a + b; } var x = add(2, 3); if (x != 5) { print(\"bad\"); }",
        );
        assert!(ok);
    }

    #[test]
    fn for_loop_break_and_continue() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run(
            "var total = 0; for (var i = 0; i < 10; i++) { if (i == 5) { break; } total += i; } ",
        );
        assert!(ok);
    }

    #[test]
    fn struct_construction_and_field_access() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run(
            "struct Point { var x = 0; var y = 0; } var p = Point(1, 2); if (p.x != 1) { print(\"bad\"); }",
        );
        assert!(ok);
    }

    #[test]
    fn array_methods_push_and_at() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("var xs[]; xs.push(1); xs.push(2); if (xs.at(1) != 2) { print(\"bad\"); }");
        assert!(ok);
    }

    #[test]
    fn map_methods_set_and_find() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("var m{}; m.set(\"a\", 1); if (m.find(\"a\") != 1) { print(\"bad\"); }");
        assert!(ok);
    }

    #[test]
    fn xor_is_true_exclusive_or() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("if ((1 xor 1) != 0) { print(\"bad\"); } if ((1 xor 0) != 1) { print(\"bad\"); }");
        assert!(ok);
    }

    #[test]
    fn break_outside_loop_is_a_warning_not_an_error() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("break;");
        assert!(ok);
    }

    #[test]
    fn from_each_binds_and_rebinds_loop_variable() {
        let arena = Bump::new();
        let mut interp = Interpreter::new(&arena);
        let ok = interp.run("var xs[] = [1, 2, 3]; var total = 0; from (var item : xs) { total += item; }");
        assert!(ok);
    }

    #[test]
    fn a_recovered_parse_error_does_not_fail_the_run() {
        // The malformed `var x = ;` is dropped at the next statement
        // boundary (synchronize()); the Program root is still built and
        // the surviving statement still executes, so `run` reports
        // success per spec.md §4.1 even though a ParseError was recorded.
        let arena = Bump::new();
        let sink = CollectSink::default();
        let mut interp = Interpreter::with_sink(&arena, Box::new(sink.clone()));
        let ok = interp.run("var x = ; print(\"still ran\");");
        assert!(ok);
        assert_eq!(sink.lines(), vec!["still ran".to_string()]);
    }
}
