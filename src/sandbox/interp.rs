//! Parser and evaluator for the sandbox language.
//!
//! A loop-free JS-like subset: `let`/`const`/`var` bindings, simple
//! assignment, `if`/`else`, `return`, and expression statements over
//! literals, arrays, member access, indexing, calls, and the usual
//! operators. With no looping construct, every accepted program is a
//! finite straight-line sequence; the step cap and wall-clock
//! deadline are backstops, not the primary containment.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::error::SandboxError;
use crate::query::ContextQuery;

use super::RecursionHook;
use super::lexer::{Token, TokenKind, tokenize};
use super::value::{Host, Value};

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Stmt {
    Let(String, Expr),
    Assign(String, Expr),
    Return(Option<Expr>),
    If(Expr, Vec<Stmt>, Option<Vec<Stmt>>),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Ident(String),
    Array(Vec<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    group_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            group_depth: 0,
        }
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.line)
    }

    fn err(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Parse {
            line: self.line().max(1),
            message: message.into(),
        }
    }

    /// Current token, skipping newlines inside groups.
    fn peek(&mut self) -> Option<&TokenKind> {
        if self.group_depth > 0 {
            while matches!(
                self.tokens.get(self.pos).map(|t| &t.kind),
                Some(TokenKind::Newline)
            ) {
                self.pos += 1;
            }
        }
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let kind = self.peek()?.clone();
        self.pos += 1;
        Some(kind)
    }

    fn eat_punct(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(TokenKind::Punct(p)) if *p == op) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_punct(&mut self, op: &'static str) -> Result<(), SandboxError> {
        if self.eat_punct(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected {op:?}")))
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(TokenKind::Ident(w)) if w == word) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Position just past `word` if it is the next significant token,
    /// looking through newlines and semicolons without consuming them.
    fn lookahead_ident(&self, word: &str) -> Option<usize> {
        let mut i = self.pos;
        while matches!(
            self.tokens.get(i).map(|t| &t.kind),
            Some(TokenKind::Newline | TokenKind::Punct(";"))
        ) {
            i += 1;
        }
        match self.tokens.get(i).map(|t| &t.kind) {
            Some(TokenKind::Ident(w)) if w == word => Some(i + 1),
            _ => None,
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Punct(";"))
        ) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.at_end() {
            stmts.push(self.parse_stmt()?);
            self.terminate_stmt()?;
            self.skip_separators();
        }
        Ok(stmts)
    }

    /// A statement must end at `;`, a newline, `}`, or EOF.
    fn terminate_stmt(&mut self) -> Result<(), SandboxError> {
        match self.tokens.get(self.pos).map(|t| &t.kind) {
            None
            | Some(TokenKind::Newline)
            | Some(TokenKind::Punct(";"))
            | Some(TokenKind::Punct("}")) => Ok(()),
            Some(other) => Err(self.err(format!("unexpected token after statement: {other:?}"))),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SandboxError> {
        if self.eat_ident("let") || self.eat_ident("const") || self.eat_ident("var") {
            let Some(TokenKind::Ident(name)) = self.advance() else {
                return Err(self.err("expected identifier after binding keyword"));
            };
            self.expect_punct("=")?;
            let expr = self.parse_expr()?;
            return Ok(Stmt::Let(name, expr));
        }

        if self.eat_ident("return") {
            let expr = match self.tokens.get(self.pos).map(|t| &t.kind) {
                None
                | Some(TokenKind::Newline)
                | Some(TokenKind::Punct(";"))
                | Some(TokenKind::Punct("}")) => None,
                _ => Some(self.parse_expr()?),
            };
            return Ok(Stmt::Return(expr));
        }

        if self.eat_ident("if") {
            return self.parse_if();
        }

        // Simple assignment: `name = expr` (but not `==`).
        if let Some(TokenKind::Ident(name)) = self.peek().cloned() {
            let is_assign = matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.kind),
                Some(TokenKind::Punct("="))
            );
            if is_assign && !KEYWORDS.contains(&name.as_str()) {
                self.pos += 2;
                let expr = self.parse_expr()?;
                return Ok(Stmt::Assign(name, expr));
            }
        }

        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse_if(&mut self) -> Result<Stmt, SandboxError> {
        self.expect_punct("(")?;
        self.group_depth += 1;
        let cond = self.parse_expr()?;
        self.group_depth -= 1;
        self.expect_punct(")")?;
        let then_block = self.parse_block()?;
        // Look past newlines for `else` without consuming a statement
        // terminator that the caller still expects to see.
        let else_block = if let Some(after_else) = self.lookahead_ident("else") {
            self.pos = after_else;
            self.skip_separators();
            if self.eat_ident("if") {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(cond, then_block, else_block))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.skip_separators();
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.err("unterminated block"));
            }
            stmts.push(self.parse_stmt()?);
            self.terminate_stmt()?;
            self.skip_separators();
        }
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> Result<Expr, SandboxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_and()?;
        while self.eat_punct("||") {
            let right = self.parse_and()?;
            left = Expr::Binary("||", Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_equality()?;
        while self.eat_punct("&&") {
            let right = self.parse_equality()?;
            left = Expr::Binary("&&", Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.eat_punct("===") || self.eat_punct("==") {
                "=="
            } else if self.eat_punct("!==") || self.eat_punct("!=") {
                "!="
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat_punct("<=") {
                "<="
            } else if self.eat_punct(">=") {
                ">="
            } else if self.eat_punct("<") {
                "<"
            } else if self.eat_punct(">") {
                ">"
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_punct("+") {
                "+"
            } else if self.eat_punct("-") {
                "-"
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_punct("*") {
                "*"
            } else if self.eat_punct("/") {
                "/"
            } else if self.eat_punct("%") {
                "%"
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        if self.eat_punct("!") {
            return Ok(Expr::Unary("!", Box::new(self.parse_unary()?)));
        }
        if self.eat_punct("-") {
            return Ok(Expr::Unary("-", Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let Some(TokenKind::Ident(name)) = self.advance() else {
                    return Err(self.err("expected property name after '.'"));
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("(") {
                self.group_depth += 1;
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(TokenKind::Punct(")"))) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                }
                self.group_depth -= 1;
                self.expect_punct(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_punct("[") {
                self.group_depth += 1;
                let index = self.parse_expr()?;
                self.group_depth -= 1;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Some(TokenKind::Num(n)) => Ok(Expr::Num(n)),
            Some(TokenKind::Str(s)) => Ok(Expr::Str(s)),
            Some(TokenKind::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" | "undefined" => Ok(Expr::Null),
                _ => Ok(Expr::Ident(word)),
            },
            Some(TokenKind::Punct("(")) => {
                self.group_depth += 1;
                let expr = self.parse_expr()?;
                self.group_depth -= 1;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Some(TokenKind::Punct("[")) => {
                self.group_depth += 1;
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(TokenKind::Punct("]"))) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                }
                self.group_depth -= 1;
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }
}

const KEYWORDS: &[&str] = &[
    "let", "const", "var", "return", "if", "else", "true", "false", "null", "undefined",
];

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

enum Flow {
    Normal,
    Return(Value),
}

/// Evaluation limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub timeout: Duration,
    pub step_limit: usize,
}

/// Result of running a program.
pub(crate) struct Evaluated {
    pub returned: Option<Value>,
    pub stdout: String,
    pub variables: BTreeMap<String, Value>,
}

pub(crate) struct Interp<'a> {
    query: &'a ContextQuery,
    hook: Option<&'a dyn RecursionHook>,
    scope: BTreeMap<String, Value>,
    stdout: String,
    deadline: Instant,
    limits: Limits,
    steps: usize,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(
        query: &'a ContextQuery,
        hook: Option<&'a dyn RecursionHook>,
        seed: BTreeMap<String, Value>,
        limits: Limits,
    ) -> Self {
        Self {
            query,
            hook,
            scope: seed,
            stdout: String::new(),
            deadline: Instant::now() + limits.timeout,
            limits,
            steps: 0,
        }
    }

    /// Parses and runs `code`.
    pub(crate) fn run(mut self, code: &str) -> Result<Evaluated, SandboxError> {
        let stmts = Parser::new(tokenize(code)?).parse_program()?;
        let mut returned = None;
        if let Flow::Return(value) = self.exec_block(&stmts)? {
            returned = Some(value);
        }
        Ok(Evaluated {
            returned,
            stdout: self.stdout,
            variables: self
                .scope
                .into_iter()
                .filter(|(_, v)| !matches!(v, Value::Host(_)))
                .collect(),
        })
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, SandboxError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, SandboxError> {
        self.charge()?;
        match stmt {
            Stmt::Let(name, expr) | Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.scope.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If(cond, then_block, else_block) => {
                if self.eval(cond)?.truthy() {
                    self.exec_block(then_block)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Budget check, charged per statement and per expression node.
    fn charge(&mut self) -> Result<(), SandboxError> {
        self.steps += 1;
        if self.steps > self.limits.step_limit {
            return Err(SandboxError::StepLimit {
                limit: self.limits.step_limit,
            });
        }
        if Instant::now() > self.deadline {
            return Err(SandboxError::Timeout {
                elapsed_ms: u64::try_from(self.limits.timeout.as_millis()).unwrap_or(u64::MAX),
                limit_ms: u64::try_from(self.limits.timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        self.charge()?;
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(values))
            }
            Expr::Ident(name) => self.resolve(name),
            Expr::Unary(op, inner) => {
                let value = self.eval(inner)?;
                match *op {
                    "!" => Ok(Value::Bool(!value.truthy())),
                    "-" => value
                        .as_number()
                        .map(|n| Value::Num(-n))
                        .ok_or_else(|| eval_err(format!("cannot negate {}", value.type_name()))),
                    _ => Err(eval_err(format!("unknown unary operator {op}"))),
                }
            }
            Expr::Binary(op, left, right) => self.eval_binary(op, left, right),
            Expr::Member(obj, name) => {
                let value = self.eval(obj)?;
                self.member(&value, name)
            }
            Expr::Index(obj, index) => {
                let value = self.eval(obj)?;
                let index = self.eval(index)?;
                match (&value, &index) {
                    (Value::Array(items), Value::Num(n)) => {
                        let i = *n as usize;
                        Ok(items.get(i).cloned().unwrap_or(Value::Null))
                    }
                    (Value::Object(map), Value::Str(key)) => {
                        Ok(map.get(key).cloned().unwrap_or(Value::Null))
                    }
                    (Value::Str(s), Value::Num(n)) => {
                        let i = *n as usize;
                        Ok(s.chars()
                            .nth(i)
                            .map_or(Value::Null, |c| Value::Str(c.to_string())))
                    }
                    _ => Err(eval_err(format!(
                        "cannot index {} with {}",
                        value.type_name(),
                        index.type_name()
                    ))),
                }
            }
            Expr::Call(callee, args) => self.eval_call(callee, args),
        }
    }

    fn eval_binary(&mut self, op: &str, left: &Expr, right: &Expr) -> Result<Value, SandboxError> {
        if op == "&&" {
            let l = self.eval(left)?;
            return if l.truthy() { self.eval(right) } else { Ok(l) };
        }
        if op == "||" {
            let l = self.eval(left)?;
            return if l.truthy() { Ok(l) } else { self.eval(right) };
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            "==" => Ok(Value::Bool(l.loose_eq(&r))),
            "!=" => Ok(Value::Bool(!l.loose_eq(&r))),
            "+" => match (&l, &r) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::Str(format!("{l}{r}")))
                }
                _ => numeric(op, &l, &r, |a, b| Value::Num(a + b)),
            },
            "-" => numeric(op, &l, &r, |a, b| Value::Num(a - b)),
            "*" => numeric(op, &l, &r, |a, b| Value::Num(a * b)),
            "/" => numeric(op, &l, &r, |a, b| Value::Num(a / b)),
            "%" => numeric(op, &l, &r, |a, b| Value::Num(a % b)),
            "<" => numeric(op, &l, &r, |a, b| Value::Bool(a < b)),
            ">" => numeric(op, &l, &r, |a, b| Value::Bool(a > b)),
            "<=" => numeric(op, &l, &r, |a, b| Value::Bool(a <= b)),
            ">=" => numeric(op, &l, &r, |a, b| Value::Bool(a >= b)),
            _ => Err(eval_err(format!("unknown operator {op}"))),
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, SandboxError> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        match name {
            "ctx" | "context" => Ok(Value::Host(Host::Ctx)),
            "JSON" => Ok(Value::Host(Host::Json)),
            "Math" => Ok(Value::Host(Host::Math)),
            "Array" => Ok(Value::Host(Host::ArrayNs)),
            "rae" => {
                if self.hook.is_some() {
                    Ok(Value::Host(Host::Rae))
                } else {
                    Err(eval_err("rae is not available in this sandbox"))
                }
            }
            _ => Err(eval_err(format!("unknown identifier {name:?}"))),
        }
    }

    fn member(&mut self, value: &Value, name: &str) -> Result<Value, SandboxError> {
        match (value, name) {
            (Value::Str(s), "length") => Ok(Value::Num(s.len() as f64)),
            (Value::Array(items), "length") => Ok(Value::Num(items.len() as f64)),
            (Value::Object(map), key) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            _ => Err(eval_err(format!(
                "no property {name:?} on {}",
                value.type_name()
            ))),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, SandboxError> {
        // Free functions
        if let Expr::Ident(name) = callee {
            if !self.scope.contains_key(name.as_str()) {
                match name.as_str() {
                    "print" => {
                        let rendered = args
                            .iter()
                            .map(|a| self.eval(a).map(|v| v.to_string()))
                            .collect::<Result<Vec<_>, _>>()?
                            .join(" ");
                        self.stdout.push_str(&rendered);
                        self.stdout.push('\n');
                        return Ok(Value::Null);
                    }
                    "String" => {
                        let v = self.eval_single(args)?;
                        return Ok(Value::Str(v.to_string()));
                    }
                    "Number" => {
                        let v = self.eval_single(args)?;
                        return Ok(v.as_number().map_or(Value::Num(f64::NAN), Value::Num));
                    }
                    "Boolean" => {
                        let v = self.eval_single(args)?;
                        return Ok(Value::Bool(v.truthy()));
                    }
                    _ => {}
                }
            }
        }

        // Method calls
        if let Expr::Member(obj, method) = callee {
            let target = self.eval(obj)?;
            let args = args
                .iter()
                .map(|a| self.eval(a))
                .collect::<Result<Vec<_>, _>>()?;
            return self.call_method(&target, method, &args);
        }

        // Evaluate the callee anyway for a precise diagnostic: unknown
        // identifiers report their name, bound values report their type.
        let value = self.eval(callee)?;
        Err(eval_err(format!("{} is not callable", value.type_name())))
    }

    fn eval_single(&mut self, args: &[Expr]) -> Result<Value, SandboxError> {
        args.first()
            .map_or(Ok(Value::Null), |expr| self.eval(expr))
    }

    #[allow(clippy::too_many_lines)]
    fn call_method(
        &mut self,
        target: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, SandboxError> {
        match target {
            Value::Host(Host::Ctx) => self.ctx_method(method, args),
            Value::Host(Host::Json) => match method {
                "stringify" => Ok(Value::Str(
                    serde_json::to_string(&args.first().unwrap_or(&Value::Null).to_json())
                        .unwrap_or_default(),
                )),
                "parse" => {
                    let text = string_arg(args, 0)?;
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(|v| Value::from_json(&v))
                        .map_err(|e| eval_err(format!("JSON.parse failed: {e}")))
                }
                _ => Err(eval_err(format!("unknown JSON method {method:?}"))),
            },
            Value::Host(Host::Math) => {
                let unary = |f: fn(f64) -> f64| -> Result<Value, SandboxError> {
                    number_arg(args, 0).map(|n| Value::Num(f(n)))
                };
                match method {
                    "floor" => unary(f64::floor),
                    "ceil" => unary(f64::ceil),
                    "round" => unary(f64::round),
                    "abs" => unary(f64::abs),
                    "sqrt" => unary(f64::sqrt),
                    "min" => fold_numbers(args, f64::min),
                    "max" => fold_numbers(args, f64::max),
                    _ => Err(eval_err(format!("unknown Math method {method:?}"))),
                }
            }
            Value::Host(Host::ArrayNs) => match method {
                "isArray" => Ok(Value::Bool(matches!(
                    args.first(),
                    Some(Value::Array(_))
                ))),
                _ => Err(eval_err(format!("unknown Array method {method:?}"))),
            },
            Value::Host(Host::Rae) => match method {
                "completion" => {
                    let hook = self
                        .hook
                        .ok_or_else(|| eval_err("rae is not available in this sandbox"))?;
                    let sub_goal = string_arg(args, 0)?;
                    let sub_context = match args.get(1) {
                        Some(Value::Str(s)) => s.clone(),
                        _ => self.query.text().to_string(),
                    };
                    hook.completion(&sub_goal, &sub_context)
                }
                _ => Err(eval_err(format!("unknown rae method {method:?}"))),
            },
            Value::Str(s) => string_method(s, method, args),
            Value::Array(items) => array_method(items, method, args),
            Value::Num(n) => match method {
                "toFixed" => {
                    let digits = number_arg(args, 0).unwrap_or(0.0).max(0.0) as usize;
                    Ok(Value::Str(format!("{n:.digits$}")))
                }
                "toString" => Ok(Value::Str(Value::Num(*n).to_string())),
                _ => Err(eval_err(format!("unknown number method {method:?}"))),
            },
            _ => Err(eval_err(format!(
                "no method {method:?} on {}",
                target.type_name()
            ))),
        }
    }

    /// Dispatch onto the context query surface.
    fn ctx_method(&mut self, method: &str, args: &[Value]) -> Result<Value, SandboxError> {
        let q = self.query;
        match method {
            "length" => Ok(Value::Num(q.length() as f64)),
            "lines" => Ok(Value::Num(q.lines() as f64)),
            "find" => Ok(Value::Num(q.find(&string_arg(args, 0)?) as f64)),
            "findAll" => Ok(Value::Array(
                q.find_all(&string_arg(args, 0)?)
                    .into_iter()
                    .map(|o| Value::Num(o as f64))
                    .collect(),
            )),
            "search" => Ok(q.search(&string_arg(args, 0)?).map_or(Value::Null, |m| {
                Value::Object(BTreeMap::from([
                    ("offset".to_string(), Value::Num(m.offset as f64)),
                    ("text".to_string(), Value::Str(m.text)),
                ]))
            })),
            "grep" => Ok(Value::Array(
                q.grep(&string_arg(args, 0)?)
                    .into_iter()
                    .map(|hit| {
                        Value::Object(BTreeMap::from([
                            ("line".to_string(), Value::Num(hit.line as f64)),
                            ("content".to_string(), Value::Str(hit.content)),
                        ]))
                    })
                    .collect(),
            )),
            "slice" => {
                let start = number_arg(args, 0)?.max(0.0) as usize;
                let end = args.get(1).and_then(Value::as_number).map(|n| n.max(0.0) as usize);
                Ok(Value::Str(q.slice(start, end)))
            }
            "getLines" => {
                let start = number_arg(args, 0)?.max(0.0) as usize;
                let end = number_arg(args, 1)?.max(0.0) as usize;
                Ok(Value::Str(q.get_lines(start, end)))
            }
            "head" => Ok(Value::Str(q.head(number_arg(args, 0)?.max(0.0) as usize))),
            "tail" => Ok(Value::Str(q.tail(number_arg(args, 0)?.max(0.0) as usize))),
            "getFunction" => Ok(q
                .get_function(&string_arg(args, 0)?)
                .map_or(Value::Null, Value::Str)),
            "getClass" => Ok(q
                .get_class(&string_arg(args, 0)?)
                .map_or(Value::Null, Value::Str)),
            "getImports" => Ok(Value::Array(
                q.get_imports().into_iter().map(Value::Str).collect(),
            )),
            "getExports" => Ok(Value::Array(
                q.get_exports().into_iter().map(Value::Str).collect(),
            )),
            "getOutline" => {
                let json = serde_json::to_value(q.get_outline()).unwrap_or_default();
                Ok(Value::from_json(&json))
            }
            "listFiles" => Ok(Value::Array(
                q.list_files().into_iter().map(Value::Str).collect(),
            )),
            "getFile" => Ok(q
                .get_file(&string_arg(args, 0)?)
                .map_or(Value::Null, Value::Str)),
            _ => Err(eval_err(format!("unknown context method {method:?}"))),
        }
    }
}

fn eval_err(message: impl Into<String>) -> SandboxError {
    SandboxError::Eval {
        message: message.into(),
    }
}

fn numeric(
    op: &str,
    l: &Value,
    r: &Value,
    f: impl Fn(f64, f64) -> Value,
) -> Result<Value, SandboxError> {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Ok(f(a, b)),
        _ => Err(eval_err(format!(
            "operator {op} needs numbers, got {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn fold_numbers(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, SandboxError> {
    let mut numbers = args.iter().filter_map(Value::as_number);
    let first = numbers
        .next()
        .ok_or_else(|| eval_err("expected at least one number"))?;
    Ok(Value::Num(numbers.fold(first, f)))
}

fn string_arg(args: &[Value], index: usize) -> Result<String, SandboxError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(eval_err(format!("missing string argument {index}"))),
    }
}

fn number_arg(args: &[Value], index: usize) -> Result<f64, SandboxError> {
    args.get(index)
        .and_then(Value::as_number)
        .ok_or_else(|| eval_err(format!("missing numeric argument {index}")))
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match method {
        "slice" | "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let start = (number_arg(args, 0).unwrap_or(0.0).max(0.0) as usize).min(len);
            let end = args
                .get(1)
                .and_then(Value::as_number)
                .map_or(len, |n| (n.max(0.0) as usize).min(len))
                .max(start);
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        "split" => {
            let sep = string_arg(args, 0)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(&sep).map(|p| Value::Str(p.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
        "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
        "trim" => Ok(Value::Str(s.trim().to_string())),
        "includes" => Ok(Value::Bool(s.contains(&string_arg(args, 0)?))),
        "startsWith" => Ok(Value::Bool(s.starts_with(&string_arg(args, 0)?))),
        "endsWith" => Ok(Value::Bool(s.ends_with(&string_arg(args, 0)?))),
        "indexOf" => Ok(Value::Num(
            s.find(&string_arg(args, 0)?)
                .and_then(|i| i64::try_from(i).ok())
                .unwrap_or(-1) as f64,
        )),
        "repeat" => {
            let n = (number_arg(args, 0)?.max(0.0) as usize).min(10_000);
            Ok(Value::Str(s.repeat(n)))
        }
        _ => Err(eval_err(format!("unknown string method {method:?}"))),
    }
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, SandboxError> {
    match method {
        "slice" => {
            let len = items.len();
            let start = (number_arg(args, 0).unwrap_or(0.0).max(0.0) as usize).min(len);
            let end = args
                .get(1)
                .and_then(Value::as_number)
                .map_or(len, |n| (n.max(0.0) as usize).min(len))
                .max(start);
            Ok(Value::Array(items[start..end].to_vec()))
        }
        "join" => {
            let sep = args
                .first()
                .map_or_else(|| ",".to_string(), ToString::to_string);
            Ok(Value::Str(
                items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        "includes" => Ok(Value::Bool(
            args.first().is_some_and(|needle| items.contains(needle)),
        )),
        "indexOf" => Ok(Value::Num(args.first().map_or(-1.0, |needle| {
            items
                .iter()
                .position(|item| item == needle)
                .map_or(-1.0, |i| i as f64)
        }))),
        _ => Err(eval_err(format!("unknown array method {method:?}"))),
    }
}
