//! Tree-walking evaluator.
//!
//! # Design Invariants
//!
//! 1. **The input globals are never touched.** The interpreter works on its
//!    own handle of the persistent table; the caller's copy stays valid
//!    whatever happens, including mid-run errors.
//! 2. **One error channel.** Every failure surfaces as `EvalError`; callers
//!    that need to distinguish "ran too long" from "script is broken" match
//!    on `StepLimit` vs `Runtime`.
//! 3. **Everything is metered.** One unit per statement and expression
//!    node, one per loop iteration, and whatever native functions charge
//!    through the shared meter.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::{BinOp, Block, Expr, Stmt, TableEntry, UnOp};
use crate::budget::{Budget, Exhausted, Meter};
use crate::chunk::Chunk;
use crate::value::{Key, ScriptFn, Table, Value};

/// Ceiling on nested script-function calls. Recursion past this depth is a
/// runtime failure rather than a host stack overflow.
pub const MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The step ceiling was hit. Kept distinct so embedders can tell
    /// exhaustion from broken scripts.
    StepLimit { spent: u64 },
    /// Any other evaluator failure: bad call target, type mismatch, etc.
    Runtime { message: String },
}

impl EvalError {
    pub fn runtime(message: impl Into<String>) -> EvalError {
        EvalError::Runtime { message: message.into() }
    }
}

impl From<Exhausted> for EvalError {
    fn from(e: Exhausted) -> EvalError {
        EvalError::StepLimit { spent: e.spent }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::StepLimit { spent } => {
                write!(f, "step budget exhausted after {spent} steps")
            }
            EvalError::Runtime { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for EvalError {}

/// What a finished run produced: the return values (empty when the chunk
/// did not `return`) and the globals to continue from.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub values: Vec<Value>,
    pub globals: Table,
}

/// Run a chunk against a globals snapshot under a budget. The snapshot is
/// taken by cheap handle copy; the caller's table is never mutated.
pub fn eval_chunk(globals: &Table, chunk: &Chunk, budget: Budget) -> Result<Outcome, EvalError> {
    let mut meter = Meter::new(budget);
    let mut interp = Interp {
        globals: globals.clone(),
        meter: &mut meter,
        depth: 0,
    };
    let mut frame = Frame::new();
    let flow = interp.exec_block(&mut frame, chunk.block())?;
    let values = match flow {
        Flow::Return(values) => values,
        Flow::Normal | Flow::Break => Vec::new(),
    };
    Ok(Outcome { values, globals: interp.globals })
}

/// Local scopes for one function activation (or the top-level chunk).
struct Frame {
    scopes: Vec<FxHashMap<String, Value>>,
}

impl Frame {
    fn new() -> Frame {
        Frame { scopes: vec![FxHashMap::default()] }
    }

    fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn declare(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    /// Assign to an existing local, innermost scope first. Returns false
    /// when the name is not a local (so the write goes to globals).
    fn assign_existing(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }
}

enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

struct Interp<'m> {
    globals: Table,
    meter: &'m mut Meter,
    depth: usize,
}

impl Interp<'_> {
    fn exec_block(&mut self, frame: &mut Frame, block: &Block) -> Result<Flow, EvalError> {
        frame.push();
        for stmt in &block.stmts {
            match self.exec_stmt(frame, stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    frame.pop();
                    return other;
                }
            }
        }
        frame.pop();
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, EvalError> {
        self.meter.charge(1)?;
        match stmt {
            Stmt::Assign { target, value } => {
                let v = self.eval_expr(frame, value)?;
                self.assign(frame, target, v)?;
                Ok(Flow::Normal)
            }
            Stmt::Local { name, value } => {
                let v = self.eval_expr(frame, value)?;
                frame.declare(name.clone(), v);
                Ok(Flow::Normal)
            }
            Stmt::Call(expr) => {
                self.eval_expr(frame, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If { arms, otherwise } => {
                for (cond, body) in arms {
                    if self.eval_expr(frame, cond)?.truthy() {
                        return self.exec_block(frame, body);
                    }
                }
                match otherwise {
                    Some(body) => self.exec_block(frame, body),
                    None => Ok(Flow::Normal),
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    self.meter.charge(1)?;
                    if !self.eval_expr(frame, cond)?.truthy() {
                        return Ok(Flow::Normal);
                    }
                    match self.exec_block(frame, body)? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(values) => return Ok(Flow::Return(values)),
                    }
                }
            }
            Stmt::NumericFor { var, start, stop, step, body } => {
                let start = self.number_operand(frame, start, "for start")?;
                let stop = self.number_operand(frame, stop, "for stop")?;
                let step = match step {
                    Some(e) => self.number_operand(frame, e, "for step")?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(EvalError::runtime("'for' step is zero"));
                }
                let mut i = start;
                while (step > 0.0 && i <= stop) || (step < 0.0 && i >= stop) {
                    self.meter.charge(1)?;
                    frame.push();
                    frame.declare(var.clone(), Value::Number(i));
                    let flow = self.exec_block(frame, body);
                    frame.pop();
                    match flow? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(values) => return Ok(Flow::Return(values)),
                    }
                    i += step;
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for e in exprs {
                    values.push(self.eval_expr(frame, e)?);
                }
                Ok(Flow::Return(values))
            }
            Stmt::Break => Ok(Flow::Break),
        }
    }

    /// Assignment through nested persistent tables: write the leaf, then
    /// rebuild each containing table back up to the root variable.
    fn assign(&mut self, frame: &mut Frame, target: &Expr, value: Value) -> Result<(), EvalError> {
        match target {
            Expr::Var(name) => {
                if !frame.assign_existing(name, value.clone()) {
                    self.globals = self.globals.set_str(name, value);
                }
                Ok(())
            }
            Expr::Index { object, key } => {
                let container = self.eval_expr(frame, object)?;
                let Value::Table(table) = container else {
                    return Err(EvalError::runtime(format!(
                        "attempt to index a {} value",
                        container.type_name()
                    )));
                };
                let key_value = self.eval_expr(frame, key)?;
                let key = Key::from_value(&key_value).map_err(EvalError::runtime)?;
                let updated = table.set(key, value);
                self.assign(frame, object, Value::Table(updated))
            }
            _ => Err(EvalError::runtime("cannot assign to this expression")),
        }
    }

    fn eval_expr(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, EvalError> {
        self.meter.charge(1)?;
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Var(name) => Ok(match frame.lookup(name) {
                Some(v) => v.clone(),
                None => self.globals.get_str(name),
            }),
            Expr::Index { object, key } => {
                let obj = self.eval_expr(frame, object)?;
                match obj {
                    Value::Table(table) => {
                        let key_value = self.eval_expr(frame, key)?;
                        let key = Key::from_value(&key_value).map_err(EvalError::runtime)?;
                        Ok(table.get(&key))
                    }
                    // Absent propagates: indexing nil yields nil, so reads
                    // through missing paths resolve to the absent sentinel.
                    Value::Nil => Ok(Value::Nil),
                    other => Err(EvalError::runtime(format!(
                        "attempt to index a {} value",
                        other.type_name()
                    ))),
                }
            }
            Expr::Call { callee, args } => {
                let values = self.eval_call(frame, callee, args)?;
                Ok(values.into_iter().next().unwrap_or(Value::Nil))
            }
            Expr::Function { params, body } => Ok(Value::Func(ScriptFn {
                params: params.clone(),
                body: body.clone(),
            })),
            Expr::TableCtor(entries) => {
                let mut table = Table::new();
                let mut next_index = 1i64;
                for entry in entries {
                    match entry {
                        TableEntry::Positional(e) => {
                            let v = self.eval_expr(frame, e)?;
                            table.insert(Key::Int(next_index), v);
                            next_index += 1;
                        }
                        TableEntry::Named { key, value } => {
                            let v = self.eval_expr(frame, value)?;
                            table.insert(Key::str(key), v);
                        }
                        TableEntry::Keyed { key, value } => {
                            let key_value = self.eval_expr(frame, key)?;
                            let k = Key::from_value(&key_value).map_err(EvalError::runtime)?;
                            let v = self.eval_expr(frame, value)?;
                            table.insert(k, v);
                        }
                    }
                }
                Ok(Value::Table(table))
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let l = self.eval_expr(frame, lhs)?;
                    if l.truthy() {
                        self.eval_expr(frame, rhs)
                    } else {
                        Ok(l)
                    }
                }
                BinOp::Or => {
                    let l = self.eval_expr(frame, lhs)?;
                    if l.truthy() {
                        Ok(l)
                    } else {
                        self.eval_expr(frame, rhs)
                    }
                }
                _ => {
                    let l = self.eval_expr(frame, lhs)?;
                    let r = self.eval_expr(frame, rhs)?;
                    binary_op(*op, l, r)
                }
            },
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(frame, operand)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnOp::Neg => match v {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(EvalError::runtime(format!(
                            "attempt to negate a {} value",
                            other.type_name()
                        ))),
                    },
                    UnOp::Len => match v {
                        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
                        Value::Table(t) => Ok(Value::Number(t.seq_len() as f64)),
                        other => Err(EvalError::runtime(format!(
                            "attempt to get length of a {} value",
                            other.type_name()
                        ))),
                    },
                }
            }
        }
    }

    fn eval_call(
        &mut self,
        frame: &mut Frame,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<Vec<Value>, EvalError> {
        let f = self.eval_expr(frame, callee)?;
        let mut argv = Vec::with_capacity(args.len());
        for a in args {
            argv.push(self.eval_expr(frame, a)?);
        }
        match f {
            Value::Native(native) => {
                let (values, globals) = native.call(&self.globals, &argv, self.meter)?;
                self.globals = globals;
                Ok(values)
            }
            Value::Func(func) => self.call_script_fn(&func, argv),
            other => {
                let message = match callee_name(callee) {
                    Some(name) => format!(
                        "attempt to call a {} value ('{}')",
                        other.type_name(),
                        name
                    ),
                    None => format!("attempt to call a {} value", other.type_name()),
                };
                Err(EvalError::runtime(message))
            }
        }
    }

    fn call_script_fn(&mut self, func: &ScriptFn, args: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::runtime(format!(
                "call depth limit exceeded ({MAX_CALL_DEPTH})"
            )));
        }
        self.depth += 1;
        let mut frame = Frame::new();
        for (i, param) in func.params.iter().enumerate() {
            frame.declare(param.clone(), args.get(i).cloned().unwrap_or(Value::Nil));
        }
        let flow = self.exec_block(&mut frame, &func.body);
        self.depth -= 1;
        match flow? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    fn number_operand(
        &mut self,
        frame: &mut Frame,
        expr: &Expr,
        what: &str,
    ) -> Result<f64, EvalError> {
        match self.eval_expr(frame, expr)? {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::runtime(format!(
                "{what} must be a number, got {}",
                other.type_name()
            ))),
        }
    }
}

fn callee_name(callee: &Expr) -> Option<&str> {
    match callee {
        Expr::Var(name) => Some(name),
        Expr::Index { key, .. } => match key.as_ref() {
            Expr::Str(s) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn binary_op(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
            let (a, b) = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => (*a, *b),
                (Value::Number(_), other) | (other, _) => {
                    return Err(EvalError::runtime(format!(
                        "attempt to perform arithmetic on a {} value",
                        other.type_name()
                    )))
                }
            };
            let n = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                // Floored modulo, sign follows the divisor
                BinOp::Mod => a - (a / b).floor() * b,
                BinOp::Pow => a.powf(b),
                _ => 0.0,
            };
            Ok(Value::Number(n))
        }
        BinOp::Concat => {
            let coerce = |v: &Value| -> Result<String, EvalError> {
                match v {
                    Value::Str(_) | Value::Number(_) => Ok(v.to_string()),
                    other => Err(EvalError::runtime(format!(
                        "attempt to concatenate a {} value",
                        other.type_name()
                    ))),
                }
            };
            let mut s = coerce(&l)?;
            s.push_str(&coerce(&r)?);
            Ok(Value::from(s))
        }
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::NotEq => Ok(Value::Bool(l != r)),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let ordered = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => match op {
                    BinOp::Lt => a < b,
                    BinOp::LtEq => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                },
                (Value::Str(a), Value::Str(b)) => match op {
                    BinOp::Lt => a < b,
                    BinOp::LtEq => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                },
                _ => {
                    return Err(EvalError::runtime(format!(
                        "attempt to compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            Ok(Value::Bool(ordered))
        }
        // Short-circuit operators never reach here
        BinOp::And | BinOp::Or => Err(EvalError::runtime("internal: unexpanded logical operator")),
    }
}
