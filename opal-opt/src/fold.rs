//! Constant propagation and folding
//!
//! Tracks, per method, which locals currently hold a known constant and
//! rewrites expressions that are fully determined by those constants.
//! Only names declared as parameters or locals are tracked: an unqualified
//! field access looks like a plain variable in the tree, but a method call
//! could change the field behind it.
//!
//! What never folds:
//! - integer division or modulo by zero (the generated check must trap),
//! - `while` conditions (their variables may change between iterations),
//! - anything downstream of an unknown value.
//!
//! Integer arithmetic folds with wrapping semantics, matching the target.

use log::debug;
use opal_ir::{BinaryOp, Expr, ExprKind, Program, Stmt, UnaryOp};
use std::collections::{HashMap, HashSet};

/// A value known at compile time.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl Value {
    fn to_expr(self) -> Expr {
        match self {
            Value::Int(v) => Expr::int(v),
            Value::Float(v) => Expr::float(v),
            Value::Bool(v) => Expr::boolean(v),
        }
    }
}

type Env = HashMap<String, Value>;

pub fn fold_program(program: &mut Program) {
    for class in &mut program.classes {
        for method in &mut class.methods {
            let tracked: HashSet<String> = method
                .params
                .iter()
                .chain(method.locals.iter())
                .map(|decl| decl.name.clone())
                .collect();
            let mut env = Env::new();
            fold_seq(&mut method.body, &mut env, &tracked);
        }
    }
}

fn fold_seq(stmts: &mut [Stmt], env: &mut Env, tracked: &HashSet<String>) {
    for stmt in stmts.iter_mut() {
        fold_stmt(stmt, env, tracked);
    }
}

fn fold_stmt(stmt: &mut Stmt, env: &mut Env, tracked: &HashSet<String>) {
    match stmt {
        Stmt::Assign { target, value } => {
            if let ExprKind::Index { array, index } = &mut target.kind {
                fold_expr(array, env, tracked);
                fold_expr(index, env, tracked);
            }
            let known = fold_expr(value, env, tracked);
            if let ExprKind::Var { name } = &target.kind {
                if tracked.contains(name) {
                    match known {
                        Some(value) => {
                            env.insert(name.clone(), value);
                        }
                        None => {
                            env.remove(name);
                        }
                    }
                }
            }
        }
        Stmt::Write { value } | Stmt::WriteFloat { value } => {
            fold_expr(value, env, tracked);
        }
        Stmt::Return { value: Some(value) } => {
            fold_expr(value, env, tracked);
        }
        Stmt::Return { value: None } | Stmt::Writeln | Stmt::Nop => {}
        Stmt::Call { receiver, args, .. } => {
            fold_expr(receiver, env, tracked);
            for arg in args {
                fold_expr(arg, env, tracked);
            }
        }
        Stmt::IfElse {
            condition,
            then_branch,
            else_branch,
        } => {
            // The condition runs exactly once, so it may be rewritten like
            // any other expression.
            match fold_expr(condition, env, tracked) {
                Some(Value::Bool(true)) => fold_seq(then_branch, env, tracked),
                Some(Value::Bool(false)) => fold_seq(else_branch, env, tracked),
                _ => {
                    // Branch unknown: fold each side on its own copy of the
                    // facts, then forget everything either side assigns.
                    let mut then_env = env.clone();
                    fold_seq(then_branch, &mut then_env, tracked);
                    let mut else_env = env.clone();
                    fold_seq(else_branch, &mut else_env, tracked);
                    for name in assigned_vars(then_branch).union(&assigned_vars(else_branch)) {
                        env.remove(name);
                    }
                }
            }
        }
        Stmt::While { condition, body } => {
            // Probe the condition without rewriting it: its variables may
            // change between iterations.
            let mut probe = condition.clone();
            let known = fold_expr(&mut probe, env, tracked);
            // Loop-assigned variables are unknown from here on, whether or
            // not the body ever runs.
            for name in assigned_vars(body) {
                env.remove(&name);
            }
            if known == Some(Value::Bool(false)) {
                return;
            }
            // Within one iteration the facts flow in statement order, as
            // long as they start from the invalidated state.
            let mut body_env = env.clone();
            fold_seq(body, &mut body_env, tracked);
        }
    }
}

/// Folds `expr` bottom-up, rewriting every node whose value is known, and
/// returns that value when the whole expression is known.
fn fold_expr(expr: &mut Expr, env: &Env, tracked: &HashSet<String>) -> Option<Value> {
    let known = match &mut expr.kind {
        ExprKind::IntConst(v) => Some(Value::Int(*v)),
        ExprKind::FloatConst(v) => Some(Value::Float(*v)),
        ExprKind::BooleanConst(v) => Some(Value::Bool(*v)),
        ExprKind::Var { name } => {
            if tracked.contains(name) {
                env.get(name).copied()
            } else {
                None
            }
        }
        ExprKind::Unary { op, operand } => {
            let value = fold_expr(operand, env, tracked);
            value.and_then(|value| apply_unary(*op, value))
        }
        ExprKind::Binary { op, left, right } => {
            let left = fold_expr(left, env, tracked);
            let right = fold_expr(right, env, tracked);
            match (left, right) {
                (Some(left), Some(right)) => apply_binary(*op, left, right),
                _ => None,
            }
        }
        ExprKind::Index { array, index } => {
            fold_expr(array, env, tracked);
            fold_expr(index, env, tracked);
            None
        }
        ExprKind::Field { receiver, .. } => {
            fold_expr(receiver, env, tracked);
            None
        }
        ExprKind::Cast { operand } => {
            fold_expr(operand, env, tracked);
            None
        }
        ExprKind::NewArray { length } => {
            fold_expr(length, env, tracked);
            None
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            fold_expr(receiver, env, tracked);
            for arg in args {
                fold_expr(arg, env, tracked);
            }
            None
        }
        ExprKind::NewObject { .. }
        | ExprKind::This
        | ExprKind::NullConst
        | ExprKind::Read
        | ExprKind::ReadFloat => None,
    };

    if let Some(value) = known {
        let already_constant = matches!(
            expr.kind,
            ExprKind::IntConst(_) | ExprKind::FloatConst(_) | ExprKind::BooleanConst(_)
        );
        if !already_constant {
            debug!("folding {} to a constant", expr);
            *expr = value.to_expr();
        }
    }
    known
}

fn apply_unary(op: UnaryOp, value: Value) -> Option<Value> {
    Some(match (op, value) {
        (UnaryOp::Plus, value) => value,
        (UnaryOp::Minus, Value::Int(v)) => Value::Int(v.wrapping_neg()),
        (UnaryOp::Minus, Value::Float(v)) => Value::Float(-v),
        (UnaryOp::Not, Value::Bool(v)) => Value::Bool(!v),
        _ => return None,
    })
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    use BinaryOp::*;
    use Value::*;
    Some(match (op, left, right) {
        (Add, Int(a), Int(b)) => Int(a.wrapping_add(b)),
        (Add, Float(a), Float(b)) => Float(a + b),
        (Sub, Int(a), Int(b)) => Int(a.wrapping_sub(b)),
        (Sub, Float(a), Float(b)) => Float(a - b),
        (Mul, Int(a), Int(b)) => Int(a.wrapping_mul(b)),
        (Mul, Float(a), Float(b)) => Float(a * b),
        // Division and modulo by zero must reach the runtime check.
        (Div, Int(a), Int(b)) => Int(a.checked_div(b)?),
        (Div, Float(a), Float(b)) => Float(a / b),
        (Mod, Int(a), Int(b)) => Int(a.checked_rem(b)?),
        (And, Bool(a), Bool(b)) => Bool(a && b),
        (Or, Bool(a), Bool(b)) => Bool(a || b),
        (Eq, Int(a), Int(b)) => Bool(a == b),
        (Eq, Float(a), Float(b)) => Bool(a == b),
        (Eq, Bool(a), Bool(b)) => Bool(a == b),
        (Ne, Int(a), Int(b)) => Bool(a != b),
        (Ne, Float(a), Float(b)) => Bool(a != b),
        (Ne, Bool(a), Bool(b)) => Bool(a != b),
        (Lt, Int(a), Int(b)) => Bool(a < b),
        (Lt, Float(a), Float(b)) => Bool(a < b),
        (Le, Int(a), Int(b)) => Bool(a <= b),
        (Le, Float(a), Float(b)) => Bool(a <= b),
        (Gt, Int(a), Int(b)) => Bool(a > b),
        (Gt, Float(a), Float(b)) => Bool(a > b),
        (Ge, Int(a), Int(b)) => Bool(a >= b),
        (Ge, Float(a), Float(b)) => Bool(a >= b),
        _ => return None,
    })
}

/// Every variable name assigned anywhere in `stmts`, including inside
/// nested blocks.
fn assigned_vars(stmts: &[Stmt]) -> HashSet<String> {
    let mut vars = HashSet::new();
    collect_assigned_vars(stmts, &mut vars);
    vars
}

fn collect_assigned_vars(stmts: &[Stmt], vars: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => {
                if let ExprKind::Var { name } = &target.kind {
                    vars.insert(name.clone());
                }
            }
            Stmt::While { body, .. } => collect_assigned_vars(body, vars),
            Stmt::IfElse {
                then_branch,
                else_branch,
                ..
            } => {
                collect_assigned_vars(then_branch, vars);
                collect_assigned_vars(else_branch, vars);
            }
            _ => {}
        }
    }
}
