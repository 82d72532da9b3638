//! Dead-assignment elimination
//!
//! Removes an assignment to a local variable when a later assignment in the
//! same statement sequence overwrites it with no intervening use. Only
//! side-effect-free right-hand sides are candidates: calls and reads must
//! stay. Conditional overwrites inside nested blocks do not count as
//! overwrites, but any use inside them counts as a use.

use log::debug;
use opal_ir::{Expr, ExprKind, Program, Stmt};

pub fn eliminate_dead_assignments(program: &mut Program) {
    for class in &mut program.classes {
        for method in &mut class.methods {
            eliminate_in_seq(&mut method.body);
        }
    }
}

fn eliminate_in_seq(stmts: &mut Vec<Stmt>) {
    let mut i = 0;
    while i < stmts.len() {
        match &mut stmts[i] {
            Stmt::While { body, .. } => eliminate_in_seq(body),
            Stmt::IfElse {
                then_branch,
                else_branch,
                ..
            } => {
                eliminate_in_seq(then_branch);
                eliminate_in_seq(else_branch);
            }
            _ => {}
        }

        if let Some(name) = removable_assignment(&stmts[i]) {
            if overwritten_before_use(&stmts[i + 1..], &name) {
                debug!("removing dead assignment: {}", stmts[i]);
                stmts.remove(i);
                continue;
            }
        }
        i += 1;
    }
}

/// The assigned variable name, when `stmt` is a plain-variable assignment
/// whose value may be dropped.
fn removable_assignment(stmt: &Stmt) -> Option<String> {
    match stmt {
        Stmt::Assign { target, value } if !has_side_effects(value) => match &target.kind {
            ExprKind::Var { name } => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// True when `name` is assigned again in `rest` before anything reads it.
fn overwritten_before_use(rest: &[Stmt], name: &str) -> bool {
    for stmt in rest {
        if stmt_uses_var(stmt, name) {
            return false;
        }
        if let Stmt::Assign { target, .. } = stmt {
            if matches!(&target.kind, ExprKind::Var { name: n } if n == name) {
                return true;
            }
        }
    }
    false
}

/// Whether evaluating `expr` could do something observable.
fn has_side_effects(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::MethodCall { .. } | ExprKind::Read | ExprKind::ReadFloat => true,
        ExprKind::Binary { left, right, .. } => {
            has_side_effects(left) || has_side_effects(right)
        }
        ExprKind::Index { array, index } => has_side_effects(array) || has_side_effects(index),
        ExprKind::Unary { operand, .. } => has_side_effects(operand),
        ExprKind::Cast { operand } => has_side_effects(operand),
        ExprKind::NewArray { length } => has_side_effects(length),
        _ => false,
    }
}

fn stmt_uses_var(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Assign { target, value } => {
            // A bare redefinition of the variable is not a use, but any
            // occurrence inside an index or field target is.
            let target_uses = match &target.kind {
                ExprKind::Var { .. } => false,
                _ => expr_uses_var(target, name),
            };
            target_uses || expr_uses_var(value, name)
        }
        Stmt::IfElse {
            condition,
            then_branch,
            else_branch,
        } => {
            expr_uses_var(condition, name)
                || then_branch.iter().any(|s| stmt_uses_var(s, name))
                || else_branch.iter().any(|s| stmt_uses_var(s, name))
        }
        Stmt::While { condition, body } => {
            expr_uses_var(condition, name) || body.iter().any(|s| stmt_uses_var(s, name))
        }
        Stmt::Write { value } | Stmt::WriteFloat { value } => expr_uses_var(value, name),
        Stmt::Return { value } => value
            .as_ref()
            .is_some_and(|value| expr_uses_var(value, name)),
        Stmt::Call { receiver, args, .. } => {
            expr_uses_var(receiver, name) || args.iter().any(|arg| expr_uses_var(arg, name))
        }
        Stmt::Writeln | Stmt::Nop => false,
    }
}

fn expr_uses_var(expr: &Expr, name: &str) -> bool {
    match &expr.kind {
        ExprKind::Var { name: n } => n == name,
        ExprKind::Field { receiver, .. } => expr_uses_var(receiver, name),
        ExprKind::Index { array, index } => {
            expr_uses_var(array, name) || expr_uses_var(index, name)
        }
        ExprKind::Unary { operand, .. } => expr_uses_var(operand, name),
        ExprKind::Binary { left, right, .. } => {
            expr_uses_var(left, name) || expr_uses_var(right, name)
        }
        ExprKind::Cast { operand } => expr_uses_var(operand, name),
        ExprKind::NewArray { length } => expr_uses_var(length, name),
        ExprKind::MethodCall { receiver, args, .. } => {
            expr_uses_var(receiver, name) || args.iter().any(|arg| expr_uses_var(arg, name))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_ir::{ClassDecl, MethodDecl, Ty, VarDecl};

    fn program_with(body: Vec<Stmt>) -> Program {
        Program::new(vec![ClassDecl {
            name: "Main".to_string(),
            superclass: "Object".to_string(),
            fields: Vec::new(),
            methods: vec![MethodDecl {
                name: "main".to_string(),
                params: vec![VarDecl::new("flag", Ty::Boolean)],
                return_ty: Ty::Void,
                locals: vec![
                    VarDecl::new("x", Ty::Int),
                    VarDecl::new("a", Ty::Array(Box::new(Ty::Int))),
                ],
                body,
            }],
        }])
    }

    fn body_of(program: &Program) -> &[Stmt] {
        &program.classes[0].methods[0].body
    }

    fn assign(name: &str, value: Expr) -> Stmt {
        Stmt::Assign {
            target: Expr::var(name, Ty::Int),
            value,
        }
    }

    #[test]
    fn test_overwritten_assignment_is_removed() {
        let mut program = program_with(vec![
            assign("x", Expr::int(1)),
            assign("x", Expr::int(2)),
            Stmt::Write {
                value: Expr::var("x", Ty::Int),
            },
        ]);
        eliminate_dead_assignments(&mut program);
        let body = body_of(&program);
        assert_eq!(body.len(), 2);
        assert_eq!(body[0], assign("x", Expr::int(2)));
    }

    #[test]
    fn test_used_assignment_stays() {
        let original = vec![
            assign("x", Expr::int(1)),
            Stmt::Write {
                value: Expr::var("x", Ty::Int),
            },
            assign("x", Expr::int(2)),
        ];
        let mut program = program_with(original.clone());
        eliminate_dead_assignments(&mut program);
        assert_eq!(body_of(&program), original.as_slice());
    }

    #[test]
    fn test_side_effecting_value_stays() {
        let original = vec![assign("x", Expr::read()), assign("x", Expr::int(2))];
        let mut program = program_with(original.clone());
        eliminate_dead_assignments(&mut program);
        assert_eq!(body_of(&program), original.as_slice());
    }

    #[test]
    fn test_index_target_counts_as_a_use() {
        let array_ty = Ty::Array(Box::new(Ty::Int));
        let original = vec![
            assign("x", Expr::int(3)),
            Stmt::Assign {
                target: Expr::index(
                    Expr::var("a", array_ty),
                    Expr::var("x", Ty::Int),
                    Ty::Int,
                ),
                value: Expr::int(5),
            },
            assign("x", Expr::int(4)),
        ];
        let mut program = program_with(original.clone());
        eliminate_dead_assignments(&mut program);
        assert_eq!(body_of(&program), original.as_slice());
    }

    #[test]
    fn test_conditional_overwrite_does_not_block_removal() {
        // The if neither uses x nor definitely overwrites it; the later
        // plain assignment does, so the first one is dead either way.
        let mut program = program_with(vec![
            assign("x", Expr::int(3)),
            Stmt::IfElse {
                condition: Expr::var("flag", Ty::Boolean),
                then_branch: vec![Stmt::Write {
                    value: Expr::int(1),
                }],
                else_branch: Vec::new(),
            },
            assign("x", Expr::int(4)),
        ]);
        eliminate_dead_assignments(&mut program);
        let body = body_of(&program);
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], Stmt::IfElse { .. }));
    }

    #[test]
    fn test_use_inside_a_nested_block_blocks_removal() {
        let original = vec![
            assign("x", Expr::int(3)),
            Stmt::IfElse {
                condition: Expr::var("flag", Ty::Boolean),
                then_branch: vec![Stmt::Write {
                    value: Expr::var("x", Ty::Int),
                }],
                else_branch: Vec::new(),
            },
            assign("x", Expr::int(4)),
        ];
        let mut program = program_with(original.clone());
        eliminate_dead_assignments(&mut program);
        assert_eq!(body_of(&program), original.as_slice());
    }

    #[test]
    fn test_elimination_recurses_into_loop_bodies() {
        let mut program = program_with(vec![Stmt::While {
            condition: Expr::var("flag", Ty::Boolean),
            body: vec![assign("x", Expr::int(1)), assign("x", Expr::int(2))],
        }]);
        eliminate_dead_assignments(&mut program);
        match &body_of(&program)[0] {
            Stmt::While { body, .. } => {
                assert_eq!(body.len(), 1);
                assert_eq!(body[0], assign("x", Expr::int(2)));
            }
            other => panic!("unexpected statement {}", other),
        }
    }
}
