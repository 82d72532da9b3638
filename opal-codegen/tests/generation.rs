//! End-to-end checks on the emitted assembly text.
//!
//! These build small typed programs the way the front end would and assert
//! on the structure of the generated unit: section order, runtime checks,
//! label placement, and the error paths for broken inputs.

use opal_codegen::{generate_assembly, CodegenError};
use opal_common::{Platform, TargetConfig};
use opal_ir::{BinaryOp, ClassDecl, Expr, MethodDecl, Program, Stmt, Ty, UnaryOp, VarDecl};

fn config() -> TargetConfig {
    TargetConfig::for_platform(Platform::Linux)
}

fn method(name: &str, locals: Vec<VarDecl>, body: Vec<Stmt>) -> MethodDecl {
    MethodDecl {
        name: name.to_string(),
        params: Vec::new(),
        return_ty: Ty::Void,
        locals,
        body,
    }
}

fn main_program(locals: Vec<VarDecl>, body: Vec<Stmt>) -> Program {
    Program::new(vec![ClassDecl {
        name: "Main".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: vec![method("main", locals, body)],
    }])
}

fn compile(program: &Program) -> String {
    generate_assembly(program, &config()).unwrap()
}

fn assign(name: &str, ty: Ty, value: Expr) -> Stmt {
    Stmt::Assign {
        target: Expr::var(name, ty),
        value,
    }
}

/// Byte position of `needle`, for ordering assertions.
fn at(asm: &str, needle: &str) -> usize {
    asm.find(needle)
        .unwrap_or_else(|| panic!("expected {:?} in generated assembly", needle))
}

#[test]
fn test_empty_main_compiles_to_entry_point() {
    let asm = compile(&main_program(Vec::new(), Vec::new()));

    // Dispatch tables precede everything; Object anchors the unit.
    assert!(at(asm.as_str(), "vtable_Object:") < at(asm.as_str(), "vtable_Main:"));

    // The entry point allocates one word for the fieldless Main instance,
    // calls Main_main, and exits 0.
    assert!(asm.contains(".globl main"));
    let entry = at(&asm, "main:\n");
    assert!(entry < at(&asm, "pushl $4"));
    assert!(at(&asm, "pushl $4") < at(&asm, "call malloc"));
    assert!(at(&asm, "call malloc") < at(&asm, "call Main_main"));
    assert!(asm.contains("movl $0, %eax"));

    // The method itself exists and returns void implicitly.
    assert!(asm.contains("Main_main:"));
    assert!(asm.contains("leave"));
}

#[test]
fn test_generation_is_deterministic() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Int)],
        vec![
            assign("x", Ty::Int, Expr::int(3)),
            Stmt::Write {
                value: Expr::var("x", Ty::Int),
            },
        ],
    );
    assert_eq!(compile(&program), compile(&program));
}

#[test]
fn test_local_frame_allocation() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Int), VarDecl::new("y", Ty::Int)],
        vec![
            assign("x", Ty::Int, Expr::int(1)),
            assign("y", Ty::Int, Expr::var("x", Ty::Int)),
        ],
    );
    let asm = compile(&program);
    assert!(asm.contains("pushl %ebp"));
    assert!(asm.contains("movl %esp, %ebp"));
    // Two locals, one stack adjustment.
    assert!(asm.contains("subl $8, %esp"));
    // x at -4(%ebp), y at -8(%ebp).
    assert!(asm.contains("leal -4(%ebp),"));
    assert!(asm.contains("leal -8(%ebp),"));
}

#[test]
fn test_write_and_writeln() {
    let program = main_program(
        Vec::new(),
        vec![
            Stmt::Write {
                value: Expr::int(42),
            },
            Stmt::Writeln,
        ],
    );
    let asm = compile(&program);
    assert!(asm.contains("pushl $int_format_string"));
    assert!(asm.contains("call printf"));
    assert!(asm.contains("addl $8, %esp"));
    assert!(asm.contains("pushl $10"));
    assert!(asm.contains("call putchar"));
}

#[test]
fn test_division_checks_divisor_before_dividing() {
    let program = main_program(
        Vec::new(),
        vec![Stmt::Write {
            value: Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0)),
        }],
    );
    let asm = compile(&program);
    let check = at(&asm, "je DivisionByZeroException");
    let divide = at(&asm, "idivl");
    assert!(check < divide);
    assert!(asm.contains("cltd"));
}

#[test]
fn test_modulo_takes_remainder_register() {
    let program = main_program(
        Vec::new(),
        vec![Stmt::Write {
            value: Expr::binary(BinaryOp::Mod, Expr::int(7), Expr::int(3)),
        }],
    );
    let asm = compile(&program);
    assert!(asm.contains("je DivisionByZeroException"));
    assert!(asm.contains("idivl"));
    assert!(asm.contains("movl %edx,"));
}

#[test]
fn test_array_indexing_emits_all_three_checks() {
    let int_array = Ty::Array(Box::new(Ty::Int));
    let program = main_program(
        vec![
            VarDecl::new("a", int_array.clone()),
            VarDecl::new("x", Ty::Int),
        ],
        vec![
            assign("a", int_array.clone(), Expr::new_array(Ty::Int, Expr::int(3))),
            assign(
                "x",
                Ty::Int,
                Expr::index(Expr::var("a", int_array), Expr::int(-1), Ty::Int),
            ),
        ],
    );
    let asm = compile(&program);
    let null_check = at(&asm, "je NullPointerException");
    let lower = at(&asm, "jl IndexOutOfBoundsException");
    let upper = at(&asm, "jge IndexOutOfBoundsException");
    assert!(null_check < lower);
    assert!(lower < upper);
    // Capacity lives one word into the array.
    assert!(asm.contains("cmpl 4("));
    // Elements start past the two-word header.
    assert!(asm.contains("addl $8,"));
}

#[test]
fn test_array_allocation_checks_size_and_fills_header() {
    let int_array = Ty::Array(Box::new(Ty::Int));
    let program = main_program(
        vec![VarDecl::new("a", int_array.clone())],
        vec![assign(
            "a",
            int_array,
            Expr::new_array(Ty::Int, Expr::int(3)),
        )],
    );
    let asm = compile(&program);
    let body = &asm[at(&asm, "Main_main:")..];
    let size_check = at(body, "jl IllegalArraySizeException");
    let alloc = at(body, "call malloc");
    assert!(size_check < alloc);
    assert!(body.contains("$vtable_int_Array"));
}

#[test]
fn test_method_dispatch_goes_through_the_vtable() {
    let worker = ClassDecl {
        name: "Worker".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: vec![method("run", Vec::new(), Vec::new())],
    };
    let mut program = main_program(
        vec![VarDecl::new("w", Ty::Class("Worker".to_string()))],
        vec![
            assign(
                "w",
                Ty::Class("Worker".to_string()),
                Expr::new_object("Worker"),
            ),
            Stmt::Call {
                receiver: Expr::var("w", Ty::Class("Worker".to_string())),
                method: "run".to_string(),
                args: Vec::new(),
            },
        ],
    );
    program.classes.push(worker);
    let asm = compile(&program);

    assert!(asm.contains("je NullPointerException"));
    // Dispatch-table pointer, then the slot at offset 4, then the
    // indirect call.
    assert!(asm.contains("movl 0(%eax), %eax"));
    assert!(asm.contains("movl 4(%eax), %eax"));
    assert!(asm.contains("call *%eax"));
    assert!(asm.contains("Worker_run:"));
    assert!(asm.contains("\t.int Worker_run"));
}

#[test]
fn test_arguments_push_in_reverse_with_receiver_last() {
    let worker = ClassDecl {
        name: "Worker".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: vec![MethodDecl {
            name: "add".to_string(),
            params: vec![VarDecl::new("a", Ty::Int), VarDecl::new("b", Ty::Int)],
            return_ty: Ty::Int,
            locals: Vec::new(),
            body: vec![Stmt::Return {
                value: Some(Expr::var("a", Ty::Int)),
            }],
        }],
    };
    let ty = Ty::Class("Worker".to_string());
    let mut program = main_program(
        vec![VarDecl::new("w", ty.clone())],
        vec![
            assign("w", ty.clone(), Expr::new_object("Worker")),
            Stmt::Call {
                receiver: Expr::var("w", ty),
                method: "add".to_string(),
                args: vec![Expr::int(11), Expr::int(22)],
            },
        ],
    );
    program.classes.push(worker);
    let asm = compile(&program);

    // Last argument first, then the first, then the receiver push before
    // the indirect call.
    let second_arg = at(&asm, "Int constant 22");
    let first_arg = at(&asm, "Int constant 11");
    let call = at(&asm, "call *%");
    assert!(second_arg < first_arg);
    assert!(first_arg < call);
    // Three words popped: two arguments plus the receiver.
    assert!(asm.contains("addl $12, %esp"));
}

#[test]
fn test_upcasts_are_elided_and_downcasts_validated() {
    let class_a = ClassDecl {
        name: "A".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: Vec::new(),
    };
    let class_b = ClassDecl {
        name: "B".to_string(),
        superclass: "A".to_string(),
        fields: Vec::new(),
        methods: Vec::new(),
    };
    let class_d = ClassDecl {
        name: "D".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: Vec::new(),
    };
    let b_ty = Ty::Class("B".to_string());
    let mut program = main_program(
        vec![
            VarDecl::new("b", b_ty.clone()),
            VarDecl::new("x", Ty::Class("A".to_string())),
            VarDecl::new("o", Ty::object()),
            VarDecl::new("d", Ty::Class("D".to_string())),
        ],
        vec![
            assign("b", b_ty.clone(), Expr::new_object("B")),
            // Provable upcast: no runtime check.
            assign(
                "x",
                Ty::Class("A".to_string()),
                Expr::cast(Expr::var("b", b_ty.clone()), Ty::Class("A".to_string())),
            ),
            // Cast to Object: no runtime check.
            assign(
                "o",
                Ty::object(),
                Expr::cast(Expr::var("b", b_ty), Ty::object()),
            ),
            // Statically unprovable: the validator runs.
            assign(
                "d",
                Ty::Class("D".to_string()),
                Expr::cast(Expr::var("o", Ty::object()), Ty::Class("D".to_string())),
            ),
        ],
    );
    program.classes.extend([class_a, class_b, class_d]);
    let asm = compile(&program);

    assert_eq!(asm.matches("call CastValidate").count(), 1);
    assert!(asm.contains("pushl $vtable_D"));
}

#[test]
fn test_cast_validator_walks_to_the_object_anchor() {
    let asm = compile(&main_program(Vec::new(), Vec::new()));
    let routine = at(&asm, "CastValidate:");
    let anchor = at(&asm, "movl $vtable_Object,");
    let failure = at(&asm, "je CastException");
    assert!(routine < anchor);
    assert!(anchor < failure);
    // Arguments come off the frame at 8 and 12.
    assert!(asm.contains("movl 8(%ebp),"));
    assert!(asm.contains("movl 12(%ebp),"));
}

#[test]
fn test_exception_handlers_print_and_exit_with_stable_codes() {
    let asm = compile(&main_program(Vec::new(), Vec::new()));
    let cases = [
        ("CastException:", "cast_exception_string", "pushl $1"),
        (
            "DivisionByZeroException:",
            "divide_by_zero_exception_string",
            "pushl $8",
        ),
        (
            "IllegalArraySizeException:",
            "illegal_array_size_exception_string",
            "pushl $5",
        ),
        (
            "IndexOutOfBoundsException:",
            "index_out_of_bounds_exception_string",
            "pushl $3",
        ),
        (
            "NullPointerException:",
            "null_pointer_exception_string",
            "pushl $4",
        ),
    ];
    for (label, message, exit_code) in cases {
        let handler = asm.split(label).nth(1).unwrap_or_else(|| {
            panic!("handler {} missing", label);
        });
        // Only look at this handler's own few lines.
        let handler: String = handler.lines().take(5).collect::<Vec<_>>().join("\n");
        assert!(handler.contains(message), "{} should print {}", label, message);
        assert!(handler.contains("call printf"));
        assert!(
            handler.contains(exit_code),
            "{} should exit via {}",
            label,
            exit_code
        );
        assert!(handler.contains("call exit"));
    }
    // The message text itself is in the literals section.
    assert!(asm.contains("EXCEPTION: Division by zero."));
    assert!(asm.contains("EXCEPTION: Invalid cast."));
}

#[test]
fn test_short_circuit_and_skips_the_right_operand() {
    let flag = MethodDecl {
        name: "flag".to_string(),
        params: Vec::new(),
        return_ty: Ty::Boolean,
        locals: Vec::new(),
        body: vec![Stmt::Return {
            value: Some(Expr::boolean(true)),
        }],
    };
    let program = Program::new(vec![ClassDecl {
        name: "Main".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: vec![
            flag,
            method(
                "main",
                vec![VarDecl::new("x", Ty::Boolean)],
                vec![assign(
                    "x",
                    Ty::Boolean,
                    Expr::binary(
                        BinaryOp::And,
                        Expr::boolean(false),
                        Expr::call(Expr::this("Main"), "flag", Vec::new(), Ty::Boolean),
                    ),
                )],
            ),
        ],
    }]);
    let asm = compile(&program);

    // Find the skip branch inside Main_main and the label it names.
    let body = &asm[at(&asm, "Main_main:")..];
    let je = body.find("je label").unwrap();
    let label_name: String = body[je + "je ".len()..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    let right_operand = body.find("call *%").unwrap();
    let cleanup = body.find("addl $8, %esp").unwrap();
    let join = body.find(&format!("{}:", label_name)).unwrap();

    // Branch before the skipped code, join after the spill cleanup.
    assert!(je < right_operand);
    assert!(right_operand < cleanup);
    assert!(cleanup < join);
}

#[test]
fn test_short_circuit_or_branches_on_true() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Boolean)],
        vec![assign(
            "x",
            Ty::Boolean,
            Expr::binary(BinaryOp::Or, Expr::boolean(true), Expr::boolean(false)),
        )],
    );
    let asm = compile(&program);
    let body = &asm[at(&asm, "Main_main:")..];
    assert!(body.contains("jne label"));
}

#[test]
fn test_comparison_materializes_a_boolean() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Boolean)],
        vec![assign(
            "x",
            Ty::Boolean,
            Expr::binary(BinaryOp::Lt, Expr::int(1), Expr::int(2)),
        )],
    );
    let asm = compile(&program);
    assert!(asm.contains("setl %al"));
    assert!(asm.contains("movzbl %al, %eax"));
}

#[test]
fn test_float_arithmetic_uses_the_x87_stack() {
    let program = main_program(
        vec![VarDecl::new("f", Ty::Float)],
        vec![assign(
            "f",
            Ty::Float,
            Expr::binary(BinaryOp::Add, Expr::float(1.0), Expr::float(2.0)),
        )],
    );
    let asm = compile(&program);
    // 1.0f as raw bits.
    assert!(asm.contains("movl $1065353216,"));
    assert!(asm.contains("flds 4(%esp)"));
    assert!(asm.contains("flds 0(%esp)"));
    assert!(asm.contains("faddp"));
    assert!(asm.contains("fstps 4(%esp)"));
    // Three spilled words dropped together.
    assert!(asm.contains("addl $12, %esp"));
}

#[test]
fn test_write_float_promotes_to_double() {
    let program = main_program(
        Vec::new(),
        vec![Stmt::WriteFloat {
            value: Expr::float(1.5),
        }],
    );
    let asm = compile(&program);
    assert!(asm.contains("movl $1069547520,"));
    assert!(asm.contains("flds 0(%esp)"));
    assert!(asm.contains("fstpl 0(%esp)"));
    assert!(asm.contains("pushl $float_format_string"));
    assert!(asm.contains("addl $16, %esp"));
}

#[test]
fn test_builtin_read_calls_scanf() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Int)],
        vec![assign("x", Ty::Int, Expr::read())],
    );
    let asm = compile(&program);
    assert!(asm.contains("pushl %esp"));
    assert!(asm.contains("pushl $int_format_string"));
    assert!(asm.contains("call scanf"));
}

#[test]
fn test_unary_operators() {
    let program = main_program(
        vec![
            VarDecl::new("x", Ty::Int),
            VarDecl::new("b", Ty::Boolean),
        ],
        vec![
            assign("x", Ty::Int, Expr::unary(UnaryOp::Minus, Expr::int(5))),
            assign(
                "b",
                Ty::Boolean,
                Expr::unary(UnaryOp::Not, Expr::boolean(false)),
            ),
        ],
    );
    let asm = compile(&program);
    assert!(asm.contains("negl"));
    assert!(asm.contains("incl"));
}

#[test]
fn test_if_else_and_while_label_structure() {
    let program = main_program(
        vec![VarDecl::new("x", Ty::Int)],
        vec![
            Stmt::IfElse {
                condition: Expr::boolean(true),
                then_branch: vec![assign("x", Ty::Int, Expr::int(1))],
                else_branch: vec![assign("x", Ty::Int, Expr::int(2))],
            },
            Stmt::While {
                condition: Expr::boolean(false),
                body: vec![assign("x", Ty::Int, Expr::int(3))],
            },
        ],
    );
    let asm = compile(&program);
    let body = &asm[at(&asm, "Main_main:")..];

    // if: branch to else, then-branch jumps over it.
    let if_branch = body.find("je label").unwrap();
    let then_jump = body.find("jmp label").unwrap();
    assert!(if_branch < then_jump);

    // while: backward jump to the loop head.
    let back_jump = body.rfind("jmp label").unwrap();
    let back_target: String = body[back_jump + "jmp ".len()..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    let head = body.find(&format!("{}:", back_target)).unwrap();
    assert!(head < back_jump);
}

#[test]
fn test_implicit_field_access_goes_through_this() {
    let program = Program::new(vec![ClassDecl {
        name: "Main".to_string(),
        superclass: "Object".to_string(),
        fields: vec![VarDecl::new("count", Ty::Int)],
        methods: vec![method(
            "main",
            Vec::new(),
            vec![assign("count", Ty::Int, Expr::int(9))],
        )],
    }]);
    let asm = compile(&program);
    // Receiver loaded from the frame's first parameter slot, null-checked,
    // field offset applied.
    assert!(asm.contains("movl 8(%ebp),"));
    assert!(asm.contains("je NullPointerException"));
    assert!(asm.contains("addl $4,"));
}

#[test]
fn test_shadowed_field_writes_share_one_slot() {
    let class_a = ClassDecl {
        name: "A".to_string(),
        superclass: "Object".to_string(),
        fields: vec![VarDecl::new("x", Ty::Int)],
        methods: Vec::new(),
    };
    let class_b = ClassDecl {
        name: "B".to_string(),
        superclass: "A".to_string(),
        fields: vec![VarDecl::new("x", Ty::Int)],
        methods: Vec::new(),
    };
    let a_ty = Ty::Class("A".to_string());
    let b_ty = Ty::Class("B".to_string());
    let mut program = main_program(
        vec![VarDecl::new("a", a_ty.clone()), VarDecl::new("b", b_ty.clone())],
        vec![
            assign("b", b_ty.clone(), Expr::new_object("B")),
            Stmt::Assign {
                target: Expr::field(Expr::var("a", a_ty), "x", "A", Ty::Int),
                value: Expr::int(1),
            },
            Stmt::Assign {
                target: Expr::field(Expr::var("b", b_ty), "x", "B", Ty::Int),
                value: Expr::int(2),
            },
        ],
    );
    program.classes.extend([class_a, class_b]);
    let asm = compile(&program);

    // Both writes resolve to the same instance offset.
    let through_a = &asm[at(&asm, "Emitting a.x = 1")..at(&asm, "Emitting b.x = 2")];
    let through_b = &asm[at(&asm, "Emitting b.x = 2")..];
    assert!(through_a.contains("addl $4,"));
    assert!(through_b.contains("addl $4,"));
}

#[test]
fn test_register_exhaustion_is_a_compile_error() {
    // Six nested index expressions hold six array references at once; the
    // seventh reservation (the innermost constant) must fail.
    let int_array = Ty::Array(Box::new(Ty::Int));
    let mut index_expr = Expr::int(0);
    for _ in 0..6 {
        index_expr = Expr::index(
            Expr::var("a", int_array.clone()),
            index_expr,
            Ty::Int,
        );
    }
    let program = main_program(
        vec![
            VarDecl::new("a", int_array.clone()),
            VarDecl::new("x", Ty::Int),
        ],
        vec![
            assign("a", int_array, Expr::new_array(Ty::Int, Expr::int(3))),
            assign("x", Ty::Int, index_expr),
        ],
    );
    let err = generate_assembly(&program, &config()).unwrap_err();
    assert_eq!(err, CodegenError::OutOfRegisters);
}

#[test]
fn test_unresolved_identifier_is_reported_at_its_use() {
    let program = main_program(
        Vec::new(),
        vec![Stmt::Write {
            value: Expr::var("ghost", Ty::Int),
        }],
    );
    let err = generate_assembly(&program, &config()).unwrap_err();
    assert_eq!(
        err,
        CodegenError::UnresolvedIdentifier {
            name: "ghost".to_string(),
            class: "Main".to_string(),
            method: "main".to_string(),
        }
    );
}

#[test]
fn test_missing_main_class_is_a_loud_error() {
    let program = Program::new(vec![ClassDecl {
        name: "NotMain".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: Vec::new(),
    }]);
    let err = generate_assembly(&program, &config()).unwrap_err();
    assert_eq!(err, CodegenError::UnknownClass("Main".to_string()));
}

#[test]
fn test_explicit_return_moves_value_into_eax() {
    let worker = ClassDecl {
        name: "Worker".to_string(),
        superclass: "Object".to_string(),
        fields: Vec::new(),
        methods: vec![MethodDecl {
            name: "seven".to_string(),
            params: Vec::new(),
            return_ty: Ty::Int,
            locals: Vec::new(),
            body: vec![Stmt::Return {
                value: Some(Expr::int(7)),
            }],
        }],
    };
    let mut program = main_program(Vec::new(), Vec::new());
    program.classes.push(worker);
    let asm = compile(&program);
    let routine = &asm[at(&asm, "Worker_seven:")..];
    assert!(routine.contains("Int constant 7"));
    assert!(routine.contains("leave"));
    assert!(routine.contains("ret"));
}
