//! Expression code generation
//!
//! Evaluates any expression into a register holding its value and returns
//! that register; ownership passes to the caller, who must release it.
//!
//! Binary operators evaluate strictly left to right. Both operand values are
//! pushed to the stack before the combining instruction so the right-hand
//! side evaluates with as many free registers as the left did — the pool has
//! no automatic spill, and this two-phase protocol is what keeps deep
//! expressions inside the six-register budget. Float values travel as raw
//! 32-bit patterns in integer registers and only touch the x87 stack for the
//! actual arithmetic.

use crate::asm::{Operand, Reg};
use crate::error::CodegenError;
use crate::runtime::{
    CAST_VALIDATE, DIVISION_BY_ZERO_EXCEPTION, ILLEGAL_ARRAY_SIZE_EXCEPTION,
    NULL_POINTER_EXCEPTION,
};
use crate::CodeGenerator;
use opal_ir::{BinaryOp, Expr, ExprKind, Ty, UnaryOp, OBJECT_CLASS};
use std::fmt;

impl<W: fmt::Write> CodeGenerator<'_, W> {
    pub(crate) fn gen_expr(&mut self, expr: &Expr) -> Result<Reg, CodegenError> {
        self.emit_indent(Some(&format!("Emitting {}", expr)))?;
        let result = self.gen_expr_inner(expr);
        self.emit_undent();
        result
    }

    fn gen_expr_inner(&mut self, expr: &Expr) -> Result<Reg, CodegenError> {
        match &expr.kind {
            ExprKind::IntConst(value) => {
                let reg = self.reserve_reg()?;
                self.emit_comment(&format!("Int constant {}", value))?;
                self.emit_move(*value, reg)?;
                Ok(reg)
            }
            ExprKind::FloatConst(value) => {
                let reg = self.reserve_reg()?;
                // Floats are stored as their raw bit pattern; no runtime
                // conversion ever happens.
                let bits = value.to_bits() as i32;
                self.emit_comment(&format!("Float constant {}", value))?;
                self.emit_move(bits, reg)?;
                Ok(reg)
            }
            ExprKind::BooleanConst(value) => {
                let reg = self.reserve_reg()?;
                // Booleans are 1 (true) or 0 (false).
                self.emit_move(i32::from(*value), reg)?;
                Ok(reg)
            }
            ExprKind::NullConst => {
                let reg = self.reserve_reg()?;
                // A null reference is address 0.
                self.emit_move(0, reg)?;
                Ok(reg)
            }
            ExprKind::This => self.gen_this(),
            ExprKind::Var { .. } | ExprKind::Field { .. } | ExprKind::Index { .. } => {
                // A value read is the address computation plus one load; the
                // safety checks live on the address path.
                let reg = self.addr_of(expr)?;
                self.emit_load(0, reg, reg)?;
                Ok(reg)
            }
            ExprKind::Unary { op, operand } => self.gen_unary(*op, operand),
            ExprKind::Binary { op, left, right } => self.gen_binary(*op, left, right),
            ExprKind::NewObject { class } => self.gen_new_object(class),
            ExprKind::NewArray { length } => self.gen_new_array(&expr.ty, length),
            ExprKind::Cast { operand } => self.gen_cast(&expr.ty, operand),
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => self.gen_method_call(receiver, method, args),
            ExprKind::Read => self.gen_builtin_read("int_format_string"),
            ExprKind::ReadFloat => self.gen_builtin_read("float_format_string"),
        }
    }

    /// The receiver reference, always the first slot of the frame's
    /// parameter area.
    pub(crate) fn gen_this(&mut self) -> Result<Reg, CodegenError> {
        let offset = self.this_offset()?;
        let reg = self.reserve_reg()?;
        self.emit_load(offset, Reg::Ebp, reg)?;
        Ok(reg)
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Reg, CodegenError> {
        let reg = self.gen_expr(operand)?;
        match op {
            UnaryOp::Plus => {}
            UnaryOp::Minus => self.emit_op1("negl", reg)?,
            UnaryOp::Not => {
                // 0 -> 1, 1 -> 0
                self.emit_op1("negl", reg)?;
                self.emit_op1("incl", reg)?;
            }
        }
        Ok(reg)
    }

    fn gen_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Reg, CodegenError> {
        let word = self.word();
        let left_reg = self.gen_expr(left)?;
        let is_float = left.ty == Ty::Float;
        let join_label = self.emit_short_circuit(op, left_reg)?;

        // Spill both operand values so the right side evaluates with the
        // same registers the left side had.
        self.emit_op1("pushl", left_reg)?;
        self.release_reg(left_reg)?;
        let right_reg = self.gen_expr(right)?;
        self.emit_op1("pushl", right_reg)?;
        self.release_reg(right_reg)?;
        let rhs = Operand::mem(0, Reg::Esp);
        let left_reg = self.reserve_specific_reg(left_reg)?;
        self.emit_load(word, Reg::Esp, left_reg)?;

        let use_fpu = is_float
            && matches!(
                op,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
            );
        if use_fpu {
            // One more copy of the left value keeps it addressable while
            // both operands are loaded onto the x87 stack.
            self.emit_op1("pushl", left_reg)?;
            self.emit_op1("flds", Operand::mem(word, Reg::Esp))?;
            self.emit_op1("flds", Operand::mem(0, Reg::Esp))?;
        }

        match op {
            BinaryOp::Add => {
                if use_fpu {
                    self.emit_op0("faddp")?;
                } else {
                    self.emit_op2("addl", rhs.clone(), left_reg)?;
                }
            }
            BinaryOp::Sub => {
                if use_fpu {
                    self.emit_op0("fsubp")?;
                } else {
                    self.emit_op2("subl", rhs.clone(), left_reg)?;
                }
            }
            BinaryOp::Mul => {
                if use_fpu {
                    self.emit_op0("fmulp")?;
                } else {
                    self.emit_op2("imull", rhs.clone(), left_reg)?;
                }
            }
            BinaryOp::Div => {
                if use_fpu {
                    self.emit_op0("fdivp")?;
                } else {
                    self.emit_divide(left_reg, false)?;
                }
            }
            BinaryOp::Mod => self.emit_divide(left_reg, true)?,
            BinaryOp::And => self.emit_op2("andl", rhs.clone(), left_reg)?,
            BinaryOp::Or => self.emit_op2("orl", rhs.clone(), left_reg)?,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => self.emit_compare(op, left_reg, rhs.clone())?,
        }

        if use_fpu {
            // Pull the result off the x87 stack before dropping the spills.
            self.emit_op1("fstps", Operand::mem(word, Reg::Esp))?;
            self.emit_load(word, Reg::Esp, left_reg)?;
            self.emit_stack_free(3 * word)?;
        } else {
            self.emit_stack_free(2 * word)?;
        }

        // The short-circuit path lands here, past the spill cleanup, with
        // the left value still in the result register.
        self.emit_label(&join_label)?;
        Ok(left_reg)
    }

    /// For `&&` and `||`, a decided left operand skips the right operand
    /// entirely. Returns the join label; it is emitted after the operator's
    /// cleanup so both paths converge on the same result register.
    fn emit_short_circuit(&mut self, op: BinaryOp, reg: Reg) -> Result<String, CodegenError> {
        let label = self.unique_label();
        match op {
            BinaryOp::And => {
                self.emit_op2("cmpl", 0, reg)?;
                self.emit_jump("je", &label)?;
            }
            BinaryOp::Or => {
                self.emit_op2("cmpl", 0, reg)?;
                self.emit_jump("jne", &label)?;
            }
            _ => {}
        }
        Ok(label)
    }

    /// Materializes a comparison as 0/1 in `left`.
    fn emit_compare(&mut self, op: BinaryOp, left: Reg, rhs: Operand) -> Result<(), CodegenError> {
        let cc = match op {
            BinaryOp::Eq => "e",
            BinaryOp::Ne => "ne",
            BinaryOp::Lt => "l",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "g",
            BinaryOp::Ge => "ge",
            other => {
                return Err(CodegenError::Internal(format!(
                    "operator {} is not a comparison",
                    other
                )))
            }
        };
        self.emit_op2("cmpl", rhs, left)?;
        if let Some(byte) = left.low_byte() {
            let set = format!("set{} {}", cc, byte);
            self.emit(&set)?;
            let extend = format!("movzbl {}, {}", byte, left);
            self.emit(&extend)?;
        } else {
            // %edi and %esi have no byte subregister; materialize over a
            // branch instead. movl leaves the compare's flags intact.
            let done = self.unique_label();
            self.emit_op2("movl", 1, left)?;
            let jump = format!("j{}", cc);
            self.emit_jump(&jump, &done)?;
            self.emit_op2("movl", 0, left)?;
            self.emit_label(&done)?;
        }
        Ok(())
    }

    /// Signed division against the divisor spilled at `0(%esp)`, leaving the
    /// quotient (or remainder) in `left`. `%eax` and `%edx` are saved around
    /// the `idivl` when some other generator is holding them.
    fn emit_divide(&mut self, left: Reg, want_remainder: bool) -> Result<(), CodegenError> {
        let word = self.word();
        self.emit_op2("cmpl", 0, Operand::mem(0, Reg::Esp))?;
        self.emit_jump("je", DIVISION_BY_ZERO_EXCEPTION)?;

        let mut divisor_offset = 0;
        let save_eax = left != Reg::Eax && self.pool.is_in_use(Reg::Eax);
        if save_eax {
            self.emit_op1("pushl", Reg::Eax)?;
            divisor_offset += word;
        }
        let save_edx = left != Reg::Edx && self.pool.is_in_use(Reg::Edx);
        if save_edx {
            self.emit_op1("pushl", Reg::Edx)?;
            divisor_offset += word;
        }

        self.emit_move(left, Reg::Eax)?;
        self.emit_op0("cltd")?;
        self.emit_op1("idivl", Operand::mem(divisor_offset, Reg::Esp))?;
        let result = if want_remainder { Reg::Edx } else { Reg::Eax };
        self.emit_move(result, left)?;

        if save_edx {
            self.emit_op1("popl", Reg::Edx)?;
        }
        if save_eax {
            self.emit_op1("popl", Reg::Eax)?;
        }
        Ok(())
    }

    /// Heap allocation; returns a fresh register holding the block address.
    fn alloc_heap(&mut self, byte_size: Operand) -> Result<Reg, CodegenError> {
        let malloc = self.config.malloc.clone();
        let word = self.word();
        let saved_eax = self.push_eax_if_used()?;
        self.emit_op1("pushl", byte_size)?;
        self.emit_call(&malloc)?;
        self.emit_stack_free(word)?;
        let reg = self.reserve_reg()?;
        self.emit_move(Reg::Eax, reg)?;
        if saved_eax {
            self.restore_eax()?;
        }
        Ok(reg)
    }

    /// Allocates an instance: one word for the dispatch-table pointer plus
    /// one per field, with the table pointer stored at word 0.
    pub(crate) fn gen_new_object(&mut self, class: &str) -> Result<Reg, CodegenError> {
        let word = self.word();
        let field_count = self.layout(class)?.field_count() as i32;
        self.emit_comment(&format!("Creating object of type {}", class))?;
        let object = self.alloc_heap(Operand::Imm(word + field_count * word))?;
        let vtable = format!("vtable_{}", class);
        self.emit_store(Operand::label(&vtable), 0, object)?;
        Ok(object)
    }

    fn gen_new_array(&mut self, array_ty: &Ty, length: &Expr) -> Result<Reg, CodegenError> {
        let word = self.word();
        let vtable_type = array_ty.vtable_type_name().ok_or_else(|| {
            CodegenError::Internal(format!("array allocation with non-array type {}", array_ty))
        })?;
        let length_reg = self.gen_expr(length)?;
        let byte_length = self.reserve_reg()?;
        self.emit_comment("Calculate byte length of array from element length")?;

        // Negative sizes trap; size 0 is allowed.
        self.emit_op2("cmpl", 0, length_reg)?;
        self.emit_jump("jl", ILLEGAL_ARRAY_SIZE_EXCEPTION)?;

        self.emit_move(length_reg, byte_length)?;
        self.emit_op2("imull", word, byte_length)?;
        // Two extra words: dispatch-table pointer and capacity.
        self.emit_op2("addl", 2 * word, byte_length)?;
        let array = self.alloc_heap(byte_length.into())?;

        let vtable = format!("vtable_{}", vtable_type);
        self.emit_store(Operand::label(&vtable), 0, array)?;
        self.emit_store(length_reg, word, array)?;

        self.release_reg(byte_length)?;
        self.release_reg(length_reg)?;
        Ok(array)
    }

    /// Casts whose success is statically provable (to `Object`, or to an
    /// ancestor of the operand's static class) compile to nothing; everything
    /// else defers to the runtime cast validator.
    fn gen_cast(&mut self, target: &Ty, operand: &Expr) -> Result<Reg, CodegenError> {
        let word = self.word();
        let target_name = target.vtable_type_name().ok_or_else(|| {
            CodegenError::Internal(format!("cast to non-reference type {}", target))
        })?;
        let reg = self.gen_expr(operand)?;

        if target_name == OBJECT_CLASS {
            return Ok(reg);
        }
        if let Ty::Class(class) = &operand.ty {
            let mut current = class.clone();
            while current != OBJECT_CLASS {
                if current == target_name {
                    return Ok(reg);
                }
                current = self.superclass_of(&current)?;
            }
        }

        // Push the operand's actual dispatch table and the target's, then
        // let the runtime walk the superclass chain.
        self.emit_op1("pushl", Operand::mem(0, reg))?;
        let target_vtable = format!("vtable_{}", target_name);
        self.emit_op1("pushl", Operand::label(&target_vtable))?;
        self.emit_call(CAST_VALIDATE)?;
        self.emit_stack_free(2 * word)?;
        Ok(reg)
    }

    /// Virtual dispatch: the call target is loaded from the receiver's
    /// dispatch table at the slot the method resolved to in the receiver's
    /// static class. All arguments including the receiver go on the stack,
    /// receiver nearest the return address.
    pub(crate) fn gen_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
    ) -> Result<Reg, CodegenError> {
        let word = self.word();
        let saved_eax = self.push_eax_if_used()?;
        let target = self.load_method_pointer(receiver, method)?;

        for arg in args.iter().rev() {
            let reg = self.gen_expr(arg)?;
            self.emit_op1("pushl", reg)?;
            self.release_reg(reg)?;
        }
        let receiver_reg = self.gen_expr(receiver)?;
        self.emit_op1("pushl", receiver_reg)?;
        self.release_reg(receiver_reg)?;

        let call = format!("call *{}", target);
        self.emit(&call)?;
        self.emit_stack_free(word * (args.len() as i32 + 1))?;
        self.emit_move(Reg::Eax, target)?;

        if saved_eax {
            self.restore_eax()?;
        }
        Ok(target)
    }

    fn load_method_pointer(&mut self, receiver: &Expr, method: &str) -> Result<Reg, CodegenError> {
        let class = match &receiver.ty {
            Ty::Class(name) => name.clone(),
            other => {
                return Err(CodegenError::Internal(format!(
                    "method call on receiver of non-class type {}",
                    other
                )))
            }
        };
        let reg = self.gen_expr(receiver)?;
        self.emit_op2("cmpl", 0, reg)?;
        self.emit_jump("je", NULL_POINTER_EXCEPTION)?;
        self.emit_load(0, reg, reg)?;
        let offset = self.method_offset_of(&class, method)?;
        self.emit_load(offset, reg, reg)?;
        Ok(reg)
    }

    /// Built-in input: `scanf` into a transient stack slot, then the slot's
    /// value into a fresh register.
    fn gen_builtin_read(&mut self, format_label: &str) -> Result<Reg, CodegenError> {
        let scanf = self.config.scanf.clone();
        let word = self.word();
        let saved_eax = self.push_eax_if_used()?;
        self.emit_stack_alloc(word)?;
        self.emit_op1("pushl", Reg::Esp)?;
        self.emit_op1("pushl", Operand::label(format_label))?;
        self.emit_call(&scanf)?;
        self.emit_stack_free(2 * word)?;
        let reg = self.reserve_reg()?;
        self.emit_load(0, Reg::Esp, reg)?;
        self.emit_stack_free(word)?;
        if saved_eax {
            self.restore_eax()?;
        }
        Ok(reg)
    }
}
