//! Address generation
//!
//! Produces the address of a storage location in a register, for the left
//! side of assignments and as the common path for value loads. Only
//! variables, fields, and array elements are addressable. The runtime safety
//! checks guarding each access (null receiver, index bounds) are inserted
//! here, so value reads and writes share them.

use crate::asm::{Operand, Reg};
use crate::error::CodegenError;
use crate::runtime::{INDEX_OUT_OF_BOUNDS_EXCEPTION, NULL_POINTER_EXCEPTION};
use crate::CodeGenerator;
use opal_ir::{Expr, ExprKind};
use std::fmt;

impl<W: fmt::Write> CodeGenerator<'_, W> {
    pub(crate) fn addr_of(&mut self, expr: &Expr) -> Result<Reg, CodegenError> {
        match &expr.kind {
            ExprKind::Var { name } => self.addr_of_var(name),
            ExprKind::Field {
                receiver,
                name,
                class,
            } => self.addr_of_field(receiver, name, class),
            ExprKind::Index { array, index } => self.addr_of_index(array, index),
            _ => Err(CodegenError::NotAnLvalue(expr.to_string())),
        }
    }

    /// Address of a bare identifier.
    ///
    /// A name that is not a local or parameter of the enclosing method is a
    /// field of the enclosing class accessed without an explicit `this`; the
    /// access goes through the implicit receiver. A name that is neither is
    /// rejected here rather than surfacing later as a failed offset lookup.
    fn addr_of_var(&mut self, name: &str) -> Result<Reg, CodegenError> {
        if let Some(offset) = self.current_local_offset(name) {
            let reg = self.reserve_reg()?;
            self.emit_op2("leal", Operand::mem(offset, Reg::Ebp), reg)?;
            return Ok(reg);
        }
        let class = self.current_class.clone();
        if self.layout(&class)?.has_field(name) {
            let receiver = self.gen_this()?;
            return self.field_addr_from_receiver(receiver, name, &class);
        }
        Err(CodegenError::UnresolvedIdentifier {
            name: name.to_string(),
            class,
            method: self.current_method.clone(),
        })
    }

    /// Address of `receiver.name`, with the offset looked up in the field's
    /// static declaring class. When the receiver is the implicit `this`, the
    /// syntactically enclosing class wins.
    pub(crate) fn addr_of_field(
        &mut self,
        receiver: &Expr,
        name: &str,
        declaring_class: &str,
    ) -> Result<Reg, CodegenError> {
        let class = if matches!(receiver.kind, ExprKind::This) {
            self.current_class.clone()
        } else {
            declaring_class.to_string()
        };
        let reg = self.gen_expr(receiver)?;
        self.field_addr_from_receiver(reg, name, &class)
    }

    fn field_addr_from_receiver(
        &mut self,
        receiver: Reg,
        field: &str,
        class: &str,
    ) -> Result<Reg, CodegenError> {
        self.emit_op2("cmpl", 0, receiver)?;
        self.emit_jump("je", NULL_POINTER_EXCEPTION)?;
        let offset = self.field_offset_of(class, field)?;
        self.emit_op2("addl", offset, receiver)?;
        Ok(receiver)
    }

    /// Address of `array[index]`: null check on the reference, then both
    /// bounds checks against the capacity word, then scale and skip the
    /// two-word header.
    fn addr_of_index(&mut self, array: &Expr, index: &Expr) -> Result<Reg, CodegenError> {
        let word = self.word();
        let array_reg = self.gen_expr(array)?;
        self.emit_op2("cmpl", 0, array_reg)?;
        self.emit_jump("je", NULL_POINTER_EXCEPTION)?;

        let index_reg = self.gen_expr(index)?;
        self.emit_op2("cmpl", 0, index_reg)?;
        self.emit_jump("jl", INDEX_OUT_OF_BOUNDS_EXCEPTION)?;
        self.emit_op2("cmpl", Operand::mem(word, array_reg), index_reg)?;
        self.emit_jump("jge", INDEX_OUT_OF_BOUNDS_EXCEPTION)?;

        self.emit_op2("imull", word, index_reg)?;
        self.emit_op2("addl", 2 * word, array_reg)?;
        self.emit_op2("addl", index_reg, array_reg)?;
        self.release_reg(index_reg)?;
        Ok(array_reg)
    }
}
