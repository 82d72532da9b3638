//! Statement and declaration code generation
//!
//! Drives control flow and register lifetimes for statements: every register
//! an expression hands back is released here before the next statement
//! starts, so statement boundaries always see a full pool.

use crate::asm::{Operand, Reg};
use crate::error::CodegenError;
use crate::CodeGenerator;
use log::debug;
use opal_ir::{ClassDecl, MethodDecl, Stmt};
use std::fmt;

impl<W: fmt::Write> CodeGenerator<'_, W> {
    pub(crate) fn gen_class(&mut self, class: &ClassDecl) -> Result<(), CodegenError> {
        debug!("generating code for class {}", class.name);
        self.emit_indent(Some(&format!("Emitting class {}", class.name)))?;
        for method in &class.methods {
            self.gen_method(class, method)?;
        }
        self.emit_undent();
        Ok(())
    }

    /// One labeled routine per method, named `<Class>_<method>`.
    ///
    /// Frame contract: the receiver lives at `8(%ebp)`, each declared
    /// parameter one word higher; locals sit below the frame pointer at
    /// `-4(%ebp)`, `-8(%ebp)`, … in declaration order, allocated with a
    /// single stack adjustment.
    fn gen_method(&mut self, class: &ClassDecl, method: &MethodDecl) -> Result<(), CodegenError> {
        let word = self.word();
        self.current_method = method.name.clone();
        self.emit_label(&format!("{}_{}", class.name, method.name))?;
        self.emit_indent(None)?;
        self.emit_prologue()?;

        let mut offset = 2 * word; // past the saved %ebp and the return address
        self.add_current_local("this", offset);
        offset += word;
        for param in &method.params {
            self.add_current_local(&param.name, offset);
            offset += word;
        }

        if !method.locals.is_empty() {
            self.emit_stack_alloc(word * method.locals.len() as i32)?;
        }
        let mut offset = -word;
        for local in &method.locals {
            self.add_current_local(&local.name, offset);
            offset -= word;
        }

        self.gen_seq(&method.body)?;

        // No explicit return at the end of the body: return void.
        if !matches!(method.body.last(), Some(Stmt::Return { .. })) {
            self.emit_epilogue(true)?;
        }
        self.emit_undent();
        Ok(())
    }

    pub(crate) fn gen_seq(&mut self, stmts: &[Stmt]) -> Result<(), CodegenError> {
        for stmt in stmts {
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        self.emit_indent(Some(&format!("Emitting {}", stmt)))?;
        let result = self.gen_stmt_inner(stmt);
        self.emit_undent();
        result
    }

    fn gen_stmt_inner(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let value_reg = self.gen_expr(value)?;
                let address_reg = self.addr_of(target)?;
                self.emit_store(value_reg, 0, address_reg)?;
                self.release_reg(value_reg)?;
                self.release_reg(address_reg)
            }
            Stmt::IfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                let else_label = self.unique_label();
                let end_label = self.unique_label();

                let condition_reg = self.gen_expr(condition)?;
                self.emit_op2("cmpl", 0, condition_reg)?;
                self.release_reg(condition_reg)?;
                self.emit_jump("je", &else_label)?;
                self.gen_seq(then_branch)?;
                self.emit_jump("jmp", &end_label)?;
                self.emit_label(&else_label)?;
                self.gen_seq(else_branch)?;
                self.emit_label(&end_label)
            }
            Stmt::While { condition, body } => {
                let start_label = self.unique_label();
                let end_label = self.unique_label();

                self.emit_label(&start_label)?;
                let condition_reg = self.gen_expr(condition)?;
                self.emit_op2("cmpl", 0, condition_reg)?;
                self.release_reg(condition_reg)?;
                self.emit_jump("je", &end_label)?;
                self.gen_seq(body)?;
                self.emit_jump("jmp", &start_label)?;
                self.emit_label(&end_label)
            }
            Stmt::Write { value } => {
                let printf = self.config.printf.clone();
                let word = self.word();
                self.emit_comment("Write: push 2 arguments to printf: integer and format str")?;
                let value_reg = self.gen_expr(value)?;
                self.emit_op1("pushl", value_reg)?;
                self.release_reg(value_reg)?;
                self.emit_op1("pushl", Operand::label("int_format_string"))?;
                self.emit_call(&printf)?;
                self.emit_comment("Write: restore stack")?;
                self.emit_stack_free(2 * word)
            }
            Stmt::WriteFloat { value } => {
                let printf = self.config.printf.clone();
                let word = self.word();
                self.emit_comment("WriteF: load single precision float into FPU")?;
                let value_reg = self.gen_expr(value)?;
                self.emit_op1("pushl", value_reg)?;
                self.emit_op1("flds", Operand::mem(0, Reg::Esp))?;
                self.release_reg(value_reg)?;

                // The variadic printf expects a double, so the value goes
                // back to the stack at twice the width.
                self.emit_comment("WriteF: move double precision float to stack")?;
                self.emit_stack_alloc(2 * word)?;
                self.emit_op1("fstpl", Operand::mem(0, Reg::Esp))?;

                self.emit_op1("pushl", Operand::label("float_format_string"))?;
                self.emit_call(&printf)?;
                self.emit_comment("WriteF: restore stack")?;
                self.emit_stack_free(4 * word)
            }
            Stmt::Writeln => {
                let putchar = self.config.putchar.clone();
                let word = self.word();
                // ASCII 10 is line feed.
                self.emit_op1("pushl", Operand::Imm(10))?;
                self.emit_call(&putchar)?;
                self.emit_stack_free(word)
            }
            Stmt::Return { value: Some(value) } => {
                let value_reg = self.gen_expr(value)?;
                self.emit_move(value_reg, Reg::Eax)?;
                self.release_reg(value_reg)?;
                self.emit_epilogue(false)
            }
            Stmt::Return { value: None } => {
                self.emit_comment("Returning from void...")?;
                self.emit_epilogue(true)
            }
            Stmt::Call {
                receiver,
                method,
                args,
            } => {
                // Same as a call expression, with the result discarded.
                let result_reg = self.gen_method_call(receiver, method, args)?;
                self.release_reg(result_reg)
            }
            Stmt::Nop => Ok(()),
        }
    }
}
