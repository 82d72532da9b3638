//! Low-level emission helpers
//!
//! Pure formatting: instruction lines with indentation, labels, comments,
//! data directives, unique label generation, and the handful of fixed
//! prologue/epilogue/stack sequences. No decisions are made here.

use crate::asm::{Operand, Reg};
use crate::error::CodegenError;
use crate::CodeGenerator;
use std::fmt;

impl<W: fmt::Write> CodeGenerator<'_, W> {
    /// Writes one line at the current indentation.
    pub(crate) fn emit(&mut self, text: &str) -> Result<(), CodegenError> {
        self.out.write_str(&self.indent)?;
        self.out.write_str(text)?;
        self.out.write_char('\n')?;
        Ok(())
    }

    pub(crate) fn emit_op0(&mut self, op: &str) -> Result<(), CodegenError> {
        self.emit(op)
    }

    pub(crate) fn emit_op1(
        &mut self,
        op: &str,
        operand: impl Into<Operand>,
    ) -> Result<(), CodegenError> {
        let line = format!("{} {}", op, operand.into());
        self.emit(&line)
    }

    pub(crate) fn emit_op2(
        &mut self,
        op: &str,
        src: impl Into<Operand>,
        dst: impl Into<Operand>,
    ) -> Result<(), CodegenError> {
        let line = format!("{} {}, {}", op, src.into(), dst.into());
        self.emit(&line)
    }

    pub(crate) fn emit_jump(&mut self, op: &str, label: &str) -> Result<(), CodegenError> {
        let line = format!("{} {}", op, label);
        self.emit(&line)
    }

    pub(crate) fn emit_call(&mut self, target: &str) -> Result<(), CodegenError> {
        let line = format!("call {}", target);
        self.emit(&line)
    }

    /// Move that elides `src == dst`.
    pub(crate) fn emit_move(
        &mut self,
        src: impl Into<Operand>,
        dst: impl Into<Operand>,
    ) -> Result<(), CodegenError> {
        let src = src.into();
        let dst = dst.into();
        if src != dst {
            self.emit_op2("movl", src, dst)?;
        }
        Ok(())
    }

    pub(crate) fn emit_load(
        &mut self,
        src_offset: i32,
        src: Reg,
        dst: Reg,
    ) -> Result<(), CodegenError> {
        self.emit_move(Operand::mem(src_offset, src), dst)
    }

    pub(crate) fn emit_store(
        &mut self,
        src: impl Into<Operand>,
        dst_offset: i32,
        dst: Reg,
    ) -> Result<(), CodegenError> {
        self.emit_move(src, Operand::mem(dst_offset, dst))
    }

    /// Writes a label, never indented.
    pub(crate) fn emit_label(&mut self, name: &str) -> Result<(), CodegenError> {
        self.out.write_str(name)?;
        self.out.write_str(":\n")?;
        Ok(())
    }

    pub(crate) fn emit_comment(&mut self, text: &str) -> Result<(), CodegenError> {
        let line = format!("{} {}", self.config.comment_leader, text);
        self.emit(&line)
    }

    /// A `#  ___Name_____` separator bar, sized to a fixed line width.
    pub(crate) fn emit_section_comment(&mut self, name: &str) -> Result<(), CodegenError> {
        let lead = self.indent.len();
        let fill = 68usize.saturating_sub(lead + name.len());
        let line = format!(
            "{} {}{}{}",
            self.config.comment_leader,
            "_".repeat(lead),
            name,
            "_".repeat(fill)
        );
        self.out.write_str(&line)?;
        self.out.write_char('\n')?;
        Ok(())
    }

    pub(crate) fn emit_indent(&mut self, comment: Option<&str>) -> Result<(), CodegenError> {
        self.indent.push_str("  ");
        if let Some(comment) = comment {
            self.emit_comment(comment)?;
        }
        Ok(())
    }

    pub(crate) fn emit_undent(&mut self) {
        let len = self.indent.len().saturating_sub(2);
        self.indent.truncate(len);
    }

    /// `\t.int value` constant word inside a data block.
    pub(crate) fn emit_word_data(&mut self, value: &str) -> Result<(), CodegenError> {
        let line = format!("\t{} {}", self.config.dot_int, value);
        self.emit(&line)
    }

    /// A labeled string constant. `value` is emitted verbatim between the
    /// quotes, so escapes like `\n` must already be spelled out.
    pub(crate) fn emit_string_data(
        &mut self,
        name: &str,
        value: &str,
    ) -> Result<(), CodegenError> {
        let line = format!("{}:\n\t{} \"{}\"", name, self.config.dot_string, value);
        self.emit(&line)
    }

    /// A fresh process-unique label. Labels are write-once; each is used as
    /// exactly one jump target or data anchor.
    pub(crate) fn unique_label(&mut self) -> String {
        let name = format!("label{}", self.label_counter);
        self.label_counter += 1;
        name
    }

    pub(crate) fn emit_prologue(&mut self) -> Result<(), CodegenError> {
        self.emit_op1("pushl", Reg::Ebp)?;
        self.emit_move(Reg::Esp, Reg::Ebp)
    }

    /// Tears the frame down and returns. `zero_result` loads 0 into the
    /// result register first, for void returns and implicit method ends.
    pub(crate) fn emit_epilogue(&mut self, zero_result: bool) -> Result<(), CodegenError> {
        if zero_result {
            self.emit_move(Operand::Imm(0), Reg::Eax)?;
        }
        self.emit_op0("leave")?;
        self.emit_op0("ret")
    }

    pub(crate) fn emit_stack_alloc(&mut self, bytes: i32) -> Result<(), CodegenError> {
        self.emit_op2("subl", bytes, Reg::Esp)
    }

    pub(crate) fn emit_stack_free(&mut self, bytes: i32) -> Result<(), CodegenError> {
        self.emit_op2("addl", bytes, Reg::Esp)
    }

    /// Saves `%eax` around a libc call when some generator is holding it.
    /// Returns whether a matching [`Self::restore_eax`] is needed.
    pub(crate) fn push_eax_if_used(&mut self) -> Result<bool, CodegenError> {
        if self.pool.is_in_use(Reg::Eax) {
            self.emit_op1("pushl", Reg::Eax)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn restore_eax(&mut self) -> Result<(), CodegenError> {
        self.emit_op1("popl", Reg::Eax)
    }

    pub(crate) fn reserve_reg(&mut self) -> Result<Reg, CodegenError> {
        let reg = self.pool.reserve()?;
        self.emit_comment(&format!("Reserving register {}", reg))?;
        Ok(reg)
    }

    pub(crate) fn reserve_specific_reg(&mut self, reg: Reg) -> Result<Reg, CodegenError> {
        let reg = self.pool.reserve_specific(reg)?;
        self.emit_comment(&format!("Reserving register {}", reg))?;
        Ok(reg)
    }

    pub(crate) fn release_reg(&mut self, reg: Reg) -> Result<(), CodegenError> {
        self.pool.release(reg);
        self.emit_comment(&format!("Releasing register {}", reg))
    }
}
