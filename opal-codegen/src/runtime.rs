//! Runtime support routines
//!
//! The generated program has no runtime of its own, so everything it needs
//! beyond libc is emitted once per unit here: the format and exception
//! string literals, the process entry point, the cast validator, and the
//! five fatal exception handlers. The handlers are shared jump targets —
//! every safety check anywhere in the generated code branches to the single
//! label for its category.

use crate::asm::{Operand, Reg};
use crate::error::CodegenError;
use crate::CodeGenerator;
use opal_ir::Program;
use std::fmt;

pub(crate) const CAST_VALIDATE: &str = "CastValidate";

pub(crate) const CAST_EXCEPTION: &str = "CastException";
pub(crate) const DIVISION_BY_ZERO_EXCEPTION: &str = "DivisionByZeroException";
pub(crate) const ILLEGAL_ARRAY_SIZE_EXCEPTION: &str = "IllegalArraySizeException";
pub(crate) const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "IndexOutOfBoundsException";
pub(crate) const NULL_POINTER_EXCEPTION: &str = "NullPointerException";

/// Exit codes, one per violation category, stable so a test harness can tell
/// the categories apart by exit status alone.
const EXCEPTIONS: [(&str, &str, i32); 5] = [
    (CAST_EXCEPTION, "cast_exception_string", 1),
    (DIVISION_BY_ZERO_EXCEPTION, "divide_by_zero_exception_string", 8),
    (ILLEGAL_ARRAY_SIZE_EXCEPTION, "illegal_array_size_exception_string", 5),
    (INDEX_OUT_OF_BOUNDS_EXCEPTION, "index_out_of_bounds_exception_string", 3),
    (NULL_POINTER_EXCEPTION, "null_pointer_exception_string", 4),
];

impl<W: fmt::Write> CodeGenerator<'_, W> {
    pub(crate) fn emit_runtime_support(&mut self, program: &Program) -> Result<(), CodegenError> {
        self.emit_string_constants()?;
        self.emit_entry_point(program)?;
        self.emit_cast_validator()?;
        self.emit_exception_handlers()
    }

    fn emit_string_constants(&mut self) -> Result<(), CodegenError> {
        let rodata = self.config.rodata_section.clone();
        self.emit("")?;
        self.emit(&rodata)?;
        self.emit_string_data("int_format_string", "%d")?;
        self.emit_string_data("float_format_string", "%f")?;
        self.emit_string_data(
            "divide_by_zero_exception_string",
            "EXCEPTION: Division by zero.\\n",
        )?;
        self.emit_string_data("cast_exception_string", "EXCEPTION: Invalid cast.\\n")?;
        self.emit_string_data(
            "illegal_array_size_exception_string",
            "EXCEPTION: Illegal Array Size.\\n",
        )?;
        self.emit_string_data(
            "index_out_of_bounds_exception_string",
            "EXCEPTION: Array index out of bounds.\\n",
        )?;
        self.emit_string_data(
            "null_pointer_exception_string",
            "EXCEPTION: Null pointer.\\n",
        )
    }

    /// The process entry point: builds one instance of the designated main
    /// class and calls its designated zero-argument method, then exits 0.
    fn emit_entry_point(&mut self, program: &Program) -> Result<(), CodegenError> {
        let text_section = self.config.text_section.clone();
        let main_symbol = self.config.main_symbol.clone();
        let word = self.word();

        self.emit(&text_section)?;
        let globl = format!(".globl {}", main_symbol);
        self.emit(&globl)?;
        self.emit_label(&main_symbol)?;
        self.emit_indent(None)?;
        self.emit_prologue()?;

        let object_reg = self.gen_new_object(&program.main_class)?;
        self.emit_op1("pushl", object_reg)?;
        self.release_reg(object_reg)?;
        let entry = format!("{}_{}", program.main_class, program.main_method);
        self.emit_call(&entry)?;

        self.emit_stack_free(word)?;
        self.emit_epilogue(true)?;
        self.emit_undent();
        Ok(())
    }

    /// Validates a downcast at runtime by walking the superclass-pointer
    /// chain of the "from" dispatch table. Arguments, nearest the return
    /// address first: the target class's table, then the source object's
    /// table. Falls through to the caller on a match; reaching `Object`'s
    /// table without one is a cast exception.
    fn emit_cast_validator(&mut self) -> Result<(), CodegenError> {
        let word = self.word();
        let loop_label = self.unique_label();
        let success_label = self.unique_label();

        let from_reg = self.reserve_reg()?;
        let object_reg = self.reserve_reg()?;
        let to_reg = self.reserve_reg()?;

        self.emit_label(CAST_VALIDATE)?;
        self.emit_indent(None)?;
        self.emit_prologue()?;

        self.emit_load(2 * word, Reg::Ebp, to_reg)?;
        self.emit_load(3 * word, Reg::Ebp, from_reg)?;
        self.emit_move(Operand::label("vtable_Object"), object_reg)?;

        self.emit_label(&loop_label)?;
        // End of the hierarchy reached: the cast is invalid.
        self.emit_op2("cmpl", from_reg, object_reg)?;
        self.emit_jump("je", CAST_EXCEPTION)?;
        self.emit_op2("cmpl", from_reg, to_reg)?;
        self.emit_jump("je", &success_label)?;
        // Step to the superclass's table.
        self.emit_load(0, from_reg, from_reg)?;
        self.emit_jump("jmp", &loop_label)?;

        self.emit_label(&success_label)?;
        self.release_reg(to_reg)?;
        self.release_reg(from_reg)?;
        self.release_reg(object_reg)?;
        self.emit_epilogue(false)?;
        self.emit_undent();
        Ok(())
    }

    fn emit_exception_handlers(&mut self) -> Result<(), CodegenError> {
        let printf = self.config.printf.clone();
        let exit = self.config.exit.clone();
        for (label, message, code) in EXCEPTIONS {
            self.emit_label(label)?;
            self.emit_indent(None)?;
            self.emit_op1("pushl", Operand::label(message))?;
            self.emit_call(&printf)?;
            self.emit_op1("pushl", Operand::Imm(code))?;
            self.emit_call(&exit)?;
            self.emit_undent();
        }
        Ok(())
    }
}
