//! Opal Compiler - x86 Code Generation Backend
//!
//! This crate turns a fully type-checked Opal syntax tree into textual
//! 32-bit x86 assembly (AT&T syntax) for an external assembler/linker. It
//! covers:
//!
//! - Object and dispatch-table layout
//! - Register allocation over a fixed six-register pool
//! - Expression, address, and statement code generation
//! - The runtime support routines the generated code calls into
//!   (entry point, cast validator, fatal exception handlers)
//!
//! The generated program enforces its own safety checks: null dereference,
//! array bounds, negative array sizes, division by zero, and failed downcasts
//! all branch to shared handlers that print a message and terminate with a
//! stable per-category exit code.

pub mod asm;
pub mod error;
pub mod pool;

mod address;
mod emit;
mod expr;
mod layout;
mod runtime;
mod stmt;


pub use asm::{Operand, Reg};
pub use error::CodegenError;
pub use layout::ClassLayout;
pub use pool::RegisterPool;

use log::debug;
use opal_common::TargetConfig;
use opal_ir::Program;
use std::collections::HashMap;
use std::fmt;

/// Main entry point for code generation.
pub fn generate_assembly(
    program: &Program,
    config: &TargetConfig,
) -> Result<String, CodegenError> {
    let mut out = String::new();
    CodeGenerator::new(config, &mut out).generate(program)?;
    Ok(out)
}

/// Hub for one code generation run.
///
/// Carries all mutable state the generators share: the output stream, the
/// register pool, the label counter, the layout tables, and the class/method
/// currently being generated. A fresh generator is created per compilation,
/// so independent runs never see each other's labels or layouts.
pub struct CodeGenerator<'a, W: fmt::Write> {
    pub(crate) config: TargetConfig,
    pub(crate) out: &'a mut W,
    pub(crate) pool: RegisterPool,
    pub(crate) layouts: HashMap<String, ClassLayout>,
    pub(crate) class_info: HashMap<String, layout::ClassInfo>,
    pub(crate) indent: String,
    pub(crate) label_counter: u32,
    pub(crate) current_class: String,
    pub(crate) current_method: String,
}

impl<'a, W: fmt::Write> CodeGenerator<'a, W> {
    pub fn new(config: &TargetConfig, out: &'a mut W) -> Self {
        CodeGenerator {
            config: config.clone(),
            out,
            pool: RegisterPool::new(),
            layouts: HashMap::new(),
            class_info: HashMap::new(),
            indent: String::new(),
            label_counter: 0,
            current_class: String::new(),
            current_method: String::new(),
        }
    }

    /// Emits the assembly unit for `program`: dispatch tables first (the
    /// layout pass must see every class before any body is generated), then
    /// the runtime support routines, then one routine per declared method.
    pub fn generate(&mut self, program: &Program) -> Result<(), CodegenError> {
        self.collect_class_info(program);
        self.emit_dispatch_tables(program)?;
        self.emit_runtime_support(program)?;
        for class in &program.classes {
            self.current_class = class.name.clone();
            self.gen_class(class)?;
        }
        debug!("generated code for {} classes", program.classes.len());
        Ok(())
    }

    pub(crate) fn word(&self) -> i32 {
        self.config.word_size
    }
}
