//! Code generation errors
//!
//! Every variant here is a compile-time failure: either the register budget
//! ran out or a symbol the front end guaranteed to exist is missing. Both are
//! unrecoverable for the current compilation; there is no partial output.

use crate::asm::Reg;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error("no registers left")]
    OutOfRegisters,

    #[error("requested register {0} already in use")]
    RegisterInUse(Reg),

    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("class {class} has no field named {field}")]
    UnknownField { class: String, field: String },

    #[error("class {class} has no method named {method}")]
    UnknownMethod { class: String, method: String },

    #[error("method {class}.{method} has no local named {local}")]
    UnknownLocal {
        class: String,
        method: String,
        local: String,
    },

    #[error("unresolved identifier {name} in {class}.{method}")]
    UnresolvedIdentifier {
        name: String,
        class: String,
        method: String,
    },

    #[error("expression is not an assignable location: {0}")]
    NotAnLvalue(String),

    #[error("failed to write assembly output: {0}")]
    Output(#[from] std::fmt::Error),

    #[error("internal code generation error: {0}")]
    Internal(String),
}
