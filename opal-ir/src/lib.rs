//! Opal Compiler - Typed Syntax Tree
//!
//! The tree the front end hands to the back end. Every expression carries a
//! resolved static type and every field access names its declaring class; the
//! back end trusts these annotations completely and performs no name
//! resolution of its own. The whole tree is serde-serializable so a typed
//! program can be carried as JSON between compiler stages.

pub mod ast;
pub mod types;

pub use ast::{
    BinaryOp, ClassDecl, Expr, ExprKind, MethodDecl, Program, Stmt, UnaryOp, VarDecl,
};
pub use types::Ty;

/// Name of the implicit root class every class chain ends in.
pub const OBJECT_CLASS: &str = "Object";
