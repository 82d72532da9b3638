//! Opal Compiler - Tree Rewriting Optimizations
//!
//! Two optional passes that rewrite the typed tree before code generation:
//! constant propagation/folding and dead-assignment elimination. Both are
//! conservative: a rewrite only happens when it provably cannot change what
//! the generated program prints, reads, or traps on.

pub mod dead;
pub mod fold;

pub use dead::eliminate_dead_assignments;
pub use fold::fold_program;
