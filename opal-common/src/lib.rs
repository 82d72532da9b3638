//! Opal Compiler - Common Types and Target Configuration
//!
//! This crate carries the settings the back end consumes but does not own:
//! word size, platform symbol names for the C library routines the generated
//! code calls, assembler directive strings, and the external assemble-and-link
//! command template.

pub mod config;

pub use config::{Platform, TargetConfig, UnknownPlatform};
