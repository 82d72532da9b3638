//! Target configuration for assembly output
//!
//! The generated assembly is plain GNU assembler text, but symbol naming and
//! data directives differ between platforms (Linux binds `printf` directly,
//! Darwin and Windows prefix C symbols with an underscore, Darwin spells
//! string data `.asciz`). Everything the code generator needs to know about
//! the target lives here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown target platform: {0}")]
pub struct UnknownPlatform(pub String);

/// Supported output platforms, all 32-bit x86.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// The platform the compiler itself is running on.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Platform::Linux),
            "macos" | "darwin" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Everything the back end needs to know about the output target.
///
/// Owned by the caller and passed into code generation; the generator itself
/// never inspects the host system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// sizeof a pointer on the target, in bytes. Drives every offset and
    /// stride computation in the object layout.
    pub word_size: i32,

    /// Name of the process entry symbol in the emitted `.s` file.
    pub main_symbol: String,

    /// Platform symbol names for the C library routines the generated
    /// code calls.
    pub printf: String,
    pub scanf: String,
    pub malloc: String,
    pub putchar: String,
    pub exit: String,

    /// Assembler directive used to define a constant string.
    pub dot_string: String,
    /// Assembler directive used to define a constant word.
    pub dot_int: String,

    /// Section header directives.
    pub text_section: String,
    pub data_section: String,
    pub rodata_section: String,

    /// Comment leader used in the emitted assembly.
    pub comment_leader: String,

    /// File extensions for assembly units and linked binaries.
    pub asm_extension: String,
    pub binary_extension: String,

    /// Assemble-and-link command template. `$0` is replaced with the output
    /// binary path and `$1` with the input `.s` path. The back end never
    /// runs this command itself.
    pub assemble_command: Vec<String>,
}

impl TargetConfig {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Linux => TargetConfig {
                word_size: 4,
                main_symbol: "main".to_string(),
                printf: "printf".to_string(),
                scanf: "scanf".to_string(),
                malloc: "malloc".to_string(),
                putchar: "putchar".to_string(),
                exit: "exit".to_string(),
                dot_string: ".string".to_string(),
                dot_int: ".int".to_string(),
                text_section: ".section .text".to_string(),
                data_section: ".section .data".to_string(),
                rodata_section: ".section .rodata".to_string(),
                comment_leader: "#".to_string(),
                asm_extension: ".s".to_string(),
                binary_extension: ".bin".to_string(),
                assemble_command: command(&["gcc", "-m32", "-o", "$0", "$1"]),
            },
            Platform::MacOs => TargetConfig {
                word_size: 4,
                main_symbol: "_main".to_string(),
                printf: "_printf".to_string(),
                scanf: "_scanf".to_string(),
                malloc: "_malloc".to_string(),
                putchar: "_putchar".to_string(),
                exit: "_exit".to_string(),
                dot_string: ".asciz".to_string(),
                dot_int: ".long".to_string(),
                text_section: ".text".to_string(),
                data_section: ".data".to_string(),
                rodata_section: ".cstring".to_string(),
                comment_leader: "#".to_string(),
                asm_extension: ".s".to_string(),
                binary_extension: ".bin".to_string(),
                assemble_command: command(&["gcc", "-m32", "-o", "$0", "$1"]),
            },
            Platform::Windows => TargetConfig {
                word_size: 4,
                main_symbol: "_main".to_string(),
                printf: "_printf".to_string(),
                scanf: "_scanf".to_string(),
                malloc: "_malloc".to_string(),
                putchar: "_putchar".to_string(),
                exit: "_exit".to_string(),
                dot_string: ".string".to_string(),
                dot_int: ".int".to_string(),
                text_section: ".section .text".to_string(),
                data_section: ".section .data".to_string(),
                rodata_section: ".section .rodata".to_string(),
                comment_leader: ";".to_string(),
                asm_extension: ".s".to_string(),
                binary_extension: ".exe".to_string(),
                assemble_command: command(&["gcc", "-o", "$0", "$1"]),
            },
        }
    }

    pub fn host() -> Self {
        Self::for_platform(Platform::host())
    }

    /// The assemble-and-link command line for a concrete binary/assembly
    /// path pair, with the `$0`/`$1` placeholders substituted.
    pub fn assemble_command_for(&self, binary: &Path, asm: &Path) -> Vec<String> {
        self.assemble_command
            .iter()
            .map(|part| match part.as_str() {
                "$0" => binary.display().to_string(),
                "$1" => asm.display().to_string(),
                _ => part.clone(),
            })
            .collect()
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::host()
    }
}

fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
