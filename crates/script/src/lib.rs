// Startup script
// Line-oriented instruction set applied to a VFS before the session starts.
// Parsing is total and happens up front; execution is one step at a time.

pub mod isa;
pub mod parse;
pub mod vm;

pub use isa::{Assertion, Instruction, Op, Opcode};
pub use parse::{Script, ScriptError, parse_script};
pub use vm::{Fault, Machine, RunResult, RunStatus, Status};

pub const COMMENT_PREFIX: char = '#';
pub const DEFAULT_PROMPT: &str = "$ ";
