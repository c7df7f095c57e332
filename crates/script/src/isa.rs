use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Opcode {
    // --- Navigation ---
    Ls,      // List a directory, or name a single file
    Cd,      // Change the current directory
    Pwd,     // Print the current directory

    // --- Reading ---
    Read,    // Print a file (alias: cat)
    Tac,     // Print a file's lines last to first

    // --- Mutation ---
    Create,  // New file, must not exist
    Write,   // Create or overwrite a file
    Touch,   // Create an empty file if missing
    Mkdir,   // New directory (-p: with parents)
    Delete,  // Remove an entry (-r: recursively; alias: rm)
    Chmod,   // Set octal permission bits

    // --- Checks ---
    Assert,  // exists | missing | file | dir | content

    // --- Session ---
    Echo,
    VfsInfo, // Print the loaded CSV name and digest
    Exit,    // Stop successfully, skip the rest
}

impl Opcode {
    pub const ALL: [Opcode; 15] = [
        Opcode::Ls,
        Opcode::Cd,
        Opcode::Pwd,
        Opcode::Read,
        Opcode::Tac,
        Opcode::Create,
        Opcode::Write,
        Opcode::Touch,
        Opcode::Mkdir,
        Opcode::Delete,
        Opcode::Chmod,
        Opcode::Assert,
        Opcode::Echo,
        Opcode::VfsInfo,
        Opcode::Exit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Ls => "ls",
            Opcode::Cd => "cd",
            Opcode::Pwd => "pwd",
            Opcode::Read => "read",
            Opcode::Tac => "tac",
            Opcode::Create => "create",
            Opcode::Write => "write",
            Opcode::Touch => "touch",
            Opcode::Mkdir => "mkdir",
            Opcode::Delete => "delete",
            Opcode::Chmod => "chmod",
            Opcode::Assert => "assert",
            Opcode::Echo => "echo",
            Opcode::VfsInfo => "vfs-info",
            Opcode::Exit => "exit",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        match name {
            "cat" => Some(Opcode::Read),
            "rm" => Some(Opcode::Delete),
            _ => Opcode::ALL.into_iter().find(|op| op.name() == name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    Exists(String),
    Missing(String),
    File(String),
    Dir(String),
    Content { path: String, expected: String },
}

/// A decoded instruction with its operands. Paths are kept as written and
/// resolved against the current directory at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Ls { long: bool, path: Option<String> },
    Cd { path: String },
    Pwd,
    Read { path: String },
    Tac { path: String },
    Create { path: String, content: String },
    Write { path: String, content: String },
    Touch { path: String },
    Mkdir { path: String, parents: bool },
    Delete { path: String, recursive: bool },
    Chmod { mode: u16, path: String },
    Assert(Assertion),
    Echo { text: String },
    VfsInfo,
    Exit,
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::Ls { .. } => Opcode::Ls,
            Op::Cd { .. } => Opcode::Cd,
            Op::Pwd => Opcode::Pwd,
            Op::Read { .. } => Opcode::Read,
            Op::Tac { .. } => Opcode::Tac,
            Op::Create { .. } => Opcode::Create,
            Op::Write { .. } => Opcode::Write,
            Op::Touch { .. } => Opcode::Touch,
            Op::Mkdir { .. } => Opcode::Mkdir,
            Op::Delete { .. } => Opcode::Delete,
            Op::Chmod { .. } => Opcode::Chmod,
            Op::Assert(_) => Opcode::Assert,
            Op::Echo { .. } => Opcode::Echo,
            Op::VfsInfo => Opcode::VfsInfo,
            Op::Exit => Opcode::Exit,
        }
    }
}

/// One executable line of a startup script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Position among executable lines, starting at 0.
    pub index: usize,
    /// 1-based line in the source text.
    pub line: usize,
    pub text: String,
    pub op: Op,
}
