use std::borrow::Cow;

use log::trace;
use thiserror::Error;

use crate::COMMENT_PREFIX;
use crate::isa::{Assertion, Instruction, Op, Opcode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// Malformed line: bad quoting, wrong operands.
    #[error("script line {line}: {message}")]
    Syntax { line: usize, message: String },
    /// The line names a command outside the instruction set.
    #[error("script line {line}: unknown command `{name}`")]
    UnknownOp { line: usize, name: String },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Syntax { line, .. } | ScriptError::UnknownOp { line, .. } => *line,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ScriptError::UnknownOp { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub instructions: Vec<Instruction>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Parse a whole script. Blank lines and `#` comments are skipped and take
/// no index. The first bad line aborts parsing.
pub fn parse_script(text: &str) -> Result<Script, ScriptError> {
    let mut instructions = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        if let Some(ins) = parse_line(i + 1, instructions.len(), raw)? {
            trace!("parsed #{} (line {}): {:?}", ins.index, ins.line, ins.op);
            instructions.push(ins);
        }
    }
    Ok(Script { instructions })
}

pub fn parse_line(line: usize, index: usize, raw: &str) -> Result<Option<Instruction>, ScriptError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX) {
        return Ok(None);
    }
    let syntax = |message: String| ScriptError::Syntax { line, message };

    let tokens = shlex::split(&escape_hashes(trimmed)).ok_or_else(|| syntax("unbalanced quotes".to_string()))?;
    let Some((name, args)) = tokens.split_first() else {
        return Ok(None);
    };
    let opcode = Opcode::from_name(name).ok_or_else(|| ScriptError::UnknownOp {
        line,
        name: name.clone(),
    })?;
    let op = decode(opcode, args).map_err(syntax)?;
    Ok(Some(Instruction { index, line, text: trimmed.to_string(), op }))
}

/// `shlex` drops everything from an unquoted `#` word onwards. Only whole
/// lines are comments here, so escape those marks to keep them literal.
fn escape_hashes(line: &str) -> Cow<'_, str> {
    if !line.contains(COMMENT_PREFIX) {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len() + 4);
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\\') | (Some('"'), '\\') => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            (None, COMMENT_PREFIX) => out.push('\\'),
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        out.push(c);
    }
    Cow::Owned(out)
}

fn one(op: Opcode, args: &[String]) -> Result<String, String> {
    match args {
        [a] => Ok(a.clone()),
        _ => Err(format!("{} expects exactly 1 path, got {}", op.name(), args.len())),
    }
}

fn none(op: Opcode, args: &[String]) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("{} takes no arguments", op.name()))
    }
}

/// Split a leading flag off `args` if it is one of `accepted`.
fn flag<'a>(args: &'a [String], accepted: &[&str]) -> (bool, &'a [String]) {
    match args.first() {
        Some(f) if accepted.contains(&f.as_str()) => (true, &args[1..]),
        _ => (false, args),
    }
}

fn decode(opcode: Opcode, args: &[String]) -> Result<Op, String> {
    Ok(match opcode {
        Opcode::Ls => {
            let (long, rest) = flag(args, &["-l"]);
            match rest {
                [] => Op::Ls { long, path: None },
                [p] => Op::Ls { long, path: Some(p.clone()) },
                _ => return Err("usage: ls [-l] [path]".to_string()),
            }
        }
        Opcode::Cd => Op::Cd { path: one(opcode, args)? },
        Opcode::Pwd => {
            none(opcode, args)?;
            Op::Pwd
        }
        Opcode::Read => Op::Read { path: one(opcode, args)? },
        Opcode::Tac => Op::Tac { path: one(opcode, args)? },
        Opcode::Create | Opcode::Write => {
            let Some((path, content)) = args.split_first() else {
                return Err(format!("usage: {} <path> [content...]", opcode.name()));
            };
            let (path, content) = (path.clone(), content.join(" "));
            if opcode == Opcode::Create {
                Op::Create { path, content }
            } else {
                Op::Write { path, content }
            }
        }
        Opcode::Touch => Op::Touch { path: one(opcode, args)? },
        Opcode::Mkdir => {
            let (parents, rest) = flag(args, &["-p"]);
            Op::Mkdir { path: one(opcode, rest)?, parents }
        }
        Opcode::Delete => {
            let (recursive, rest) = flag(args, &["-r", "-R", "-rf"]);
            Op::Delete { path: one(opcode, rest)?, recursive }
        }
        Opcode::Chmod => match args {
            [mode, path] => {
                let mode = vfs::parse_mode(mode).ok_or_else(|| {
                    format!("chmod: invalid mode '{}' (expected octal such as 644 or 0755)", mode)
                })?;
                Op::Chmod { mode, path: path.clone() }
            }
            _ => return Err("usage: chmod <octal-mode> <path>".to_string()),
        },
        Opcode::Assert => Op::Assert(decode_assertion(args)?),
        Opcode::Echo => Op::Echo { text: args.join(" ") },
        Opcode::VfsInfo => {
            none(opcode, args)?;
            Op::VfsInfo
        }
        Opcode::Exit => {
            none(opcode, args)?;
            Op::Exit
        }
    })
}

fn decode_assertion(args: &[String]) -> Result<Assertion, String> {
    let usage = || "usage: assert exists|missing|file|dir <path> | assert content <path> <text>".to_string();
    let (kind, rest) = args.split_first().ok_or_else(usage)?;
    Ok(match (kind.as_str(), rest) {
        ("exists", [p]) => Assertion::Exists(p.clone()),
        ("missing", [p]) => Assertion::Missing(p.clone()),
        ("file", [p]) => Assertion::File(p.clone()),
        ("dir", [p]) => Assertion::Dir(p.clone()),
        ("content", [p, text @ ..]) => Assertion::Content {
            path: p.clone(),
            expected: text.join(" "),
        },
        _ => return Err(usage()),
    })
}
