use log::{debug, trace};
use serde::Serialize;
use thiserror::Error;
use vfs::{VPath, Vfs, VfsError};

use crate::DEFAULT_PROMPT;
use crate::isa::{Assertion, Instruction, Op, Opcode};

#[derive(Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted, // Ran past the last instruction
    Exited, // `exit` was executed
}

/// A step whose precondition did not hold.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Fault {
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub failed_step: Option<usize>,
    pub failed_line: Option<usize>,
    pub failed_op: Option<Opcode>,
    pub steps_applied: usize,
    pub message: String,
}

impl RunResult {
    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Ok => 0,
            RunStatus::Failed => 1,
        }
    }
}

/// Applies a parsed script to a filesystem one instruction at a time.
///
/// There is no rollback: a failing step leaves every earlier mutation in
/// place and nothing after it runs.
pub struct Machine<F: Vfs> {
    pub fs: F,
    pub cwd: VPath,
    pub ip: usize,              // Index of the next instruction
    pub output: Vec<String>,    // Transcript: echoed lines and their output
    program: Vec<Instruction>,
    prompt: String,
}

impl<F: Vfs> Machine<F> {
    pub fn new(fs: F, program: Vec<Instruction>) -> Self {
        Self {
            fs,
            cwd: VPath::root(),
            ip: 0,
            output: Vec::new(),
            program,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn into_fs(self) -> F {
        self.fs
    }

    fn resolve(&self, path: &str) -> VPath {
        VPath::resolve(&self.cwd, path)
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn read_text(&self, path: &VPath) -> Result<String, Fault> {
        let bytes = self.fs.read(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| VfsError::InvalidUtf8 { path: path.clone() }.into())
    }

    // Execute one instruction
    pub fn step(&mut self) -> Result<Status, Fault> {
        let Some(ins) = self.program.get(self.ip).cloned() else {
            return Ok(Status::Halted);
        };
        debug!("step {} (line {}): {}", ins.index, ins.line, ins.text);
        self.emit(format!("{}{}", self.prompt, ins.text));
        let status = self.execute(&ins.op)?;
        self.ip += 1;
        Ok(status)
    }

    fn execute(&mut self, op: &Op) -> Result<Status, Fault> {
        match op {
            Op::Ls { long, path } => {
                let target = self.resolve(path.as_deref().unwrap_or("."));
                let entry = self
                    .fs
                    .stat(&target)
                    .ok_or_else(|| VfsError::NotFound { path: target.clone() })?;
                if entry.is_file() {
                    let line = if *long {
                        format!("{} {}", entry.mode_string(), target.file_name())
                    } else {
                        target.file_name().to_string()
                    };
                    self.emit(line);
                    return Ok(Status::Running);
                }
                let lines: Vec<String> = {
                    let children = self.fs.list(&target)?;
                    if *long {
                        children.iter().map(|(name, e)| format!("{} {}", e.mode_string(), name)).collect()
                    } else if children.is_empty() {
                        Vec::new()
                    } else {
                        vec![children.iter().map(|(name, _)| *name).collect::<Vec<_>>().join("  ")]
                    }
                };
                self.output.extend(lines);
            }
            Op::Cd { path } => {
                let target = self.resolve(path);
                match self.fs.stat(&target) {
                    None => return Err(VfsError::NotFound { path: target }.into()),
                    Some(e) if !e.is_dir() => return Err(VfsError::NotADirectory { path: target }.into()),
                    Some(_) => self.cwd = target,
                }
            }
            Op::Pwd => self.emit(self.cwd.to_string()),
            Op::Read { path } => {
                let text = self.read_text(&self.resolve(path))?;
                self.output.extend(text.lines().map(str::to_string));
            }
            Op::Tac { path } => {
                let text = self.read_text(&self.resolve(path))?;
                self.output.extend(text.lines().rev().map(str::to_string));
            }
            Op::Create { path, content } => {
                let target = self.resolve(path);
                self.fs.create(&target, content.as_bytes())?;
            }
            Op::Write { path, content } => {
                let target = self.resolve(path);
                self.fs.write(&target, content.as_bytes())?;
            }
            Op::Touch { path } => {
                let target = self.resolve(path);
                if self.fs.stat(&target).is_some() {
                    self.emit(format!("touch: '{}' already exists", path));
                } else {
                    self.fs.create(&target, b"")?;
                    self.emit(format!("touch: created empty file '{}'", path));
                }
            }
            Op::Mkdir { path, parents } => {
                let target = self.resolve(path);
                self.fs.mkdir(&target, *parents)?;
            }
            Op::Delete { path, recursive } => {
                let target = self.resolve(path);
                let removed = self.fs.remove(&target, *recursive)?;
                trace!("removed {} entries under {}", removed, target);
                if self.cwd == target || self.cwd.is_descendant_of(&target) {
                    self.cwd = target.parent().unwrap_or_else(VPath::root);
                }
            }
            Op::Chmod { mode, path } => {
                let target = self.resolve(path);
                self.fs.chmod(&target, *mode)?;
                self.emit(format!("chmod: set {:04o} for '{}'", mode, path));
            }
            Op::Assert(assertion) => self.check(assertion)?,
            Op::Echo { text } => self.emit(text.clone()),
            Op::VfsInfo => {
                let line = match self.fs.source() {
                    Some(src) => format!("VFS: name={}, sha256={}", src.name, src.sha256),
                    None => "VFS not loaded.".to_string(),
                };
                self.emit(line);
            }
            Op::Exit => {
                self.emit("shutting down");
                return Ok(Status::Exited);
            }
        }
        Ok(Status::Running)
    }

    fn check(&self, assertion: &Assertion) -> Result<(), Fault> {
        let failed = |msg: String| Err(Fault::Assertion(msg));
        match assertion {
            Assertion::Exists(p) => {
                let target = self.resolve(p);
                if self.fs.stat(&target).is_none() {
                    return failed(format!("expected {} to exist", target));
                }
            }
            Assertion::Missing(p) => {
                let target = self.resolve(p);
                if self.fs.stat(&target).is_some() {
                    return failed(format!("expected {} to be missing", target));
                }
            }
            Assertion::File(p) => {
                let target = self.resolve(p);
                if !self.fs.stat(&target).is_some_and(|e| e.is_file()) {
                    return failed(format!("expected {} to be a file", target));
                }
            }
            Assertion::Dir(p) => {
                let target = self.resolve(p);
                if !self.fs.stat(&target).is_some_and(|e| e.is_dir()) {
                    return failed(format!("expected {} to be a directory", target));
                }
            }
            Assertion::Content { path, expected } => {
                let target = self.resolve(path);
                let actual = self.fs.read(&target)?;
                if actual != expected.as_bytes() {
                    return failed(format!(
                        "{}: expected {:?}, found {:?}",
                        target,
                        expected,
                        String::from_utf8_lossy(actual)
                    ));
                }
            }
        }
        Ok(())
    }

    /// Step until the program halts, exits or faults.
    pub fn run(&mut self) -> RunResult {
        loop {
            let current = self.program.get(self.ip).cloned();
            match self.step() {
                Ok(Status::Running) => {}
                Ok(Status::Halted) => {
                    return RunResult {
                        status: RunStatus::Ok,
                        failed_step: None,
                        failed_line: None,
                        failed_op: None,
                        steps_applied: self.ip,
                        message: format!("completed {} steps", self.ip),
                    };
                }
                Ok(Status::Exited) => {
                    return RunResult {
                        status: RunStatus::Ok,
                        failed_step: None,
                        failed_line: None,
                        failed_op: None,
                        steps_applied: self.ip,
                        message: format!("exited after {} steps", self.ip),
                    };
                }
                Err(fault) => {
                    // `step` only faults on an existing instruction.
                    let (index, line, opcode) = match &current {
                        Some(ins) => (ins.index, ins.line, Some(ins.op.opcode())),
                        None => (self.ip, 0, None),
                    };
                    let name = opcode.map(Opcode::name).unwrap_or("?");
                    self.emit(format!("{}: {}", name, fault));
                    return RunResult {
                        status: RunStatus::Failed,
                        failed_step: Some(index),
                        failed_line: Some(line),
                        failed_op: opcode,
                        steps_applied: self.ip,
                        message: format!("step {} (line {}) {}: {}", index, line, name, fault),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_script;
    use vfs::{VirtualFilesystem, load_csv};

    fn machine(csv: &str, script: &str) -> Machine<VirtualFilesystem> {
        let fs = load_csv("test.csv", csv.as_bytes()).unwrap();
        let program = parse_script(script).unwrap().instructions;
        Machine::new(fs, program)
    }

    fn p(s: &str) -> VPath {
        VPath::resolve(&VPath::root(), s)
    }

    const HELLO: &str = "path,type,content\n/a.txt,file,hello\n";
    const EMPTY: &str = "path,type,content\n";

    #[test]
    fn reading_an_existing_file_succeeds() {
        let mut m = machine(HELLO, "read /a.txt\n");
        let result = m.run();
        assert_eq!(result.status, RunStatus::Ok);
        assert_eq!(result.steps_applied, 1);
        assert_eq!(m.output, vec!["$ read /a.txt", "hello"]);
    }

    #[test]
    fn deleting_a_missing_path_fails_at_step_zero() {
        let mut m = machine(EMPTY, "delete /missing\n");
        let result = m.run();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.failed_step, Some(0));
        assert_eq!(result.failed_line, Some(1));
        assert_eq!(result.failed_op, Some(Opcode::Delete));
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn failure_stops_later_steps_without_rollback() {
        let script = "create /one\n# comment\ncreate /two\nread /nope\ncreate /three\n";
        let mut m = machine(EMPTY, script);
        let result = m.run();
        assert_eq!(result.failed_step, Some(2));
        assert_eq!(result.failed_line, Some(4));
        assert_eq!(result.steps_applied, 2);
        let fs = m.into_fs();
        assert!(fs.stat(&p("/one")).is_some());
        assert!(fs.stat(&p("/two")).is_some());
        assert!(fs.stat(&p("/three")).is_none());
    }

    #[test]
    fn mutations_apply_in_order() {
        let script = "mkdir -p /srv/app\ncd /srv/app\nwrite conf.ini v1\nwrite conf.ini v2\n\
                      assert content /srv/app/conf.ini v2\nchmod 600 conf.ini\ncd ..\nrm -r app\n\
                      assert missing /srv/app\npwd\n";
        let mut m = machine(EMPTY, script);
        let result = m.run();
        assert!(result.is_ok(), "{}", result.message);
        assert_eq!(result.steps_applied, 10);
        assert_eq!(m.output.last().map(String::as_str), Some("/srv"));
    }

    #[test]
    fn exit_skips_the_rest() {
        let mut m = machine(EMPTY, "echo before\nexit\ndelete /nothing\n");
        let result = m.run();
        assert!(result.is_ok());
        assert_eq!(result.steps_applied, 2);
        assert_eq!(m.output, vec!["$ echo before", "before", "$ exit", "shutting down"]);
    }

    #[test]
    fn ls_short_and_long() {
        let csv = "path,type,content,mode\n/d,dir,,\n/d/b,file,x,600\n/d/a,dir,,\n";
        let mut m = machine(csv, "ls /d\nls -l /d\nls -l /d/b\nls /d/a\n");
        assert!(m.run().is_ok());
        assert_eq!(
            m.output,
            vec!["$ ls /d", "a  b", "$ ls -l /d", "d0755 a", "-0600 b", "$ ls -l /d/b", "-0600 b", "$ ls /d/a"]
        );
    }

    #[test]
    fn tac_reverses_lines() {
        let csv = "path,type,content\n/log,file,\"one\ntwo\nthree\"\n";
        let mut m = machine(csv, "tac /log\n");
        assert!(m.run().is_ok());
        assert_eq!(m.output[1..], ["three", "two", "one"]);
    }

    #[test]
    fn cd_into_a_file_fails() {
        let mut m = machine(HELLO, "cd /a.txt\n");
        let result = m.run();
        assert_eq!(result.failed_step, Some(0));
        assert!(result.message.contains("Not a directory"), "{}", result.message);
        assert_eq!(m.cwd, VPath::root());
    }

    #[test]
    fn failed_assertion_reports_message() {
        let mut m = machine(HELLO, "assert content /a.txt bye\n");
        let result = m.run();
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.message.contains("assertion failed"), "{}", result.message);
        assert_eq!(m.output.last().unwrap(), &format!("assert: {}", Fault::Assertion("/a.txt: expected \"bye\", found \"hello\"".into())));
    }

    #[test]
    fn binary_content_cannot_be_read_as_text() {
        let csv = "path,type,content,encoding\n/bin,file,/w==,base64\n";
        let mut m = machine(csv, "read /bin\n");
        let result = m.run();
        assert_eq!(result.failed_op, Some(Opcode::Read));
        assert!(result.message.contains("not valid UTF-8"));
    }

    #[test]
    fn vfs_info_reports_source() {
        let mut m = machine(HELLO, "vfs-info\n");
        assert!(m.run().is_ok());
        assert!(m.output[1].starts_with("VFS: name=test.csv, sha256="));

        let mut bare = Machine::new(VirtualFilesystem::new(), parse_script("vfs-info").unwrap().instructions);
        assert!(bare.run().is_ok());
        assert_eq!(bare.output[1], "VFS not loaded.");
    }

    #[test]
    fn deleting_the_cwd_moves_to_its_parent() {
        let mut m = machine(EMPTY, "mkdir -p /a/b\ncd /a/b\nrm -r /a\npwd\n");
        assert!(m.run().is_ok());
        assert_eq!(m.output.last().map(String::as_str), Some("/"));
    }

    #[test]
    fn touch_and_chmod_confirm_in_the_transcript() {
        let mut m = machine(HELLO, "touch a.txt\ntouch /new\nchmod 0600 /new\n");
        assert!(m.run().is_ok());
        assert_eq!(
            m.output,
            vec![
                "$ touch a.txt",
                "touch: 'a.txt' already exists",
                "$ touch /new",
                "touch: created empty file '/new'",
                "$ chmod 0600 /new",
                "chmod: set 0600 for '/new'",
            ]
        );
    }

    #[test]
    fn touch_leaves_existing_content_alone() {
        let mut m = machine(HELLO, "touch /a.txt\nassert content /a.txt hello\n");
        assert!(m.run().is_ok());
        assert_eq!(m.fs.read(&p("/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn assert_exists_passes_and_fails() {
        let mut ok = machine(HELLO, "assert exists /a.txt\nassert exists /\n");
        assert!(ok.run().is_ok());

        let mut m = machine(HELLO, "assert exists /a.txt\nassert exists /b.txt\n");
        let result = m.run();
        assert_eq!(result.failed_step, Some(1));
        assert_eq!(result.failed_op, Some(Opcode::Assert));
        assert!(result.message.contains("expected /b.txt to exist"), "{}", result.message);
    }

    #[test]
    fn assert_dir_passes_and_fails() {
        let csv = "path,type,content\n/etc,dir,\n/etc/motd,file,hi\n";
        let mut ok = machine(csv, "assert dir /etc\nassert dir /\n");
        assert!(ok.run().is_ok());

        let mut m = machine(csv, "assert dir /etc/motd\n");
        let result = m.run();
        assert_eq!(result.failed_step, Some(0));
        assert!(result.message.contains("expected /etc/motd to be a directory"), "{}", result.message);

        let mut missing = machine(csv, "assert dir /var\n");
        assert_eq!(missing.run().status, RunStatus::Failed);
    }

    #[test]
    fn mkdir_without_parents_needs_an_existing_parent() {
        let mut m = machine(EMPTY, "mkdir /a/b\n");
        let result = m.run();
        assert_eq!(result.failed_step, Some(0));
        assert_eq!(result.failed_op, Some(Opcode::Mkdir));
        assert_eq!(result.steps_applied, 0);
        assert!(m.fs.stat(&p("/a")).is_none());
        assert!(m.fs.stat(&p("/a/b")).is_none());
    }

    #[test]
    fn hash_words_reach_the_filesystem() {
        let mut m = machine(EMPTY, "write /f #tag\nassert content /f #tag\necho issue #42\n");
        assert!(m.run().is_ok());
        assert_eq!(m.fs.read(&p("/f")).unwrap(), b"#tag");
        assert_eq!(m.output.last().map(String::as_str), Some("issue #42"));
    }

    #[test]
    fn custom_prompt_is_echoed() {
        let mut m = machine(EMPTY, "pwd\n").with_prompt("[user@host]$ ");
        m.run();
        assert_eq!(m.output[0], "[user@host]$ pwd");
    }
}
