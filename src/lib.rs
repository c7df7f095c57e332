use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use script::{Machine, RunResult, ScriptError, parse_script};
use vfs::{LoadError, VirtualFilesystem, load_csv};

mod config;

pub use config::{Config, ReportFormat};
pub use script::RunStatus;

pub const BANNER: &str = r#"
================================================================================
VFS-EMU // CSV-BACKED SHELL EMULATOR
================================================================================
Commands: ls [-l] [path], cd, pwd, read, tac, create, write, touch, mkdir [-p],
          delete [-r], chmod <mode> <path>, assert, echo, vfs-info, exit.
"#;

/// Errors that stop a session before or while loading its inputs.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl EmuError {
    /// Load, parse and configuration problems all exit with 2, keeping 1 for
    /// a script that ran and failed.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// What a finished run leaves behind.
#[derive(Debug)]
pub struct Outcome {
    pub result: RunResult,
    pub transcript: Vec<String>,
    pub fs: VirtualFilesystem,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        self.result.exit_code()
    }
}

fn read_resource(path: &Path) -> Result<Vec<u8>, EmuError> {
    fs::read(path).map_err(|source| EmuError::Io { path: path.to_path_buf(), source })
}

/// Load, parse and run from in-memory inputs.
pub fn run_sources(vfs_name: &str, vfs_csv: &[u8], script_text: &str, prompt: &str) -> Result<Outcome, EmuError> {
    let fs = load_csv(vfs_name, vfs_csv)?;
    info!("vfs {}: {} entries", vfs_name, fs.len());

    let script = parse_script(script_text)?;
    info!("startup script: {} instructions", script.len());

    let mut machine = Machine::new(fs, script.instructions).with_prompt(prompt);
    let result = machine.run();
    if result.is_ok() {
        info!("{}", result.message);
    } else {
        warn!("{}", result.message);
    }
    Ok(Outcome {
        result,
        transcript: std::mem::take(&mut machine.output),
        fs: machine.into_fs(),
    })
}

/// Read both resources from disk, one after the other, then run.
pub fn run(config: &Config) -> Result<Outcome, EmuError> {
    let vfs_csv = read_resource(&config.vfs_path)?;
    let vfs_name = config
        .vfs_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.vfs_path.display().to_string());

    let script_bytes = read_resource(&config.startup_path)?;
    let script_text = String::from_utf8(script_bytes).map_err(|e| EmuError::Io {
        path: config.startup_path.clone(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;

    run_sources(&vfs_name, &vfs_csv, &script_text, &config.prompt)
}

/// Final status line, e.g. `[script] ok: completed 3 steps`.
pub fn status_line(result: &RunResult) -> String {
    match result.status {
        RunStatus::Ok => format!("[script] ok: {}", result.message),
        RunStatus::Failed => format!("[script] failed: {}", result.message),
    }
}

pub fn render_json(result: &RunResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}
