use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use emu_core::{BANNER, Config, ReportFormat, render_json, status_line};
use log::{LevelFilter, debug};

#[derive(Parser, Debug)]
#[command(name = "vfs-emu")]
#[command(about = "Load a CSV virtual filesystem and run a startup script against it.", long_about = None)]
#[command(version)]
struct Cli {
    /// CSV file describing the virtual filesystem.
    #[arg(long, value_name = "CSV")]
    vfs: PathBuf,

    /// Startup script, one instruction per line.
    #[arg(long, value_name = "SCRIPT")]
    startup: PathBuf,

    /// Prefix echoed before every executed line.
    #[arg(long, default_value = "$ ")]
    prompt: String,

    /// How to report the final result.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,

    /// Print the final filesystem as CSV after the run.
    #[arg(long)]
    dump_vfs: bool,

    /// Do not print the banner and transcript.
    #[arg(short, long)]
    quiet: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.vfs, self.startup);
        config.prompt = self.prompt;
        config.report = self.report;
        config.dump_vfs = self.dump_vfs;
        config.quiet = self.quiet;
        config
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

fn session(config: &Config) -> Result<i32> {
    debug!("config: {:?}", config);
    let outcome = match emu_core::run(config) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("error: {}", err);
            return Ok(err.exit_code());
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !config.quiet {
        writeln!(out, "{}", BANNER.trim())?;
        for line in &outcome.transcript {
            writeln!(out, "{}", line)?;
        }
    }
    if config.dump_vfs {
        let csv = outcome.fs.to_csv().context("serializing the final VFS")?;
        write!(out, "{}", csv)?;
    }
    match config.report {
        ReportFormat::Text => eprintln!("{}", status_line(&outcome.result)),
        ReportFormat::Json => {
            let json = render_json(&outcome.result).context("encoding the run result")?;
            writeln!(out, "{}", json)?;
        }
    }
    out.flush()?;
    Ok(outcome.exit_code())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.into_config();
    match session(&config) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
