use std::path::PathBuf;

use script::DEFAULT_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One status line on stderr.
    #[default]
    Text,
    /// The `RunResult` as a JSON object on stdout.
    Json,
}

impl ReportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
        }
    }
}

#[cfg(feature = "clap")]
impl clap::ValueEnum for ReportFormat {
    fn value_variants<'a>() -> &'a [Self] {
        const ALL: [ReportFormat; 2] = [ReportFormat::Text, ReportFormat::Json];
        &ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Everything a single run needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub vfs_path: PathBuf,
    pub startup_path: PathBuf,
    pub prompt: String,
    pub report: ReportFormat,
    pub dump_vfs: bool,
    pub quiet: bool,
}

impl Config {
    pub fn new(vfs_path: impl Into<PathBuf>, startup_path: impl Into<PathBuf>) -> Self {
        Self {
            vfs_path: vfs_path.into(),
            startup_path: startup_path.into(),
            prompt: DEFAULT_PROMPT.to_string(),
            report: ReportFormat::default(),
            dump_vfs: false,
            quiet: false,
        }
    }
}
