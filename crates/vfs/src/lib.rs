// Virtual File System (VFS)
// In-memory directory tree loaded from a CSV description.
// Nothing in here touches the host filesystem; callers hand in bytes.

mod fs;
mod loader;
mod path;

use thiserror::Error;

pub use fs::{Body, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Entry, EntryKind, Source, VirtualFilesystem};
pub use loader::{LoadError, LoadErrorKind, load_csv};
pub use path::VPath;

/// Operations the startup interpreter performs against a filesystem.
pub trait Vfs {
    fn stat(&self, path: &VPath) -> Option<&Entry>;
    fn read(&self, path: &VPath) -> Result<&[u8], VfsError>;
    /// Create or overwrite a file.
    fn write(&mut self, path: &VPath, data: &[u8]) -> Result<(), VfsError>;
    /// Create a file that must not exist yet.
    fn create(&mut self, path: &VPath, data: &[u8]) -> Result<(), VfsError>;
    fn mkdir(&mut self, path: &VPath, parents: bool) -> Result<(), VfsError>;
    /// Returns the number of entries removed.
    fn remove(&mut self, path: &VPath, recursive: bool) -> Result<usize, VfsError>;
    /// Direct children of a directory, sorted by name.
    fn list(&self, path: &VPath) -> Result<Vec<(&str, &Entry)>, VfsError>;
    fn chmod(&mut self, path: &VPath, mode: u16) -> Result<(), VfsError>;
    fn source(&self) -> Option<&Source>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfsError {
    #[error("{path}: No such file or directory")]
    NotFound { path: VPath },
    #[error("{path}: File exists")]
    AlreadyExists { path: VPath },
    #[error("{path}: Not a directory")]
    NotADirectory { path: VPath },
    #[error("{path}: Is a directory")]
    IsADirectory { path: VPath },
    #[error("{path}: Directory not empty")]
    DirectoryNotEmpty { path: VPath },
    #[error("refusing to remove the root directory")]
    RootRemoval,
    #[error("{path}: content is not valid UTF-8")]
    InvalidUtf8 { path: VPath },
}

/// Parse a 3 or 4 digit octal permission string such as `644` or `0755`.
pub fn parse_mode(s: &str) -> Option<u16> {
    if !(3..=4).contains(&s.len()) || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return None;
    }
    u16::from_str_radix(s, 8).ok()
}
