// CSV <-> VirtualFilesystem.
//
// One row per entry: path,type[,content][,encoding][,mode]. The header row is
// line 1, so the first entry reported in errors is line 2.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fs::{Body, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Entry, EntryKind, Source, VirtualFilesystem};
use crate::parse_mode;
use crate::path::VPath;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("CSV line {line}: {kind}")]
pub struct LoadError {
    pub line: u64,
    pub kind: LoadErrorKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadErrorKind {
    #[error("malformed CSV: {0}")]
    Csv(String),
    #[error("expected {expected} fields, found {found}")]
    ColumnCount { expected: u64, found: u64 },
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("empty `{0}` value")]
    EmptyField(&'static str),
    #[error("unknown type `{0}`")]
    UnknownKind(String),
    #[error("unknown encoding `{0}`")]
    UnknownEncoding(String),
    #[error("cannot decode base64 content: {0}")]
    Base64(String),
    #[error("invalid mode `{0}` (expected 3-4 octal digits)")]
    InvalidMode(String),
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("duplicate path {0}")]
    DuplicatePath(VPath),
    #[error("{path} already exists as a {}", .existing.as_str())]
    Conflict { path: VPath, existing: EntryKind },
    #[error("directory {0} cannot carry content")]
    DirectoryContent(VPath),
}

#[derive(Debug, Deserialize)]
struct Row {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    #[serde(default)]
    mode: String,
}

#[derive(Debug, Serialize)]
struct RowOut<'a> {
    path: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: String,
    encoding: &'static str,
    mode: String,
}

fn csv_error(err: csv::Error) -> LoadError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let kind = match err.kind() {
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => LoadErrorKind::ColumnCount {
            expected: *expected_len,
            found: *len,
        },
        _ => LoadErrorKind::Csv(err.to_string()),
    };
    LoadError { line, kind }
}

fn parse_kind(s: &str) -> Option<EntryKind> {
    match s.to_ascii_lowercase().as_str() {
        "file" => Some(EntryKind::File),
        "dir" | "directory" => Some(EntryKind::Directory),
        _ => None,
    }
}

fn decode_content(content: &str, encoding: &str) -> Result<Vec<u8>, LoadErrorKind> {
    match encoding.to_ascii_lowercase().as_str() {
        "" | "utf8" | "utf-8" | "text" => Ok(content.as_bytes().to_vec()),
        "base64" | "b64" | "binary" => BASE64
            .decode(content.trim())
            .map_err(|e| LoadErrorKind::Base64(e.to_string())),
        other => Err(LoadErrorKind::UnknownEncoding(other.to_string())),
    }
}

struct Builder {
    fs: VirtualFilesystem,
    explicit: BTreeSet<VPath>,
}

impl Builder {
    /// Create missing ancestors of `path` as directories.
    fn ensure_parents(&mut self, path: &VPath) -> Result<(), LoadErrorKind> {
        for anc in path.ancestors() {
            match self.fs.entries.get(&anc) {
                Some(e) if e.is_dir() => {}
                Some(e) => {
                    return Err(LoadErrorKind::Conflict { path: anc, existing: e.kind() });
                }
                None => {
                    trace!("implicit directory {}", anc);
                    self.fs.entries.insert(anc, Entry::dir());
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, row: Row) -> Result<(), LoadErrorKind> {
        // Paths are taken verbatim so that names written by `to_csv` load back
        // unchanged.
        let raw_path = row.path.as_str();
        let raw_kind = row.kind.trim();
        if raw_path.trim().is_empty() {
            return Err(LoadErrorKind::EmptyField("path"));
        }
        if raw_kind.is_empty() {
            return Err(LoadErrorKind::EmptyField("type"));
        }
        let path = VPath::parse_strict(raw_path)
            .ok_or_else(|| LoadErrorKind::InvalidPath(raw_path.to_string()))?;
        let kind = parse_kind(raw_kind).ok_or_else(|| LoadErrorKind::UnknownKind(raw_kind.to_string()))?;
        let mode = match row.mode.trim() {
            "" => None,
            m => Some(parse_mode(m).ok_or_else(|| LoadErrorKind::InvalidMode(m.to_string()))?),
        };
        if !self.explicit.insert(path.clone()) {
            return Err(LoadErrorKind::DuplicatePath(path));
        }
        self.ensure_parents(&path)?;

        match kind {
            EntryKind::Directory => {
                if !row.content.is_empty() {
                    return Err(LoadErrorKind::DirectoryContent(path));
                }
                match self.fs.entries.get_mut(&path) {
                    Some(e) if e.is_dir() => e.mode = mode.unwrap_or(e.mode),
                    Some(e) => {
                        return Err(LoadErrorKind::Conflict { path, existing: e.kind() });
                    }
                    None => {
                        let mut e = Entry::dir();
                        e.mode = mode.unwrap_or(DEFAULT_DIR_MODE);
                        self.fs.entries.insert(path, e);
                    }
                }
            }
            EntryKind::File => {
                if path.is_root() {
                    return Err(LoadErrorKind::InvalidPath(raw_path.to_string()));
                }
                if let Some(e) = self.fs.entries.get(&path) {
                    return Err(LoadErrorKind::Conflict { path, existing: e.kind() });
                }
                let data = decode_content(&row.content, row.encoding.trim())?;
                let mut e = Entry::file(data);
                e.mode = mode.unwrap_or(DEFAULT_FILE_MODE);
                self.fs.entries.insert(path, e);
            }
        }
        Ok(())
    }
}

/// Build a filesystem from the raw bytes of a CSV resource. `name` is
/// recorded as the source name together with the SHA-256 of `bytes`.
///
/// Any malformed row fails the whole load.
pub fn load_csv(name: &str, bytes: &[u8]) -> Result<VirtualFilesystem, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut builder = Builder { fs: VirtualFilesystem::new(), explicit: BTreeSet::new() };

    if !headers.is_empty() {
        for required in ["path", "type"] {
            if !headers.iter().any(|h| h.trim() == required) {
                return Err(LoadError { line: 1, kind: LoadErrorKind::MissingColumn(required) });
            }
        }
        let headers = csv::StringRecord::from(headers.iter().map(str::trim).collect::<Vec<_>>());
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let row: Row = record
                .deserialize(Some(&headers))
                .map_err(|e| LoadError { line, kind: LoadErrorKind::Csv(e.to_string()) })?;
            builder.apply(row).map_err(|kind| LoadError { line, kind })?;
        }
    }

    let mut fs = builder.fs;
    fs.set_source(Source {
        name: name.to_string(),
        sha256: hex::encode(Sha256::digest(bytes)),
    });
    debug!("loaded {} entries from {}", fs.len(), name);
    Ok(fs)
}

impl VirtualFilesystem {
    /// Serialize every entry except a default-mode root, in path order.
    /// File content that is not UTF-8 is written base64-encoded.
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (path, entry) in self.iter() {
            if path.is_root() && entry.mode == DEFAULT_DIR_MODE {
                continue;
            }
            let (content, encoding) = match &entry.body {
                Body::Dir => (String::new(), ""),
                Body::File(data) => match std::str::from_utf8(data) {
                    Ok(text) => (text.to_string(), ""),
                    Err(_) => (BASE64.encode(data), "base64"),
                },
            };
            writer.serialize(RowOut {
                path: path.as_str(),
                kind: entry.kind().as_str(),
                content,
                encoding,
                mode: format!("{:04o}", entry.mode),
            })?;
        }
        // An empty filesystem still gets its header.
        if self.is_empty() && self.entries.values().all(|e| e.mode == DEFAULT_DIR_MODE) {
            writer.write_record(["path", "type", "content", "encoding", "mode"])?;
        }
        let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vfs;

    fn p(s: &str) -> VPath {
        VPath::resolve(&VPath::root(), s)
    }

    #[test]
    fn loads_files_dirs_and_implicit_parents() {
        let csv = "path,type,content,encoding\n\
                   /etc,dir,,\n\
                   /etc/motd,file,\"hello, world\",\n\
                   /bin/blob,file,AAEC,base64\n";
        let fs = load_csv("vfs.csv", csv.as_bytes()).unwrap();
        assert_eq!(fs.read(&p("/etc/motd")).unwrap(), b"hello, world");
        assert_eq!(fs.read(&p("/bin/blob")).unwrap(), &[0u8, 1, 2]);
        assert!(fs.stat(&p("/bin")).unwrap().is_dir());
        let src = fs.source().unwrap();
        assert_eq!(src.name, "vfs.csv");
        assert_eq!(src.sha256.len(), 64);
    }

    #[test]
    fn header_only_yields_just_the_root() {
        let fs = load_csv("empty.csv", b"path,type,content\n").unwrap();
        assert!(fs.is_empty());
    }

    #[test]
    fn duplicate_path_fails_with_its_line() {
        let csv = "path,type,content\n/a.txt,file,one\n/b,dir,\n/a.txt,file,two\n";
        let err = load_csv("dup.csv", csv.as_bytes()).unwrap_err();
        assert_eq!(err.line, 4);
        assert_eq!(err.kind, LoadErrorKind::DuplicatePath(p("/a.txt")));
    }

    #[test]
    fn normalized_duplicates_are_detected() {
        let csv = "path,type,content\n/a/./b,dir,\na//b/,dir,\n";
        let err = load_csv("dup.csv", csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::DuplicatePath(p("/a/b")));
    }

    #[test]
    fn wrong_column_count_fails() {
        let csv = "path,type,content\n/a,file,x\n/b,file\n";
        let err = load_csv("bad.csv", csv.as_bytes()).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, LoadErrorKind::ColumnCount { expected: 3, found: 2 });
    }

    #[test]
    fn unknown_kind_and_encoding_fail() {
        let err = load_csv("x", b"path,type,content\n/a,symlink,\n").unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::UnknownKind("symlink".into()));
        let err = load_csv("x", b"path,type,content,encoding\n/a,file,x,rot13\n").unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::UnknownEncoding("rot13".into()));
    }

    #[test]
    fn file_below_file_conflicts() {
        let csv = "path,type,content\n/a,file,x\n/a/b,file,y\n";
        let err = load_csv("x", csv.as_bytes()).unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::Conflict { path: p("/a"), existing: EntryKind::File });
    }

    #[test]
    fn missing_required_column_is_reported_on_the_header() {
        let err = load_csv("x", b"name,type\n/a,file\n").unwrap_err();
        assert_eq!(err, LoadError { line: 1, kind: LoadErrorKind::MissingColumn("path") });
    }

    #[test]
    fn dotdot_in_csv_path_is_rejected() {
        let err = load_csv("x", b"path,type\n/a/../b,dir\n").unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::InvalidPath("/a/../b".into()));
    }

    #[test]
    fn modes_are_parsed_and_defaulted() {
        let csv = "path,type,content,mode\n/s,dir,,0700\n/s/key,file,k,600\n/pub,file,p,\n";
        let fs = load_csv("x", csv.as_bytes()).unwrap();
        assert_eq!(fs.stat(&p("/s")).unwrap().mode, 0o700);
        assert_eq!(fs.stat(&p("/s/key")).unwrap().mode, 0o600);
        assert_eq!(fs.stat(&p("/pub")).unwrap().mode, DEFAULT_FILE_MODE);
        let err = load_csv("x", b"path,type,content,mode\n/a,file,,999\n").unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::InvalidMode("999".into()));
    }

    #[test]
    fn serializing_back_keeps_the_path_set() {
        let csv = "path,type,content,encoding\n\
                   /home/user/notes.txt,file,\"line1\nline2\",\n\
                   /var/log,dir,,\n\
                   /bin/raw,file,/w==,base64\n";
        let fs = load_csv("x", csv.as_bytes()).unwrap();
        let dumped = fs.to_csv().unwrap();
        let again = load_csv("y", dumped.as_bytes()).unwrap();
        let a: Vec<_> = fs.paths().collect();
        let b: Vec<_> = again.paths().collect();
        assert_eq!(a, b);
        assert_eq!(again.read(&p("/bin/raw")).unwrap(), &[0xffu8]);
        assert_eq!(again.read(&p("/home/user/notes.txt")).unwrap(), b"line1\nline2");
    }

    #[test]
    fn empty_path_or_type_is_rejected() {
        let err = load_csv("x", b"path,type\n/a,dir\n  ,dir\n").unwrap_err();
        assert_eq!(err, LoadError { line: 3, kind: LoadErrorKind::EmptyField("path") });
        let err = load_csv("x", b"path,type\n/a,\n").unwrap_err();
        assert_eq!(err, LoadError { line: 2, kind: LoadErrorKind::EmptyField("type") });
    }

    #[test]
    fn undecodable_base64_fails_the_load() {
        let err = load_csv("x", b"path,type,content,encoding\n/blob,file,not*base64!,base64\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, LoadErrorKind::Base64(_)), "{err}");
    }

    #[test]
    fn directory_rows_cannot_carry_content() {
        let err = load_csv("x", b"path,type,content\n/etc,dir,oops\n").unwrap_err();
        assert_eq!(err.kind, LoadErrorKind::DirectoryContent(p("/etc")));
    }

    #[test]
    fn root_cannot_be_a_file() {
        let err = load_csv("x", b"path,type,content\n/,file,x\n").unwrap_err();
        assert_eq!(err, LoadError { line: 2, kind: LoadErrorKind::InvalidPath("/".into()) });
    }

    #[test]
    fn whitespace_in_names_survives_a_dump() {
        let mut fs = VirtualFilesystem::new();
        fs.create(&p("/a "), b"x").unwrap();
        fs.mkdir(&p("/ dir"), false).unwrap();
        let again = load_csv("y", fs.to_csv().unwrap().as_bytes()).unwrap();
        let a: Vec<_> = fs.paths().collect();
        let b: Vec<_> = again.paths().collect();
        assert_eq!(a, b);
        assert_eq!(again.read(&p("/a ")).unwrap(), b"x");
    }

    #[test]
    fn empty_filesystem_serializes_to_a_loadable_header() {
        let dumped = VirtualFilesystem::new().to_csv().unwrap();
        assert!(load_csv("x", dumped.as_bytes()).unwrap().is_empty());
    }
}
