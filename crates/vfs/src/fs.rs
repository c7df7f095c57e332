use std::collections::BTreeMap;

use crate::path::VPath;
use crate::{Vfs, VfsError};

pub const DEFAULT_DIR_MODE: u16 = 0o755;
pub const DEFAULT_FILE_MODE: u16 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Name used in the CSV `type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "dir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub mode: u16,
    pub body: Body,
}

impl Entry {
    pub fn file(content: Vec<u8>) -> Self {
        Entry { mode: DEFAULT_FILE_MODE, body: Body::File(content) }
    }

    pub fn dir() -> Self {
        Entry { mode: DEFAULT_DIR_MODE, body: Body::Dir }
    }

    pub fn kind(&self) -> EntryKind {
        match self.body {
            Body::File(_) => EntryKind::File,
            Body::Dir => EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.body, Body::Dir)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.body, Body::File(_))
    }

    pub fn content(&self) -> Option<&[u8]> {
        match &self.body {
            Body::File(c) => Some(c),
            Body::Dir => None,
        }
    }

    /// `d0755` / `-0644`, as printed by `ls -l`.
    pub fn mode_string(&self) -> String {
        let c = if self.is_dir() { 'd' } else { '-' };
        format!("{}{:04o}", c, self.mode)
    }
}

/// Where a filesystem was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub sha256: String,
}

/// Flat, ordered map of every entry keyed by normalized path.
/// The root is inserted on construction and never removed, and every other
/// entry's parent is a directory.
#[derive(Debug, Clone)]
pub struct VirtualFilesystem {
    pub(crate) entries: BTreeMap<VPath, Entry>,
    pub(crate) source: Option<Source>,
}

impl Default for VirtualFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFilesystem {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(VPath::root(), Entry::dir());
        Self { entries, source: None }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn paths(&self) -> impl Iterator<Item = &VPath> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VPath, &Entry)> {
        self.entries.iter()
    }

    pub fn set_source(&mut self, source: Source) {
        self.source = Some(source);
    }

    fn descendants<'a>(&'a self, dir: &VPath) -> impl Iterator<Item = (&'a VPath, &'a Entry)> {
        // Keys sharing the string prefix are contiguous; the segment check
        // drops siblings such as `/a-b` when scanning `/a`.
        self.entries
            .range(dir.clone()..)
            .take_while(move |(p, _)| p.as_str().starts_with(dir.as_str()))
            .filter(move |(p, _)| p.is_descendant_of(dir))
    }

    fn require_parent_dir(&self, path: &VPath) -> Result<(), VfsError> {
        let Some(parent) = path.parent() else {
            return Err(VfsError::AlreadyExists { path: path.clone() });
        };
        match self.entries.get(&parent) {
            None => Err(VfsError::NotFound { path: parent }),
            Some(e) if !e.is_dir() => Err(VfsError::NotADirectory { path: parent }),
            Some(_) => Ok(()),
        }
    }

    fn entry(&self, path: &VPath) -> Result<&Entry, VfsError> {
        self.entries.get(path).ok_or_else(|| VfsError::NotFound { path: path.clone() })
    }

    pub fn read_to_string(&self, path: &VPath) -> Result<&str, VfsError> {
        let bytes = self.read(path)?;
        std::str::from_utf8(bytes).map_err(|_| VfsError::InvalidUtf8 { path: path.clone() })
    }
}

impl Vfs for VirtualFilesystem {
    fn stat(&self, path: &VPath) -> Option<&Entry> {
        self.entries.get(path)
    }

    fn read(&self, path: &VPath) -> Result<&[u8], VfsError> {
        self.entry(path)?
            .content()
            .ok_or_else(|| VfsError::IsADirectory { path: path.clone() })
    }

    fn write(&mut self, path: &VPath, data: &[u8]) -> Result<(), VfsError> {
        if let Some(entry) = self.entries.get_mut(path) {
            return match &mut entry.body {
                Body::File(content) => {
                    *content = data.to_vec();
                    Ok(())
                }
                Body::Dir => Err(VfsError::IsADirectory { path: path.clone() }),
            };
        }
        self.require_parent_dir(path)?;
        self.entries.insert(path.clone(), Entry::file(data.to_vec()));
        Ok(())
    }

    fn create(&mut self, path: &VPath, data: &[u8]) -> Result<(), VfsError> {
        if self.entries.contains_key(path) {
            return Err(VfsError::AlreadyExists { path: path.clone() });
        }
        self.require_parent_dir(path)?;
        self.entries.insert(path.clone(), Entry::file(data.to_vec()));
        Ok(())
    }

    fn mkdir(&mut self, path: &VPath, parents: bool) -> Result<(), VfsError> {
        if !parents {
            if self.entries.contains_key(path) {
                return Err(VfsError::AlreadyExists { path: path.clone() });
            }
            self.require_parent_dir(path)?;
            self.entries.insert(path.clone(), Entry::dir());
            return Ok(());
        }
        let mut chain = path.ancestors();
        chain.push(path.clone());
        for p in chain {
            match self.entries.get(&p) {
                Some(e) if e.is_dir() => {}
                Some(_) => return Err(VfsError::NotADirectory { path: p }),
                None => {
                    self.entries.insert(p, Entry::dir());
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, path: &VPath, recursive: bool) -> Result<usize, VfsError> {
        if path.is_root() {
            return Err(VfsError::RootRemoval);
        }
        self.entry(path)?;
        let below: Vec<VPath> = self.descendants(path).map(|(p, _)| p.clone()).collect();
        if !below.is_empty() && !recursive {
            return Err(VfsError::DirectoryNotEmpty { path: path.clone() });
        }
        for p in &below {
            self.entries.remove(p);
        }
        self.entries.remove(path);
        Ok(below.len() + 1)
    }

    fn list(&self, path: &VPath) -> Result<Vec<(&str, &Entry)>, VfsError> {
        let entry = self.entry(path)?;
        if !entry.is_dir() {
            return Err(VfsError::NotADirectory { path: path.clone() });
        }
        Ok(self
            .descendants(path)
            .filter(|(p, _)| p.parent().as_ref() == Some(path))
            .map(|(p, e)| (p.file_name(), e))
            .collect())
    }

    fn chmod(&mut self, path: &VPath, mode: u16) -> Result<(), VfsError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| VfsError::NotFound { path: path.clone() })?;
        entry.mode = mode;
        Ok(())
    }

    fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VPath {
        VPath::resolve(&VPath::root(), s)
    }

    #[test]
    fn root_always_exists() {
        let fs = VirtualFilesystem::new();
        assert!(fs.stat(&VPath::root()).unwrap().is_dir());
        assert!(fs.is_empty());
    }

    #[test]
    fn create_requires_existing_parent_directory() {
        let mut fs = VirtualFilesystem::new();
        assert_eq!(
            fs.create(&p("/a/b.txt"), b"x"),
            Err(VfsError::NotFound { path: p("/a") })
        );
        fs.create(&p("/a"), b"").unwrap();
        assert_eq!(
            fs.create(&p("/a/b.txt"), b"x"),
            Err(VfsError::NotADirectory { path: p("/a") })
        );
        assert_eq!(fs.create(&p("/a"), b""), Err(VfsError::AlreadyExists { path: p("/a") }));
    }

    #[test]
    fn write_overwrites_files_but_not_directories() {
        let mut fs = VirtualFilesystem::new();
        fs.write(&p("/f"), b"one").unwrap();
        fs.write(&p("/f"), b"two").unwrap();
        assert_eq!(fs.read(&p("/f")).unwrap(), b"two");
        assert_eq!(fs.write(&VPath::root(), b""), Err(VfsError::IsADirectory { path: VPath::root() }));
    }

    #[test]
    fn mkdir_with_and_without_parents() {
        let mut fs = VirtualFilesystem::new();
        assert!(fs.mkdir(&p("/x/y"), false).is_err());
        fs.mkdir(&p("/x/y/z"), true).unwrap();
        assert!(fs.stat(&p("/x/y")).unwrap().is_dir());
        fs.mkdir(&p("/x/y"), true).unwrap();
        assert_eq!(fs.mkdir(&p("/x"), false), Err(VfsError::AlreadyExists { path: p("/x") }));
    }

    #[test]
    fn remove_needs_recursive_for_non_empty_dirs() {
        let mut fs = VirtualFilesystem::new();
        fs.mkdir(&p("/a/b"), true).unwrap();
        fs.write(&p("/a/b/c"), b"c").unwrap();
        fs.write(&p("/a-b"), b"sibling").unwrap();
        assert_eq!(fs.remove(&p("/a"), false), Err(VfsError::DirectoryNotEmpty { path: p("/a") }));
        assert_eq!(fs.remove(&p("/a"), true), Ok(3));
        assert!(fs.stat(&p("/a-b")).is_some());
        assert_eq!(fs.remove(&VPath::root(), true), Err(VfsError::RootRemoval));
        assert_eq!(fs.remove(&p("/gone"), false), Err(VfsError::NotFound { path: p("/gone") }));
    }

    #[test]
    fn list_returns_direct_children_only() {
        let mut fs = VirtualFilesystem::new();
        fs.mkdir(&p("/d/sub"), true).unwrap();
        fs.write(&p("/d/sub/deep"), b"").unwrap();
        fs.write(&p("/d/f"), b"").unwrap();
        fs.write(&p("/d-other"), b"").unwrap();
        let names: Vec<&str> = fs.list(&p("/d")).unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["f", "sub"]);
        assert!(matches!(fs.list(&p("/d/f")), Err(VfsError::NotADirectory { .. })));
    }

    #[test]
    fn mode_string_formats_kind_and_octal() {
        let mut fs = VirtualFilesystem::new();
        fs.write(&p("/f"), b"").unwrap();
        fs.chmod(&p("/f"), 0o600).unwrap();
        assert_eq!(fs.stat(&p("/f")).unwrap().mode_string(), "-0600");
        assert_eq!(fs.stat(&VPath::root()).unwrap().mode_string(), "d0755");
    }
}
