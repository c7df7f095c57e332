use std::fmt;

/// A normalized absolute path inside the virtual filesystem.
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// never contains empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VPath(String);

impl VPath {
    pub fn root() -> Self {
        VPath("/".to_string())
    }

    /// Resolve `input` against `cwd`. Absolute input ignores `cwd`.
    /// `..` at the root stays at the root.
    pub fn resolve(cwd: &VPath, input: &str) -> Self {
        let mut parts: Vec<&str> = if input.starts_with('/') {
            Vec::new()
        } else {
            cwd.segments().collect()
        };
        for seg in input.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                s => parts.push(s),
            }
        }
        Self::from_segments(parts)
    }

    /// Strict parse used by the loader: relative input is taken from the root
    /// and `..` is rejected.
    pub fn parse_strict(input: &str) -> Option<Self> {
        let mut parts = Vec::new();
        for seg in input.split('/') {
            match seg {
                "" | "." => {}
                ".." => return None,
                s => parts.push(s),
            }
        }
        Some(Self::from_segments(parts))
    }

    fn from_segments<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut s = String::new();
        for p in parts {
            s.push('/');
            s.push_str(p);
        }
        if s.is_empty() {
            s.push('/');
        }
        VPath(s)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// `None` for the root.
    pub fn parent(&self) -> Option<VPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(VPath::root()),
            Some(i) => Some(VPath(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Last segment; empty for the root.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(i) => &self.0[i + 1..],
            None => &self.0,
        }
    }

    pub fn join(&self, name: &str) -> VPath {
        Self::resolve(self, name)
    }

    /// Every proper ancestor from the root down, excluding `self`.
    pub fn ancestors(&self) -> Vec<VPath> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            cur = p.parent();
            out.push(p);
        }
        out.reverse();
        out
    }

    /// True when `self` lies strictly below `dir`.
    pub fn is_descendant_of(&self, dir: &VPath) -> bool {
        if dir.is_root() {
            return !self.is_root();
        }
        self.0.len() > dir.0.len()
            && self.0.starts_with(dir.as_str())
            && self.0.as_bytes()[dir.0.len()] == b'/'
    }
}

impl fmt::Display for VPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
