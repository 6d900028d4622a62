/// Portable, normalised path keys.
///
/// Every path the index stores is an absolute path rendered with `/`
/// separators, so snapshots written on one OS load unchanged on another.
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexPath(String);

impl IndexPath {
    /// Normalise a native path.
    pub fn from_path(path: &Path) -> Self {
        Self(normalize(&os_str_key(path.as_os_str()), cfg!(windows)))
    }

    /// Wrap a string that is already in normalised form (snapshot keys).
    pub fn from_normalized(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Append one path segment.
    pub fn join(&self, name: &str) -> Self {
        if self.0.ends_with('/') {
            Self(format!("{}{name}", self.0))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// Last segment, or the whole string for a bare root.
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) if idx + 1 < self.0.len() => &self.0[idx + 1..],
            _ => &self.0,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        let idx = self.0.rfind('/')?;
        if idx + 1 == self.0.len() {
            // "/" or "//server/share/" style roots have no parent.
            return None;
        }
        if idx == 0 {
            return Some(Self("/".to_string()));
        }
        let head = &self.0[..idx];
        if head.ends_with(':') && !head.contains('/') {
            // Drive root: the parent of "C:/Users" is "C:/".
            return Some(Self(format!("{head}/")));
        }
        Some(Self(head.to_string()))
    }

    /// Path relative to `base`, without a leading separator. `Some("")`
    /// when the two are equal.
    pub fn relative_to<'a>(&'a self, base: &IndexPath) -> Option<&'a str> {
        if self.0 == base.0 {
            return Some("");
        }
        let rest = self.0.strip_prefix(base.0.as_str())?;
        if base.0.ends_with('/') {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }

    /// `true` if `self` is `base` or lies below it.
    pub fn starts_with(&self, base: &IndexPath) -> bool {
        self.relative_to(base).is_some()
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a native name (or whole path) as key text.
///
/// Valid Unicode passes through untouched. Otherwise each undecodable unit
/// is percent-escaped (`%E9` for a stray byte, `%uD800` for a lone UTF-16
/// surrogate) and `%` itself becomes `%25`, so two names that differ only
/// in undecodable bytes still get distinct keys.
pub fn os_str_key(s: &OsStr) -> Cow<'_, str> {
    match s.to_str() {
        Some(valid) => Cow::Borrowed(valid),
        None => Cow::Owned(escape_invalid(s)),
    }
}

#[cfg(unix)]
fn escape_invalid(s: &OsStr) -> String {
    use std::os::unix::ffi::OsStrExt;
    escape_bytes(s.as_bytes())
}

#[cfg(windows)]
fn escape_invalid(s: &OsStr) -> String {
    use std::os::windows::ffi::OsStrExt;
    let mut out = String::new();
    for unit in char::decode_utf16(s.encode_wide()) {
        match unit {
            Ok('%') => out.push_str("%25"),
            Ok(c) => out.push(c),
            Err(e) => out.push_str(&format!("%u{:04X}", e.unpaired_surrogate())),
        }
    }
    out
}

#[cfg(not(any(unix, windows)))]
fn escape_invalid(s: &OsStr) -> String {
    s.to_string_lossy().into_owned()
}

#[cfg_attr(not(unix), allow(dead_code))]
fn escape_bytes(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 8);
    while !bytes.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                push_percent_escaped(&mut out, valid);
                break;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    push_percent_escaped(&mut out, valid);
                }
                let bad = e.error_len().unwrap_or(rest.len());
                for b in &rest[..bad] {
                    out.push_str(&format!("%{b:02X}"));
                }
                bytes = &rest[bad..];
            }
        }
    }
    out
}

#[cfg_attr(not(unix), allow(dead_code))]
fn push_percent_escaped(out: &mut String, valid: &str) {
    for c in valid.chars() {
        if c == '%' {
            out.push_str("%25");
        } else {
            out.push(c);
        }
    }
}

/// String-level normalisation, split out so both flavours are testable on
/// any host.
///
/// On Windows-style input, `\` becomes `/`, the `\\?\` verbatim prefix that
/// `canonicalize` produces is dropped (`\\?\UNC\srv\share` → `//srv/share`),
/// and drive letters stay as the first segment (`C:/Users`). Repeated
/// separators collapse, except the leading pair of a UNC path. A trailing
/// separator is removed unless the path is a bare root.
pub(crate) fn normalize(raw: &str, windows: bool) -> String {
    let mut s = if windows {
        raw.replace('\\', "/")
    } else {
        raw.to_string()
    };

    let mut unc = false;
    if windows {
        if let Some(rest) = s.strip_prefix("//?/UNC/") {
            s = format!("//{rest}");
            unc = true;
        } else if let Some(rest) = s.strip_prefix("//?/") {
            s = rest.to_string();
        } else if s.starts_with("//") {
            unc = true;
        }
    }

    let mut out = String::with_capacity(s.len());
    if unc {
        out.push_str("//");
        s = s.trim_start_matches('/').to_string();
    }
    let mut prev_slash = unc;
    for ch in s.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }

    let is_bare_root = out == "/" || out == "//" || (windows && out.len() == 3 && out.ends_with(":/"));
    if out.len() > 1 && out.ends_with('/') && !is_bare_root {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_paths_are_left_alone() {
        assert_eq!(normalize("/home/user/a.txt", false), "/home/user/a.txt");
        assert_eq!(normalize("/home//user/", false), "/home/user");
        assert_eq!(normalize("/", false), "/");
    }

    #[test]
    fn backslashes_are_literal_on_posix() {
        assert_eq!(normalize("/tmp/odd\\name", false), "/tmp/odd\\name");
    }

    #[test]
    fn windows_drive_paths_use_forward_slashes() {
        assert_eq!(normalize("C:\\Users\\me\\a.txt", true), "C:/Users/me/a.txt");
        assert_eq!(normalize("C:\\", true), "C:/");
        assert_eq!(normalize("\\\\?\\C:\\Data\\x", true), "C:/Data/x");
    }

    #[test]
    fn windows_unc_paths_keep_their_leading_pair() {
        assert_eq!(normalize("\\\\server\\share\\dir", true), "//server/share/dir");
        assert_eq!(normalize("\\\\?\\UNC\\server\\share\\f", true), "//server/share/f");
    }

    #[test]
    fn undecodable_bytes_get_distinct_escaped_keys() {
        assert_eq!(escape_bytes(b"caf\xe9.txt"), "caf%E9.txt");
        assert_eq!(escape_bytes(b"caf\xe8.txt"), "caf%E8.txt");
        assert_eq!(escape_bytes(b"100%\xff"), "100%25%FF");
        assert_eq!(escape_bytes(b"\xc3\xa9t\xe9"), "\u{e9}t%E9");
        assert_eq!(os_str_key(OsStr::new("plain 100%.txt")), "plain 100%.txt");
    }

    #[test]
    fn join_parent_and_file_name() {
        let root = IndexPath::from_normalized("/data");
        let file = root.join("b").join("c.txt");
        assert_eq!(file.as_str(), "/data/b/c.txt");
        assert_eq!(file.file_name(), "c.txt");
        assert_eq!(file.parent().unwrap().as_str(), "/data/b");
        assert_eq!(root.parent().unwrap().as_str(), "/");
        assert!(IndexPath::from_normalized("/").parent().is_none());
        assert_eq!(IndexPath::from_normalized("/").join("etc").as_str(), "/etc");
    }

    #[test]
    fn relative_to_respects_segment_boundaries() {
        let root = IndexPath::from_normalized("/data");
        assert_eq!(IndexPath::from_normalized("/data/b/c").relative_to(&root), Some("b/c"));
        assert_eq!(root.relative_to(&root), Some(""));
        assert_eq!(IndexPath::from_normalized("/database").relative_to(&root), None);
        let slash = IndexPath::from_normalized("/");
        assert_eq!(IndexPath::from_normalized("/etc").relative_to(&slash), Some("etc"));
    }
}
