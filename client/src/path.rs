//! C1 — Path Normalizer.
//!
//! Maps kernel inode numbers to canonical relative paths and back, and
//! validates every name the kernel hands us before it reaches any other
//! component. Pure and side-effect free, per spec §4.7.

use crate::fs_error::FsError;
use std::ffi::OsStr;
use std::fmt;

/// A canonical relative path: `.` for the mount root, `./a/b/c` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    pub const ROOT: &'static str = ".";

    pub fn root() -> Self {
        CanonicalPath(Self::ROOT.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path with the `./` prefix (or root's leading `.`) stripped,
    /// suitable for use as the server's `relPath` query value.
    pub fn as_rel_path(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            self.0.strip_prefix("./").unwrap_or(&self.0)
        }
    }

    pub fn basename(&self) -> &str {
        if self.is_root() {
            return Self::ROOT;
        }
        self.as_rel_path().rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> CanonicalPath {
        if self.is_root() {
            return self.clone();
        }
        match self.as_rel_path().rsplit_once('/') {
            Some((parent, _)) => CanonicalPath(format!("./{parent}")),
            None => CanonicalPath::root(),
        }
    }

    /// Builds a synthetic key for internal, non-kernel-visible cache
    /// entries (e.g. `statfs`'s volume summary). The leading NUL makes it
    /// impossible for any real path produced by `join`/`normalize` to
    /// collide with it, since both reject NUL bytes.
    pub fn sentinel(tag: &str) -> CanonicalPath {
        CanonicalPath(format!("\0{tag}"))
    }

    /// True if `self` is `other` or a descendant of it; used for
    /// subtree invalidation (spec §4.3).
    pub fn is_within(&self, other: &CanonicalPath) -> bool {
        if other.is_root() {
            return true;
        }
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw component name (as handed over by the kernel via
/// `OsStr`) and joins it onto an already-canonical parent.
pub fn join(parent: &CanonicalPath, name: &OsStr) -> Result<CanonicalPath, FsError> {
    let name = name
        .to_str()
        .ok_or_else(|| FsError::InvalidArgument("non-UTF-8 name".into()))?;
    join_str(parent, name)
}

pub fn join_str(parent: &CanonicalPath, name: &str) -> Result<CanonicalPath, FsError> {
    validate_component(name)?;
    if parent.is_root() {
        Ok(CanonicalPath(format!("./{name}")))
    } else {
        Ok(CanonicalPath(format!("{parent}/{name}")))
    }
}

/// Normalizes an arbitrary server-relative path string (e.g. the `name`
/// field of a `/list` entry, or a path received from the push channel)
/// into canonical form.
pub fn normalize(raw: &str) -> Result<CanonicalPath, FsError> {
    if raw.is_empty() || raw == "." || raw == "./" {
        return Ok(CanonicalPath::root());
    }
    let trimmed = raw.trim_start_matches("./").trim_matches('/');
    if trimmed.is_empty() {
        return Ok(CanonicalPath::root());
    }
    let mut components = Vec::new();
    for part in trimmed.split('/') {
        validate_component(part)?;
        components.push(part);
    }
    Ok(CanonicalPath(format!("./{}", components.join("/"))))
}

fn validate_component(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidArgument(format!(
            "invalid path component: {name:?}"
        )));
    }
    if name.contains('\0') {
        return Err(FsError::InvalidArgument("null byte in name".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_dot() {
        assert_eq!(CanonicalPath::root().as_str(), ".");
        assert_eq!(normalize("").unwrap().as_str(), ".");
        assert_eq!(normalize(".").unwrap().as_str(), ".");
    }

    #[test]
    fn joins_under_root() {
        let root = CanonicalPath::root();
        let child = join_str(&root, "hello.txt").unwrap();
        assert_eq!(child.as_str(), "./hello.txt");
        assert_eq!(child.as_rel_path(), "hello.txt");
    }

    #[test]
    fn joins_nested() {
        let a = normalize("./a").unwrap();
        let ab = join_str(&a, "b").unwrap();
        assert_eq!(ab.as_str(), "./a/b");
        assert_eq!(ab.parent().as_str(), "./a");
        assert_eq!(ab.basename(), "b");
    }

    #[test]
    fn rejects_traversal() {
        assert!(join_str(&CanonicalPath::root(), "..").is_err());
        assert!(normalize("./a/../b").is_err());
    }

    #[test]
    fn rejects_null_byte() {
        assert!(join_str(&CanonicalPath::root(), "a\0b").is_err());
    }

    #[test]
    fn subtree_containment() {
        let a = normalize("./a").unwrap();
        let ab = normalize("./a/b").unwrap();
        let c = normalize("./c").unwrap();
        assert!(ab.is_within(&a));
        assert!(a.is_within(&a));
        assert!(!c.is_within(&a));
        assert!(a.is_within(&CanonicalPath::root()));
    }

    #[test]
    fn unicode_roundtrip() {
        let p = normalize("./café/naïve.txt").unwrap();
        assert_eq!(p.as_rel_path(), "café/naïve.txt");
    }
}
