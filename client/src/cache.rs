//! C3 — Attribute & Dirent Cache.
//!
//! A TTL-keyed store, sharded via `dashmap` so no single lock is held
//! across upcalls (spec §5 "no upcall holds a cache lock across a
//! network call"). `invalidate_subtree` does a prefix scan over both
//! maps for rename/rmdir (spec §4.3).

use crate::config::{CacheConfig, CacheStrategy};
use crate::path::CanonicalPath;
use crate::remote::VolumeStats;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub ino: u64,
    pub kind: AttrKind,
    pub size: u64,
    pub mode: u16,
    pub mtime_s: i64,
    pub atime_s: i64,
    pub ctime_s: i64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    File,
    Dir,
}

impl Attr {
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(512)
    }
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: AttrKind,
    pub ino: u64,
}

struct TtlEntry<T> {
    value: T,
    deadline: Instant,
}

impl<T> TtlEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.deadline
    }
}

pub struct Cache {
    attrs: DashMap<CanonicalPath, TtlEntry<Attr>>,
    dirs: DashMap<CanonicalPath, TtlEntry<Vec<DirEntry>>>,
    stats: DashMap<CanonicalPath, TtlEntry<VolumeStats>>,
    attr_ttl: Duration,
    dir_ttl: Duration,
    enabled: bool,
}

impl Cache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            attrs: DashMap::new(),
            dirs: DashMap::new(),
            stats: DashMap::new(),
            attr_ttl: Duration::from_secs(config.attr_ttl_seconds),
            dir_ttl: Duration::from_secs(config.dir_ttl_seconds),
            enabled: config.strategy != CacheStrategy::None,
        }
    }

    pub fn get_attr(&self, path: &CanonicalPath) -> Option<Attr> {
        let entry = self.attrs.get(path)?;
        if entry.is_live() {
            Some(entry.value)
        } else {
            drop(entry);
            self.attrs.remove(path);
            None
        }
    }

    pub fn put_attr(&self, path: CanonicalPath, attr: Attr) {
        if !self.enabled {
            return;
        }
        self.attrs.insert(path, TtlEntry::new(attr, self.attr_ttl));
    }

    pub fn invalidate_attr(&self, path: &CanonicalPath) {
        self.attrs.remove(path);
    }

    pub fn get_dir(&self, path: &CanonicalPath) -> Option<Vec<DirEntry>> {
        let entry = self.dirs.get(path)?;
        if entry.is_live() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.dirs.remove(path);
            None
        }
    }

    pub fn put_dir(&self, path: CanonicalPath, entries: Vec<DirEntry>) {
        if !self.enabled {
            return;
        }
        self.dirs.insert(path, TtlEntry::new(entries, self.dir_ttl));
    }

    pub fn invalidate_dir(&self, path: &CanonicalPath) {
        self.dirs.remove(path);
    }

    /// Invalidates every attr/dir entry at or below `path` (rename and
    /// rmdir, spec §4.3).
    pub fn invalidate_subtree(&self, path: &CanonicalPath) {
        self.attrs.retain(|p, _| !p.is_within(path));
        self.dirs.retain(|p, _| !p.is_within(path));
    }

    /// `statfs`'s volume summary, cached under a synthetic key for the
    /// attribute TTL (spec §4.1).
    pub fn get_stats(&self, key: &CanonicalPath) -> Option<VolumeStats> {
        let entry = self.stats.get(key)?;
        if entry.is_live() {
            Some(entry.value)
        } else {
            drop(entry);
            self.stats.remove(key);
            None
        }
    }

    pub fn put_stats(&self, key: CanonicalPath, stats: VolumeStats) {
        if !self.enabled {
            return;
        }
        self.stats.insert(key, TtlEntry::new(stats, self.attr_ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attr(ino: u64) -> Attr {
        Attr {
            ino,
            kind: AttrKind::File,
            size: 42,
            mode: 0o644,
            mtime_s: 0,
            atime_s: 0,
            ctime_s: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
        }
    }

    #[test]
    fn put_then_get_hits() {
        let cache = Cache::new(&CacheConfig::default());
        let p = CanonicalPath::root();
        cache.put_attr(p.clone(), sample_attr(1));
        assert_eq!(cache.get_attr(&p).unwrap().ino, 1);
    }

    #[test]
    fn ttl_expiry_evicts() {
        let mut cfg = CacheConfig::default();
        cfg.attr_ttl_seconds = 0;
        let cache = Cache::new(&cfg);
        let p = CanonicalPath::root();
        cache.put_attr(p.clone(), sample_attr(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_attr(&p).is_none());
    }

    #[test]
    fn subtree_invalidation() {
        let cache = Cache::new(&CacheConfig::default());
        let a = crate::path::normalize("./a").unwrap();
        let ab = crate::path::normalize("./a/b").unwrap();
        let c = crate::path::normalize("./c").unwrap();
        cache.put_attr(a.clone(), sample_attr(1));
        cache.put_attr(ab.clone(), sample_attr(2));
        cache.put_attr(c.clone(), sample_attr(3));
        cache.invalidate_subtree(&a);
        assert!(cache.get_attr(&a).is_none());
        assert!(cache.get_attr(&ab).is_none());
        assert!(cache.get_attr(&c).is_some());
    }

    #[test]
    fn none_strategy_never_stores() {
        let mut cfg = CacheConfig::default();
        cfg.strategy = CacheStrategy::None;
        let cache = Cache::new(&cfg);
        let p = CanonicalPath::root();
        cache.put_attr(p.clone(), sample_attr(1));
        assert!(cache.get_attr(&p).is_none());
    }
}
