//! C4 — Inode Table.
//!
//! A bijective `ino ⇄ path` mapping with a strictly monotonic counter;
//! freed inos are never reused (spec §3/§4.4). Ino 1 is reserved for the
//! root path `.`.

use crate::path::CanonicalPath;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const ROOT_INO: u64 = 1;

pub struct InodeTable {
    path_to_ino: DashMap<CanonicalPath, u64>,
    ino_to_path: DashMap<u64, CanonicalPath>,
    next_ino: AtomicU64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let table = Self {
            path_to_ino: DashMap::new(),
            ino_to_path: DashMap::new(),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        };
        table
            .path_to_ino
            .insert(CanonicalPath::root(), ROOT_INO);
        table.ino_to_path.insert(ROOT_INO, CanonicalPath::root());
        table
    }

    pub fn path_of(&self, ino: u64) -> Option<CanonicalPath> {
        self.ino_to_path.get(&ino).map(|e| e.clone())
    }

    pub fn ino_of(&self, path: &CanonicalPath) -> Option<u64> {
        self.path_to_ino.get(path).map(|e| *e)
    }

    /// Returns the existing ino for `path`, allocating a fresh one if
    /// this is the first time the path has been observed (spec §4.4
    /// "A lookup from kernel for an unknown path allocates a new ino").
    pub fn ino_of_or_allocate(&self, path: &CanonicalPath) -> u64 {
        if let Some(ino) = self.path_to_ino.get(path) {
            return *ino;
        }
        let new_ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        self.path_to_ino.insert(path.clone(), new_ino);
        self.ino_to_path.insert(new_ino, path.clone());
        new_ino
    }

    /// Drops `path` from the table after a successful unlink/rmdir. The
    /// ino becomes a tombstone: a later `create` of the same path
    /// allocates a brand-new ino (generation bump), never this one.
    pub fn forget(&self, path: &CanonicalPath) {
        if let Some((_, ino)) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }

    /// Re-keys both directions for a successful rename, in a single
    /// critical section per path (spec §4.4). If `new` already named a
    /// live ino, that ino is invalidated first so it stops resolving to
    /// the (now overwritten) path.
    pub fn rename(&self, old: &CanonicalPath, new: &CanonicalPath) {
        if let Some((_, stale_ino)) = self.path_to_ino.remove(new) {
            self.ino_to_path.remove(&stale_ino);
        }
        if let Some((_, ino)) = self.path_to_ino.remove(old) {
            self.path_to_ino.insert(new.clone(), ino);
            self.ino_to_path.insert(ino, new.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_ino_one() {
        let table = InodeTable::new();
        assert_eq!(table.ino_of(&CanonicalPath::root()), Some(ROOT_INO));
        assert_eq!(table.path_of(ROOT_INO), Some(CanonicalPath::root()));
    }

    #[test]
    fn allocation_is_monotonic_and_stable() {
        let table = InodeTable::new();
        let a = crate::path::normalize("./a").unwrap();
        let ino1 = table.ino_of_or_allocate(&a);
        let ino2 = table.ino_of_or_allocate(&a);
        assert_eq!(ino1, ino2);
        assert!(ino1 > ROOT_INO);
    }

    #[test]
    fn unlink_then_recreate_bumps_generation() {
        let table = InodeTable::new();
        let a = crate::path::normalize("./a").unwrap();
        let ino1 = table.ino_of_or_allocate(&a);
        table.forget(&a);
        assert_eq!(table.ino_of(&a), None);
        let ino2 = table.ino_of_or_allocate(&a);
        assert_ne!(ino1, ino2);
    }

    #[test]
    fn rename_rekeys_both_directions() {
        let table = InodeTable::new();
        let a = crate::path::normalize("./a").unwrap();
        let b = crate::path::normalize("./b").unwrap();
        let ino = table.ino_of_or_allocate(&a);
        table.rename(&a, &b);
        assert_eq!(table.ino_of(&a), None);
        assert_eq!(table.ino_of(&b), Some(ino));
        assert_eq!(table.path_of(ino), Some(b));
    }

    #[test]
    fn rename_onto_existing_path_invalidates_its_ino() {
        let table = InodeTable::new();
        let a = crate::path::normalize("./a").unwrap();
        let b = crate::path::normalize("./b").unwrap();
        let ino_a = table.ino_of_or_allocate(&a);
        let ino_b = table.ino_of_or_allocate(&b);
        table.rename(&a, &b);
        assert_eq!(table.ino_of(&b), Some(ino_a));
        assert_eq!(table.path_of(ino_b), None);
    }
}
