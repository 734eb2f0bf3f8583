//! Index snapshot (M2): an immutable, sorted view of the index,
//! partitioned into shards for the diff engine to fan out over.
//!
//! Invariant I1 (spec.md §3): once built, an `IndexSnapshot` is never
//! mutated — it is wrapped in `Arc` and handed to worker tasks, which
//! read it without any synchronization beyond the reference count.

use std::ops::Range;
use std::path::PathBuf;

use gix::bstr::BString;

/// Bits of `git`'s index entry flags this daemon cares about. Mirrors
/// the subset of `gix::index::entry::Flags` named in spec.md §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags {
    pub assume_unchanged: bool,
    pub skip_worktree: bool,
    pub intent_to_add: bool,
    pub conflicted: bool,
}

/// Cached stat fields recorded at the time the index entry was last
/// written — compared against a fresh `stat()` of the working tree
/// file to decide, without hashing, whether content could have changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedStat {
    pub dev: u64,
    pub ino: u64,
    pub mtime_secs: u32,
    pub mtime_nanos: u32,
    pub ctime_secs: u32,
    pub ctime_nanos: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Forward-slash separated, no leading slash (spec.md §3).
    pub path: BString,
    pub oid: gix::ObjectId,
    pub mode: gix::index::entry::Mode,
    pub stat: CachedStat,
    pub flags: EntryFlags,
}

impl IndexEntry {
    /// The top-level (first path component) directory name, used by
    /// the shard-boundary algorithm to keep a subdirectory's entries
    /// within one shard.
    pub fn top_level_dir(&self) -> &[u8] {
        match self.path.iter().position(|&b| b == b'/') {
            Some(pos) => &self.path[..pos],
            None => &self.path[..],
        }
    }

    pub fn is_submodule(&self) -> bool {
        self.mode == gix::index::entry::Mode::COMMIT
    }
}

/// An immutable, lexicographically-sorted view of the index, divided
/// into disjoint shards whose boundaries never split a directory
/// across two shards (required for correct untracked-file detection,
/// spec.md §4.M2).
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    entries: Vec<IndexEntry>,
    shards: Vec<Range<usize>>,
}

impl IndexSnapshot {
    pub fn build(mut entries: Vec<IndexEntry>, thread_count: usize) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let shards = compute_shard_boundaries(&entries, thread_count);
        Self { entries, shards }
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn shards(&self) -> &[Range<usize>] {
        &self.shards
    }

    pub fn shard_entries(&self, shard: Range<usize>) -> &[IndexEntry] {
        &self.entries[shard]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binary search for an exact path match; used by the staged
    /// (index-vs-HEAD) side-by-side walk.
    pub fn find(&self, path: &[u8]) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_slice().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Walks the sorted entries, opening a new shard once the current
/// shard has reached the target size *and* the next entry's top-level
/// directory differs from the previous entry's — spec.md §4.M2.
fn compute_shard_boundaries(entries: &[IndexEntry], thread_count: usize) -> Vec<Range<usize>> {
    if entries.is_empty() {
        return Vec::new();
    }
    let thread_count = thread_count.max(1);
    let target_size = (entries.len() / (2 * thread_count)).max(1);

    let mut shards = Vec::new();
    let mut shard_start = 0usize;

    for i in 1..entries.len() {
        let shard_len = i - shard_start;
        let dir_changed = entries[i].top_level_dir() != entries[i - 1].top_level_dir();
        if shard_len >= target_size && dir_changed {
            shards.push(shard_start..i);
            shard_start = i;
        }
    }
    shards.push(shard_start..entries.len());
    shards
}

/// Helper used when a snapshot needs to be addressed by its on-disk
/// location, e.g. to stat the working-tree file an entry describes.
pub fn worktree_path(workdir: &std::path::Path, entry: &IndexEntry) -> PathBuf {
    workdir.join(gix::path::from_bstr(entry.path.as_slice()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> IndexEntry {
        IndexEntry {
            path: BString::from(path),
            oid: gix::ObjectId::null(gix::hash::Kind::Sha1),
            mode: gix::index::entry::Mode::FILE,
            stat: CachedStat::default(),
            flags: EntryFlags::default(),
        }
    }

    #[test]
    fn shards_never_split_a_directory() {
        let mut paths = Vec::new();
        for dir in ["a", "b", "c", "d"] {
            for i in 0..25 {
                paths.push(format!("{dir}/file{i}.rs"));
            }
        }
        let entries: Vec<_> = paths.iter().map(|p| entry(p)).collect();
        let snapshot = IndexSnapshot::build(entries, 2);

        for shard in snapshot.shards() {
            let dirs: std::collections::HashSet<_> = snapshot.shard_entries(shard.clone())
                .iter()
                .map(|e| e.top_level_dir().to_vec())
                .collect();
            // A shard may legitimately contain exactly one directory's
            // worth of entries split only at directory boundaries —
            // assert no directory appears in two different shards.
            for other in snapshot.shards() {
                if other.start == shard.start {
                    continue;
                }
                let other_dirs: std::collections::HashSet<_> =
                    snapshot.shard_entries(other.clone())
                        .iter()
                        .map(|e| e.top_level_dir().to_vec())
                        .collect();
                assert!(dirs.is_disjoint(&other_dirs));
            }
        }
    }

    #[test]
    fn shards_cover_every_entry_exactly_once() {
        let entries: Vec<_> = (0..100).map(|i| entry(&format!("dir{}/f", i % 10))).collect();
        let snapshot = IndexSnapshot::build(entries, 4);
        let mut covered = 0;
        let mut prev_end = 0;
        for shard in snapshot.shards() {
            assert_eq!(shard.start, prev_end);
            covered += shard.len();
            prev_end = shard.end;
        }
        assert_eq!(covered, snapshot.len());
    }

    #[test]
    fn find_locates_exact_path() {
        let entries = vec![entry("a/one"), entry("a/two"), entry("b/three")];
        let snapshot = IndexSnapshot::build(entries, 1);
        assert!(snapshot.find(b"a/two").is_some());
        assert!(snapshot.find(b"missing").is_none());
    }

    #[test]
    fn empty_index_has_no_shards() {
        let snapshot = IndexSnapshot::build(Vec::new(), 4);
        assert!(snapshot.shards().is_empty());
    }
}
