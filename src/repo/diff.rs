//! Diff engine (M4) — the hard part. A single parallel pass that
//! answers three questions (staged / unstaged / untracked) with early
//! exit, per spec.md §4.M4.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gix::bstr::{BString, ByteSlice};
use sha1::{Digest, Sha1};

use crate::dirlist::{self, FileKind};
use crate::repo::index_snapshot::{worktree_path, IndexEntry, IndexSnapshot};
use crate::threadpool::ThreadPool;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// A boolean that may be unknown because a work-budget was exceeded or
/// a per-shard I/O failure downgraded the answer (spec.md §4.M4
/// "Failure semantics", §7 `budget-exceeded`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate {
    Known(bool),
    Unknown,
}

impl Tristate {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Tristate::Known(true) => "1",
            Tristate::Known(false) => "0",
            Tristate::Unknown => "-1",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiffOutcome {
    pub staged: bool,
    pub unstaged: Tristate,
    pub untracked: Tristate,
}

/// Walks HEAD's tree and the sorted index side by side. Returns as
/// soon as a difference is found. Any conflicted or intent-to-add
/// entry is itself a staged difference.
pub fn diff_staged(
    repo: &gix::Repository,
    head_tree: Option<gix::Tree<'_>>,
    snapshot: &IndexSnapshot,
) -> Result<bool, gix::object::find::existing::Error> {
    for entry in snapshot.entries() {
        if entry.flags.conflicted || entry.flags.intent_to_add {
            return Ok(true);
        }
    }

    let mut tree_entries: Vec<(BString, gix::ObjectId, gix::object::tree::EntryKind)> = Vec::new();
    if let Some(tree) = head_tree {
        let platform = tree.traverse();
        let iter = platform
            .breadthfirst
            .files()
            .map_err(|_| gix::object::find::existing::Error::NotFound {
                oid: repo.object_hash().null(),
            })?;
        for entry in iter {
            tree_entries.push((
                BString::from(entry.filepath.to_vec()),
                entry.oid.detach(),
                entry.mode.kind(),
            ));
        }
    }
    tree_entries.sort_by(|a, b| a.0.cmp(&b.0));

    let index_entries = snapshot.entries();
    let (mut i, mut t) = (0usize, 0usize);
    while i < index_entries.len() && t < tree_entries.len() {
        let ie = &index_entries[i];
        let (tpath, toid, tkind) = &tree_entries[t];
        match ie.path.as_slice().cmp(tpath.as_slice()) {
            std::cmp::Ordering::Less => return Ok(true), // staged-added, not in HEAD
            std::cmp::Ordering::Greater => return Ok(true), // deleted-from-index relative to HEAD
            std::cmp::Ordering::Equal => {
                let mode_matches = matches!(
                    (ie.mode, tkind),
                    (gix::index::entry::Mode::FILE, gix::object::tree::EntryKind::Blob)
                        | (
                            gix::index::entry::Mode::FILE_EXECUTABLE,
                            gix::object::tree::EntryKind::BlobExecutable
                        )
                        | (gix::index::entry::Mode::SYMLINK, gix::object::tree::EntryKind::Link)
                        | (gix::index::entry::Mode::COMMIT, gix::object::tree::EntryKind::Commit)
                );
                if ie.oid != *toid || !mode_matches {
                    return Ok(true);
                }
                i += 1;
                t += 1;
            }
        }
    }
    if i < index_entries.len() || t < tree_entries.len() {
        return Ok(true);
    }
    Ok(false)
}

/// Shared flags that shard tasks publish into, per spec.md §4.M4 /
/// §5: atomic booleans written by workers, read by workers (for early
/// exit) and by the request thread after join.
#[derive(Default)]
struct SharedFlags {
    unstaged_true: AtomicBool,
    untracked_true: AtomicBool,
    unstaged_error: AtomicBool,
    untracked_error: AtomicBool,
}

impl SharedFlags {
    fn both_resolved_true(&self) -> bool {
        self.unstaged_true.load(Ordering::Relaxed) && self.untracked_true.load(Ordering::Relaxed)
    }

    fn finish(&self) -> (Tristate, Tristate) {
        let unstaged = if self.unstaged_true.load(Ordering::Relaxed) {
            Tristate::Known(true)
        } else if self.unstaged_error.load(Ordering::Relaxed) {
            Tristate::Unknown
        } else {
            Tristate::Known(false)
        };
        let untracked = if self.untracked_true.load(Ordering::Relaxed) {
            Tristate::Known(true)
        } else if self.untracked_error.load(Ordering::Relaxed) {
            Tristate::Unknown
        } else {
            Tristate::Known(false)
        };
        (unstaged, untracked)
    }
}

/// Runs the unstaged/untracked scan across every shard of `snapshot`,
/// fanned out on `pool`, and blocks until all shards finish (the
/// scheduler always waits for deterministic accounting, even though
/// individual shards do minimal work once their contribution is moot).
pub fn diff_worktree(
    repo_hash: gix::hash::Kind,
    workdir: &Path,
    snapshot: Arc<IndexSnapshot>,
    ignore: Arc<ignore::gitignore::Gitignore>,
    pool: &ThreadPool,
) -> (Tristate, Tristate) {
    let flags = Arc::new(SharedFlags::default());
    let shards: Vec<_> = snapshot.shards().to_vec();

    let jobs: Vec<Box<dyn FnOnce() + Send>> = shards
        .into_iter()
        .map(|shard| {
            let snapshot = Arc::clone(&snapshot);
            let flags = Arc::clone(&flags);
            let ignore = Arc::clone(&ignore);
            let workdir = workdir.to_path_buf();
            let job: Box<dyn FnOnce() + Send> = Box::new(move || {
                scan_shard(repo_hash, &workdir, &snapshot, shard, &ignore, &flags);
            });
            job
        })
        .collect();

    pool.scoped_join(jobs);
    flags.finish()
}

fn scan_shard(
    repo_hash: gix::hash::Kind,
    workdir: &Path,
    snapshot: &IndexSnapshot,
    shard: std::ops::Range<usize>,
    ignore: &ignore::gitignore::Gitignore,
    flags: &SharedFlags,
) {
    let entries = snapshot.shard_entries(shard.clone());

    // --- unstaged: index vs worktree ---
    for entry in entries {
        if flags.both_resolved_true() {
            break;
        }
        match check_entry_unstaged(repo_hash, workdir, entry) {
            Ok(true) => {
                flags.unstaged_true.store(true, Ordering::Relaxed);
                break;
            }
            Ok(false) => {}
            Err(()) => {
                flags.unstaged_error.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    if flags.both_resolved_true() {
        return;
    }

    // --- untracked: list each relevant directory, diff against the
    // shard's own sorted entries ---
    let known_names: HashSet<&[u8]> = entries.iter().map(|e| e.path.as_slice()).collect();
    let mut relevant_dirs: Vec<BString> = entries
        .iter()
        .filter_map(|e| {
            e.path
                .rfind(b"/")
                .map(|pos| BString::from(e.path[..pos].to_vec()))
        })
        .collect();
    relevant_dirs.sort();
    relevant_dirs.dedup();
    if relevant_dirs.is_empty() {
        relevant_dirs.push(BString::from(""));
    }

    for dir in relevant_dirs {
        if flags.both_resolved_true() {
            break;
        }
        let dir_path = if dir.is_empty() {
            workdir.to_path_buf()
        } else {
            workdir.join(gix::path::from_bstr(dir.as_slice()).as_ref())
        };
        let listing = match dirlist::list_dir(&dir_path) {
            Ok(l) => l,
            Err(_) => {
                flags.untracked_error.store(true, Ordering::Relaxed);
                continue;
            }
        };
        for e in &listing.entries {
            let name = listing.name_bytes(e);
            let full_path = if dir.is_empty() {
                BString::from(name.to_vec())
            } else {
                let mut p = dir.to_vec();
                p.push(b'/');
                p.extend_from_slice(name);
                BString::from(p)
            };
            if known_names.contains(full_path.as_slice()) {
                continue;
            }
            let is_dir = e.kind == FileKind::Directory;
            let abs = dir_path.join(std::ffi::OsStr::new(
                &String::from_utf8_lossy(name).into_owned(),
            ));
            if ignore
                .matched_path_or_any_parents(&abs, is_dir)
                .is_ignore()
            {
                continue;
            }
            // A bare directory only counts as untracked if it
            // transitively contains at least one non-ignored file —
            // an empty directory, or one containing only ignored
            // files, is never shown as untracked by git.
            if is_dir && !directory_has_untracked_content(&abs, ignore) {
                continue;
            }
            flags.untracked_true.store(true, Ordering::Relaxed);
            break;
        }
    }
}

/// Recurses into `dir` looking for any entry that is not itself
/// git-ignored — a plain file counts immediately, a subdirectory
/// counts only if *it* transitively contains a non-ignored entry.
/// Unreadable directories don't flip the flag; that's the per-shard
/// I/O failure's job, not this helper's (it only runs after the shard
/// has already successfully listed the parent directory).
fn directory_has_untracked_content(dir: &Path, ignore: &ignore::gitignore::Gitignore) -> bool {
    let listing = match dirlist::list_dir(dir) {
        Ok(l) => l,
        Err(_) => return false,
    };
    for e in &listing.entries {
        let name = listing.name_bytes(e);
        let is_dir = e.kind == FileKind::Directory;
        let abs = dir.join(std::ffi::OsStr::new(&String::from_utf8_lossy(name).into_owned()));
        if ignore
            .matched_path_or_any_parents(&abs, is_dir)
            .is_ignore()
        {
            continue;
        }
        if is_dir {
            if directory_has_untracked_content(&abs, ignore) {
                return true;
            }
        } else {
            return true;
        }
    }
    false
}

/// Returns `Ok(true)` if this entry differs from the working tree,
/// `Ok(false)` if it matches, `Err(())` on an I/O failure that should
/// downgrade the shard's answer to unknown.
fn check_entry_unstaged(
    repo_hash: gix::hash::Kind,
    workdir: &Path,
    entry: &IndexEntry,
) -> Result<bool, ()> {
    // `assume-unchanged`/`skip-worktree` entries are unconditionally
    // clean by definition — that is the entire point of the flag, so
    // the working tree is never even stat'd for them.
    if entry.flags.assume_unchanged || entry.flags.skip_worktree {
        return Ok(false);
    }

    let path = worktree_path(workdir, entry);
    let meta = match std::fs::symlink_metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(_) => return Err(()),
    };

    if entry.is_submodule() {
        return Ok(diff_submodule(&path, entry.oid));
    }

    if stat_matches(&meta, entry) {
        return Ok(false);
    }

    let on_disk_oid = match hash_file(&path, repo_hash) {
        Ok(oid) => oid,
        Err(_) => return Err(()),
    };
    Ok(on_disk_oid != entry.oid)
}

/// Compares every cached stat field spec.md §4.M4 step 2 names,
/// including the nanosecond mtime and ctime fields — this is the
/// "racy git" protection: a file edited twice within the same
/// wall-clock second still changes `mtime_nanos`/`ctime`, so relying
/// on `mtime_secs` alone would let a same-second edit slip through as
/// "unchanged" without ever reaching the hash check.
fn stat_matches(meta: &std::fs::Metadata, entry: &IndexEntry) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.len() == entry.stat.size
        && meta.ino() == entry.stat.ino
        && meta.dev() == entry.stat.dev
        && meta.mtime() as u32 == entry.stat.mtime_secs
        && meta.mtime_nsec() as u32 == entry.stat.mtime_nanos
        && meta.ctime() as u32 == entry.stat.ctime_secs
        && meta.ctime_nsec() as u32 == entry.stat.ctime_nanos
        && meta.mode() as u32 & 0o170000 == mode_kind_bits(entry)
}

fn mode_kind_bits(entry: &IndexEntry) -> u32 {
    use gix::index::entry::Mode;
    match entry.mode {
        Mode::SYMLINK => 0o120000,
        Mode::COMMIT => 0o160000,
        _ => 0o100000,
    }
}

fn diff_submodule(worktree_path: &Path, recorded_oid: gix::ObjectId) -> bool {
    match gix::open(worktree_path) {
        Ok(sub_repo) => match sub_repo.head_id() {
            Ok(id) => id.detach() != recorded_oid,
            Err(_) => true,
        },
        Err(_) => true,
    }
}

/// Streams the file through the repository's object hash with a
/// fixed-size buffer — no whole-file allocation, per spec.md §4.M4.
fn hash_file(path: &Path, kind: gix::hash::Kind) -> std::io::Result<gix::ObjectId> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();

    match kind {
        gix::hash::Kind::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(format!("blob {len}\0").as_bytes());
            let mut buf = [0u8; HASH_BUF_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let digest = hasher.finalize();
            Ok(gix::ObjectId::from_bytes_or_panic(&digest))
        }
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unsupported object hash kind",
        )),
    }
}
