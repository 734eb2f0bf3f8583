//! Repository cache (M5): a process-wide map from working-tree path to
//! an opened [`Repo`], created on demand. spec.md §4.M5 / §5: lookups
//! are single-threaded because the request loop (T3) is strictly
//! serial, so the map needs no internal locking of its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ScanError;
use crate::repo::handle::Repo;
use crate::repo::types::RepoRef;

/// Walks upward from `dir` looking for a `.git` entry, the same
/// discovery git itself performs for a path that names a file or a
/// non-root directory inside a working tree (spec.md §3: "`dir` must
/// be ... a file or directory inside a working tree"). Returns the
/// directory that contains the `.git` entry, i.e. the workdir root.
///
/// `gix::open` only opens a repository rooted exactly at the given
/// path; it does not discover upward on its own, so the cache performs
/// discovery itself before ever constructing a [`Repo`].
fn discover_workdir(dir: &Path) -> Option<PathBuf> {
    let mut cursor = Some(dir);
    while let Some(candidate) = cursor {
        if candidate.join(".git").exists() {
            return Some(candidate.to_path_buf());
        }
        cursor = candidate.parent();
    }
    None
}

/// spec.md §3: "Repo handle ... Two requests with the same `dir` map
/// to the same handle; a handle is created on first use and never
/// destroyed before process exit unless explicitly evicted." No
/// eviction is implemented — DESIGN.md records this as the accepted
/// Open Question (unbounded cache, "tens of distinct repos per shell
/// session" workload).
#[derive(Default)]
pub struct RepoCache {
    repos: HashMap<RepoRef, Repo>,
}

impl RepoCache {
    pub fn new() -> Self {
        Self {
            repos: HashMap::new(),
        }
    }

    /// Resolves `dir` to its working-tree root and returns the cached
    /// [`Repo`] for that root, opening and inserting one on a miss.
    /// Errors (not-a-repo, open failure) are not cached (spec.md
    /// §4.M5: "Errors are not cached"), so a later request against the
    /// same `dir` retries discovery from scratch.
    pub fn get_or_open(&mut self, dir: &Path) -> Result<&mut Repo, ScanError> {
        let workdir = discover_workdir(dir).ok_or_else(|| ScanError::NotARepo(dir.to_path_buf()))?;
        let canonical = std::fs::canonicalize(&workdir).unwrap_or(workdir);
        let key = RepoRef::new(canonical.clone());

        if !self.repos.contains_key(&key) {
            let repo = Repo::open(&canonical)?;
            self.repos.insert(key.clone(), repo);
        }

        let repo = self.repos.get_mut(&key).expect("just inserted or present");
        repo.touch();
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_caches_same_handle_for_same_dir() {
        let tmp = tempfile::tempdir().unwrap();
        gix::init(tmp.path()).unwrap();

        let mut cache = RepoCache::new();
        cache.get_or_open(tmp.path()).unwrap();
        assert_eq!(cache.len(), 1);
        cache.get_or_open(tmp.path()).unwrap();
        assert_eq!(cache.len(), 1, "second lookup must reuse the cached handle");
    }

    #[test]
    fn discovers_repo_from_nested_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        gix::init(tmp.path()).unwrap();
        let nested = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let mut cache = RepoCache::new();
        let repo = cache.get_or_open(&nested).unwrap();
        assert_eq!(
            std::fs::canonicalize(repo.workdir()).unwrap(),
            std::fs::canonicalize(tmp.path()).unwrap()
        );
    }

    #[test]
    fn non_repo_directory_is_not_a_repo_and_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cache = RepoCache::new();
        assert!(cache.get_or_open(tmp.path()).is_err());
        assert_eq!(cache.len(), 0);
    }
}
