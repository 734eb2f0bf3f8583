//! Shared repository-facing types. `RepoRef` plays the role of the
//! teacher's `repo/types.rs::RepoRef` — a cheap, hashable identity for
//! a working tree — but is scoped down to the one backend this daemon
//! supports (a local working-tree path); there is no `Backend` enum
//! because spec.md names no other transport.

use std::path::{Path, PathBuf};

/// Identifies a working tree by its canonicalized path. Two requests
/// naming the same `dir` (after canonicalization) resolve to the same
/// `RepoRef` and therefore the same cached [`crate::repo::handle::Repo`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    path: PathBuf,
}

impl RepoRef {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// spec.md §6 item 8: one of the named repository states, detected by
/// probing marker files under the git directory the same way `git`
/// itself does — there is no gix API for this, it is filesystem
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    None,
    Merge,
    Rebase,
    CherryPick,
    Bisect,
    Revert,
    ApplyMailbox,
}

impl RepoState {
    /// The exact wire token from spec.md §6 item 8.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            RepoState::None => "",
            RepoState::Merge => "merge",
            RepoState::Rebase => "rebase",
            RepoState::CherryPick => "cherry-pick",
            RepoState::Bisect => "bisect",
            RepoState::Revert => "revert",
            RepoState::ApplyMailbox => "apply-mailbox",
        }
    }

    /// Probes `git_dir` (the `.git` directory, or the resolved common
    /// dir for a worktree) for the marker files git itself writes
    /// while these operations are in progress.
    pub fn detect(git_dir: &Path) -> Self {
        if git_dir.join("MERGE_HEAD").is_file() {
            RepoState::Merge
        } else if git_dir.join("rebase-merge").is_dir() {
            RepoState::Rebase
        } else if git_dir.join("rebase-apply").join("rebasing").is_file() {
            RepoState::Rebase
        } else if git_dir.join("rebase-apply").join("applying").is_file() {
            RepoState::ApplyMailbox
        } else if git_dir.join("rebase-apply").is_dir() {
            RepoState::ApplyMailbox
        } else if git_dir.join("CHERRY_PICK_HEAD").is_file() {
            RepoState::CherryPick
        } else if git_dir.join("BISECT_LOG").is_file() {
            RepoState::Bisect
        } else if git_dir.join("REVERT_HEAD").is_file() {
            RepoState::Revert
        } else {
            RepoState::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_merge_state() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("MERGE_HEAD"), b"deadbeef").unwrap();
        assert_eq!(RepoState::detect(tmp.path()), RepoState::Merge);
    }

    #[test]
    fn detects_rebase_merge_state() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("rebase-merge")).unwrap();
        assert_eq!(RepoState::detect(tmp.path()), RepoState::Rebase);
    }

    #[test]
    fn clean_tree_has_no_state() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(RepoState::detect(tmp.path()), RepoState::None);
        assert_eq!(RepoState::None.as_wire_str(), "");
    }
}
