//! Recognized configuration values (G1), spec.md §6. Built with `clap`
//! the way the teacher's `Configuration` is (teacher:
//! `application/config/configuration.rs`), but scoped to exactly the
//! options spec.md names — anything else is a hard parse error, which
//! is `clap`'s default and matches "all others rejected".

use clap::Parser;

/// Sentinel used when `dirty-max-index-size` is left at its default:
/// large enough that no real working tree trips the worktree-scan
/// budget unless the operator opts in to the guard.
pub const DEFAULT_DIRTY_MAX_INDEX_SIZE: u64 = u64::MAX;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Low-latency working-tree status daemon", long_about = None)]
pub struct Options {
    /// Worker count for the diff engine's thread pool.
    #[arg(long = "num-threads", default_value_t = default_num_threads())]
    pub num_threads: usize,

    /// Indexes with more entries than this skip the worktree scan
    /// (unstaged/untracked are reported unknown).
    #[arg(long = "dirty-max-index-size", default_value_t = DEFAULT_DIRTY_MAX_INDEX_SIZE)]
    pub dirty_max_index_size: u64,

    /// File descriptor used to signal parent liveness; the process
    /// exits once this fd reaches EOF.
    #[arg(long = "lock-fd")]
    pub lock_fd: Option<i32>,

    /// Process id to forward a terminal-resize signal to. Cosmetic
    /// only; has no effect on scan semantics.
    #[arg(long = "sigwinch-pid")]
    pub sigwinch_pid: Option<i32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            dirty_max_index_size: DEFAULT_DIRTY_MAX_INDEX_SIZE,
            lock_fd: None,
            sigwinch_pid: None,
        }
    }
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
