use std::path::PathBuf;

use thiserror::Error;

/// Top-level error taxonomy for the scanner, matching the five kinds
/// named in the spec: parse, not-a-repo, io, library, budget-exceeded.
///
/// `BudgetExceeded` is carried here for completeness even though no
/// call site constructs it today — `Repo::get_index_stats` downgrades
/// unstaged/untracked to `Tristate::Unknown` directly rather than
/// raising an error for the over-budget case (see
/// `repo::handle::Repo::get_index_stats`).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("malformed request: {0}")]
    ParseError(String),

    #[error("not a working tree: {0}")]
    NotARepo(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository library error: {0}")]
    Library(Box<dyn std::error::Error + Send + Sync>),

    #[error("index too large for worktree scan ({entries} entries)")]
    BudgetExceeded { entries: usize },
}

impl ScanError {
    /// Wraps any library-originated error (gix, ignore, ...) that isn't
    /// one of the other named kinds. A helper rather than `#[from]`
    /// since several distinct crates' error types land here, not one.
    pub fn library<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ScanError::Library(Box::new(err))
    }
}

impl ScanError {
    /// Whether this error should produce a logged-but-silent response
    /// (`is_repo = 0`) rather than dropping the request outright.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ScanError::ParseError(_))
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
