//! Tag name resolver (M3). Computes, off the request thread, the name
//! of the tag (if any) that peels to a given commit, and caches the
//! answer keyed by `(refs-db generation, oid)` so a second request
//! against an unchanged repository doesn't re-walk every tag ref.
//!
//! Ties are broken by lexicographic maximum of tag names (spec.md's
//! Open Question: tag tie-breaking isn't specified upstream; this
//! picks the deterministic answer called out in DESIGN.md).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use gix::ObjectId;
use tokio::sync::oneshot;

use crate::threadpool::ThreadPool;

/// One-shot handle to a tag-name computation running on the pool.
/// `spec.md` §5 requires this be awaited, or explicitly drained,
/// before the owning `Repo` returns to the cache — both paths are
/// provided here so the request loop can't accidentally let it
/// outlive the request.
pub struct TagFuture {
    rx: oneshot::Receiver<String>,
}

impl TagFuture {
    pub async fn resolve(self) -> String {
        self.rx.await.unwrap_or_default()
    }

    /// Explicitly discards the future without awaiting its result —
    /// used on error exit paths where the response won't carry a tag
    /// field at all. The background job still runs to completion (it's
    /// cheap and has no side effects worth cancelling); this just
    /// ensures the request thread doesn't block on it.
    pub fn drain(self) {
        drop(self.rx);
    }
}

#[derive(Default)]
pub struct TagResolver {
    generation: AtomicU64,
    cache: Mutex<HashMap<(u64, ObjectId), String>>,
}

impl TagResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call when the refs database is observed to have changed (e.g.
    /// the repo's `refs/` or `packed-refs` mtime moved) — invalidates
    /// every cached answer.
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn generation_now(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Resolves the tag name for `commit` in `repo`, returning
    /// immediately with a future; the enumeration itself runs on
    /// `pool`.
    pub fn resolve(
        self: &std::sync::Arc<Self>,
        repo: gix::ThreadSafeRepository,
        commit: ObjectId,
        pool: &ThreadPool,
    ) -> TagFuture {
        let generation = self.generation_now();
        if let Some(name) = self
            .cache
            .lock()
            .expect("tag cache lock poisoned")
            .get(&(generation, commit))
        {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(name.clone());
            return TagFuture { rx };
        }

        let (tx, rx) = oneshot::channel();
        let this = std::sync::Arc::clone(self);
        pool.submit(move || {
            let name = enumerate_and_match(&repo, commit).unwrap_or_default();
            this.cache
                .lock()
                .expect("tag cache lock poisoned")
                .insert((generation, commit), name.clone());
            let _ = tx.send(name);
        });

        TagFuture { rx }
    }
}

fn enumerate_and_match(repo: &gix::ThreadSafeRepository, commit: ObjectId) -> Option<String> {
    let local = repo.to_thread_local();
    let mut best: Option<String> = None;

    let platform = local.references().ok()?;
    let tags = platform.tags().ok()?;
    for tag_ref in tags.filter_map(|r| r.ok()) {
        let mut tag_ref = tag_ref;
        let peeled = match tag_ref.peel_to_id_in_place() {
            Ok(id) => id.detach(),
            Err(_) => continue,
        };
        if peeled != commit {
            continue;
        }
        let full_name = tag_ref.name().as_bstr().to_string();
        let short_name = full_name
            .strip_prefix("refs/tags/")
            .unwrap_or(&full_name)
            .to_string();
        best = match best {
            Some(existing) if existing >= short_name => Some(existing),
            _ => Some(short_name),
        };
    }
    best
}

/// Detects whether the refs database changed since `known_mtime`, by
/// stat-ing the repo's `packed-refs` file and `refs/` directory. Used
/// by the repo handle to decide when to call
/// [`TagResolver::bump_generation`].
pub fn refs_db_mtime(git_dir: &Path) -> Option<std::time::SystemTime> {
    let packed = git_dir.join("packed-refs");
    let refs = git_dir.join("refs");
    let packed_mtime = std::fs::metadata(&packed).and_then(|m| m.modified()).ok();
    let refs_mtime = std::fs::metadata(&refs).and_then(|m| m.modified()).ok();
    packed_mtime.into_iter().chain(refs_mtime).max()
}
