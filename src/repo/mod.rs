//! Repository-facing subsystems: handle (M1), index snapshot (M2), tag
//! resolver (M3), diff engine (M4), and the process-wide cache (M5).

pub mod cache;
pub mod diff;
pub mod handle;
pub mod index_snapshot;
pub mod tag_resolver;
pub mod types;
