//! Severity-tagged line sink (G2). Unlike the teacher, which writes a
//! daily-rotated file under its own index directory, this daemon has no
//! persisted state and no log directory of its own (spec.md explicitly
//! puts log sinks out of scope as an external collaborator) — so the
//! façade installs a single `tracing_subscriber` layer writing to
//! stderr, guarded so a second call is a no-op.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static LOGGER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Installs the global tracing subscriber exactly once per process.
/// Safe to call from multiple places (e.g. both `main` and tests) —
/// subsequent calls are ignored.
pub fn install() {
    LOGGER_INSTALLED.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .with(env_filter)
            .try_init();
    });
}
