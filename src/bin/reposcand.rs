//! Daemon entry point. Parses `Options` (G1), installs the logging
//! façade (G2), builds the `Application`, and drives the request loop
//! (T3) over stdin/stdout until EOF or parent death.

use clap::Parser;
use tracing::info;

use reposcand::application::config::Options;
use reposcand::application::logging;
use reposcand::application::service::Application;
use reposcand::requestloop;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let options = Options::parse();
    logging::install();
    info!(
        num_threads = options.num_threads,
        dirty_max_index_size = options.dirty_max_index_size,
        "reposcand starting"
    );

    spawn_lock_fd_watcher(options.lock_fd);
    spawn_sigwinch_forwarder(options.sigwinch_pid);

    let mut app = Application::new(options);
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    requestloop::run(&mut app, &mut stdin, &mut stdout).await;
    info!("reposcand exiting: request stream closed");
}

/// spec.md §6: "`lock-fd`: file descriptor used to signal parent
/// liveness; when readable-EOF, the process exits." Blocking read on
/// a dedicated OS thread, since this is a liveness check entirely
/// orthogonal to the request loop — correctness doesn't depend on a
/// graceful shutdown (spec.md §5), so an immediate `process::exit` is
/// the implementation-defined choice made here.
fn spawn_lock_fd_watcher(lock_fd: Option<i32>) {
    let Some(fd) = lock_fd else { return };
    std::thread::Builder::new()
        .name("reposcand-lock-fd".into())
        .spawn(move || {
            #[cfg(unix)]
            {
                use std::os::unix::io::FromRawFd;
                let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
                use std::io::Read;
                let mut buf = [0u8; 1];
                loop {
                    match file.read(&mut buf) {
                        Ok(0) => {
                            tracing::info!("lock-fd reached EOF, parent died, exiting");
                            std::process::exit(0);
                        }
                        Ok(_) => continue,
                        Err(_) => {
                            std::process::exit(0);
                        }
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = fd;
            }
        })
        .expect("failed to spawn lock-fd watcher thread");
}

/// spec.md §6: "`sigwinch-pid`: process id to which a terminal-resize
/// signal, when received by this process, is forwarded. Purely
/// cosmetic; no impact on core semantics." Implemented with
/// `tokio::signal` rather than a raw `signal()` handler, matching the
/// rest of the daemon's async I/O (Cargo.toml already carries the
/// `signal` tokio feature for this).
#[cfg(unix)]
fn spawn_sigwinch_forwarder(sigwinch_pid: Option<i32>) {
    let Some(target_pid) = sigwinch_pid else {
        return;
    };
    tokio::spawn(async move {
        let mut stream = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
        {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGWINCH handler");
                return;
            }
        };
        loop {
            stream.recv().await;
            unsafe {
                libc::kill(target_pid, libc::SIGWINCH);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_sigwinch_forwarder(_sigwinch_pid: Option<i32>) {}
