//! Thread pool (L2).
//!
//! Fixed-size pool, opaque work units run to completion, no priorities
//! and no cancellation — matching spec.md §4.L2. Submission never
//! blocks: when the bounded queue has room the job is handed to a
//! worker, otherwise the submitting thread runs the job inline
//! (caller-runs), which guarantees forward progress under load instead
//! of deadlocking a saturated pool.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
    sender: SyncSender<Job>,
    _workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// `num_threads` workers, a bounded queue of `queue_capacity` jobs.
    pub fn new(num_threads: usize, queue_capacity: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..num_threads)
            .map(|idx| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("reposcand-worker-{idx}"))
                    .spawn(move || Self::worker_loop(receiver))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            sender,
            _workers: workers,
        }
    }

    fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
        loop {
            let job = {
                let guard = receiver.lock().expect("worker queue lock poisoned");
                guard.recv()
            };
            match job {
                Ok(job) => job(),
                Err(_) => return, // pool dropped, channel closed
            }
        }
    }

    /// Submits a job. Non-blocking: runs inline if the queue is full.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => job(),
            Err(TrySendError::Disconnected(job)) => job(),
        }
    }

    /// Runs every job in `jobs` on the pool and blocks until all of
    /// them have completed. This is the join point the diff engine uses
    /// after fanning a scan out across shards.
    pub fn scoped_join<F>(&self, jobs: Vec<F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let remaining = jobs.len();
        if remaining == 0 {
            return;
        }
        let (done_tx, done_rx) = sync_channel::<()>(remaining);
        for job in jobs {
            let done_tx = done_tx.clone();
            self.submit(move || {
                job();
                let _ = done_tx.send(());
            });
        }
        drop(done_tx);
        for _ in 0..remaining {
            done_rx.recv().expect("worker dropped completion signal");
        }
    }
}
