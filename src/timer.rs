//! Monotonic-clock interval reporter (G3). The request loop starts one
//! of these when it begins processing a request and logs the elapsed
//! time through the logging façade (G2) when the response is emitted —
//! the minimum instrumentation implied by the daemon's sub-10ms latency
//! goal.

use std::time::{Duration, Instant};

pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic_nondecreasing() {
        let timer = Timer::start();
        let a = timer.elapsed();
        std::thread::sleep(Duration::from_millis(1));
        let b = timer.elapsed();
        assert!(b >= a);
    }
}
