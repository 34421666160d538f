//! Fixed-size worker pool for duration-bounded workloads
//!
//! Each worker runs the same work function for the same wall-clock budget on
//! its own OS thread and owns all of its state; the pool only collects the
//! per-worker byte counts.

use std::thread;
use std::time::Duration;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` on every worker and return their results in worker order
    ///
    /// A worker that cannot be spawned fails the whole run; workers already
    /// started are still joined before the error is returned.
    pub fn run<F>(&self, duration: Duration, work: F) -> Result<Vec<u64>, ProbeError>
    where
        F: Fn(Duration) -> u64 + Sync,
    {
        let work = &work;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            let mut spawn_error = None;
            for index in 0..self.workers {
                match thread::Builder::new()
                    .name(format!("hostbench-worker-{index}"))
                    .spawn_scoped(scope, move || work(duration))
                {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        spawn_error = Some(ProbeError::WorkerSpawn { index, source });
                        break;
                    }
                }
            }

            // every handle is joined so a panicked worker never escapes the scope
            let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            if let Some(err) = spawn_error {
                return Err(err);
            }

            joined
                .into_iter()
                .enumerate()
                .map(|(index, result)| result.map_err(|_| ProbeError::WorkerPanicked(index)))
                .collect()
        })
    }
}
