//! Bounded fan-out/fan-in over worker threads
//!
//! Each batch spawns at most `max_workers` threads that pull jobs from a
//! shared queue. The caller collects results until every job reported or
//! the deadline passed. Workers are never joined: a job still running at
//! the deadline finishes on its own and its result is dropped.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Position of a session in the orchestrator's member list
pub type SessionId = usize;

type Job<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Outcome of one batch, keyed by session
#[derive(Debug)]
pub struct BatchResult<T> {
    pub results: BTreeMap<SessionId, T>,
    /// Failed jobs, stragglers included as `Error::Timeout`
    pub errors: BTreeMap<SessionId, Error>,
    /// Jobs that had not reported when the deadline passed
    pub timed_out: Vec<SessionId>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            timed_out: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.timed_out.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    max_workers: usize,
    timeout: Duration,
    launch_delay: Duration,
}

impl WorkerPool {
    pub fn new(max_workers: usize, timeout: Duration) -> Self {
        Self {
            max_workers: max_workers.max(1),
            timeout,
            launch_delay: Duration::ZERO,
        }
    }

    /// Pause between queueing consecutive jobs
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn run<T, F>(&self, jobs: Vec<(SessionId, F)>) -> BatchResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let mut batch = BatchResult::default();
        if jobs.is_empty() {
            return batch;
        }

        let (job_tx, job_rx) = mpsc::channel::<(SessionId, Job<T>)>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<(SessionId, Result<T>)>();

        let workers = self.max_workers.min(jobs.len());
        for index in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("hackdriver-worker-{}", index))
                .spawn(move || loop {
                    let next = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => return,
                    };
                    let Ok((id, job)) = next else {
                        return;
                    };
                    let result = panic::catch_unwind(AssertUnwindSafe(job))
                        .unwrap_or_else(|payload| Err(Error::Worker(panic_message(payload))));
                    // The caller may have stopped listening; the job still ran
                    let _ = result_tx.send((id, result));
                });
            if let Err(e) = spawned {
                warn!("Failed to spawn worker {}: {}", index, e);
            }
        }
        drop(result_tx);

        let mut pending = HashSet::new();
        let mut first = true;
        for (id, job) in jobs {
            if !first && !self.launch_delay.is_zero() {
                thread::sleep(self.launch_delay);
            }
            first = false;
            pending.insert(id);
            let job: Job<T> = Box::new(job);
            if job_tx.send((id, job)).is_err() {
                pending.remove(&id);
                batch.errors.insert(id, Error::Worker("no worker available".to_string()));
            }
        }
        drop(job_tx);

        let deadline = Instant::now() + self.timeout;
        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match result_rx.recv_timeout(remaining) {
                Ok((id, result)) => {
                    pending.remove(&id);
                    match result {
                        Ok(value) => {
                            batch.results.insert(id, value);
                        }
                        Err(e) => {
                            debug!("Session {} failed: {}", id, e);
                            batch.errors.insert(id, e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    for id in pending.drain() {
                        batch.errors.insert(id, Error::Worker("worker exited".to_string()));
                    }
                }
            }
        }

        batch.timed_out = pending.into_iter().collect();
        batch.timed_out.sort_unstable();
        for id in &batch.timed_out {
            batch.errors.insert(*id, Error::Timeout(self.timeout));
        }
        if !batch.timed_out.is_empty() {
            warn!("{} sessions missed the {:?} deadline", batch.timed_out.len(), self.timeout);
        }
        batch
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_and_errors_are_keyed() {
        let pool = WorkerPool::new(3, Duration::from_secs(5));
        let jobs: Vec<(SessionId, Box<dyn FnOnce() -> Result<usize> + Send>)> = (0..5)
            .map(|id| {
                let job: Box<dyn FnOnce() -> Result<usize> + Send> = Box::new(move || {
                    if id == 3 {
                        Err(Error::ConnectionLost)
                    } else {
                        Ok(id * 10)
                    }
                });
                (id, job)
            })
            .collect();

        let batch = pool.run(jobs);
        assert_eq!(batch.results.len(), 4);
        assert_eq!(batch.results.get(&4), Some(&40));
        assert!(matches!(batch.errors.get(&3), Some(Error::ConnectionLost)));
        assert!(batch.timed_out.is_empty());
    }

    #[test]
    fn test_panics_become_errors() {
        let pool = WorkerPool::new(2, Duration::from_secs(5));
        let batch = pool.run(vec![(0, || -> Result<()> { panic!("boom") })]);
        match batch.errors.get(&0) {
            Some(Error::Worker(message)) => assert_eq!(message, "boom"),
            other => panic!("expected worker error, got {:?}", other),
        }
    }

    #[test]
    fn test_stragglers_are_reported_and_finish() {
        let finished = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(2, Duration::from_millis(100));

        let jobs: Vec<(SessionId, Box<dyn FnOnce() -> Result<()> + Send>)> = (0..2)
            .map(|id| {
                let finished = finished.clone();
                let job: Box<dyn FnOnce() -> Result<()> + Send> = Box::new(move || {
                    if id == 1 {
                        thread::sleep(Duration::from_millis(400));
                    }
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                (id, job)
            })
            .collect();

        let batch = pool.run(jobs);
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.timed_out, vec![1]);
        assert!(matches!(batch.errors.get(&1), Some(Error::Timeout(_))));

        thread::sleep(Duration::from_millis(600));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(2, Duration::from_secs(5));

        let jobs: Vec<(SessionId, Box<dyn FnOnce() -> Result<()> + Send>)> = (0..6)
            .map(|id| {
                let (active, peak) = (active.clone(), peak.clone());
                let job: Box<dyn FnOnce() -> Result<()> + Send> = Box::new(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                });
                (id, job)
            })
            .collect();

        let batch = pool.run(jobs);
        assert_eq!(batch.results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_empty_batch() {
        let pool = WorkerPool::new(4, Duration::from_millis(10));
        let batch = pool.run(Vec::<(SessionId, fn() -> Result<()>)>::new());
        assert!(batch.is_complete());
        assert!(batch.results.is_empty());
    }
}
