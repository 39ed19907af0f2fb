//! Request-serving worker pool
//!
//! A fixed set of worker threads pulls requests from a bounded FIFO queue.
//! A full queue rejects new work instead of blocking the caller; callers see
//! that as a `Validation` failure ("queue full").

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tessera_core::error::{TesseraError, TesseraResult};
use thiserror::Error;
use tracing::{debug, error};

/// Why a request was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BackpressureError {
    /// The queue is at capacity
    #[error("api queue full")]
    QueueFull,
    /// The pool has been shut down
    #[error("api pool is shut down")]
    ShutDown,
}

impl From<BackpressureError> for TesseraError {
    fn from(e: BackpressureError) -> Self {
        match e {
            BackpressureError::QueueFull => TesseraError::validation("api queue full"),
            BackpressureError::ShutDown => TesseraError::not_ready("api pool shut down"),
        }
    }
}

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests waiting in the queue.
    pub queue_depth: usize,
    /// Requests currently executing.
    pub active_tasks: usize,
    /// Requests completed since start.
    pub tasks_completed: u64,
    /// Worker threads.
    pub worker_count: usize,
}

type Task = Box<dyn FnOnce() + Send>;

struct PoolInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
}

/// Fixed-size worker pool serving API requests
pub struct ApiPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl ApiPool {
    /// Start `num_threads` workers named `tessera-api-0`, `tessera-api-1`, ...
    pub fn new(num_threads: usize, max_queue_depth: usize) -> TesseraResult<Self> {
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
        });

        let pool = ApiPool {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&pool.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("tessera-api-{}", i))
                .spawn(move || worker_loop(&inner));
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(TesseraError::internal(format!(
                        "failed to spawn api worker {}: {}",
                        i, e
                    )));
                }
            }
        }
        debug!(target: "tessera::api", workers = num_threads, max_queue_depth, "api pool started");
        Ok(pool)
    }

    /// Queue `work` for a worker.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackpressureError::ShutDown);
        }
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.max_queue_depth {
                return Err(BackpressureError::QueueFull);
            }
            queue.push_back(Box::new(work));
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Run `f` on a worker and wait for its result.
    pub fn call<T: Send + 'static>(
        &self,
        f: impl FnOnce() -> TesseraResult<T> + Send + 'static,
    ) -> TesseraResult<T> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = tx.send(f());
        })?;
        rx.recv()
            .map_err(|_| TesseraError::internal("api request aborted before producing a result"))?
    }

    /// Block until all queued and in-flight requests have completed.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active_tasks.load(Ordering::Acquire) > 0 {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Stop accepting work, finish what is queued, join the workers.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            // Notify under the lock so a worker about to wait cannot miss it
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        let mut workers = self.workers.lock();
        let joined = workers.len();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        if joined > 0 {
            debug!(target: "tessera::api", workers = joined, "api pool stopped");
        }
    }

    /// Whether shutdown has begun
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Return a snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue.lock().len(),
            active_tasks: self.inner.active_tasks.load(Ordering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Drop for ApiPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_tasks` and wakes drain waiters, even if a task panics.
struct ActiveTaskGuard<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if prev_active == 1 {
            let queue = self.inner.queue.lock();
            if queue.is_empty() {
                self.inner.drain_cond.notify_all();
            }
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            error!(
                target: "tessera::api",
                "api request panicked: {}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
