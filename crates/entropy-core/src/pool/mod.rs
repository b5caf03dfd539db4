//! Persistent worker pool for specialist `Task`s, with a result cache
//! and fingerprint-keyed in-flight coalescing.
//!
//! A bounded queue of workers drains two priority lanes (immediate
//! requests ahead of speculative pre-fetches) and coordinates callers
//! via `tokio::sync::{Mutex, Notify, watch}`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, Notify};

use crate::config::PoolConfig;
use crate::data::{fingerprint, SpecialistKind, SpecialistResult, Task};

/// Outcome of a non-blocking (or timed) lookup.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Ready(SpecialistResult),
    Pending,
    /// Either the cache entry's TTL elapsed, or the pool cancelled the
    /// in-flight future (saturation eviction / shutdown).
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Pending,
    Ready,
    Cancelled,
}

struct InflightEntry {
    sender: watch::Sender<SlotState>,
    receiver: watch::Receiver<SlotState>,
    is_prefetch: bool,
}

struct QueueItem {
    fingerprint: String,
    task: Task,
}

struct PoolState {
    /// Completed results, keyed by fingerprint, with absolute TTL.
    cache: HashMap<String, (SpecialistResult, tokio::time::Instant)>,
    inflight: HashMap<String, InflightEntry>,
    immediate_queue: VecDeque<QueueItem>,
    prefetch_queue: VecDeque<QueueItem>,
    shutting_down: bool,
}

/// A function that executes a `Task` end-to-end (the agent loop +
/// tool calls + LLM calls) and produces its content and cost. Kept as
/// a trait object so `SpecialistPool` doesn't need to know about
/// `Agent`/`ToolBelt`/`LLMClient` directly.
#[async_trait::async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> (String, f64);
}

/// Bounded worker pool + fingerprint-keyed result cache.
pub struct SpecialistPool {
    state: Mutex<PoolState>,
    notify: Notify,
    config: PoolConfig,
    executor: Arc<dyn TaskExecutor>,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl SpecialistPool {
    /// Spawns `config.max_workers` worker tasks immediately.
    pub fn new(config: PoolConfig, executor: Arc<dyn TaskExecutor>) -> Arc<Self> {
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState {
                cache: HashMap::new(),
                inflight: HashMap::new(),
                immediate_queue: VecDeque::new(),
                prefetch_queue: VecDeque::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            config,
            executor,
            worker_handles: Mutex::new(Vec::new()),
        });

        for _ in 0..pool.config.max_workers {
            let worker_pool = Arc::clone(&pool);
            let handle = tokio::spawn(async move { worker_pool.worker_loop().await });
            // Safety: no other task holds this lock yet at construction time.
            if let Ok(mut handles) = pool.worker_handles.try_lock() {
                handles.push(handle);
            }
        }

        pool
    }

    /// Pre-fetch is disabled entirely when the pool has exactly one
    /// worker: a single
    /// worker must never let a speculative task queue ahead of an
    /// immediate one.
    pub fn prefetch_allowed(&self) -> bool {
        self.config.max_workers > 1
    }

    /// `submit(task) -> Future`. Fingerprint coalescing and cache
    /// reuse. Returns the fingerprint the caller
    /// should later pass to `try_get`/`await_result`.
    pub async fn submit(&self, task: Task, is_prefetch: bool) -> String {
        let f = fingerprint(task.kind, &task.focused_brief, &task.session_id);
        let mut state = self.state.lock().await;

        if let Some((result, expires_at)) = state.cache.get(&f) {
            if tokio::time::Instant::now() < *expires_at {
                let _ = result;
                return f; // cache hit; caller resolves via try_get
            }
            state.cache.remove(&f);
        }

        if state.inflight.contains_key(&f) {
            return f; // in-flight coalesces onto the existing future
        }

        let (tx, rx) = watch::channel(SlotState::Pending);
        state.inflight.insert(
            f.clone(),
            InflightEntry {
                sender: tx,
                receiver: rx,
                is_prefetch,
            },
        );

        let total_queued = state.immediate_queue.len() + state.prefetch_queue.len();
        if total_queued >= self.config.queue_depth {
            // Saturation: drop the oldest unconsumed pre-fetch future
            // to make room. Immediate submissions never evict
            // in-flight immediate futures.
            if let Some(evicted) = state.prefetch_queue.pop_front() {
                if let Some(entry) = state.inflight.remove(&evicted.fingerprint) {
                    let _ = entry.sender.send(SlotState::Cancelled);
                }
            }
        }

        if is_prefetch {
            state.prefetch_queue.push_back(QueueItem { fingerprint: f.clone(), task });
        } else {
            state.immediate_queue.push_back(QueueItem { fingerprint: f.clone(), task });
        }
        drop(state);
        self.notify.notify_one();
        f
    }

    /// `try_get(F, timeout)`. `timeout == 0` is
    /// non-blocking; otherwise blocks up to `timeout`.
    pub async fn try_get(&self, f: &str, timeout: Duration) -> GetOutcome {
        if timeout.is_zero() {
            return self.poll_once(f).await;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.poll_once(f).await {
                GetOutcome::Pending => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return GetOutcome::Pending;
                    }
                    let mut receiver = {
                        let state = self.state.lock().await;
                        match state.inflight.get(f) {
                            Some(entry) => entry.receiver.clone(),
                            None => return GetOutcome::Expired,
                        }
                    };
                    let _ = tokio::time::timeout(remaining, receiver.changed()).await;
                }
                other => return other,
            }
        }
    }

    async fn poll_once(&self, f: &str) -> GetOutcome {
        let mut state = self.state.lock().await;
        if let Some((result, expires_at)) = state.cache.get(f).cloned() {
            if tokio::time::Instant::now() < expires_at {
                return GetOutcome::Ready(result);
            }
            state.cache.remove(f);
            return GetOutcome::Expired;
        }
        match state.inflight.get(f).map(|e| e.receiver.borrow().clone()) {
            Some(SlotState::Ready) => {
                // Promoted to cache by the worker before flipping the
                // slot to Ready; re-check cache.
                state
                    .cache
                    .get(f)
                    .cloned()
                    .map(|(r, _)| GetOutcome::Ready(r))
                    .unwrap_or(GetOutcome::Expired)
            }
            Some(SlotState::Pending) => GetOutcome::Pending,
            Some(SlotState::Cancelled) => GetOutcome::Expired,
            None => GetOutcome::Expired,
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let item = {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return;
                }
                state
                    .immediate_queue
                    .pop_front()
                    .or_else(|| state.prefetch_queue.pop_front())
            };

            let Some(item) = item else {
                self.notify.notified().await;
                continue;
            };

            let (content, cost) = self.executor.execute(&item.task).await;
            let result = SpecialistResult {
                kind: item.task.kind,
                content,
                cost,
                created_at: Utc::now(),
                task_fingerprint: item.fingerprint.clone(),
            };

            let mut state = self.state.lock().await;
            let ttl = Duration::from_secs(self.config.ttl_seconds);
            state
                .cache
                .insert(item.fingerprint.clone(), (result, tokio::time::Instant::now() + ttl));
            if let Some(entry) = state.inflight.remove(&item.fingerprint) {
                let _ = entry.sender.send(SlotState::Ready);
            }
        }
    }

    /// Drains the queue, cancels pending futures, and waits for
    /// running workers to finish their current task.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutting_down = true;
        for item in state.immediate_queue.drain(..).chain(state.prefetch_queue.drain(..)) {
            if let Some(entry) = state.inflight.remove(&item.fingerprint) {
                let _ = entry.sender.send(SlotState::Cancelled);
            }
        }
        drop(state);
        self.notify.notify_waiters();

        let mut handles = self.worker_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    /// Number of distinct in-flight submissions for a `(session, kind)`
    /// pair; used by tests to verify the at-most-one-in-flight
    /// invariant.
    pub async fn inflight_count_for(&self, kind: SpecialistKind, session_id: &str, brief: &str) -> usize {
        let f = fingerprint(kind, brief, session_id);
        let state = self.state.lock().await;
        usize::from(state.inflight.contains_key(&f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpecialistKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl TaskExecutor for CountingExecutor {
        async fn execute(&self, task: &Task) -> (String, f64) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (format!("analysis for {}", task.focused_brief), 0.02)
        }
    }

    fn task(kind: SpecialistKind, brief: &str, session: &str) -> Task {
        Task {
            kind,
            focused_brief: brief.to_string(),
            context_window: vec![],
            session_id: session.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_submits_coalesce_onto_one_execution() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(50) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 2, ttl_seconds: 300, timeout_seconds: 30, queue_depth: 32 },
            executor.clone(),
        );

        let f1 = pool.submit(task(SpecialistKind::Market, "AAPL RSI", "s1"), false).await;
        let f2 = pool.submit(task(SpecialistKind::Market, "aapl rsi", "s1"), false).await;
        assert_eq!(f1, f2);

        let result = pool.try_get(&f1, Duration::from_millis(500)).await;
        assert!(matches!(result, GetOutcome::Ready(_)));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_blocking_get_reports_pending_before_completion() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(200) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 1, ttl_seconds: 300, timeout_seconds: 30, queue_depth: 32 },
            executor,
        );
        let f = pool.submit(task(SpecialistKind::News, "tsla news", "s1"), false).await;
        let outcome = pool.try_get(&f, Duration::ZERO).await;
        assert!(matches!(outcome, GetOutcome::Pending));
    }

    #[tokio::test]
    async fn cache_hit_is_served_within_ttl() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(5) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 1, ttl_seconds: 300, timeout_seconds: 30, queue_depth: 32 },
            executor.clone(),
        );
        let f = pool.submit(task(SpecialistKind::News, "tsla news", "s1"), false).await;
        let _ = pool.try_get(&f, Duration::from_millis(200)).await;

        let f2 = pool.submit(task(SpecialistKind::News, "tsla news", "s1"), false).await;
        assert_eq!(f, f2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entry_expires_after_ttl() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(5) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 1, ttl_seconds: 60, timeout_seconds: 30, queue_depth: 32 },
            executor.clone(),
        );
        let f = pool.submit(task(SpecialistKind::News, "tsla news", "s1"), false).await;
        assert!(matches!(pool.try_get(&f, Duration::from_millis(50)).await, GetOutcome::Ready(_)));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(matches!(pool.try_get(&f, Duration::ZERO).await, GetOutcome::Expired));

        let f2 = pool.submit(task(SpecialistKind::News, "tsla news", "s1"), false).await;
        assert_eq!(f, f2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_futures() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(500) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 1, ttl_seconds: 300, timeout_seconds: 30, queue_depth: 32 },
            executor,
        );
        let _busy = pool.submit(task(SpecialistKind::Market, "busy", "s1"), false).await;
        let queued = pool.submit(task(SpecialistKind::Market, "queued", "s1"), true).await;

        pool.shutdown().await;
        let outcome = pool.try_get(&queued, Duration::ZERO).await;
        assert!(matches!(outcome, GetOutcome::Expired));
    }

    #[tokio::test]
    async fn single_worker_disables_prefetch() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0), delay: Duration::from_millis(1) });
        let pool = SpecialistPool::new(
            PoolConfig { max_workers: 1, ttl_seconds: 300, timeout_seconds: 30, queue_depth: 32 },
            executor,
        );
        assert!(!pool.prefetch_allowed());
        pool.shutdown().await;
    }
}
