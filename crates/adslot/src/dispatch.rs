//! Single ordered dispatch queue with keyed, cancellable timers.
//!
//! Every deferred piece of work in the crate runs here, one job at a time:
//! - ad-source listener callbacks (load completion, dismissal, clicks)
//! - observer notifications
//! - refresh timers
//!
//! Timers are tracked by [`TimerToken`] and tagged with the key of the slot that
//! owns them, so one slot's timers can be cancelled without touching another's.
//!
//! ```text
//! schedule(key, delay, f) ──► sleeper task ──(delay)──► queue: Fire(token, f)
//!                                   ▲                         │
//! cancel(token) ── remove entry ────┘ (wakes sleeper)         ▼
//!                                              dispatcher: run f iff entry still present
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Run(Callback),
    Fire(TimerToken, Callback),
}

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl std::fmt::Display for TimerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

struct TimerEntry {
    key: String,
    cancel: CancellationToken,
}

/// Handle to the dispatch queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
    timers: Arc<DashMap<TimerToken, TimerEntry>>,
    next_token: Arc<AtomicU64>,
    runtime: tokio::runtime::Handle,
}

impl Dispatcher {
    /// Start the dispatch loop on the current Tokio runtime.
    ///
    /// Must be called from within a runtime. The returned handle may then be used
    /// from any thread. The loop exits once every handle is dropped.
    pub fn spawn() -> Self {
        Self::spawn_on(tokio::runtime::Handle::current())
    }

    /// Start the dispatch loop on the given runtime.
    pub fn spawn_on(runtime: tokio::runtime::Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let timers: Arc<DashMap<TimerToken, TimerEntry>> = Arc::new(DashMap::new());

        let loop_timers = Arc::clone(&timers);
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Run(f) => f(),
                    Job::Fire(token, f) => {
                        // Claiming the entry is what makes the firing legitimate.
                        if loop_timers.remove(&token).is_some() {
                            f();
                        } else {
                            tracing::trace!(%token, "Dropping cancelled timer");
                        }
                    }
                }
            }
            tracing::debug!("Dispatch loop stopped");
        });

        Self {
            tx,
            timers,
            next_token: Arc::new(AtomicU64::new(1)),
            runtime,
        }
    }

    /// Enqueue a job to run on the dispatch loop after everything already queued.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Job::Run(Box::new(f))).is_err() {
            tracing::warn!("Dispatch loop closed - dropping job");
        }
    }

    /// Run `f` on the dispatch loop after `delay`, unless cancelled first.
    pub fn schedule<F>(&self, key: &str, delay: Duration, f: F) -> TimerToken
    where
        F: FnOnce() + Send + 'static,
    {
        let token = TimerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();

        self.timers.insert(
            token,
            TimerEntry {
                key: key.to_string(),
                cancel: cancel.clone(),
            },
        );

        let tx = self.tx.clone();
        let callback: Callback = Box::new(f);
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Job::Fire(token, callback));
                }
            }
        });

        tracing::trace!(
            slot = %key,
            %token,
            delay_ms = delay.as_millis() as u64,
            "Timer scheduled"
        );
        token
    }

    /// Cancel a timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self, token: TimerToken) -> bool {
        match self.timers.remove(&token) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                tracing::trace!(slot = %entry.key, %token, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer owned by `key`. Returns how many were cancelled.
    pub fn cancel_key(&self, key: &str) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|_, entry| {
            if entry.key == key {
                entry.cancel.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn pending_for(&self, key: &str) -> usize {
        self.timers.iter().filter(|e| e.value().key == key).count()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}
