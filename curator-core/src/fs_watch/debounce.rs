//! Deadline-based strict debounce.
//!
//! Every [`Debouncer::signal`] pushes the deadline to `now + window`. A single
//! waiter task sleeps until the deadline and fires only if the deadline has
//! not moved while it slept; otherwise it sleeps again until the new one.
//! With a `max_delay`, the deadline never moves past `burst_start +
//! max_delay`, so a burst that never goes quiet still flushes.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    fire_at: Instant,
    burst_started: Instant,
}

struct DebounceState {
    window: Duration,
    max_delay: Option<Duration>,
    deadline: Mutex<Option<Deadline>>,
    wake: Notify,
}

#[derive(Clone)]
pub struct Debouncer {
    state: Arc<DebounceState>,
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.state.window)
            .field("max_delay", &self.state.max_delay)
            .field("armed", &self.state.deadline.lock().is_some())
            .finish()
    }
}

impl Debouncer {
    pub fn new(window: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            state: Arc::new(DebounceState {
                window,
                max_delay,
                deadline: Mutex::new(None),
                wake: Notify::new(),
            }),
        }
    }

    /// Record activity. Safe to call from any thread, inside or outside the
    /// runtime.
    pub fn signal(&self) {
        let now = Instant::now();
        let mut deadline = self.state.deadline.lock();
        let burst_started = deadline.map(|d| d.burst_started).unwrap_or(now);
        let mut fire_at = now + self.state.window;
        if let Some(max_delay) = self.state.max_delay {
            fire_at = fire_at.min(burst_started + max_delay);
        }
        *deadline = Some(Deadline {
            fire_at,
            burst_started,
        });
        drop(deadline);
        self.state.wake.notify_one();
    }

    /// Whether a flush is scheduled.
    pub fn is_armed(&self) -> bool {
        self.state.deadline.lock().is_some()
    }

    /// Spawn the single waiter. `on_fire` runs to completion before the next
    /// deadline is considered, so fires never overlap.
    pub fn spawn<F, Fut>(&self, mut on_fire: F, cancel: CancellationToken) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                let current = *state.deadline.lock();
                let target = match current {
                    Some(target) => target,
                    None => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = state.wake.notified() => {}
                        }
                        continue;
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep_until(target.fire_at) => {}
                }

                let due = {
                    let mut deadline = state.deadline.lock();
                    if *deadline == Some(target) {
                        *deadline = None;
                        true
                    } else {
                        false
                    }
                };

                if due {
                    trace!("debounce window elapsed, firing");
                    on_fire().await;
                }
            }
        })
    }
}
