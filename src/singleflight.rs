//! # Single-Flight Fetch Coordinator
//!
//! Guarantees at most one outbound catalog fetch at a time and fans its
//! outcome out to every caller that asked while it was in flight. This is
//! the standard request-coalescing guard for a rate-limited upstream: N
//! cold-cache queries issued together (several UI lookups at launch) must
//! produce exactly one network call.
//!
//! ## State Machine
//!
//! ```text
//! IDLE --first caller--> IN_FLIGHT(waiters=[])
//! IN_FLIGHT             --later caller-->  waiter appended (FIFO)
//! IN_FLIGHT --trigger done--> drain waiters, IDLE, notify in enqueue order
//! ```
//!
//! The state lives behind a synchronous mutex: every critical section is a
//! plain field swap with no await inside, so the guard is never held across
//! a suspension point. Waiters are `oneshot` senders, resolved after the
//! state has already returned to `IDLE`; a caller that arrives during the
//! drain starts a fresh cycle instead of joining a finished one.
//!
//! A failed fetch notifies all current waiters with the failure and leaves
//! the coordinator ready for the next attempt; nothing is poisoned and
//! nothing retries on its own. If the leader task is cancelled mid-fetch,
//! a drop guard releases the waiters with a failure rather than leaving
//! them parked forever.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::TideError;

type Outcome = Result<(), TideError>;

enum FetchState {
    Idle,
    InFlight {
        /// Pending callers in enqueue order.
        waiters: Vec<oneshot::Sender<Outcome>>,
    },
}

/// Coalesces concurrent refresh requests into one in-flight fetch.
pub struct FetchCoordinator {
    state: Mutex<FetchState>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        FetchCoordinator {
            state: Mutex::new(FetchState::Idle),
        }
    }

    /// Run `trigger` if no fetch is in flight, or wait for the in-flight
    /// fetch's outcome otherwise.
    ///
    /// The first caller while `IDLE` becomes the leader: it runs `trigger`
    /// to completion (outside the state lock) and then notifies every
    /// caller that queued up behind it, in FIFO order. Later callers never
    /// invoke `trigger`; they just receive the leader's outcome.
    pub async fn ensure_fresh<F, Fut>(&self, trigger: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let rx = {
            let mut state = lock(&self.state);
            match &mut *state {
                FetchState::InFlight { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                FetchState::Idle => {
                    *state = FetchState::InFlight {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = rx {
            // The sender side only disappears if the leader was dropped
            // before notifying; surface that as a failed refresh.
            return rx.await.unwrap_or_else(|_| {
                Err(TideError::Network("catalog refresh abandoned".to_string()))
            });
        }

        // Leader path. The guard covers cancellation between here and the
        // explicit drain below.
        let mut guard = LeaderGuard {
            state: &self.state,
            armed: true,
        };

        let outcome = trigger().await;

        guard.armed = false;
        let waiters = drain(&self.state);
        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh cycle complete");
        for waiter in waiters {
            // A waiter that gave up waiting is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }
}

impl Default for FetchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomically take the waiter list and reset to `IDLE`.
fn drain(state: &Mutex<FetchState>) -> Vec<oneshot::Sender<Outcome>> {
    let mut state = lock(state);
    match std::mem::replace(&mut *state, FetchState::Idle) {
        FetchState::InFlight { waiters } => waiters,
        FetchState::Idle => Vec::new(),
    }
}

fn lock(state: &Mutex<FetchState>) -> std::sync::MutexGuard<'_, FetchState> {
    // The critical sections cannot panic, but recover anyway rather than
    // propagate poisoning into every future caller.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases waiters with a failure if the leader future is dropped before
/// it could notify them.
struct LeaderGuard<'a> {
    state: &'a Mutex<FetchState>,
    armed: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for waiter in drain(self.state) {
            let _ = waiter.send(Err(TideError::Network(
                "catalog refresh cancelled".to_string(),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_fetch() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            let calls = Arc::clone(&calls);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coordinator
                    .ensure_fresh(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the fetch open until the test releases it so
                        // the other callers pile up behind it.
                        release.notified().await;
                        Ok(())
                    })
                    .await
            }));
        }

        // Give every task time to reach the coordinator, then finish the
        // one in-flight fetch.
        tokio::time::sleep(Duration::from_millis(100)).await;
        release.notify_one();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok(), "every caller sees the outcome");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one trigger invocation");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failure_fans_out_and_does_not_poison() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let coordinator = Arc::clone(&coordinator);
            let calls = Arc::clone(&calls);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coordinator
                    .ensure_fresh(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Err(TideError::Network("upstream down".to_string()))
                    })
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        release.notify_one();

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(
                matches!(result, Err(TideError::Network(_))),
                "every waiter of the failed cycle sees the failure"
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failed cycle must not block the next attempt.
        let retried = coordinator
            .ensure_fresh(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(retried.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2, "new cycle starts from IDLE");
    }

    #[tokio::test]
    async fn sequential_calls_each_run_the_trigger() {
        let coordinator = FetchCoordinator::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            coordinator
                .ensure_fresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "no coalescing without overlap");
    }

    #[tokio::test]
    async fn waiters_are_notified_in_enqueue_order() {
        // Single-threaded runtime: tasks run in wake order, and the drain
        // loop sends to the oneshot channels sequentially, so the order the
        // waiters resume in is the order they were enqueued.
        let coordinator = Arc::new(FetchCoordinator::new());
        let release = Arc::new(Notify::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            let release = Arc::clone(&release);
            tokio::spawn(async move {
                coordinator
                    .ensure_fresh(|| async move {
                        release.notified().await;
                        Ok(())
                    })
                    .await
            })
        };

        while matches!(&*lock(&coordinator.state), FetchState::Idle) {
            tokio::task::yield_now().await;
        }

        // Enqueue waiters one at a time, confirming each has joined the
        // in-flight cycle before starting the next.
        let mut waiters = Vec::new();
        for i in 0..4usize {
            let waiter_coordinator = Arc::clone(&coordinator);
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                let outcome = waiter_coordinator.ensure_fresh(|| async { Ok(()) }).await;
                order.lock().unwrap().push(i);
                outcome
            }));
            loop {
                let enqueued = match &*lock(&coordinator.state) {
                    FetchState::InFlight { waiters } => waiters.len(),
                    FetchState::Idle => 0,
                };
                if enqueued == i + 1 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }

        release.notify_one();
        leader.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_leader_releases_waiters() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                coordinator
                    .ensure_fresh(|| async move {
                        started.notify_one();
                        // Never completes; the test aborts this task.
                        std::future::pending::<()>().await;
                        Ok(())
                    })
                    .await
            })
        };

        started.notified().await;

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.ensure_fresh(|| async { Ok(()) }).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        leader.abort();
        let result = waiter.await.unwrap();
        assert!(
            matches!(result, Err(TideError::Network(_))),
            "abandoned waiters get a failure, not a hang"
        );
    }
}
