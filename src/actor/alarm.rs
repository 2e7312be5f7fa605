//! # Alarm coordinator: per-actor alarm de-duplication.
//!
//! An actor has one logical timer. Alarm requests can arrive concurrently (retries, reschedules),
//! but the program must see each scheduled time at most once, and at most one alarm runs at a time.
//!
//! ## State machine
//! ```text
//!            schedule(T)                        fulfill / reject / cancel
//!   Idle ─────────────────► Running(T) ───────────────────────────────────► Idle
//!                             │    ▲
//!              schedule(T2≠T) │    │ fulfill / reject / cancel (pending promoted)
//!                             ▼    │
//!                     Running(T) + Pending(T2)
//!                             │
//!              schedule(T3)   └──► Running(T) + Pending(T3)   (T2 superseded)
//! ```
//!
//! ## Rules
//! - Requests for the running (or pending) time attach to its result; no second invocation.
//! - A newer pending request supersedes the older one; the superseded waiters observe the
//!   result of the alarm that eventually runs in its place.
//! - Dropping an [`AlarmFulfiller`] without settling it cancels the alarm: attached waiters
//!   observe [`AlarmResult::canceled`] and the state advances as on completion.
//! - State changes happen in short critical sections; the lock is never held across `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use crate::error::Exception;
use crate::interface::AlarmResult;

/// Outcome shared by every caller attached to one alarm run.
pub type AlarmOutcome = Result<AlarmResult, Exception>;

/// Future resolving with the outcome of an alarm someone else is running.
pub type AlarmWaiter = Shared<BoxFuture<'static, AlarmOutcome>>;

/// What a call to [`AlarmCoordinator::schedule_alarm`] got.
#[derive(Debug)]
pub enum ScheduledAlarm {
    /// The caller must run the alarm and settle the fulfiller.
    Fulfiller(AlarmFulfiller),
    /// Another caller ran the alarm; this is its outcome.
    Settled(AlarmOutcome),
}

struct Pending {
    time: SystemTime,
    grant: oneshot::Sender<AlarmFulfiller>,
    result_tx: oneshot::Sender<AlarmOutcome>,
    result: AlarmWaiter,
}

enum AlarmState {
    Idle,
    Running {
        time: SystemTime,
        result: AlarmWaiter,
        pending: Option<Pending>,
    },
}

enum Wait {
    Attached(AlarmWaiter),
    Queued(oneshot::Receiver<AlarmFulfiller>, AlarmWaiter),
}

fn outcome_channel() -> (oneshot::Sender<AlarmOutcome>, AlarmWaiter) {
    let (tx, rx) = oneshot::channel::<AlarmOutcome>();
    let result = async move { rx.await.unwrap_or_else(|_| Ok(AlarmResult::canceled())) }
        .boxed()
        .shared();
    (tx, result)
}

/// Per-actor alarm slot.
///
/// Cloning is cheap; clones share the same slot.
#[derive(Clone)]
pub struct AlarmCoordinator {
    state: Arc<Mutex<AlarmState>>,
}

impl Default for AlarmCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AlarmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.lock() {
            AlarmState::Idle => "idle",
            AlarmState::Running { pending: None, .. } => "running",
            AlarmState::Running {
                pending: Some(_), ..
            } => "running+pending",
        };
        f.debug_struct("AlarmCoordinator")
            .field("state", &state)
            .finish()
    }
}

impl AlarmCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AlarmState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AlarmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a waiter for the alarm already running or pending for `scheduled_time`.
    pub fn get_alarm(&self, scheduled_time: SystemTime) -> Option<AlarmWaiter> {
        match &*self.lock() {
            AlarmState::Running { time, result, .. } if *time == scheduled_time => {
                Some(result.clone())
            }
            AlarmState::Running {
                pending: Some(pending),
                ..
            } if pending.time == scheduled_time => Some(pending.result.clone()),
            _ => None,
        }
    }

    /// Claims the right to run the alarm for `scheduled_time`, or waits for whoever holds it.
    ///
    /// - Idle: returns a fulfiller immediately.
    /// - Same time already running or pending: waits for that outcome.
    /// - Different time while running: becomes the pending request (superseding any other) and
    ///   waits until promoted; if superseded in turn, waits for the replacement's outcome.
    pub async fn schedule_alarm(&self, scheduled_time: SystemTime) -> ScheduledAlarm {
        let wait = {
            let mut state = self.lock();
            if matches!(*state, AlarmState::Idle) {
                let (result_tx, result) = outcome_channel();
                *state = AlarmState::Running {
                    time: scheduled_time,
                    result,
                    pending: None,
                };
                return ScheduledAlarm::Fulfiller(AlarmFulfiller::new(
                    scheduled_time,
                    result_tx,
                    self.clone(),
                ));
            }

            match &mut *state {
                AlarmState::Idle => unreachable!("idle slot handled above"),
                AlarmState::Running { time, result, .. } if *time == scheduled_time => {
                    Wait::Attached(result.clone())
                }
                AlarmState::Running { pending, .. } => {
                    if let Some(queued) = pending.as_ref().filter(|q| q.time == scheduled_time) {
                        Wait::Attached(queued.result.clone())
                    } else {
                        let (result_tx, result) = match pending.take() {
                            // Superseded: its waiters follow whichever alarm runs next.
                            Some(old) => (old.result_tx, old.result),
                            None => outcome_channel(),
                        };
                        let (grant, granted) = oneshot::channel();
                        *pending = Some(Pending {
                            time: scheduled_time,
                            grant,
                            result_tx,
                            result: result.clone(),
                        });
                        Wait::Queued(granted, result)
                    }
                }
            }
        };

        match wait {
            Wait::Attached(result) => ScheduledAlarm::Settled(result.await),
            Wait::Queued(granted, result) => match granted.await {
                Ok(fulfiller) => ScheduledAlarm::Fulfiller(fulfiller),
                Err(_) => ScheduledAlarm::Settled(result.await),
            },
        }
    }

    /// Clears the running slot and promotes the pending request, if any.
    fn finish(&self) {
        let promoted = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, AlarmState::Idle) {
                AlarmState::Running {
                    pending: Some(next),
                    ..
                } => {
                    *state = AlarmState::Running {
                        time: next.time,
                        result: next.result,
                        pending: None,
                    };
                    Some((next.time, next.grant, next.result_tx))
                }
                _ => None,
            }
        };

        if let Some((time, grant, result_tx)) = promoted {
            let fulfiller = AlarmFulfiller::new(time, result_tx, self.clone());
            // Requester gone: dropping the returned fulfiller cancels and advances again.
            if let Err(orphan) = grant.send(fulfiller) {
                drop(orphan);
            }
        }
    }
}

/// Right (and obligation) to run one alarm.
///
/// Settle it with [`fulfill`](Self::fulfill) or [`reject`](Self::reject); dropping it unsettled
/// cancels the alarm for every attached waiter.
pub struct AlarmFulfiller {
    scheduled_time: SystemTime,
    result_tx: Option<oneshot::Sender<AlarmOutcome>>,
    coordinator: AlarmCoordinator,
}

impl AlarmFulfiller {
    fn new(
        scheduled_time: SystemTime,
        result_tx: oneshot::Sender<AlarmOutcome>,
        coordinator: AlarmCoordinator,
    ) -> Self {
        Self {
            scheduled_time,
            result_tx: Some(result_tx),
            coordinator,
        }
    }

    /// Time the alarm was scheduled for.
    pub fn scheduled_time(&self) -> SystemTime {
        self.scheduled_time
    }

    /// Resolves every attached waiter with `result`.
    pub fn fulfill(mut self, result: AlarmResult) {
        self.settle(Ok(result));
    }

    /// Resolves every attached waiter with `error`.
    pub fn reject(mut self, error: Exception) {
        self.settle(Err(error));
    }

    fn settle(&mut self, outcome: AlarmOutcome) {
        if let Some(tx) = self.result_tx.take() {
            self.coordinator.finish();
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for AlarmFulfiller {
    fn drop(&mut self) {
        self.settle(Ok(AlarmResult::canceled()));
    }
}

impl std::fmt::Debug for AlarmFulfiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmFulfiller")
            .field("scheduled_time", &self.scheduled_time)
            .field("settled", &self.result_tx.is_none())
            .finish()
    }
}
