//! Stateful actors.
//!
//! An [`Actor`] outlives individual events: every event routed to it reuses the same execution
//! context, and its [`AlarmCoordinator`] de-duplicates alarm invocations across events.
//!
//! ## Contents
//! - [`Actor`], [`ActorId`] identity, cached execution context, alarm slot
//! - [`AlarmCoordinator`], [`AlarmFulfiller`], [`ScheduledAlarm`] alarm de-duplication

mod alarm;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

pub use alarm::{AlarmCoordinator, AlarmFulfiller, AlarmOutcome, AlarmWaiter, ScheduledAlarm};

use crate::context::ExecutionContext;

/// Identity of an actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(Arc<str>);

impl ActorId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A stateful actor hosting a program instance.
pub struct Actor {
    id: ActorId,
    alarms: AlarmCoordinator,
    io_context: Mutex<Option<Arc<dyn ExecutionContext>>>,
}

impl Actor {
    /// Creates an actor with no cached execution context.
    pub fn new(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            alarms: AlarmCoordinator::new(),
            io_context: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Returns the result of an alarm already running or pending for `scheduled_time`.
    pub fn get_alarm(&self, scheduled_time: SystemTime) -> Option<AlarmWaiter> {
        self.alarms.get_alarm(scheduled_time)
    }

    /// Claims (or waits for) the right to run the alarm for `scheduled_time`.
    pub async fn schedule_alarm(&self, scheduled_time: SystemTime) -> ScheduledAlarm {
        self.alarms.schedule_alarm(scheduled_time).await
    }

    /// Execution context cached for this actor, if one was created.
    pub fn io_context(&self) -> Option<Arc<dyn ExecutionContext>> {
        self.io_context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Caches `context` for subsequent events.
    pub fn set_io_context(&self, context: Arc<dyn ExecutionContext>) {
        *self
            .io_context
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(context);
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
