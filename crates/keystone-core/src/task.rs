//! Scheduled tasks: recurring units of game logic driven by the tick.
//!
//! A [`Task`] carries the work; [`ScheduledTask`] wraps it with its delay,
//! instant flag, execution counter and attachment key; a [`TaskHandle`] is
//! the shared view used to cancel or retune a task from anywhere, including
//! from inside another task.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use keystone_types::{EntityId, TaskState};
use tracing::{error, warn};

/// Errors produced by a task's work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task reported a failure.
    #[error("task failed: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },

    /// The task panicked and was contained.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload text.
        message: String,
    },
}

impl TaskError {
    /// A plain failure with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Key grouping tasks so they can be found and cancelled together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKey {
    /// Tasks belonging to an entity; cancelled when it leaves the world.
    Entity(EntityId),
    /// Tasks grouped under a free-form label.
    Label(String),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "entity:{id}"),
            Self::Label(label) => write!(f, "label:{label}"),
        }
    }
}

/// A unit of recurring game logic run against context `C`.
pub trait Task<C>: Send {
    /// Do one execution's worth of work.
    fn execute(&mut self, ctx: &mut C, handle: &TaskHandle) -> Result<(), TaskError>;

    /// Called when the task is scheduled. Returning `false` rejects it.
    fn on_schedule(&mut self, _ctx: &mut C) -> bool {
        true
    }

    /// Called once, when the cancelled task is purged.
    fn on_cancel(&mut self, _ctx: &mut C) {}

    /// Called when [`Task::execute`] fails or panics. The task stays
    /// scheduled unless it cancels itself through `handle`.
    fn on_failure(&mut self, error: &TaskError, handle: &TaskHandle) {
        error!(key = ?handle.key(), error = %error, "Scheduled task failed");
    }
}

/// Closure-backed [`Task`].
pub struct FnTask<F>(F);

impl<F> FnTask<F> {
    /// Wrap a closure.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<C, F> Task<C> for FnTask<F>
where
    F: FnMut(&mut C, &TaskHandle) -> Result<(), TaskError> + Send,
{
    fn execute(&mut self, ctx: &mut C, handle: &TaskHandle) -> Result<(), TaskError> {
        (self.0)(ctx, handle)
    }
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CANCELLED: u8 = 2;

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    delay: AtomicU32,
    key: OnceLock<TaskKey>,
}

/// Shared handle to a scheduled task.
///
/// Cancellation takes effect on the scheduler's next pass. A task already
/// queued to run in the current pass still runs once.
#[derive(Debug, Clone)]
pub struct TaskHandle(Arc<Shared>);

impl TaskHandle {
    fn new(delay: u32) -> Self {
        Self(Arc::new(Shared {
            state: AtomicU8::new(STATE_IDLE),
            delay: AtomicU32::new(delay.max(1)),
            key: OnceLock::new(),
        }))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        match self.0.state.load(Ordering::Acquire) {
            STATE_IDLE => TaskState::Idle,
            STATE_RUNNING => TaskState::Running,
            _ => TaskState::Cancelled,
        }
    }

    /// Whether the task is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Whether the task is running.
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Cancel the task. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.0.state.swap(STATE_CANCELLED, Ordering::AcqRel) != STATE_CANCELLED
    }

    /// Ticks between executions.
    pub fn delay(&self) -> u32 {
        self.0.delay.load(Ordering::Acquire)
    }

    /// Change the delay. Values below one are raised to one.
    pub fn set_delay(&self, ticks: u32) {
        self.0.delay.store(ticks.max(1), Ordering::Release);
    }

    /// Attachment key, if any.
    pub fn key(&self) -> Option<&TaskKey> {
        self.0.key.get()
    }

    /// `Idle -> Running`; fails for any other starting state.
    pub(crate) fn start(&self) -> bool {
        self.0
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A task plus its scheduling parameters.
pub struct ScheduledTask<C> {
    pub(crate) task: Box<dyn Task<C>>,
    pub(crate) handle: TaskHandle,
    pub(crate) instant: bool,
    pub(crate) counter: u32,
}

impl<C> ScheduledTask<C> {
    /// Wrap a task with a delay of one tick.
    pub fn new(task: impl Task<C> + 'static) -> Self {
        Self {
            task: Box::new(task),
            handle: TaskHandle::new(1),
            instant: false,
            counter: 0,
        }
    }

    /// Wrap a closure with a delay of one tick.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&mut C, &TaskHandle) -> Result<(), TaskError> + Send + 'static,
    {
        Self::new(FnTask::new(f))
    }

    /// Run every `ticks` passes (minimum one).
    #[must_use]
    pub fn delay(self, ticks: u32) -> Self {
        self.handle.set_delay(ticks);
        self
    }

    /// Also run once immediately when scheduled.
    #[must_use]
    pub const fn instant(mut self) -> Self {
        self.instant = true;
        self
    }

    /// Attach the task to a key. A task keeps its first attachment; later
    /// keys are ignored.
    #[must_use]
    pub fn attach(self, key: TaskKey) -> Self {
        if let Err(rejected) = self.handle.0.key.set(key) {
            warn!(key = %rejected, existing = ?self.handle.key(), "task already has an attachment");
        }
        self
    }

    /// Handle sharing this task's state.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// Whether the task runs once at schedule time.
    pub const fn is_instant(&self) -> bool {
        self.instant
    }
}

impl<C> fmt::Debug for ScheduledTask<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("handle", &self.handle)
            .field("instant", &self.instant)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn noop() -> ScheduledTask<()> {
        ScheduledTask::from_fn(|_, _| Ok(()))
    }

    #[test]
    fn builder_sets_parameters() {
        let key = TaskKey::Label(String::from("spawns"));
        let task = noop().delay(3).instant().attach(key.clone());
        let handle = task.handle();
        assert!(task.is_instant());
        assert_eq!(handle.delay(), 3);
        assert_eq!(handle.key(), Some(&key));
        assert_eq!(handle.state(), TaskState::Idle);
    }

    #[test]
    fn delay_is_at_least_one() {
        let task = noop().delay(0);
        assert_eq!(task.handle().delay(), 1);
        task.handle().set_delay(0);
        assert_eq!(task.handle().delay(), 1);
    }

    #[test]
    fn start_only_from_idle() {
        let handle = noop().handle();
        assert!(handle.start());
        assert!(handle.is_running());
        assert!(!handle.start());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(!handle.start());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let task = noop();
        let a = task.handle();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }

    #[test]
    fn handle_taken_before_attach_stays_live() {
        let key = TaskKey::Label(String::from("early"));
        let task = noop();
        let early = task.handle();
        let task = task.attach(key.clone());
        assert_eq!(early.key(), Some(&key));
        assert!(early.cancel());
        assert!(task.handle().is_cancelled());
    }

    #[test]
    fn first_attachment_wins() {
        let first = TaskKey::Label(String::from("first"));
        let task = noop()
            .attach(first.clone())
            .attach(TaskKey::Label(String::from("second")));
        assert_eq!(task.handle().key(), Some(&first));
    }

    #[test]
    fn key_display() {
        assert_eq!(TaskKey::Label(String::from("x")).to_string(), "label:x");
    }
}
