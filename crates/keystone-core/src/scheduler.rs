//! Cooperative task scheduler.
//!
//! [`TaskManager`] keeps every scheduled task in a pending list. Once per
//! tick, [`TaskManager::run_iteration`] purges cancelled tasks, advances every
//! other task's counter, queues those whose counter reached their delay, and
//! then drains that queue in order. A failing or panicking task is reported
//! to its own failure hook and never interrupts the rest of the pass; a
//! panicking hook is logged and contained the same way.
//!
//! Cancelling a task that is already queued for the current pass does not
//! stop that run. It is purged on the next pass.
//!
//! Work running inside a pass cannot reach the manager itself, so tasks it
//! schedules go through the context's [`TaskHost`] buffer and are merged once
//! the pass has drained.

use std::collections::VecDeque;

use keystone_types::TaskState;
use tracing::{debug, error, trace};

use crate::fault;
use crate::task::{ScheduledTask, TaskError, TaskHandle, TaskKey};

/// A context that can buffer tasks scheduled while a pass is running.
pub trait TaskHost: Sized {
    /// Take every task buffered since the last call.
    fn take_scheduled(&mut self) -> Vec<ScheduledTask<Self>>;
}

/// Counts from one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Tasks whose work ran (including failures).
    pub executed: usize,
    /// Executions that returned an error or panicked.
    pub failed: usize,
    /// Cancelled tasks dropped from the pending list.
    pub purged: usize,
    /// Buffered tasks merged into the pending list.
    pub merged: usize,
}

/// Pending set plus execution-ready queue.
pub struct TaskManager<C> {
    pending: Vec<ScheduledTask<C>>,
    executing: VecDeque<usize>,
}

impl<C: TaskHost> TaskManager<C> {
    /// Create an empty manager.
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            executing: VecDeque::new(),
        }
    }

    /// Schedule a task.
    ///
    /// Only an `Idle` task whose `on_schedule` hook accepts is scheduled; it
    /// becomes `Running`, runs once right away if instant, and joins the
    /// pending list. Returns whether it was scheduled.
    pub fn schedule(&mut self, mut task: ScheduledTask<C>, ctx: &mut C) -> bool {
        if task.handle.state() != TaskState::Idle {
            debug!(key = ?task.handle.key(), state = ?task.handle.state(), "Task is not idle");
            return false;
        }
        let accepted = {
            let ScheduledTask { task: work, handle, .. } = &mut task;
            contain_hook("on_schedule", handle, || work.on_schedule(ctx)).unwrap_or(false)
        };
        if !accepted || !task.handle.start() {
            debug!(key = ?task.handle.key(), "Task rejected at schedule time");
            return false;
        }
        if task.instant {
            run_contained(&mut task, ctx);
        }
        trace!(key = ?task.handle.key(), delay = task.handle.delay(), "Task scheduled");
        self.pending.push(task);
        true
    }

    /// Run one scheduler pass.
    pub fn run_iteration(&mut self, ctx: &mut C) -> IterationReport {
        let mut report = IterationReport {
            merged: self.merge_buffered(ctx),
            ..IterationReport::default()
        };

        let before = self.pending.len();
        self.pending.retain_mut(|task| {
            if task.handle.is_cancelled() {
                let ScheduledTask { task: work, handle, .. } = task;
                contain_hook("on_cancel", handle, || work.on_cancel(ctx));
                false
            } else {
                true
            }
        });
        report.purged = before.saturating_sub(self.pending.len());

        for (slot, task) in self.pending.iter_mut().enumerate() {
            task.counter = task.counter.saturating_add(1);
            if task.counter >= task.handle.delay() && task.handle.is_running() {
                task.counter = 0;
                self.executing.push_back(slot);
            }
        }

        while let Some(slot) = self.executing.pop_front() {
            let Some(task) = self.pending.get_mut(slot) else {
                continue;
            };
            report.executed = report.executed.saturating_add(1);
            if !run_contained(task, ctx) {
                report.failed = report.failed.saturating_add(1);
            }
        }

        report.merged = report.merged.saturating_add(self.merge_buffered(ctx));
        report
    }

    /// Apply `action` to the handle of every pending task attached to `key`.
    pub fn for_each_attachment(&self, key: &TaskKey, mut action: impl FnMut(&TaskHandle)) {
        self.pending
            .iter()
            .filter(|task| task.handle.key() == Some(key))
            .for_each(|task| action(&task.handle));
    }

    /// Cancel every pending task attached to `key`. Returns how many were
    /// newly cancelled.
    pub fn cancel_all(&self, key: &TaskKey) -> usize {
        let mut cancelled = 0_usize;
        self.for_each_attachment(key, |handle| {
            if handle.cancel() {
                cancelled = cancelled.saturating_add(1);
            }
        });
        cancelled
    }

    /// Number of tasks in the pending list, cancelled ones included until
    /// the next pass purges them.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn merge_buffered(&mut self, ctx: &mut C) -> usize {
        let buffered = ctx.take_scheduled();
        let mut merged = 0_usize;
        for task in buffered {
            if self.schedule(task, ctx) {
                merged = merged.saturating_add(1);
            }
        }
        merged
    }
}

impl<C: TaskHost> Default for TaskManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute once with panics contained. Returns whether the work succeeded.
fn run_contained<C>(task: &mut ScheduledTask<C>, ctx: &mut C) -> bool {
    let ScheduledTask {
        task: work, handle, ..
    } = task;
    let result = fault::contain(
        || work.execute(ctx, handle),
        |message| TaskError::Panicked { message },
    );
    match result {
        Ok(()) => true,
        Err(error) => {
            contain_hook("on_failure", handle, || work.on_failure(&error, handle));
            false
        }
    }
}

/// Run a task hook with panics contained. `None` means it panicked.
fn contain_hook<T>(hook: &'static str, handle: &TaskHandle, work: impl FnOnce() -> T) -> Option<T> {
    match fault::contain(|| Ok(work()), |message| message) {
        Ok(value) => Some(value),
        Err(message) => {
            error!(key = ?handle.key(), hook, panic = %message, "Task hook panicked");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use keystone_types::EntityId;

    use super::*;
    use crate::task::Task;

    #[derive(Default)]
    struct Ctx {
        log: Vec<(u32, &'static str)>,
        pass: u32,
        buffered: Vec<ScheduledTask<Self>>,
        cancels: u32,
    }

    impl TaskHost for Ctx {
        fn take_scheduled(&mut self) -> Vec<ScheduledTask<Self>> {
            std::mem::take(&mut self.buffered)
        }
    }

    fn logging(label: &'static str) -> ScheduledTask<Ctx> {
        ScheduledTask::from_fn(move |ctx: &mut Ctx, _| {
            ctx.log.push((ctx.pass, label));
            Ok(())
        })
    }

    fn run(manager: &mut TaskManager<Ctx>, ctx: &mut Ctx, passes: u32) {
        for _ in 0..passes {
            ctx.pass += 1;
            manager.run_iteration(ctx);
        }
    }

    struct Cancelling;

    impl Task<Ctx> for Cancelling {
        fn execute(&mut self, ctx: &mut Ctx, handle: &TaskHandle) -> Result<(), TaskError> {
            ctx.log.push((ctx.pass, "cancelling"));
            handle.cancel();
            Ok(())
        }

        fn on_cancel(&mut self, ctx: &mut Ctx) {
            ctx.cancels += 1;
        }
    }

    #[test]
    fn delay_three_runs_on_every_third_pass() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        assert!(manager.schedule(logging("t").delay(3), &mut ctx));

        run(&mut manager, &mut ctx, 9);
        let passes: Vec<_> = ctx.log.iter().map(|(pass, _)| *pass).collect();
        assert_eq!(passes, vec![3, 6, 9]);
    }

    #[test]
    fn instant_runs_at_schedule_time_too() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        manager.schedule(logging("t").delay(2).instant(), &mut ctx);
        assert_eq!(ctx.log, vec![(0, "t")]);

        run(&mut manager, &mut ctx, 4);
        let passes: Vec<_> = ctx.log.iter().map(|(pass, _)| *pass).collect();
        assert_eq!(passes, vec![0, 2, 4]);
    }

    #[test]
    fn ready_tasks_run_in_schedule_order() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        manager.schedule(logging("a"), &mut ctx);
        manager.schedule(logging("b"), &mut ctx);
        manager.schedule(logging("c"), &mut ctx);

        run(&mut manager, &mut ctx, 1);
        assert_eq!(ctx.log, vec![(1, "a"), (1, "b"), (1, "c")]);
    }

    #[test]
    fn self_cancel_lets_the_pass_finish_and_stops_future_runs() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        manager.schedule(ScheduledTask::new(Cancelling), &mut ctx);
        manager.schedule(logging("after"), &mut ctx);

        run(&mut manager, &mut ctx, 3);
        assert_eq!(
            ctx.log,
            vec![(1, "cancelling"), (1, "after"), (2, "after"), (3, "after")]
        );
        assert_eq!(ctx.cancels, 1);
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn cancelled_before_its_turn_runs_out_the_pass() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let victim = logging("victim");
        let victim_handle = victim.handle();
        let killer = ScheduledTask::from_fn(move |ctx: &mut Ctx, _| {
            ctx.log.push((ctx.pass, "killer"));
            victim_handle.cancel();
            Ok(())
        });
        manager.schedule(killer, &mut ctx);
        manager.schedule(victim, &mut ctx);

        run(&mut manager, &mut ctx, 2);
        assert_eq!(ctx.log, vec![(1, "killer"), (1, "victim"), (2, "killer")]);
        assert_eq!(manager.pending_count(), 1);
    }

    struct LoudCancel;

    impl Task<Ctx> for LoudCancel {
        fn execute(&mut self, ctx: &mut Ctx, handle: &TaskHandle) -> Result<(), TaskError> {
            ctx.log.push((ctx.pass, "loud"));
            handle.cancel();
            Ok(())
        }

        fn on_cancel(&mut self, _: &mut Ctx) {
            panic!("on_cancel blew up");
        }
    }

    struct LoudFailure;

    impl Task<Ctx> for LoudFailure {
        fn execute(&mut self, _: &mut Ctx, _: &TaskHandle) -> Result<(), TaskError> {
            Err(TaskError::failed("nope"))
        }

        fn on_failure(&mut self, _: &TaskError, _: &TaskHandle) {
            panic!("on_failure blew up");
        }
    }

    struct LoudSchedule;

    impl Task<Ctx> for LoudSchedule {
        fn execute(&mut self, _: &mut Ctx, _: &TaskHandle) -> Result<(), TaskError> {
            Ok(())
        }

        fn on_schedule(&mut self, _: &mut Ctx) -> bool {
            panic!("on_schedule blew up");
        }
    }

    #[test]
    fn panicking_hooks_are_contained() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let rejected = ScheduledTask::new(LoudSchedule);
        let rejected_handle = rejected.handle();
        assert!(!manager.schedule(rejected, &mut ctx));
        assert_eq!(rejected_handle.state(), TaskState::Idle);

        manager.schedule(ScheduledTask::new(LoudCancel), &mut ctx);
        manager.schedule(ScheduledTask::new(LoudFailure), &mut ctx);
        manager.schedule(logging("survivor"), &mut ctx);

        run(&mut manager, &mut ctx, 3);
        assert_eq!(
            ctx.log,
            vec![(1, "loud"), (1, "survivor"), (2, "survivor"), (3, "survivor")]
        );
        assert_eq!(manager.pending_count(), 2);
    }

    #[test]
    fn failures_and_panics_are_contained() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        manager.schedule(
            ScheduledTask::from_fn(|_: &mut Ctx, _| Err(TaskError::failed("nope"))),
            &mut ctx,
        );
        manager.schedule(
            ScheduledTask::from_fn(|_: &mut Ctx, _| panic!("task blew up")),
            &mut ctx,
        );
        manager.schedule(logging("survivor"), &mut ctx);

        ctx.pass = 1;
        let report = manager.run_iteration(&mut ctx);
        assert_eq!(report.executed, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(ctx.log, vec![(1, "survivor")]);
        assert_eq!(manager.pending_count(), 3);
    }

    #[test]
    fn schedule_only_from_idle() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let task = logging("t");
        let handle = task.handle();
        handle.cancel();
        assert!(!manager.schedule(task, &mut ctx));
        assert_eq!(handle.state(), TaskState::Cancelled);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn on_schedule_can_reject() {
        struct Picky;
        impl Task<Ctx> for Picky {
            fn execute(&mut self, _: &mut Ctx, _: &TaskHandle) -> Result<(), TaskError> {
                Ok(())
            }
            fn on_schedule(&mut self, _: &mut Ctx) -> bool {
                false
            }
        }

        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let task = ScheduledTask::new(Picky);
        let handle = task.handle();
        assert!(!manager.schedule(task, &mut ctx));
        assert_eq!(handle.state(), TaskState::Idle);
    }

    #[test]
    fn tasks_scheduled_mid_pass_are_merged_after_drain() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let spawner = ScheduledTask::from_fn(|ctx: &mut Ctx, handle: &TaskHandle| {
            ctx.log.push((ctx.pass, "spawner"));
            ctx.buffered.push(logging("child"));
            handle.cancel();
            Ok(())
        });
        manager.schedule(spawner, &mut ctx);

        run(&mut manager, &mut ctx, 2);
        assert_eq!(ctx.log, vec![(1, "spawner"), (2, "child")]);
    }

    #[test]
    fn attachment_cancellation() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let owner = TaskKey::Entity(EntityId::new());
        manager.schedule(logging("a").attach(owner.clone()), &mut ctx);
        manager.schedule(logging("b").attach(owner.clone()), &mut ctx);
        manager.schedule(logging("c"), &mut ctx);

        let mut seen = 0;
        manager.for_each_attachment(&owner, |_| seen += 1);
        assert_eq!(seen, 2);
        assert_eq!(manager.cancel_all(&owner), 2);
        assert_eq!(manager.cancel_all(&owner), 0);

        let report = {
            ctx.pass = 1;
            manager.run_iteration(&mut ctx)
        };
        assert_eq!(report.purged, 2);
        assert_eq!(ctx.log, vec![(1, "c")]);
    }

    #[test]
    fn runtime_delay_change() {
        let mut manager = TaskManager::new();
        let mut ctx = Ctx::default();
        let task = logging("t");
        let handle = task.handle();
        manager.schedule(task, &mut ctx);

        run(&mut manager, &mut ctx, 1);
        handle.set_delay(2);
        run(&mut manager, &mut ctx, 4);
        let passes: Vec<_> = ctx.log.iter().map(|(pass, _)| *pass).collect();
        assert_eq!(passes, vec![1, 3, 5]);
    }
}
