//! Deferred task queue.
//!
//! Features:
//!   - Task scheduling from any thread with duplicate rejection
//!   - Main-thread-only draining in FIFO order
//!   - Backlog and slow-task warnings
//!
//! Tasks are one-shot: the queue takes a reference at schedule time and drops
//! it right after the task runs. No lock is held while a task executes, so
//! tasks may freely schedule further tasks; those land in the next drain pass.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::threads::ThreadRegistry;
use crate::types::{TaskId, TaskQueueConfig};

/// A one-shot unit of work executed on the main execution thread.
pub trait Task: Send + Sync {
    /// Execute the task. Invoked during a drain pass, never under a queue lock.
    fn run(&self);
}

/// Queue entry: the task plus bookkeeping for diagnostics.
struct ScheduledTask {
    id: TaskId,
    task: Arc<dyn Task>,
    scheduled_at: DateTime<Utc>,
}

// =============================================================================
// Task Queue
// =============================================================================

/// TaskQueue accumulates deferred work for the main execution thread.
///
/// Scheduling is safe from any thread. Draining is restricted to the main
/// execution thread: an off-thread drain logs a warning and runs nothing.
pub struct TaskQueue {
    /// Pending tasks in FIFO order.
    pending: Mutex<Vec<ScheduledTask>>,

    /// Statistics
    stats: Mutex<QueueStats>,

    /// Main-thread designation used to gate draining.
    threads: Arc<ThreadRegistry>,

    config: TaskQueueConfig,
}

/// Statistics about queue usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub tasks_scheduled: u64,
    pub tasks_executed: u64,
    pub duplicates_rejected: u64,
    pub tasks_cleared: u64,
    pub off_thread_drains: u64,
    pub pending_tasks: usize,
}

impl TaskQueue {
    /// Create a new queue gated by the given thread registry.
    pub fn new(threads: Arc<ThreadRegistry>, config: TaskQueueConfig) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            stats: Mutex::new(QueueStats::default()),
            threads,
            config,
        }
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedule a task for the next drain pass.
    /// Returns true if the task was queued, false if it is already pending.
    pub fn schedule_task(&self, task: Arc<dyn Task>) -> bool {
        let mut pending = self.pending.lock();

        if pending.iter().any(|entry| Arc::ptr_eq(&entry.task, &task)) {
            let mut stats = self.stats.lock();
            stats.duplicates_rejected += 1;
            tracing::warn!("Task already pending; duplicate schedule rejected");
            return false;
        }

        let id = TaskId::new();
        pending.push(ScheduledTask {
            id: id.clone(),
            task,
            scheduled_at: Utc::now(),
        });
        let backlog = pending.len();

        let mut stats = self.stats.lock();
        stats.tasks_scheduled += 1;
        stats.pending_tasks = backlog;
        drop(stats);

        if backlog == self.config.pending_warn_threshold {
            tracing::warn!("Task backlog reached {} pending tasks", backlog);
        }

        tracing::debug!("Scheduled task {} ({} pending)", id, backlog);
        true
    }

    // =========================================================================
    // Draining
    // =========================================================================

    /// Run every task that was pending when the call began, in FIFO order.
    ///
    /// Must be called from the main execution thread; any other caller gets a
    /// warning and nothing runs. The queue is swapped out before the pass, so
    /// tasks scheduled while the pass runs wait for the next call. Each task
    /// is dropped immediately after it runs. A panicking task aborts the
    /// pass; the tasks behind it return to the queue. Returns the number
    /// executed.
    pub fn execute_pending_tasks(&self) -> usize {
        if !self.threads.is_main_execution_thread() {
            self.stats.lock().off_thread_drains += 1;
            tracing::warn!("execute_pending_tasks called off the main execution thread; tasks left pending");
            return 0;
        }

        let batch = {
            let mut pending = self.pending.lock();
            let batch = std::mem::take(&mut *pending);
            self.stats.lock().pending_tasks = 0;
            batch
        };

        if batch.is_empty() {
            return 0;
        }

        // Held newest-first so each pop yields the oldest entry and drops it
        // as soon as it has run
        let mut guard = DrainGuard {
            queue: self,
            remaining: batch,
        };
        guard.remaining.reverse();

        let mut executed = 0usize;
        while let Some(entry) = guard.remaining.pop() {
            let started = Instant::now();
            entry.task.run();
            executed += 1;
            let elapsed = started.elapsed();

            if elapsed > self.config.slow_task_warning {
                let queued_ms = (Utc::now() - entry.scheduled_at).num_milliseconds();
                tracing::warn!(
                    "Task {} ran for {:?} after waiting {}ms in the queue",
                    entry.id,
                    elapsed,
                    queued_ms
                );
            } else {
                tracing::debug!("Executed task {} in {:?}", entry.id, elapsed);
            }
        }

        self.stats.lock().tasks_executed += executed as u64;
        tracing::debug!("Drained {} deferred tasks", executed);
        executed
    }

    /// Drop every pending task without running it.
    /// Intended for teardown. Returns the number destroyed.
    pub fn clear_pending_tasks(&self) -> usize {
        let cleared = {
            let mut pending = self.pending.lock();
            let cleared = pending.len();
            pending.clear();
            let mut stats = self.stats.lock();
            stats.tasks_cleared += cleared as u64;
            stats.pending_tasks = 0;
            cleared
        };

        if cleared > 0 {
            tracing::debug!("Cleared {} pending tasks without running them", cleared);
        }
        cleared
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of the currently pending tasks.
    pub fn get_pending_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.pending
            .lock()
            .iter()
            .map(|entry| Arc::clone(&entry.task))
            .collect()
    }

    /// Number of currently pending tasks.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Get current queue statistics.
    pub fn get_stats(&self) -> QueueStats {
        self.stats.lock().clone()
    }

    /// Reset statistics counters (the pending gauge is left alone).
    pub fn reset_stats(&self) {
        let mut stats = self.stats.lock();
        stats.tasks_scheduled = 0;
        stats.tasks_executed = 0;
        stats.duplicates_rejected = 0;
        stats.tasks_cleared = 0;
        stats.off_thread_drains = 0;
    }
}

/// Returns the unexecuted remainder of a drain pass to the front of the
/// queue when the pass unwinds mid-batch.
struct DrainGuard<'a> {
    queue: &'a TaskQueue,
    remaining: Vec<ScheduledTask>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.remaining.is_empty() {
            return;
        }

        // Entries are held newest-first while draining; restore FIFO order
        self.remaining.reverse();
        let abandoned = self.remaining.len();

        let mut pending = self.queue.pending.lock();
        let mut restored = std::mem::take(&mut self.remaining);
        restored.append(&mut *pending);
        *pending = restored;
        self.queue.stats.lock().pending_tasks = pending.len();

        tracing::warn!(
            "Drain pass aborted mid-batch; {} unexecuted tasks returned to the queue",
            abandoned
        );
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending.lock().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tracing_test::traced_test;

    fn test_queue() -> Arc<TaskQueue> {
        Arc::new(TaskQueue::new(
            Arc::new(ThreadRegistry::new()),
            TaskQueueConfig::default(),
        ))
    }

    /// Counts how many times it has run.
    struct CountingTask {
        runs: AtomicUsize,
    }

    impl CountingTask {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl Task for CountingTask {
        fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Appends its label to a shared journal when run.
    struct OrderedTask {
        label: usize,
        journal: Arc<Mutex<Vec<usize>>>,
    }

    impl Task for OrderedTask {
        fn run(&self) {
            self.journal.lock().push(self.label);
        }
    }

    #[test]
    fn test_schedule_and_execute() {
        let queue = test_queue();
        let task1 = CountingTask::new();
        let task2 = CountingTask::new();

        assert!(queue.schedule_task(task1.clone()));
        assert!(queue.schedule_task(task2.clone()));
        assert_eq!(queue.pending_count(), 2);

        let executed = queue.execute_pending_tasks();
        assert_eq!(executed, 2);
        assert_eq!(task1.runs(), 1);
        assert_eq!(task2.runs(), 1);
        assert_eq!(queue.pending_count(), 0);

        // A drained task can be scheduled again
        assert!(queue.schedule_task(task1.clone()));
        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(task1.runs(), 2);
    }

    #[test]
    fn test_duplicate_schedule_rejected() {
        let queue = test_queue();
        let task = CountingTask::new();

        assert!(queue.schedule_task(task.clone()));
        assert!(!queue.schedule_task(task.clone()));
        assert_eq!(queue.pending_count(), 1);

        let stats = queue.get_stats();
        assert_eq!(stats.tasks_scheduled, 1);
        assert_eq!(stats.duplicates_rejected, 1);
    }

    #[test]
    fn test_fifo_order() {
        let queue = test_queue();
        let journal = Arc::new(Mutex::new(Vec::new()));

        for label in 0..5 {
            queue.schedule_task(Arc::new(OrderedTask {
                label,
                journal: Arc::clone(&journal),
            }));
        }

        assert_eq!(queue.execute_pending_tasks(), 5);
        assert_eq!(*journal.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[traced_test]
    #[test]
    fn test_execute_off_main_thread_runs_nothing() {
        let threads = Arc::new(ThreadRegistry::new());
        let queue = TaskQueue::new(Arc::clone(&threads), TaskQueueConfig::default());

        // Hand the designation to a worker so this thread is not main
        let remote = Arc::clone(&threads);
        thread::spawn(move || remote.set_main_execution_thread())
            .join()
            .unwrap();

        let task = CountingTask::new();
        queue.schedule_task(task.clone());

        assert_eq!(queue.execute_pending_tasks(), 0);
        assert_eq!(task.runs(), 0);
        assert_eq!(queue.pending_count(), 1);
        assert!(logs_contain("off the main execution thread"));
        assert_eq!(queue.get_stats().off_thread_drains, 1);

        // Undesignated registry is fail-open; draining works again
        threads.clear_main_execution_thread();
        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(task.runs(), 1);
    }

    #[test]
    fn test_cross_thread_scheduling() {
        let queue = test_queue();
        let task = CountingTask::new();

        let remote = Arc::clone(&queue);
        let remote_task = task.clone();
        let accepted = thread::spawn(move || remote.schedule_task(remote_task))
            .join()
            .unwrap();

        assert!(accepted);
        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(task.runs(), 1);
    }

    /// Schedules a follow-up task from inside its own run.
    struct ChainTask {
        queue: Arc<TaskQueue>,
        follow_up: Arc<CountingTask>,
    }

    impl Task for ChainTask {
        fn run(&self) {
            assert!(self.queue.schedule_task(self.follow_up.clone()));
        }
    }

    #[test]
    fn test_task_scheduled_during_drain_waits_for_next_pass() {
        let queue = test_queue();
        let follow_up = CountingTask::new();

        queue.schedule_task(Arc::new(ChainTask {
            queue: Arc::clone(&queue),
            follow_up: follow_up.clone(),
        }));

        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(follow_up.runs(), 0);
        assert_eq!(queue.pending_count(), 1);

        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(follow_up.runs(), 1);
    }

    /// Re-schedules itself once from inside run.
    struct SelfRequeue {
        queue: Arc<TaskQueue>,
        me: Mutex<Option<Arc<dyn Task>>>,
        runs: AtomicUsize,
    }

    impl Task for SelfRequeue {
        fn run(&self) {
            if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
                let me = self.me.lock().clone();
                if let Some(me) = me {
                    assert!(self.queue.schedule_task(me));
                }
            }
        }
    }

    #[test]
    fn test_task_may_reschedule_itself() {
        let queue = test_queue();
        let task = Arc::new(SelfRequeue {
            queue: Arc::clone(&queue),
            me: Mutex::new(None),
            runs: AtomicUsize::new(0),
        });
        *task.me.lock() = Some(task.clone());

        queue.schedule_task(task.clone());

        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);

        *task.me.lock() = None;
    }

    /// Panics on run.
    struct ExplodingTask;

    impl Task for ExplodingTask {
        fn run(&self) {
            panic!("task failure");
        }
    }

    #[test]
    fn test_panicking_task_returns_remainder_to_queue() {
        let queue = test_queue();
        let journal = Arc::new(Mutex::new(Vec::new()));

        queue.schedule_task(Arc::new(OrderedTask {
            label: 0,
            journal: Arc::clone(&journal),
        }));
        queue.schedule_task(Arc::new(ExplodingTask));
        queue.schedule_task(Arc::new(OrderedTask {
            label: 1,
            journal: Arc::clone(&journal),
        }));

        let unwind = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            queue.execute_pending_tasks()
        }));
        assert!(unwind.is_err());

        // The task ahead of the panic ran; the one behind it is pending again
        assert_eq!(*journal.lock(), vec![0]);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.get_stats().pending_tasks, 1);

        assert_eq!(queue.execute_pending_tasks(), 1);
        assert_eq!(*journal.lock(), vec![0, 1]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_clear_pending_tasks() {
        let queue = test_queue();
        let task1 = CountingTask::new();
        let task2 = CountingTask::new();

        queue.schedule_task(task1.clone());
        queue.schedule_task(task2.clone());

        assert_eq!(queue.clear_pending_tasks(), 2);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(task1.runs(), 0);
        assert_eq!(task2.runs(), 0);

        let stats = queue.get_stats();
        assert_eq!(stats.tasks_cleared, 2);
        assert_eq!(stats.tasks_executed, 0);
    }

    #[test]
    fn test_get_pending_tasks_snapshot() {
        let queue = test_queue();
        queue.schedule_task(CountingTask::new());
        queue.schedule_task(CountingTask::new());

        let snapshot = queue.get_pending_tasks();
        assert_eq!(snapshot.len(), 2);

        queue.clear_pending_tasks();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(queue.get_pending_tasks().len(), 0);
    }

    #[traced_test]
    #[test]
    fn test_backlog_warning() {
        let config = TaskQueueConfig {
            pending_warn_threshold: 2,
            ..TaskQueueConfig::default()
        };
        let queue = TaskQueue::new(Arc::new(ThreadRegistry::new()), config);

        queue.schedule_task(CountingTask::new());
        queue.schedule_task(CountingTask::new());

        assert!(logs_contain("Task backlog reached 2 pending tasks"));
    }

    #[test]
    fn test_stats_and_reset() {
        let queue = test_queue();
        let task = CountingTask::new();

        queue.schedule_task(task.clone());
        queue.schedule_task(task.clone()); // duplicate
        queue.execute_pending_tasks();

        let stats = queue.get_stats();
        assert_eq!(stats.tasks_scheduled, 1);
        assert_eq!(stats.tasks_executed, 1);
        assert_eq!(stats.duplicates_rejected, 1);
        assert_eq!(stats.pending_tasks, 0);

        queue.reset_stats();
        let stats = queue.get_stats();
        assert_eq!(stats.tasks_scheduled, 0);
        assert_eq!(stats.tasks_executed, 0);
        assert_eq!(stats.duplicates_rejected, 0);
    }

    proptest::proptest! {
        /// A single drain always runs tasks in scheduling order.
        #[test]
        fn prop_drain_preserves_fifo(count in 1usize..40) {
            let queue = test_queue();
            let journal = Arc::new(Mutex::new(Vec::new()));

            for label in 0..count {
                queue.schedule_task(Arc::new(OrderedTask {
                    label,
                    journal: Arc::clone(&journal),
                }));
            }

            proptest::prop_assert_eq!(queue.execute_pending_tasks(), count);
            let expected: Vec<usize> = (0..count).collect();
            proptest::prop_assert_eq!(journal.lock().clone(), expected);
        }
    }
}
