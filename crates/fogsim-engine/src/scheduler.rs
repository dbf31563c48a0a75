//! Per-device task scheduler
//!
//! Owns the priority queue of admitted tasks and the bag of executing
//! tasks. Each tick runs three phases in order: progress on executing
//! work, dispatch from the queue head, then deadline decay on whatever is
//! still queued. Admission is gated on queue capacity only; dispatch is
//! gated on available MIPS, so an oversized task queues until its deadline
//! expires.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::device::ResourcePool;
use crate::task::{Task, TaskState};

/// Guaranteed forward progress per executing task per tick, in MI
pub const MIN_PROGRESS_MI: u32 = 100;

/// Heap wrapper ordering tasks urgent-first, then earliest deadline, then
/// task id (for determinism). `BinaryHeap` is a max-heap, so `cmp` makes
/// the highest-priority task the greatest element.
#[derive(Debug, Clone)]
struct Prioritized(Task);

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .urgent
            .cmp(&other.0.urgent)
            .then_with(|| other.0.deadline.cmp(&self.0.deadline))
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Prioritized {}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Priority scheduler for a single fog device
#[derive(Debug)]
pub struct Scheduler {
    max_queue: usize,
    /// Tasks admitted this tick; folded into the queue at the end of the
    /// device's tick so fresh arrivals are never dispatched mid-tick
    inbox: Vec<Task>,
    queue: BinaryHeap<Prioritized>,
    executing: Vec<Task>,
    completed: Vec<Task>,

    failed_tasks: u64,
    completed_tasks: u64,
    flushed_in_flight: u64,
    total_response_ms: f64,
}

impl Scheduler {
    pub fn new(max_queue: usize) -> Self {
        Scheduler {
            max_queue,
            inbox: Vec::new(),
            queue: BinaryHeap::new(),
            executing: Vec::new(),
            completed: Vec::new(),
            failed_tasks: 0,
            completed_tasks: 0,
            flushed_in_flight: 0,
            total_response_ms: 0.0,
        }
    }

    /// Number of admitted tasks waiting for dispatch
    pub fn queue_len(&self) -> usize {
        self.inbox.len() + self.queue.len()
    }

    pub fn executing_count(&self) -> usize {
        self.executing.len()
    }

    pub fn can_accept(&self) -> bool {
        self.queue_len() < self.max_queue
    }

    /// Admit a task, or hand it back when the queue is full
    pub fn admit(&mut self, mut task: Task) -> Result<(), Task> {
        if !self.can_accept() {
            return Err(task);
        }
        task.state = TaskState::Queued;
        self.inbox.push(task);
        Ok(())
    }

    /// Advance one simulation step: progress, dispatch, deadline decay.
    pub fn tick(&mut self, pool: &mut ResourcePool, now: u64) {
        self.progress(pool, now);
        self.dispatch(pool);
        self.decay_deadlines();

        // arrivals admitted during this tick become dispatchable next tick
        for task in self.inbox.drain(..) {
            self.queue.push(Prioritized(task));
        }
    }

    fn progress(&mut self, pool: &mut ResourcePool, now: u64) {
        let executing_count = self.executing.len().max(1) as u32;
        for mut task in std::mem::take(&mut self.executing) {
            // fair share of the remaining headroom, floored so contended
            // tasks still move forward
            let share = (pool.available_mips() / executing_count).max(1);
            let progress = share.max(MIN_PROGRESS_MI);

            if task.advance(progress) {
                pool.release(task.size);
                task.complete(now);
                self.completed_tasks += 1;
                self.total_response_ms += task.response_time_ms;
                debug!(task = %task.id, response_ms = task.response_time_ms, "task completed");
                self.completed.push(task);
            } else {
                self.executing.push(task);
            }
        }
    }

    fn dispatch(&mut self, pool: &mut ResourcePool) {
        while let Some(head) = self.queue.peek() {
            if head.0.size > pool.available_mips() {
                break;
            }
            let mut task = self.queue.pop().expect("peeked entry").0;
            pool.allocate(task.size);
            task.state = TaskState::Executing;
            self.executing.push(task);
        }
    }

    fn decay_deadlines(&mut self) {
        let queued: Vec<Prioritized> = std::mem::take(&mut self.queue).into_vec();
        for mut entry in queued {
            entry.0.deadline -= 1;
            if entry.0.deadline <= 0 {
                entry.0.state = TaskState::Failed;
                self.failed_tasks += 1;
                debug!(task = %entry.0.id, "deadline expired in queue");
            } else {
                self.queue.push(entry);
            }
        }
    }

    /// Terminal flush: mark all in-flight work completed so end-of-run
    /// metrics capture it. Counted separately from genuine completions.
    pub fn force_complete_all(&mut self, pool: &mut ResourcePool, now: u64) {
        for mut task in self.executing.drain(..) {
            pool.release(task.size);
            task.complete(now);
            self.flushed_in_flight += 1;
            self.total_response_ms += task.response_time_ms;
            self.completed.push(task);
        }
        let queued: Vec<Prioritized> = std::mem::take(&mut self.queue).into_vec();
        for Prioritized(mut task) in queued.into_iter().chain(self.inbox.drain(..).map(Prioritized)) {
            task.complete(now);
            self.flushed_in_flight += 1;
            self.total_response_ms += task.response_time_ms;
            self.completed.push(task);
        }
    }

    pub fn completed(&self) -> &[Task] {
        &self.completed
    }

    /// Tasks currently holding MIPS
    pub fn executing(&self) -> &[Task] {
        &self.executing
    }

    /// Tasks that finished by doing all their work
    pub fn completed_tasks(&self) -> u64 {
        self.completed_tasks
    }

    /// Tasks that missed their deadline while queued
    pub fn failed_tasks(&self) -> u64 {
        self.failed_tasks
    }

    /// In-flight tasks flushed at end of run
    pub fn flushed_in_flight(&self) -> u64 {
        self.flushed_in_flight
    }

    pub fn total_response_ms(&self) -> f64 {
        self.total_response_ms
    }

    pub fn reset(&mut self) {
        self.inbox.clear();
        self.queue.clear();
        self.executing.clear();
        self.completed.clear();
        self.failed_tasks = 0;
        self.completed_tasks = 0;
        self.flushed_in_flight = 0;
        self.total_response_ms = 0.0;
    }
}
