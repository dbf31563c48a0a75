//! Task descriptor and execution state

use fogsim_core::{DeviceId, TaskId};
use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds represented by one simulation tick.
///
/// Keeps tick-derived waiting time additive with the millisecond
/// communication latencies accumulated on offload.
pub const TICK_MS: f64 = 1.0;

/// Execution state of a task.
///
/// Transitions are monotonic: Created -> Queued -> Executing -> Completed,
/// with Failed absorbing from Queued on deadline expiry. A Completed task is
/// never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Queued,
    Executing,
    Completed,
    Failed,
}

/// A unit of work generated by an IoT device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// IoT device that generated the task
    pub source: String,
    /// Fog device that first admitted the task
    pub origin_fog: Option<DeviceId>,
    /// Processing cost in millions of instructions
    pub size: u32,
    /// Ticks remaining before the task expires in a queue
    pub deadline: i32,
    pub urgent: bool,
    pub created_at: u64,
    /// Outstanding work in MI; counts down from `size` to zero
    pub remaining_work: u32,
    pub response_time_ms: f64,
    pub state: TaskState,
}

impl Task {
    pub fn new(
        id: TaskId,
        source: impl Into<String>,
        size: u32,
        deadline: i32,
        urgent: bool,
        created_at: u64,
    ) -> Self {
        Task {
            id,
            source: source.into(),
            origin_fog: None,
            size,
            deadline,
            urgent,
            created_at,
            remaining_work: size,
            response_time_ms: 0.0,
            state: TaskState::Created,
        }
    }

    /// Apply `mips` worth of progress; returns true once all work is done
    pub fn advance(&mut self, mips: u32) -> bool {
        self.remaining_work = self.remaining_work.saturating_sub(mips);
        self.remaining_work == 0
    }

    /// Accumulate latency (communication, authentication) into the response time
    pub fn add_response_time(&mut self, ms: f64) {
        self.response_time_ms += ms;
    }

    /// Mark the task completed at `now`, folding its queueing and execution
    /// time into the response time
    pub fn complete(&mut self, now: u64) {
        self.state = TaskState::Completed;
        self.response_time_ms += now.saturating_sub(self.created_at) as f64 * TICK_MS;
    }

    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }

    /// Approximate wire size of the task payload in bytes
    pub fn wire_bytes(&self) -> u64 {
        self.size as u64 * 1024
    }
}
