use std::sync::atomic::{AtomicU8, Ordering};

/// Worker lifecycle; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerStatus {
    Created = 0,
    Waiting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl WorkerStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerStatus::Created,
            1 => WorkerStatus::Waiting,
            2 => WorkerStatus::Running,
            3 => WorkerStatus::Stopping,
            _ => WorkerStatus::Stopped,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Stopped)
    }
}

/// Shared, lock-free view of a worker's status.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl Default for StatusCell {
    fn default() -> Self {
        Self(AtomicU8::new(WorkerStatus::Created as u8))
    }
}

impl StatusCell {
    #[must_use]
    pub fn load(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if it is later in the lifecycle; returns whether it moved.
    pub fn advance(&self, next: WorkerStatus) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < next as u8).then_some(next as u8)
            })
            .is_ok()
    }
}
