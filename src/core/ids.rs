//! Identity types: tickets, worker ids and caller ids.
//!
//! Tickets and worker ids come from process-wide atomic counters, so they are unique
//! across every coalescer instance in the process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);
static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Correlates one delivery with the one `request` call that should receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub(crate) fn mint() -> Self {
        Ticket(NEXT_TICKET.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifies one producer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        WorkerId(NEXT_WORKER.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        WorkerId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Identity of the caller that owns a [`RequestHandle`](crate::RequestHandle).
///
/// Inside a tokio task this is the task id; anywhere else (e.g. the future driven by
/// `block_on` or `#[tokio::main]`) it is the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerId {
    Task(tokio::task::Id),
    Thread(ThreadId),
}

impl CallerId {
    /// Identity of the code running right now.
    pub fn current() -> Self {
        match tokio::task::try_id() {
            Some(id) => CallerId::Task(id),
            None => CallerId::Thread(thread::current().id()),
        }
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerId::Task(id) => write!(f, "task:{id}"),
            CallerId::Thread(id) => write!(f, "thread:{id:?}"),
        }
    }
}
