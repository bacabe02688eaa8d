use async_trait::async_trait;
use sitelog_core::LogEntry;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::sink::{LogSink, SinkError};

/// In-process log sink for local development and tests
///
/// Deduplicates on `entry_id` like a real collector. Transient failures can be
/// injected to exercise retry behaviour.
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<LogEntry>,
    seen: HashSet<Uuid>,
    attempts: u64,
    fail_next: u32,
    lose_ack_next: u32,
    reject: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `n` appends before storing anything.
    pub fn fail_next(&self, n: u32) {
        self.state().fail_next = n;
    }

    /// Store the next `n` appends but report them as failed.
    pub fn lose_ack_next(&self, n: u32) {
        self.state().lose_ack_next = n;
    }

    /// Reject every append as malformed.
    pub fn reject_all(&self, reject: bool) {
        self.state().reject = reject;
    }

    /// Entries in append order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of append calls received, including failed ones
    pub fn attempts(&self) -> u64 {
        self.state().attempts
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let mut state = self.state();
        state.attempts += 1;

        if state.reject {
            return Err(SinkError::Rejected("rejected by memory sink".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Unavailable("injected failure".to_string()));
        }

        if state.seen.insert(entry.entry_id) {
            state.entries.push(entry.clone());
        }

        if state.lose_ack_next > 0 {
            state.lose_ack_next -= 1;
            return Err(SinkError::Unavailable("acknowledgement lost".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
