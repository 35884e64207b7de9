use std::collections::HashSet;

/// Work that must start at most once per round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Configuration,
    Research,
    Participant(usize),
    Synthesis,
}

/// Idempotence guards keyed by `(subsystem, round)`.
///
/// Entries belong to one thread; attaching to a different thread wipes them.
#[derive(Debug, Clone, Default)]
pub struct TriggerLedger {
    thread_id: Option<String>,
    entries: HashSet<(Subsystem, u32)>,
}

impl TriggerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller until the entry is released
    pub fn try_acquire(&mut self, subsystem: Subsystem, round_number: u32) -> bool {
        self.entries.insert((subsystem, round_number))
    }

    pub fn has_triggered(&self, subsystem: Subsystem, round_number: u32) -> bool {
        self.entries.contains(&(subsystem, round_number))
    }

    pub fn release(&mut self, subsystem: Subsystem, round_number: u32) {
        self.entries.remove(&(subsystem, round_number));
    }

    /// Drop every entry of one round
    pub fn clear_round(&mut self, round_number: u32) {
        self.entries.retain(|(_, round)| *round != round_number);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Bind the ledger to `thread_id`, clearing it if it belonged to another thread.
    ///
    /// Returns whether anything was cleared.
    pub fn reset_for_thread(&mut self, thread_id: &str) -> bool {
        if self.thread_id.as_deref() == Some(thread_id) {
            return false;
        }
        let had_entries = !self.entries.is_empty();
        self.entries.clear();
        self.thread_id = Some(thread_id.to_string());
        had_entries
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
