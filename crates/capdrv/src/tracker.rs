use std::collections::HashMap;
use std::fmt;

use crate::state::ListedInterface;
use crate::timer::TimerId;

/// Completion for a list command: transaction id and the interfaces found
/// (empty on failure).
pub type ListCallback = Box<dyn FnOnce(u32, Vec<ListedInterface>) + Send>;

/// Completion for probe/open/configure commands: transaction id, success,
/// and the remote's message (or the failure reason).
pub type AckCallback = Box<dyn FnOnce(u32, bool, String) + Send>;

/// Command families tracked against responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    List,
    Probe,
    Open,
    Configure,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::List => "list",
            CommandKind::Probe => "probe",
            CommandKind::Open => "open",
            CommandKind::Configure => "configure",
        };
        f.write_str(name)
    }
}

/// The one-shot typed completion attached to a pending command.
pub enum Completion {
    List(ListCallback),
    Probe(AckCallback),
    Open(AckCallback),
    Configure(AckCallback),
}

impl Completion {
    pub fn kind(&self) -> CommandKind {
        match self {
            Completion::List(_) => CommandKind::List,
            Completion::Probe(_) => CommandKind::Probe,
            Completion::Open(_) => CommandKind::Open,
            Completion::Configure(_) => CommandKind::Configure,
        }
    }

    /// Build the failure invocation for this completion: list callbacks
    /// receive an empty interface vector, the rest receive the reason.
    pub fn into_failure(self, transaction: u32, reason: &str) -> Box<dyn FnOnce() + Send> {
        match self {
            Completion::List(cb) => Box::new(move || cb(transaction, Vec::new())),
            Completion::Probe(cb) | Completion::Open(cb) | Completion::Configure(cb) => {
                let reason = reason.to_string();
                Box::new(move || cb(transaction, false, reason))
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Completion").field(&self.kind()).finish()
    }
}

/// A command awaiting its response, keyed by wire sequence.
pub struct PendingCommand {
    /// Caller-chosen transaction id, echoed into the completion.
    pub transaction: u32,
    pub sequence: u32,
    pub kind: CommandKind,
    completion: Option<Completion>,
    /// Timeout timer armed for this command, if any.
    pub timer: Option<TimerId>,
}

impl PendingCommand {
    pub fn new(
        transaction: u32,
        sequence: u32,
        kind: CommandKind,
        completion: Option<Completion>,
    ) -> Self {
        Self {
            transaction,
            sequence,
            kind,
            completion,
            timer: None,
        }
    }

    /// Take the completion for invocation; completions fire exactly once.
    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("transaction", &self.transaction)
            .field("sequence", &self.sequence)
            .field("kind", &self.kind)
            .field("has_completion", &self.completion.is_some())
            .field("timer", &self.timer)
            .finish()
    }
}

/// Pending-command table with the wire sequence allocator.
///
/// The sequence counter is seeded randomly and wraps modulo 2^32; one
/// tracker serves one transport session, so per-session monotonicity is
/// all the protocol needs.
pub struct CommandTracker {
    next_sequence: u32,
    pending: HashMap<u32, PendingCommand>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            next_sequence: seed,
            pending: HashMap::new(),
        }
    }

    /// Hand out the next sequence number.
    pub fn allocate(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.wrapping_add(1);
        sequence
    }

    /// Remember a command until its response or cancellation.
    pub fn register(&mut self, command: PendingCommand) {
        self.pending.insert(command.sequence, command);
    }

    /// Remove the command matching `sequence`, if any.
    pub fn remove(&mut self, sequence: u32) -> Option<PendingCommand> {
        self.pending.remove(&sequence)
    }

    /// Remove every pending command.
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.pending.drain().map(|(_, cmd)| cmd).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for CommandTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn sequences_are_consecutive() {
        let mut tracker = CommandTracker::with_seed(41);
        let sequences: Vec<u32> = (0..5).map(|_| tracker.allocate()).collect();
        assert_eq!(sequences, vec![41, 42, 43, 44, 45]);
    }

    #[test]
    fn sequences_wrap_modulo_u32() {
        let mut tracker = CommandTracker::with_seed(u32::MAX - 1);
        assert_eq!(tracker.allocate(), u32::MAX - 1);
        assert_eq!(tracker.allocate(), u32::MAX);
        assert_eq!(tracker.allocate(), 0);
        assert_eq!(tracker.allocate(), 1);
    }

    #[test]
    fn register_and_remove_by_sequence() {
        let mut tracker = CommandTracker::with_seed(100);
        let seq = tracker.allocate();
        tracker.register(PendingCommand::new(7, seq, CommandKind::Open, None));

        assert_eq!(tracker.len(), 1);
        let cmd = tracker.remove(seq).unwrap();
        assert_eq!(cmd.transaction, 7);
        assert_eq!(cmd.kind, CommandKind::Open);
        assert!(tracker.remove(seq).is_none());
    }

    #[test]
    fn completion_fires_exactly_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let completion = Completion::Configure(Box::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut cmd = PendingCommand::new(1, 9, CommandKind::Configure, Some(completion));
        let first = cmd.take_completion();
        assert!(first.is_some());
        assert!(cmd.take_completion().is_none());

        first.unwrap().into_failure(1, "cancelled")();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_empties_the_table() {
        let mut tracker = CommandTracker::with_seed(5);
        for _ in 0..3 {
            let seq = tracker.allocate();
            tracker.register(PendingCommand::new(0, seq, CommandKind::List, None));
        }

        let drained = tracker.drain();
        assert_eq!(drained.len(), 3);
        assert!(tracker.is_empty());
    }

    #[test]
    fn list_failure_gets_empty_vector() {
        let seen = Arc::new(AtomicU32::new(u32::MAX));
        let slot = Arc::clone(&seen);
        let completion = Completion::List(Box::new(move |tx, interfaces| {
            assert!(interfaces.is_empty());
            slot.store(tx, Ordering::SeqCst);
        }));

        completion.into_failure(7, "whatever")();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
