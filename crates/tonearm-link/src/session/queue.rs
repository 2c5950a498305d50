//! Per-session outbound command queue.

use std::collections::VecDeque;

use crate::protocol::OutgoingCommand;

/// FIFO of commands waiting for the session's node, with at most one in
/// flight. Pure bookkeeping: the caller owns the actual sending.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    pending: VecDeque<OutgoingCommand>,
    in_flight: bool,
}

impl CommandQueue {
    /// Append a command. Returns `true` when nothing was in flight and the
    /// caller must start draining.
    pub(crate) fn push_back(&mut self, command: OutgoingCommand) -> bool {
        self.pending.push_back(command);
        self.claim()
    }

    /// Put a command ahead of everything pending. Used for the voice
    /// handshake.
    pub(crate) fn push_front(&mut self, command: OutgoingCommand) -> bool {
        self.pending.push_front(command);
        self.claim()
    }

    /// Take the next command to send. `None` ends the drain and releases
    /// the in-flight slot.
    pub(crate) fn next(&mut self) -> Option<OutgoingCommand> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.in_flight = false;
        }
        next
    }

    /// Forget everything pending. A command already handed out stays sent.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.in_flight, true)
    }
}
