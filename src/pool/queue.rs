//! Bounded FIFO of undelivered outbound messages.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::protocol::OutboundMessage;

// ============================================================================
// MessageQueue
// ============================================================================

/// Per-connection outbound queue.
///
/// Strict FIFO, priority-blind. When full, new messages are refused and
/// the queue keeps what it has.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
}

impl MessageQueue {
    /// Creates an empty queue.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a message.
    ///
    /// Returns the message back if the queue is full.
    pub(crate) fn push(&mut self, message: OutboundMessage) -> Result<(), OutboundMessage> {
        if self.messages.len() >= self.capacity {
            return Err(message);
        }
        self.messages.push_back(message);
        Ok(())
    }

    /// Removes the oldest message.
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Puts a message back at the head after a failed delivery.
    ///
    /// Always succeeds: the slot was freed by the matching [`pop`](Self::pop).
    #[inline]
    pub(crate) fn requeue(&mut self, message: OutboundMessage) {
        self.messages.push_front(message);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Moves all messages out, leaving an empty queue of the same capacity.
    pub(crate) fn take(&mut self) -> Self {
        Self {
            messages: std::mem::take(&mut self.messages),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
