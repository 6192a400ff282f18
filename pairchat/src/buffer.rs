//! Pre-engine signal buffering

use pairchat_core::{NegotiationEngine, PairChatError, RoomId, SignalEnvelope};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Outcome of flushing a buffer into an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Envelopes the engine accepted
    pub delivered: usize,
    /// Envelopes the engine rejected
    pub rejected: usize,
}

/// FIFO of envelopes that arrived before the engine existed
///
/// Bound to one room. Flushing consumes the buffer, so every envelope
/// reaches the engine at most once and nothing survives the flush.
#[derive(Debug)]
pub struct SignalBuffer {
    room_id: RoomId,
    envelopes: VecDeque<SignalEnvelope>,
}

impl SignalBuffer {
    /// Create an empty buffer for a room
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            envelopes: VecDeque::new(),
        }
    }

    /// Room this buffer belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Append an envelope; envelopes for another room are refused
    pub fn push(&mut self, envelope: SignalEnvelope) -> Result<(), PairChatError> {
        if !envelope.is_for(&self.room_id) {
            return Err(PairChatError::StaleSignal {
                room_id: envelope.room_id.to_string(),
                current: Some(self.room_id.to_string()),
            });
        }
        self.envelopes.push_back(envelope);
        debug!(
            "📥 Buffered signal #{} for room {} (engine not ready)",
            self.envelopes.len(),
            self.room_id
        );
        Ok(())
    }

    /// Number of buffered envelopes
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Deliver every envelope to the engine in arrival order, in one pass
    ///
    /// A rejected envelope is logged and skipped; the rest are still
    /// delivered.
    pub fn drain_into(self, engine: &mut dyn NegotiationEngine) -> FlushReport {
        let mut report = FlushReport::default();
        let total = self.envelopes.len();

        for (index, envelope) in self.envelopes.into_iter().enumerate() {
            match engine.signal(envelope.payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Engine rejected buffered signal {}/{} for room {}: {}",
                        index + 1,
                        total,
                        self.room_id,
                        e
                    );
                    report.rejected += 1;
                }
            }
        }

        if total > 0 {
            debug!(
                "📤 Flushed {} buffered signals into engine for room {}",
                total, self.room_id
            );
        }
        report
    }

    /// Drop everything; returns how many envelopes were discarded
    pub fn discard(self) -> usize {
        let discarded = self.envelopes.len();
        if discarded > 0 {
            debug!(
                "🗑️ Discarded {} unflushed signals for room {}",
                discarded, self.room_id
            );
        }
        discarded
    }
}
