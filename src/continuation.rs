//! Continuation records and the arena that owns them.
//!
//! A suspended dispatch parks its transport exchange in a slot of the
//! resource's [`ContinuationArena`] and hands the transport an opaque
//! [`ContinuationToken`]. Tokens carry a generation counter, so a token
//! kept past its record's removal is detected on use instead of reaching a
//! recycled or dangling record. The arena is only ever touched under the
//! resource's lock.

use std::any::Any;

use crate::exchange::{Exchange, RequestParts};

/// Opaque single-use token bridging a suspended dispatch to its resumption.
///
/// Valid for exactly one resumption; a dispatch that suspends again re-arms
/// the same token for the next one. Resuming a consumed, stopped, or stale
/// token is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContinuationToken {
    index: usize,
    generation: u64,
}

impl std::fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContinuationToken({}/{})", self.index, self.generation)
    }
}

/// State a producer stashed for the next invocation of the same request.
pub(crate) type ContinuationData = Option<Box<dyn Any + Send>>;

/// Arena entry backing one suspended dispatch.
pub(crate) struct ContinuationRecord {
    /// The Rust rendition of the original owner back-reference: cleared the
    /// instant a resumption consumes the token, re-set when the dispatch
    /// suspends again.
    attached: bool,
    stopped: bool,
    parts: Option<RequestParts>,
    exchange: Option<Box<dyn Exchange>>,
    data: ContinuationData,
}

impl ContinuationRecord {
    fn new_attached() -> Self {
        Self {
            attached: true,
            stopped: false,
            parts: None,
            exchange: None,
            data: None,
        }
    }

    /// Idempotent: marks the record stopped and releases the held exchange,
    /// so a racing resumption finds nothing to resume.
    pub(crate) fn stop(&mut self) {
        self.stopped = true;
        self.parts = None;
        self.exchange = None;
        self.data = None;
    }
}

struct Slot {
    generation: u64,
    record: Option<ContinuationRecord>,
}

/// Generational arena of continuation records, owned by one resource.
#[derive(Default)]
pub(crate) struct ContinuationArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl ContinuationArena {
    /// Allocate an attached, empty record and return its token.
    pub(crate) fn insert(&mut self) -> ContinuationToken {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].record = Some(ContinuationRecord::new_attached());
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(ContinuationRecord::new_attached()),
                });
                self.slots.len() - 1
            }
        };
        ContinuationToken {
            index,
            generation: self.slots[index].generation,
        }
    }

    fn record_mut(&mut self, token: ContinuationToken) -> Option<&mut ContinuationRecord> {
        let slot = self.slots.get_mut(token.index)?;
        if slot.generation != token.generation {
            return None;
        }
        slot.record.as_mut()
    }

    /// Park a suspended dispatch: store the exchange, its request data, and
    /// any producer state on the attached record.
    pub(crate) fn park(
        &mut self,
        token: ContinuationToken,
        parts: RequestParts,
        exchange: Box<dyn Exchange>,
        data: ContinuationData,
    ) {
        if let Some(record) = self.record_mut(token) {
            record.parts = Some(parts);
            record.exchange = Some(exchange);
            record.data = data;
        }
    }

    /// Consume the token's single resumption: detach the record and take
    /// everything needed to re-run the dispatch.
    ///
    /// Returns `None` for a stale, stopped, or already-consumed token, which
    /// makes a duplicate resumption a no-op.
    pub(crate) fn begin_resumption(
        &mut self,
        token: ContinuationToken,
    ) -> Option<(RequestParts, Box<dyn Exchange>, ContinuationData)> {
        let record = self.record_mut(token)?;
        if record.stopped || !record.attached {
            return None;
        }
        record.attached = false;
        let parts = record.parts.take()?;
        let exchange = record.exchange.take()?;
        let data = record.data.take();
        Some((parts, exchange, data))
    }

    /// Re-arm a detached record for another suspension of the same request.
    ///
    /// Returns `false` if the record is gone or stopped; the caller treats
    /// that as "nothing left to resume" and completes the dispatch.
    pub(crate) fn reattach(&mut self, token: ContinuationToken) -> bool {
        match self.record_mut(token) {
            Some(record) if !record.stopped => {
                record.attached = true;
                true
            }
            _ => false,
        }
    }

    /// Remove a completed record; its token becomes stale.
    pub(crate) fn remove(&mut self, token: ContinuationToken) {
        let Some(slot) = self.slots.get_mut(token.index) else {
            return;
        };
        if slot.generation != token.generation || slot.record.is_none() {
            return;
        }
        slot.record = None;
        slot.generation += 1;
        self.free.push(token.index);
    }

    /// Stop every outstanding record and empty the arena. Used at teardown.
    ///
    /// The stopped records (and with them the held exchanges) are returned
    /// so the caller can drop them after releasing its state borrow.
    pub(crate) fn drain_stop(&mut self) -> Vec<ContinuationRecord> {
        let mut stopped = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(mut record) = slot.record.take() {
                record.stop();
                slot.generation += 1;
                self.free.push(index);
                stopped.push(record);
            }
        }
        stopped
    }

    /// Number of records that have not yet completed.
    pub(crate) fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.record.is_some())
            .count()
    }
}
