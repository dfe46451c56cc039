//! Bounded circular event store with overwrite-on-full semantics.
//!
//! The ring holds the most recent `cap()` events. A single writer appends;
//! any number of readers address events by a monotonically increasing 64-bit
//! sequence number. Readers that fall behind the writer never observe stale
//! data: a read below the overrun floor yields a synthesized lost-event
//! marker instead.
//!
//! ## Write protocol
//!
//! The writer stores `(sequence, event)` into the slot, publishes the new
//! write sequence with a release store, then wakes followers. Readers load
//! the write sequence with an acquire load before indexing, so a published
//! sequence always refers to a completed slot store. A reader that finds a
//! newer sequence in the slot than the one it asked for has been lapped and
//! gets a lost-event marker.

pub mod reader;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use flowscope_common::{Event, EventPayload, LostEvent, LostEventSource};

/// Errors returned by positional reads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// The requested sequence has not been written yet.
    #[error("sequence {0} has not been written yet")]
    NotYetWritten(u64),
}

/// Bounded circular event store.
///
/// Single writer, many concurrent readers. The capacity is fixed at
/// creation and rounded up to the next power of two.
pub struct Ring {
    /// Capacity minus one; the capacity is a power of two.
    mask: u64,
    /// Slots, indexed by `sequence & mask`. Each slot stores the sequence it
    /// holds so a lapped reader is detectable.
    slots: Box<[RwLock<Option<(u64, Arc<Event>)>>]>,
    /// Next sequence to write. Published with release ordering after the
    /// slot store completes.
    write: AtomicU64,
    /// Wakes parked followers on every publish.
    follow: Notify,
}

impl Ring {
    /// Create a ring holding up to `capacity` events, rounded up to the next
    /// power of two (minimum 1).
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| RwLock::new(None)).collect();
        Self {
            mask: capacity - 1,
            slots,
            write: AtomicU64::new(0),
            follow: Notify::new(),
        }
    }

    /// Ring capacity.
    pub fn cap(&self) -> u64 {
        self.mask + 1
    }

    /// Number of events currently stored.
    pub fn len(&self) -> u64 {
        self.write.load(Ordering::Acquire).min(self.cap())
    }

    /// Returns true if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.write.load(Ordering::Acquire) == 0
    }

    /// Append an event, overwriting the oldest slot when full. Never blocks.
    ///
    /// Must only be called from the single writer task.
    pub fn write(&self, event: Arc<Event>) {
        let seq = self.write.load(Ordering::Relaxed);
        *self.slots[(seq & self.mask) as usize].write() = Some((seq, event));
        self.write.store(seq + 1, Ordering::Release);
        self.follow.notify_waiters();
    }

    /// The oldest sequence still stored. Reads at or above this position are
    /// expected to succeed while the writer is quiescent; a read racing an
    /// overwrite degrades to a lost-event marker, never to stale data.
    pub fn oldest_write(&self) -> u64 {
        self.write.load(Ordering::Acquire).saturating_sub(self.cap())
    }

    /// Start position for a reader running concurrently with the writer: the
    /// most recently published write. Slot stores happen before publication,
    /// so this position is always complete.
    pub fn last_write_parallel(&self) -> u64 {
        self.write.load(Ordering::Acquire).saturating_sub(1)
    }

    /// Read the event at `seq`.
    ///
    /// Fails with [`RingError::NotYetWritten`] when `seq` has not been
    /// published. Returns a synthesized ring-overrun [`LostEvent`] when
    /// `seq` has already been overwritten.
    pub fn read(&self, seq: u64) -> Result<Arc<Event>, RingError> {
        let write = self.write.load(Ordering::Acquire);
        if seq >= write {
            return Err(RingError::NotYetWritten(seq));
        }
        if seq < write.saturating_sub(self.cap()) {
            return Ok(self.lost_event(seq));
        }
        let slot = self.slots[(seq & self.mask) as usize].read();
        match &*slot {
            Some((stored, event)) if *stored == seq => Ok(Arc::clone(event)),
            // The writer lapped us between the floor check and the slot
            // read: the slot already holds a newer event.
            Some((stored, _)) if *stored > seq => {
                drop(slot);
                Ok(self.lost_event(seq))
            }
            // Publication happens after the slot store, so a published
            // sequence always finds its slot populated.
            _ => Err(RingError::NotYetWritten(seq)),
        }
    }

    /// Blocking read: returns immediately when `seq` is readable, otherwise
    /// parks until the writer publishes past `seq` or `cancel` fires.
    /// Returns `None` on cancellation.
    pub async fn next_follow(
        &self,
        seq: u64,
        cancel: &CancellationToken,
    ) -> Option<Arc<Event>> {
        loop {
            // Register for notification before re-checking, so a publish
            // between the check and the await is not missed.
            let notified = self.follow.notified();
            match self.read(seq) {
                Ok(event) => return Some(event),
                Err(RingError::NotYetWritten(_)) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    fn lost_event(&self, seq: u64) -> Arc<Event> {
        let oldest = self.oldest_write();
        Arc::new(Event::new(
            Utc::now(),
            EventPayload::Lost(LostEvent {
                source: LostEventSource::RingBuffer,
                num_events_lost: oldest.saturating_sub(seq),
                cpu: None,
            }),
        ))
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("cap", &self.cap())
            .field("write", &self.write.load(Ordering::Relaxed))
            .finish()
    }
}
