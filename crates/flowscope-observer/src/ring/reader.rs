//! Stateful cursor over the ring.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use flowscope_common::Event;

use super::{Ring, RingError};

/// A cursor over a [`Ring`], scoped to a single query.
///
/// The cursor addresses the position read by the next call; both directions
/// read the current position and then move. On a ring-overrun lost event the
/// forward cursor snaps to the oldest surviving sequence, so one lost marker
/// summarizes the entire gap.
#[derive(Debug)]
pub struct RingReader {
    ring: Arc<Ring>,
    idx: u64,
    /// Set once a backward scan has consumed sequence 0.
    exhausted_backward: bool,
}

impl RingReader {
    /// Create a reader positioned at `start`.
    pub fn new(ring: Arc<Ring>, start: u64) -> Self {
        Self {
            ring,
            idx: start,
            exhausted_backward: false,
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.idx
    }

    /// Read the event at the cursor and advance. Returns `None` when the
    /// cursor has caught up with the writer.
    pub fn next(&mut self) -> Option<Arc<Event>> {
        match self.ring.read(self.idx) {
            Ok(event) => {
                self.advance(&event);
                Some(event)
            }
            Err(RingError::NotYetWritten(_)) => None,
        }
    }

    /// Read the event at the cursor and move backward. Returns `None` when
    /// the scan has walked past the beginning of the stream. A cursor below
    /// the overrun floor yields a ring-overrun lost event and stays pinned.
    pub fn previous(&mut self) -> Option<Arc<Event>> {
        if self.exhausted_backward {
            return None;
        }
        match self.ring.read(self.idx) {
            Ok(event) => {
                if !event.payload.is_ring_overrun() {
                    if self.idx == 0 {
                        self.exhausted_backward = true;
                    } else {
                        self.idx -= 1;
                    }
                }
                Some(event)
            }
            Err(RingError::NotYetWritten(_)) => None,
        }
    }

    /// Blocking read: like [`next`](Self::next) but parks until new data is
    /// published. Returns `None` on cancellation.
    pub async fn next_follow(&mut self, cancel: &CancellationToken) -> Option<Arc<Event>> {
        let event = self.ring.next_follow(self.idx, cancel).await?;
        self.advance(&event);
        Some(event)
    }

    fn advance(&mut self, event: &Event) {
        if event.payload.is_ring_overrun() {
            self.idx = self.ring.oldest_write();
        } else {
            self.idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, TimeZone, Utc};
    use flowscope_common::{EventPayload, Flow};

    fn flow_event(ts_secs: i64) -> Arc<Event> {
        let time: DateTime<Utc> = Utc.timestamp_opt(ts_secs, 0).unwrap();
        Arc::new(Event::new(
            time,
            EventPayload::Flow(Flow {
                time,
                ..Flow::default()
            }),
        ))
    }

    fn filled_ring(capacity: u64, count: i64) -> Arc<Ring> {
        let ring = Arc::new(Ring::new(capacity));
        for ts in 1..=count {
            ring.write(flow_event(ts));
        }
        ring
    }

    fn ts_of(event: &Event) -> i64 {
        event.timestamp.timestamp()
    }

    #[test]
    fn test_next_reads_in_order_until_end() {
        let ring = filled_ring(4, 3);
        let mut reader = RingReader::new(ring, 0);
        let mut seen = Vec::new();
        while let Some(event) = reader.next() {
            seen.push(ts_of(&event));
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_next_on_empty_ring_is_none() {
        let ring = Arc::new(Ring::new(4));
        let mut reader = RingReader::new(ring, 0);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_next_after_overrun_yields_one_lost_then_survivors() {
        let ring = filled_ring(4, 6);
        // Cursor left behind at 0; sequences 0 and 1 are gone.
        let mut reader = RingReader::new(ring, 0);

        let lost = reader.next().unwrap();
        assert!(lost.payload.is_ring_overrun());
        assert_eq!(lost.payload.lost().unwrap().num_events_lost, 2);

        let mut seen = Vec::new();
        while let Some(event) = reader.next() {
            seen.push(ts_of(&event));
        }
        assert_eq!(seen, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_previous_walks_backward_and_stops_at_zero() {
        let ring = filled_ring(4, 3);
        let mut reader = RingReader::new(Arc::clone(&ring), ring.last_write_parallel());
        let mut seen = Vec::new();
        while let Some(event) = reader.previous() {
            seen.push(ts_of(&event));
        }
        assert_eq!(seen, vec![3, 2, 1]);
        // The scan is exhausted; further calls keep returning None.
        assert!(reader.previous().is_none());
    }

    #[test]
    fn test_previous_pins_at_overrun_floor() {
        let ring = filled_ring(4, 6);
        let mut reader = RingReader::new(Arc::clone(&ring), ring.last_write_parallel());
        let mut flows = 0;
        loop {
            let event = reader.previous().unwrap();
            if event.payload.is_ring_overrun() {
                break;
            }
            flows += 1;
        }
        assert_eq!(flows, 4);
        // Pinned below the floor: the cursor does not move and keeps
        // reporting the overrun.
        let pinned = reader.position();
        assert!(reader.previous().unwrap().payload.is_ring_overrun());
        assert_eq!(reader.position(), pinned);
    }

    #[test]
    fn test_direction_change() {
        let ring = filled_ring(8, 5);
        let mut reader = RingReader::new(ring, 4);
        assert_eq!(ts_of(&reader.previous().unwrap()), 5);
        assert_eq!(ts_of(&reader.previous().unwrap()), 4);
        // The cursor now addresses sequence 2.
        assert_eq!(ts_of(&reader.next().unwrap()), 3);
        assert_eq!(ts_of(&reader.next().unwrap()), 4);
    }

    #[tokio::test]
    async fn test_next_follow_delivers_new_write() {
        let ring = Arc::new(Ring::new(4));
        let mut reader = RingReader::new(Arc::clone(&ring), 0);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(async move {
            let event = reader.next_follow(&cancel).await;
            event.map(|e| ts_of(&e))
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        ring.write(flow_event(42));

        let ts = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("follower did not wake")
            .unwrap();
        assert_eq!(ts, Some(42));
    }
}
