//! Request-level reading: cursor placement and criteria filtering on top of
//! [`RingReader`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use flowscope_common::{Event, QueryRequest};

use crate::error::ObserverError;
use crate::filters::{self, FilterFns};
use crate::ring::reader::RingReader;
use crate::ring::Ring;

/// Reads events through a [`RingReader`], applying the request criteria
/// (count limit, time window, follow, whitelist/blacklist) before returning
/// them.
///
/// Lost-event markers bypass every criterion: callers never request them,
/// they only flag that data went missing, so neither the time range nor the
/// predicates nor the count applies. Counting delivered events is the
/// caller's responsibility via `event_count`.
pub(crate) struct EventsReader {
    ring_reader: RingReader,
    whitelist: FilterFns,
    blacklist: FilterFns,
    max_events: u64,
    follow: bool,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    /// Qualifying events delivered so far; incremented by the caller.
    pub event_count: u64,
}

impl EventsReader {
    pub fn new(
        ring_reader: RingReader,
        request: &impl QueryRequest,
        whitelist: FilterFns,
        blacklist: FilterFns,
    ) -> Self {
        Self {
            ring_reader,
            whitelist,
            blacklist,
            max_events: request.number(),
            follow: request.follow(),
            since: request.since(),
            until: request.until(),
            event_count: 0,
        }
    }

    /// Return the next event matching the request criteria. `Ok(None)` is
    /// the clean end of a non-follow stream.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<Event>>, ObserverError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled);
            }
            let event = if self.follow {
                match self.ring_reader.next_follow(cancel).await {
                    Some(event) => event,
                    None => return Err(ObserverError::Cancelled),
                }
            } else {
                if self.max_events > 0 && self.event_count >= self.max_events {
                    return Ok(None);
                }
                match self.ring_reader.next() {
                    Some(event) => event,
                    None => return Ok(None),
                }
            };

            if !event.payload.is_lost() {
                if let Some(until) = self.until {
                    if event.timestamp > until {
                        return Ok(None);
                    }
                }
                if let Some(since) = self.since {
                    if event.timestamp < since {
                        continue;
                    }
                }
                if !filters::apply(&self.whitelist, &self.blacklist, &event) {
                    continue;
                }
            }

            return Ok(Some(event));
        }
    }
}

/// Position a [`RingReader`] for a request.
///
/// `first` starts at the oldest buffered event. Requests with no count, no
/// window and no `first` start at the most recent write: for follow queries
/// that is the live tail, for one-shot queries it means "no rewind". All
/// other requests rewind backward from the most recent write, counting
/// filter-qualifying events, until the count is reached, the window's lower
/// bound is crossed, the buffer's overrun wall is hit, or the ring is
/// exhausted. Filters run during the rewind so the count covers matching
/// events, not raw events.
pub(crate) fn position_reader(
    ring: &Arc<Ring>,
    request: &impl QueryRequest,
    whitelist: &FilterFns,
    blacklist: &FilterFns,
) -> RingReader {
    let since = request.since();

    if request.first() && since.is_none() {
        return RingReader::new(Arc::clone(ring), ring.oldest_write());
    }
    if request.number() == 0 && since.is_none() {
        return RingReader::new(Arc::clone(ring), ring.last_write_parallel());
    }

    let start = ring.last_write_parallel();
    let mut scan = RingReader::new(Arc::clone(ring), start);
    let mut pos = start;
    let mut count: u64 = 0;
    let mut remaining = ring.len();

    while remaining > 0 {
        let Some(event) = scan.previous() else {
            break;
        };
        if event.payload.is_ring_overrun() {
            // One step past the wall; everything below is gone.
            pos += 1;
            break;
        }
        if !event.payload.is_lost() && filters::apply(whitelist, blacklist, &event) {
            count += 1;
            if let Some(since) = since {
                if event.timestamp < since {
                    pos += 1;
                    break;
                }
            } else if count == request.number() {
                break;
            }
        }
        remaining -= 1;
        if pos == 0 {
            break;
        }
        pos -= 1;
    }

    RingReader::new(Arc::clone(ring), pos)
}

/// Flows per second over the most recent minute.
///
/// Scans backward from the most recent write counting flow events. If the
/// scan hits the buffer's overrun wall inside the window, the rate is
/// computed over the time range that is still available.
pub(crate) fn flow_rate(ring: &Arc<Ring>, at: DateTime<Utc>) -> f64 {
    let mut reader = RingReader::new(Arc::clone(ring), ring.last_write_parallel());
    let mut since = at - Duration::minutes(1);
    let mut last_seen: Option<DateTime<Utc>> = None;
    let mut count: u64 = 0;

    loop {
        let Some(event) = reader.previous() else {
            // Empty ring or backward scan exhausted.
            break;
        };
        if event.payload.is_ring_overrun() {
            // The whole buffer was scanned; rate over the available range.
            if let Some(ts) = last_seen {
                since = ts;
            }
            break;
        }
        if event.payload.flow().is_none() {
            continue;
        }
        if event.timestamp < since {
            break;
        }
        last_seen = Some(event.timestamp);
        count += 1;
    }

    let window = (at - since).num_milliseconds() as f64 / 1000.0;
    if window <= 0.0 {
        return 0.0;
    }
    count as f64 / window
}
