//! Event types stored in the ring buffer, plus the raw monitor events the
//! ingest loop consumes.
//!
//! `Event` is the unit stored in the ring: an arrival timestamp and a tagged
//! payload. `LostEvent` is never produced by users; it is synthesized by the
//! ring itself (buffer overrun) or reported by the dataplane transport
//! (upstream loss) and bypasses all user filtering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Flow;

/// Agent lifecycle event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    #[default]
    Unknown,
    AgentStarted,
    PolicyUpdated,
    PolicyDeleted,
    EndpointCreated,
    EndpointDeleted,
    IpCacheUpserted,
    IpCacheDeleted,
    ServiceUpserted,
    ServiceDeleted,
}

/// An event emitted by the agent itself rather than the dataplane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event category.
    pub kind: AgentEventKind,
    /// Human-readable notification payload.
    pub message: String,
}

/// A datapath debug event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    /// Datapath-defined debug message type.
    pub kind: String,
    /// Human-readable debug message.
    pub message: String,
    /// CPU the event was captured on, when known.
    pub cpu: Option<i32>,
}

/// Where events were lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LostEventSource {
    #[default]
    Unknown,
    /// The observer's ring buffer overwrote slots a reader had not consumed.
    RingBuffer,
    /// The dataplane monitor queue dropped events before they reached the
    /// observer.
    MonitorQueue,
}

/// Marker for unread data that was lost before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LostEvent {
    /// Where the loss happened.
    pub source: LostEventSource,
    /// Number of events lost.
    pub num_events_lost: u64,
    /// CPU the loss was detected on, when known.
    pub cpu: Option<i32>,
}

/// Tagged payload of a ring event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Flow(Flow),
    Agent(AgentEvent),
    Debug(DebugEvent),
    Lost(LostEvent),
}

impl EventPayload {
    /// Returns the flow payload, if any.
    pub fn flow(&self) -> Option<&Flow> {
        match self {
            EventPayload::Flow(flow) => Some(flow),
            _ => None,
        }
    }

    /// Returns the lost-event payload, if any.
    pub fn lost(&self) -> Option<&LostEvent> {
        match self {
            EventPayload::Lost(lost) => Some(lost),
            _ => None,
        }
    }

    /// Returns true if this is a lost-event marker.
    pub fn is_lost(&self) -> bool {
        matches!(self, EventPayload::Lost(_))
    }

    /// Returns true if this is a lost-event marker synthesized by the ring
    /// buffer itself.
    pub fn is_ring_overrun(&self) -> bool {
        matches!(
            self,
            EventPayload::Lost(LostEvent {
                source: LostEventSource::RingBuffer,
                ..
            })
        )
    }
}

/// The unit stored in the ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Arrival timestamp, set by the ingest pipeline. Lost-event markers are
    /// the exception: their timestamp is the detection time.
    pub timestamp: DateTime<Utc>,
    /// Tagged payload.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event.
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }
}

/// Payload variants handed over by the dataplane monitor transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorPayload {
    /// Raw perf ring sample; decoded downstream by the payload decoder.
    Perf { data: Vec<u8>, cpu: i32 },
    /// Agent event already materialized by the transport.
    Agent(AgentEvent),
    /// Loss reported by the monitor queue before events reached the
    /// observer.
    Lost { num_events_lost: u64, cpu: i32 },
}

/// A raw event handed to the observer by the dataplane transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    /// Correlation id assigned by the transport.
    pub uuid: Uuid,
    /// Name of the node that produced the event.
    pub node_name: String,
    /// Arrival timestamp.
    pub timestamp: DateTime<Utc>,
    /// Raw payload.
    pub payload: MonitorPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accessors() {
        let flow_payload = EventPayload::Flow(Flow::default());
        assert!(flow_payload.flow().is_some());
        assert!(flow_payload.lost().is_none());
        assert!(!flow_payload.is_lost());

        let lost_payload = EventPayload::Lost(LostEvent {
            source: LostEventSource::RingBuffer,
            num_events_lost: 3,
            cpu: None,
        });
        assert!(lost_payload.is_lost());
        assert!(lost_payload.is_ring_overrun());
        assert_eq!(lost_payload.lost().unwrap().num_events_lost, 3);
    }

    #[test]
    fn test_upstream_loss_is_not_ring_overrun() {
        let lost_payload = EventPayload::Lost(LostEvent {
            source: LostEventSource::MonitorQueue,
            num_events_lost: 1,
            cpu: Some(2),
        });
        assert!(lost_payload.is_lost());
        assert!(!lost_payload.is_ring_overrun());
    }

    #[test]
    fn test_event_payload_serde_tags() {
        let event = Event::new(
            Utc::now(),
            EventPayload::Debug(DebugEvent {
                kind: "DBG_CAPTURE_DELIVERY".to_string(),
                message: "packet delivered".to_string(),
                cpu: Some(0),
            }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "debug");
        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }
}
