//! Decoded flow types.
//!
//! A `Flow` is one decoded network event: source and destination identities,
//! the dataplane verdict, and transport metadata. Filters and field masks
//! operate on these types; everything else in the observer treats them as
//! opaque payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dataplane verdict for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    #[default]
    Unknown,
    Forwarded,
    Dropped,
    Audit,
    Redirected,
    Traced,
}

impl Verdict {
    /// Returns the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unknown => "UNKNOWN",
            Verdict::Forwarded => "FORWARDED",
            Verdict::Dropped => "DROPPED",
            Verdict::Audit => "AUDIT",
            Verdict::Redirected => "REDIRECTED",
            Verdict::Traced => "TRACED",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of the flow relative to the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficDirection {
    #[default]
    Unknown,
    Ingress,
    Egress,
}

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Unknown,
    Tcp,
    Udp,
    Icmp,
    Sctp,
}

/// Layer-4 information of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Layer4 {
    /// Transport protocol.
    pub protocol: Protocol,
    /// Source port (0 for port-less protocols).
    pub source_port: u16,
    /// Destination port (0 for port-less protocols).
    pub destination_port: u16,
}

/// One side of a flow: the workload identity observed by the dataplane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Endpoint {
    /// Numeric security identity.
    pub identity: u32,
    /// Namespace the workload runs in (empty for cluster-external peers).
    pub namespace: String,
    /// Pod name (empty for cluster-external peers).
    pub pod_name: String,
    /// Workload labels.
    pub labels: Vec<String>,
}

/// A decoded network flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Unique flow id assigned by the decoder.
    pub uuid: Uuid,
    /// Capture timestamp.
    pub time: DateTime<Utc>,
    /// Dataplane verdict.
    pub verdict: Verdict,
    /// Drop reason, set when the verdict is `Dropped`.
    pub drop_reason: Option<String>,
    /// Name of the node that observed the flow.
    pub node_name: String,
    /// Source identity.
    pub source: Endpoint,
    /// Destination identity.
    pub destination: Endpoint,
    /// Layer-4 metadata, when the flow carries any.
    pub l4: Option<Layer4>,
    /// Direction relative to the reporting node.
    pub traffic_direction: TrafficDirection,
    /// Whether this flow is a reply in an established connection.
    pub is_reply: Option<bool>,
    /// Human-readable one-line summary.
    pub summary: String,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            uuid: Uuid::nil(),
            time: DateTime::<Utc>::UNIX_EPOCH,
            verdict: Verdict::default(),
            drop_reason: None,
            node_name: String::new(),
            source: Endpoint::default(),
            destination: Endpoint::default(),
            l4: None,
            traffic_direction: TrafficDirection::default(),
            is_reply: None,
            summary: String::new(),
        }
    }
}
