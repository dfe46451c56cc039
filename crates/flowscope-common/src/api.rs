//! Request and response types for the streaming query endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AgentEvent, DebugEvent, LostEvent};
use crate::types::{Flow, Verdict};

/// A (namespace, cluster) pair observed across flows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name.
    pub namespace: String,
    /// Cluster the namespace belongs to.
    pub cluster: String,
}

/// A declarative filter expression matched against decoded flows.
///
/// Every populated field must match for the expression to match; list fields
/// match when any entry matches. An empty expression matches every flow.
/// Expressions are compiled into predicates by the observer's filter
/// builders; hook-supplied builders can extend the recognized fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowFilter {
    /// Match flows whose source namespace is one of these.
    pub source_namespace: Vec<String>,
    /// Match flows whose destination namespace is one of these.
    pub destination_namespace: Vec<String>,
    /// Match flows whose source pod name starts with one of these prefixes.
    pub source_pod: Vec<String>,
    /// Match flows whose destination pod name starts with one of these
    /// prefixes.
    pub destination_pod: Vec<String>,
    /// Match flows with one of these verdicts.
    pub verdict: Vec<Verdict>,
    /// Match flows reported by one of these nodes.
    pub node_name: Vec<String>,
}

/// Fields shared by all streaming query requests.
pub trait QueryRequest {
    /// Maximum number of events to return; 0 means unbounded.
    fn number(&self) -> u64;
    /// Keep the stream open and deliver new events as they arrive.
    fn follow(&self) -> bool;
    /// Start with the oldest buffered event instead of the most recent ones.
    fn first(&self) -> bool;
    /// Only return events at or after this time.
    fn since(&self) -> Option<DateTime<Utc>>;
    /// Only return events at or before this time.
    fn until(&self) -> Option<DateTime<Utc>>;
}

/// Request for the flows streaming endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GetFlowsRequest {
    /// Maximum number of flows to return; 0 means unbounded.
    pub number: u64,
    /// Deliver new flows as they arrive instead of closing the stream.
    pub follow: bool,
    /// Start with the oldest buffered flow.
    pub first: bool,
    /// Only return flows at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only return flows at or before this time.
    pub until: Option<DateTime<Utc>>,
    /// Include filters: a flow is a candidate if any expression matches.
    pub whitelist: Vec<FlowFilter>,
    /// Exclude filters: a flow is rejected if any expression matches.
    pub blacklist: Vec<FlowFilter>,
    /// Dotted paths selecting the flow fields to populate in responses;
    /// empty means "deliver full flows".
    pub field_mask: Vec<String>,
}

/// Request for the agent-events streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GetAgentEventsRequest {
    /// Maximum number of events to return; 0 means unbounded.
    pub number: u64,
    /// Deliver new events as they arrive instead of closing the stream.
    pub follow: bool,
    /// Start with the oldest buffered event.
    pub first: bool,
    /// Only return events at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only return events at or before this time.
    pub until: Option<DateTime<Utc>>,
}

/// Request for the debug-events streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GetDebugEventsRequest {
    /// Maximum number of events to return; 0 means unbounded.
    pub number: u64,
    /// Deliver new events as they arrive instead of closing the stream.
    pub follow: bool,
    /// Start with the oldest buffered event.
    pub first: bool,
    /// Only return events at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only return events at or before this time.
    pub until: Option<DateTime<Utc>>,
}

macro_rules! impl_query_request {
    ($($request:ty),+) => {
        $(impl QueryRequest for $request {
            fn number(&self) -> u64 {
                self.number
            }
            fn follow(&self) -> bool {
                self.follow
            }
            fn first(&self) -> bool {
                self.first
            }
            fn since(&self) -> Option<DateTime<Utc>> {
                self.since
            }
            fn until(&self) -> Option<DateTime<Utc>> {
                self.until
            }
        })+
    };
}

impl_query_request!(GetFlowsRequest, GetAgentEventsRequest, GetDebugEventsRequest);

/// Payload of one flows-endpoint response item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowsPayload {
    /// A delivered flow.
    Flow(Flow),
    /// Marker for events lost before delivery.
    LostEvents(LostEvent),
}

/// One item of the flows response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFlowsResponse {
    /// Server-side timestamp of the delivered item.
    pub time: DateTime<Utc>,
    /// Name of the node that observed the item.
    pub node_name: String,
    /// The delivered payload.
    pub payload: FlowsPayload,
}

/// One item of the agent-events response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetAgentEventsResponse {
    /// Server-side timestamp of the delivered item.
    pub time: DateTime<Utc>,
    /// Name of the node that observed the item.
    pub node_name: String,
    /// The delivered agent event.
    pub agent_event: AgentEvent,
}

/// One item of the debug-events response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDebugEventsResponse {
    /// Server-side timestamp of the delivered item.
    pub time: DateTime<Utc>,
    /// Name of the node that observed the item.
    pub node_name: String,
    /// The delivered debug event.
    pub debug_event: DebugEvent,
}

/// Server status summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatusResponse {
    /// Server version string.
    pub version: String,
    /// Ring buffer capacity.
    pub max_flows: u64,
    /// Number of events currently buffered.
    pub num_flows: u64,
    /// Total number of flows observed since the server started.
    pub seen_flows: u64,
    /// Uptime in nanoseconds.
    pub uptime_ns: u64,
    /// Flows per second over the most recent minute.
    pub flows_rate: f64,
}

/// Response for the namespace listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GetNamespacesResponse {
    /// Accumulated namespaces, sorted.
    pub namespaces: Vec<Namespace>,
}

/// Response for the node listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GetNodesResponse {
    /// Known node names.
    pub nodes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_filter_default_is_empty() {
        let filter = FlowFilter::default();
        assert!(filter.source_namespace.is_empty());
        assert!(filter.verdict.is_empty());
    }

    #[test]
    fn test_request_defaults() {
        let req = GetFlowsRequest::default();
        assert_eq!(req.number(), 0);
        assert!(!req.follow());
        assert!(!req.first());
        assert!(req.since().is_none());
        assert!(req.until().is_none());
        assert!(req.field_mask.is_empty());
    }

    #[test]
    fn test_request_deserialize_partial() {
        let req: GetFlowsRequest =
            serde_json::from_str(r#"{"number": 20, "follow": true}"#).unwrap();
        assert_eq!(req.number, 20);
        assert!(req.follow);
        assert!(req.whitelist.is_empty());
    }

    #[test]
    fn test_namespace_ordering() {
        let mut namespaces = vec![
            Namespace {
                namespace: "kube-system".to_string(),
                cluster: "default".to_string(),
            },
            Namespace {
                namespace: "default".to_string(),
                cluster: "default".to_string(),
            },
        ];
        namespaces.sort();
        assert_eq!(namespaces[0].namespace, "default");
    }
}
