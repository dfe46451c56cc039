//! Shared types for the flowscope flow observer.
//!
//! This crate contains:
//! - Flow types (Flow, Endpoint, Verdict, Layer4)
//! - Event types stored in the ring buffer (Event, EventPayload, LostEvent)
//! - Raw monitor events produced by the dataplane transport
//! - Request/response types for the streaming query endpoints

pub mod api;
pub mod event;
pub mod types;

pub use api::{
    FlowFilter, GetAgentEventsRequest, GetAgentEventsResponse, GetDebugEventsRequest,
    GetDebugEventsResponse, GetFlowsRequest, GetFlowsResponse, GetNamespacesResponse,
    GetNodesResponse, FlowsPayload, Namespace, QueryRequest, ServerStatusResponse,
};
pub use event::{
    AgentEvent, AgentEventKind, DebugEvent, Event, EventPayload, LostEvent, LostEventSource,
    MonitorEvent, MonitorPayload,
};
pub use types::{Endpoint, Flow, Layer4, Protocol, TrafficDirection, Verdict};
