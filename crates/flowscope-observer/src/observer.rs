//! The local observer server: ingest pipeline, streaming query endpoints,
//! and status.
//!
//! One long-lived ingest task owns writes to the ring; every query runs on
//! its own task with its own cursor. The inbound monitor-event channel is
//! the shutdown signal: when every sender is dropped the ingest loop drains,
//! exits, and flips the stopped signal.

pub mod reader;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowscope_common::{
    Event, EventPayload, Flow, FlowsPayload, GetAgentEventsRequest, GetAgentEventsResponse,
    GetDebugEventsRequest, GetDebugEventsResponse, GetFlowsRequest, GetFlowsResponse,
    GetNamespacesResponse, GetNodesResponse, MonitorEvent, Namespace, QueryRequest,
    ServerStatusResponse,
};

use crate::error::ObserverError;
use crate::fieldmask::FieldMask;
use crate::filters::{self, FilterFns};
use crate::observer::reader::{flow_rate, position_reader, EventsReader};
use crate::options::ObserverOptions;
use crate::ring::Ring;
use crate::transport::ResponseStream;

/// Version string reported in status responses.
pub const SERVER_VERSION: &str = concat!("flowscope/", env!("CARGO_PKG_VERSION"));

/// Errors returned by the payload decoder.
///
/// The benign variants are expected on a shared dataplane channel and are
/// dropped silently; anything else is logged at debug and dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The event type is not known to the decoder.
    #[error("unknown event type")]
    UnknownEventType,

    /// The decoder chose to skip this event.
    #[error("event skipped")]
    EventSkipped,

    /// The event is valid but not intended for this consumer.
    #[error("invalid event type for this consumer")]
    InvalidType,

    /// The payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Returns true for outcomes that are dropped without logging.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownEventType | DecodeError::EventSkipped | DecodeError::InvalidType
        )
    }
}

/// Decodes raw monitor events into ring events. External collaborator; the
/// concrete wire format lives with the dataplane.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, event: &MonitorEvent) -> Result<Event, DecodeError>;
}

/// Tracks the set of namespaces observed across flows. Must be safe for
/// concurrent inserts from ingest and reads from status queries.
pub trait NamespaceManager: Send + Sync {
    /// Idempotent insert.
    fn add_namespace(&self, namespace: &Namespace);
    /// The accumulated set, sorted.
    fn get_namespaces(&self) -> Vec<Namespace>;
}

/// Concurrent-set namespace manager.
#[derive(Debug, Default)]
pub struct InMemoryNamespaceManager {
    namespaces: DashSet<Namespace>,
}

impl InMemoryNamespaceManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamespaceManager for InMemoryNamespaceManager {
    fn add_namespace(&self, namespace: &Namespace) {
        if !self.namespaces.contains(namespace) {
            self.namespaces.insert(namespace.clone());
        }
    }

    fn get_namespaces(&self) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> =
            self.namespaces.iter().map(|ns| ns.key().clone()).collect();
        namespaces.sort();
        namespaces
    }
}

/// The local observer server. One instance per process; queries run
/// concurrently against the shared ring.
pub struct ObserverServer {
    ring: Arc<Ring>,
    /// Inbound channel receiver, taken by the ingest loop on start.
    events: Mutex<Option<mpsc::Receiver<MonitorEvent>>>,
    stopped_tx: watch::Sender<bool>,
    stopped_rx: watch::Receiver<bool>,
    decoder: Arc<dyn EventDecoder>,
    opts: ObserverOptions,
    start_time: DateTime<Utc>,
    /// Flows observed since start; monotonically increasing.
    seen_flows: AtomicU64,
    namespaces: Arc<dyn NamespaceManager>,
}

impl ObserverServer {
    /// Construct a server and hand back the sender half of its inbound
    /// monitor-event channel. Dropping every sender shuts the ingest loop
    /// down.
    ///
    /// Runs the `on_server_init` hooks; any hook failure aborts
    /// construction.
    pub fn new(
        decoder: Arc<dyn EventDecoder>,
        namespaces: Arc<dyn NamespaceManager>,
        opts: ObserverOptions,
    ) -> Result<(Arc<Self>, mpsc::Sender<MonitorEvent>), ObserverError> {
        info!(
            max_flows = opts.max_flows,
            monitor_buffer = opts.monitor_buffer,
            "configuring flow observer"
        );

        let (events_tx, events_rx) = mpsc::channel(opts.monitor_buffer);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let server = Arc::new(Self {
            ring: Arc::new(Ring::new(opts.max_flows)),
            events: Mutex::new(Some(events_rx)),
            stopped_tx,
            stopped_rx,
            decoder,
            opts,
            start_time: Utc::now(),
            seen_flows: AtomicU64::new(0),
            namespaces,
        });

        for hook in &server.opts.on_server_init {
            if let Err(err) = hook.on_server_init(&server) {
                warn!(error = %err, "server init hook failed");
                return Err(ObserverError::Hook(err));
            }
        }

        Ok((server, events_tx))
    }

    /// The ring buffer backing this server.
    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    /// The options this server was built with.
    pub fn options(&self) -> &ObserverOptions {
        &self.opts
    }

    /// Total flows observed since start.
    pub fn seen_flows(&self) -> u64 {
        self.seen_flows.load(Ordering::Relaxed)
    }

    /// Resolves once the ingest loop has drained the inbound channel and
    /// exited.
    pub async fn wait_stopped(&self) {
        let mut stopped = self.stopped_rx.clone();
        while !*stopped.borrow() {
            if stopped.changed().await.is_err() {
                return;
            }
        }
    }

    /// Consume the inbound channel until it closes: run monitor-event
    /// hooks, decode, track namespaces, run decoded-event hooks, and write
    /// to the ring. Returns when the channel closes, after flipping the
    /// stopped signal.
    pub async fn start(&self) {
        let Some(mut events) = self.events.lock().take() else {
            warn!("observer ingest loop already started");
            return;
        };

        'next_event: while let Some(monitor_event) = events.recv().await {
            for hook in &self.opts.on_monitor_event {
                let outcome = hook.on_monitor_event(&monitor_event).await;
                if let Some(error) = &outcome.error {
                    info!(error = %error, uuid = %monitor_event.uuid, "monitor event hook failed");
                }
                if outcome.stop {
                    continue 'next_event;
                }
            }

            let event = match self.decoder.decode(&monitor_event) {
                Ok(event) => event,
                Err(err) if err.is_benign() => continue,
                Err(err) => {
                    debug!(error = %err, uuid = %monitor_event.uuid, "failed to decode monitor event");
                    continue;
                }
            };

            if let EventPayload::Flow(flow) = &event.payload {
                self.track_namespaces(flow);
                for hook in &self.opts.on_decoded_flow {
                    let outcome = hook.on_decoded_flow(flow).await;
                    if let Some(error) = &outcome.error {
                        info!(error = %error, uuid = %monitor_event.uuid, "decoded flow hook failed");
                    }
                    if outcome.stop {
                        continue 'next_event;
                    }
                }
                self.seen_flows.fetch_add(1, Ordering::Relaxed);
            }

            for hook in &self.opts.on_decoded_event {
                let outcome = hook.on_decoded_event(&event).await;
                if let Some(error) = &outcome.error {
                    info!(error = %error, uuid = %monitor_event.uuid, "decoded event hook failed");
                }
                if outcome.stop {
                    continue 'next_event;
                }
            }

            self.ring.write(Arc::new(event));
        }

        let _ = self.stopped_tx.send(true);
    }

    fn track_namespaces(&self, flow: &Flow) {
        if !flow.source.namespace.is_empty() {
            self.namespaces.add_namespace(&Namespace {
                namespace: flow.source.namespace.clone(),
                cluster: self.opts.cluster_name.clone(),
            });
        }
        if !flow.destination.namespace.is_empty() {
            self.namespaces.add_namespace(&Namespace {
                namespace: flow.destination.namespace.clone(),
                cluster: self.opts.cluster_name.clone(),
            });
        }
    }

    /// Stream flows matching the request. Returns when a non-follow query
    /// is exhausted, the caller cancels, or the transport fails.
    pub async fn get_flows<S>(
        &self,
        request: &GetFlowsRequest,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ObserverError>
    where
        S: ResponseStream<GetFlowsResponse>,
    {
        validate_request(request)?;
        for hook in &self.opts.on_get_flows {
            hook.on_get_flows(request).await.map_err(ObserverError::Hook)?;
        }

        let mut builders = filters::default_builders();
        builders.extend(self.opts.on_build_filter.iter().cloned());
        let whitelist = filters::build_filter_list(&request.whitelist, &builders)?;
        let blacklist = filters::build_filter_list(&request.blacklist, &builders)?;

        let mask = FieldMask::new(&request.field_mask)?;
        let mut masked = mask.is_active().then(|| mask.alloc());

        let started = std::time::Instant::now();
        let ring_reader = position_reader(&self.ring, request, &whitelist, &blacklist);
        let mut events = EventsReader::new(ring_reader, request, whitelist, blacklist);
        let mut delivered: u64 = 0;

        let result = 'deliver: loop {
            let event = match events.next(cancel).await {
                Ok(Some(event)) => event,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };

            let response = match &event.payload {
                EventPayload::Flow(flow) => {
                    // Counted before delivery hooks run: a stopped flow
                    // still counts against the requested number.
                    events.event_count += 1;
                    for hook in &self.opts.on_flow_delivery {
                        let outcome = hook.on_flow_delivery(flow).await;
                        if let Some(error) = &outcome.error {
                            info!(error = %error, "flow delivery hook failed");
                        }
                        if outcome.stop {
                            continue 'deliver;
                        }
                    }
                    let flow = match masked.as_mut() {
                        Some(target) => {
                            mask.copy(target, flow);
                            target.clone()
                        }
                        None => flow.clone(),
                    };
                    GetFlowsResponse {
                        time: flow.time,
                        node_name: flow.node_name.clone(),
                        payload: FlowsPayload::Flow(flow),
                    }
                }
                EventPayload::Lost(lost) => GetFlowsResponse {
                    time: event.timestamp,
                    node_name: self.opts.node_name.clone(),
                    payload: FlowsPayload::LostEvents(*lost),
                },
                // Agent and debug events are not delivered on this endpoint.
                _ => continue,
            };

            if let Err(err) = stream.send(response).await {
                break Err(ObserverError::Transport(err));
            }
            delivered += 1;
        };

        debug!(
            flows = delivered,
            buffer_size = self.ring.cap(),
            whitelist = request.whitelist.len(),
            blacklist = request.blacklist.len(),
            took = ?started.elapsed(),
            "get_flows finished"
        );
        result
    }

    /// Stream agent events matching the request; other event kinds are
    /// silently skipped.
    pub async fn get_agent_events<S>(
        &self,
        request: &GetAgentEventsRequest,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ObserverError>
    where
        S: ResponseStream<GetAgentEventsResponse>,
    {
        validate_request(request)?;

        let started = std::time::Instant::now();
        let ring_reader =
            position_reader(&self.ring, request, &FilterFns::default(), &FilterFns::default());
        let mut events =
            EventsReader::new(ring_reader, request, FilterFns::default(), FilterFns::default());
        let mut delivered: u64 = 0;

        let result = loop {
            let event = match events.next(cancel).await {
                Ok(Some(event)) => event,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            if let EventPayload::Agent(agent_event) = &event.payload {
                events.event_count += 1;
                let response = GetAgentEventsResponse {
                    time: event.timestamp,
                    node_name: self.opts.node_name.clone(),
                    agent_event: agent_event.clone(),
                };
                if let Err(err) = stream.send(response).await {
                    break Err(ObserverError::Transport(err));
                }
                delivered += 1;
            }
        };

        debug!(
            agent_events = delivered,
            buffer_size = self.ring.cap(),
            took = ?started.elapsed(),
            "get_agent_events finished"
        );
        result
    }

    /// Stream debug events matching the request; other event kinds are
    /// silently skipped.
    pub async fn get_debug_events<S>(
        &self,
        request: &GetDebugEventsRequest,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ObserverError>
    where
        S: ResponseStream<GetDebugEventsResponse>,
    {
        validate_request(request)?;

        let started = std::time::Instant::now();
        let ring_reader =
            position_reader(&self.ring, request, &FilterFns::default(), &FilterFns::default());
        let mut events =
            EventsReader::new(ring_reader, request, FilterFns::default(), FilterFns::default());
        let mut delivered: u64 = 0;

        let result = loop {
            let event = match events.next(cancel).await {
                Ok(Some(event)) => event,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            if let EventPayload::Debug(debug_event) = &event.payload {
                events.event_count += 1;
                let response = GetDebugEventsResponse {
                    time: event.timestamp,
                    node_name: self.opts.node_name.clone(),
                    debug_event: debug_event.clone(),
                };
                if let Err(err) = stream.send(response).await {
                    break Err(ObserverError::Transport(err));
                }
                delivered += 1;
            }
        };

        debug!(
            debug_events = delivered,
            buffer_size = self.ring.cap(),
            took = ?started.elapsed(),
            "get_debug_events finished"
        );
        result
    }

    /// Server status: version, buffer occupancy, flow counters, uptime, and
    /// the flow rate over the last minute.
    pub fn server_status(&self) -> ServerStatusResponse {
        let now = Utc::now();
        ServerStatusResponse {
            version: SERVER_VERSION.to_string(),
            max_flows: self.ring.cap(),
            num_flows: self.ring.len(),
            seen_flows: self.seen_flows.load(Ordering::Relaxed),
            uptime_ns: (now - self.start_time).num_nanoseconds().unwrap_or(0).max(0) as u64,
            flows_rate: flow_rate(&self.ring, now),
        }
    }

    /// Node listing is not served by the local observer.
    pub fn get_nodes(&self) -> Result<GetNodesResponse, ObserverError> {
        Err(ObserverError::Unimplemented("get_nodes"))
    }

    /// The accumulated namespace set.
    pub fn get_namespaces(&self) -> GetNamespacesResponse {
        GetNamespacesResponse {
            namespaces: self.namespaces.get_namespaces(),
        }
    }
}

impl std::fmt::Debug for ObserverServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverServer")
            .field("ring", &self.ring)
            .field("start_time", &self.start_time)
            .field("seen_flows", &self.seen_flows.load(Ordering::Relaxed))
            .finish()
    }
}

fn validate_request(request: &impl QueryRequest) -> Result<(), ObserverError> {
    if request.first() && request.follow() {
        return Err(ObserverError::InvalidArgument(
            "first cannot be specified with follow".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_first_with_follow() {
        let request = GetFlowsRequest {
            first: true,
            follow: true,
            ..GetFlowsRequest::default()
        };
        assert!(matches!(
            validate_request(&request),
            Err(ObserverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_accepts_first_or_follow_alone() {
        let first = GetFlowsRequest {
            first: true,
            ..GetFlowsRequest::default()
        };
        assert!(validate_request(&first).is_ok());

        let follow = GetFlowsRequest {
            follow: true,
            ..GetFlowsRequest::default()
        };
        assert!(validate_request(&follow).is_ok());
    }

    #[test]
    fn test_namespace_manager_deduplicates_and_sorts() {
        let manager = InMemoryNamespaceManager::new();
        let ns = |namespace: &str| Namespace {
            namespace: namespace.to_string(),
            cluster: "default".to_string(),
        };
        manager.add_namespace(&ns("kube-system"));
        manager.add_namespace(&ns("default"));
        manager.add_namespace(&ns("kube-system"));

        let namespaces = manager.get_namespaces();
        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespaces[0].namespace, "default");
        assert_eq!(namespaces[1].namespace, "kube-system");
    }

    #[test]
    fn test_decode_error_benign_classification() {
        assert!(DecodeError::UnknownEventType.is_benign());
        assert!(DecodeError::EventSkipped.is_benign());
        assert!(DecodeError::InvalidType.is_benign());
        assert!(!DecodeError::Malformed("truncated".to_string()).is_benign());
    }
}
