//! Shared helpers for observer integration tests: a JSON-encoded perf
//! payload decoder and event builders.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use flowscope_common::{
    AgentEvent, AgentEventKind, DebugEvent, Endpoint, Event, EventPayload, Flow, FlowsPayload,
    GetFlowsRequest, GetFlowsResponse, LostEvent, LostEventSource, MonitorEvent, MonitorPayload,
    Verdict,
};
use flowscope_observer::observer::{DecodeError, EventDecoder, InMemoryNamespaceManager};
use flowscope_observer::{ChannelStream, ObserverError, ObserverOptions, ObserverServer};

/// Wire format carried in test perf payloads.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum PerfRecord {
    Flow(Flow),
    Debug(DebugEvent),
    Skip,
}

/// Decodes JSON perf records; agent events and upstream loss reports pass
/// through.
pub struct JsonDecoder;

impl EventDecoder for JsonDecoder {
    fn decode(&self, event: &MonitorEvent) -> Result<Event, DecodeError> {
        match &event.payload {
            MonitorPayload::Perf { data, .. } => {
                let record: PerfRecord = serde_json::from_slice(data)
                    .map_err(|err| DecodeError::Malformed(err.to_string()))?;
                match record {
                    PerfRecord::Flow(flow) => {
                        Ok(Event::new(event.timestamp, EventPayload::Flow(flow)))
                    }
                    PerfRecord::Debug(debug) => {
                        Ok(Event::new(event.timestamp, EventPayload::Debug(debug)))
                    }
                    PerfRecord::Skip => Err(DecodeError::EventSkipped),
                }
            }
            MonitorPayload::Agent(agent) => {
                Ok(Event::new(event.timestamp, EventPayload::Agent(agent.clone())))
            }
            MonitorPayload::Lost {
                num_events_lost,
                cpu,
            } => Ok(Event::new(
                event.timestamp,
                EventPayload::Lost(LostEvent {
                    source: LostEventSource::MonitorQueue,
                    num_events_lost: *num_events_lost,
                    cpu: Some(*cpu),
                }),
            )),
        }
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn flow_at(time: DateTime<Utc>) -> Flow {
    Flow {
        uuid: Uuid::new_v4(),
        time,
        verdict: Verdict::Forwarded,
        node_name: "node-1".to_string(),
        source: Endpoint {
            identity: 1,
            namespace: "default".to_string(),
            pod_name: "client-0".to_string(),
            labels: vec![],
        },
        destination: Endpoint {
            identity: 2,
            namespace: "kube-system".to_string(),
            pod_name: "coredns-0".to_string(),
            labels: vec![],
        },
        summary: "test flow".to_string(),
        ..Flow::default()
    }
}

fn monitor(time: DateTime<Utc>, payload: MonitorPayload) -> MonitorEvent {
    MonitorEvent {
        uuid: Uuid::new_v4(),
        node_name: "node-1".to_string(),
        timestamp: time,
        payload,
    }
}

pub fn monitor_flow(flow: Flow) -> MonitorEvent {
    let time = flow.time;
    let data = serde_json::to_vec(&PerfRecord::Flow(flow)).unwrap();
    monitor(time, MonitorPayload::Perf { data, cpu: 0 })
}

pub fn monitor_debug(time: DateTime<Utc>, message: &str) -> MonitorEvent {
    let data = serde_json::to_vec(&PerfRecord::Debug(DebugEvent {
        kind: "DBG_GENERIC".to_string(),
        message: message.to_string(),
        cpu: Some(0),
    }))
    .unwrap();
    monitor(time, MonitorPayload::Perf { data, cpu: 0 })
}

pub fn monitor_agent(time: DateTime<Utc>, message: &str) -> MonitorEvent {
    monitor(
        time,
        MonitorPayload::Agent(AgentEvent {
            kind: AgentEventKind::PolicyUpdated,
            message: message.to_string(),
        }),
    )
}

pub fn monitor_skip(time: DateTime<Utc>) -> MonitorEvent {
    let data = serde_json::to_vec(&PerfRecord::Skip).unwrap();
    monitor(time, MonitorPayload::Perf { data, cpu: 0 })
}

pub fn monitor_garbage(time: DateTime<Utc>) -> MonitorEvent {
    monitor(
        time,
        MonitorPayload::Perf {
            data: b"not json".to_vec(),
            cpu: 0,
        },
    )
}

pub fn monitor_upstream_loss(time: DateTime<Utc>, lost: u64) -> MonitorEvent {
    monitor(
        time,
        MonitorPayload::Lost {
            num_events_lost: lost,
            cpu: 1,
        },
    )
}

/// Route observer logs through the test harness when `RUST_LOG` asks for
/// them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a server with the JSON test decoder and the given options.
pub fn build_server(
    opts: ObserverOptions,
) -> (Arc<ObserverServer>, mpsc::Sender<MonitorEvent>) {
    init_tracing();
    ObserverServer::new(
        Arc::new(JsonDecoder),
        Arc::new(InMemoryNamespaceManager::new()),
        opts,
    )
    .expect("server construction failed")
}

pub fn small_server(max_flows: u64) -> (Arc<ObserverServer>, mpsc::Sender<MonitorEvent>) {
    build_server(
        ObserverOptions::new()
            .with_max_flows(max_flows)
            .with_monitor_buffer(64)
            .with_node_name("node-1"),
    )
}

/// Run the ingest loop over `events`, close the channel, and wait until the
/// loop has drained.
pub async fn ingest_all(
    server: &Arc<ObserverServer>,
    sender: mpsc::Sender<MonitorEvent>,
    events: Vec<MonitorEvent>,
) {
    let ingest = {
        let server = Arc::clone(server);
        tokio::spawn(async move { server.start().await })
    };
    for event in events {
        sender.send(event).await.unwrap();
    }
    drop(sender);
    server.wait_stopped().await;
    ingest.await.unwrap();
}

/// Run a non-follow flows query to completion and return the responses.
pub async fn collect_flows(
    server: &Arc<ObserverServer>,
    request: GetFlowsRequest,
) -> Result<Vec<GetFlowsResponse>, ObserverError> {
    let (tx, mut rx) = mpsc::channel(1024);
    let mut stream = ChannelStream::new(tx);
    let cancel = tokio_util::sync::CancellationToken::new();
    server.get_flows(&request, &mut stream, &cancel).await?;
    drop(stream);

    let mut responses = Vec::new();
    while let Ok(response) = rx.try_recv() {
        responses.push(response);
    }
    Ok(responses)
}

/// Flow timestamps (seconds) of the flow responses, ignoring lost markers.
pub fn flow_seconds(responses: &[GetFlowsResponse]) -> Vec<i64> {
    responses
        .iter()
        .filter_map(|response| match &response.payload {
            FlowsPayload::Flow(flow) => Some(flow.time.timestamp()),
            FlowsPayload::LostEvents(_) => None,
        })
        .collect()
}
