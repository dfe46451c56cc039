//! Field masks: client-selected projection of flow fields.
//!
//! A mask is a list of dotted paths (`"verdict"`, `"source.namespace"`).
//! It is parsed and validated once per query; each delivery copies only the
//! masked fields into a fresh target flow. An empty mask is inactive and
//! flows are delivered in full.

use thiserror::Error;

use flowscope_common::{Endpoint, Flow};

/// Errors raised while parsing a field mask.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldMaskError {
    /// The path does not name a flow field.
    #[error("unknown field path: {0:?}")]
    UnknownPath(String),
}

/// A single parsed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldPath {
    Uuid,
    Time,
    Verdict,
    DropReason,
    NodeName,
    L4,
    TrafficDirection,
    IsReply,
    Summary,
    Source(EndpointPath),
    Destination(EndpointPath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointPath {
    All,
    Identity,
    Namespace,
    PodName,
    Labels,
}

impl EndpointPath {
    fn parse(sub: Option<&str>) -> Option<Self> {
        match sub {
            None => Some(EndpointPath::All),
            Some("identity") => Some(EndpointPath::Identity),
            Some("namespace") => Some(EndpointPath::Namespace),
            Some("pod_name") => Some(EndpointPath::PodName),
            Some("labels") => Some(EndpointPath::Labels),
            Some(_) => None,
        }
    }

    fn copy(&self, dst: &mut Endpoint, src: &Endpoint) {
        match self {
            EndpointPath::All => *dst = src.clone(),
            EndpointPath::Identity => dst.identity = src.identity,
            EndpointPath::Namespace => dst.namespace = src.namespace.clone(),
            EndpointPath::PodName => dst.pod_name = src.pod_name.clone(),
            EndpointPath::Labels => dst.labels = src.labels.clone(),
        }
    }
}

/// A parsed field mask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask {
    paths: Vec<FieldPath>,
}

impl FieldMask {
    /// Parse and validate a list of dotted paths. An empty list yields an
    /// inactive mask.
    pub fn new(paths: &[String]) -> Result<Self, FieldMaskError> {
        let mut parsed = Vec::with_capacity(paths.len());
        for path in paths {
            let (head, sub) = match path.split_once('.') {
                Some((head, sub)) => (head, Some(sub)),
                None => (path.as_str(), None),
            };
            let field = match (head, sub) {
                ("uuid", None) => FieldPath::Uuid,
                ("time", None) => FieldPath::Time,
                ("verdict", None) => FieldPath::Verdict,
                ("drop_reason", None) => FieldPath::DropReason,
                ("node_name", None) => FieldPath::NodeName,
                ("l4", None) => FieldPath::L4,
                ("traffic_direction", None) => FieldPath::TrafficDirection,
                ("is_reply", None) => FieldPath::IsReply,
                ("summary", None) => FieldPath::Summary,
                ("source", sub) => EndpointPath::parse(sub)
                    .map(FieldPath::Source)
                    .ok_or_else(|| FieldMaskError::UnknownPath(path.clone()))?,
                ("destination", sub) => EndpointPath::parse(sub)
                    .map(FieldPath::Destination)
                    .ok_or_else(|| FieldMaskError::UnknownPath(path.clone()))?,
                _ => return Err(FieldMaskError::UnknownPath(path.clone())),
            };
            parsed.push(field);
        }
        Ok(Self { paths: parsed })
    }

    /// Returns true when the mask selects fields; an inactive mask delivers
    /// full flows.
    pub fn is_active(&self) -> bool {
        !self.paths.is_empty()
    }

    /// Allocate an empty target flow to copy masked fields into.
    pub fn alloc(&self) -> Flow {
        Flow::default()
    }

    /// Reset `dst` and copy the masked fields of `src` into it.
    pub fn copy(&self, dst: &mut Flow, src: &Flow) {
        *dst = Flow::default();
        for path in &self.paths {
            match path {
                FieldPath::Uuid => dst.uuid = src.uuid,
                FieldPath::Time => dst.time = src.time,
                FieldPath::Verdict => dst.verdict = src.verdict,
                FieldPath::DropReason => dst.drop_reason = src.drop_reason.clone(),
                FieldPath::NodeName => dst.node_name = src.node_name.clone(),
                FieldPath::L4 => dst.l4 = src.l4,
                FieldPath::TrafficDirection => dst.traffic_direction = src.traffic_direction,
                FieldPath::IsReply => dst.is_reply = src.is_reply,
                FieldPath::Summary => dst.summary = src.summary.clone(),
                FieldPath::Source(sub) => sub.copy(&mut dst.source, &src.source),
                FieldPath::Destination(sub) => sub.copy(&mut dst.destination, &src.destination),
            }
        }
    }
}
