//! Local flow observer core.
//!
//! This crate implements the in-process subsystem of a network-observability
//! agent: it ingests raw monitor events from a kernel dataplane, decodes
//! them into structured flow records, retains them in a bounded ring buffer,
//! and serves them through streaming query endpoints supporting historical,
//! live-follow, and time-bounded retrieval.
//!
//! ## Architecture
//!
//! - **Single-writer ring**: one ingest task owns writes; readers address
//!   events by sequence number and observe explicit lost-event markers when
//!   they fall behind, never stale data
//! - **Per-query cursors**: every query runs on its own task with its own
//!   reader; cancellation is prompt and scoped to the query
//! - **Hook chains**: ordered interceptors with early-stop semantics at
//!   every pipeline stage, fixed at construction
//!
//! ## Modules
//!
//! - `ring`: bounded circular event store and its cursor
//! - `filters`: include/exclude predicate compilation and evaluation
//! - `fieldmask`: client-selected projection of flow fields
//! - `observer`: the server, ingest loop, and query endpoints
//! - `options`/`config`: construction options and on-disk configuration
//! - `transport`: the response stream seam

pub mod config;
pub mod error;
pub mod fieldmask;
pub mod filters;
pub mod hooks;
pub mod observer;
pub mod options;
pub mod ring;
pub mod transport;

pub use config::ObserverConfig;
pub use error::ObserverError;
pub use fieldmask::{FieldMask, FieldMaskError};
pub use filters::{
    apply, build_filter_list, default_builders, FilterBuilder, FilterError, FilterFn, FilterFns,
};
pub use hooks::{
    HookError, HookOutcome, OnDecodedEvent, OnDecodedFlow, OnFlowDelivery, OnGetFlows,
    OnMonitorEvent, OnServerInit,
};
pub use observer::{
    DecodeError, EventDecoder, InMemoryNamespaceManager, NamespaceManager, ObserverServer,
    SERVER_VERSION,
};
pub use options::{
    ObserverOptions, DEFAULT_CLUSTER_NAME, DEFAULT_MAX_FLOWS, DEFAULT_MONITOR_BUFFER,
};
pub use ring::{reader::RingReader, Ring, RingError};
pub use transport::{ChannelStream, ResponseStream, TransportError};
