//! Interception hook chains for the ingest and query pipelines.
//!
//! Hook chains are ordered lists fixed at construction; there is no runtime
//! mutation. Each ingest-side hook returns a [`HookOutcome`]: whether to
//! stop processing the current event, plus an optional error. Errors are
//! logged and never abort the pipeline; an erroring hook can still request
//! stop. The exceptions are [`OnServerInit`] (a failure aborts construction)
//! and [`OnGetFlows`] (a failure rejects the query before streaming
//! begins).

use async_trait::async_trait;
use thiserror::Error;

use flowscope_common::{Event, Flow, GetFlowsRequest, MonitorEvent};

/// Error reported by a hook.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    /// Create a hook error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Outcome of one hook invocation.
///
/// `stop` drops the current event from the rest of the pipeline. `error` is
/// reported by the caller; it does not cancel a stop request.
#[derive(Debug, Default)]
pub struct HookOutcome {
    /// Stop processing the current event.
    pub stop: bool,
    /// Error to report.
    pub error: Option<HookError>,
}

impl HookOutcome {
    /// Keep processing the event.
    pub fn pass() -> Self {
        Self::default()
    }

    /// Drop the event from the rest of the pipeline.
    pub fn stop() -> Self {
        Self {
            stop: true,
            error: None,
        }
    }

    /// Report an error and keep processing.
    pub fn fail(error: HookError) -> Self {
        Self {
            stop: false,
            error: Some(error),
        }
    }

    /// Attach an error to this outcome.
    pub fn with_error(mut self, error: HookError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Runs against every raw monitor event before decoding.
#[async_trait]
pub trait OnMonitorEvent: Send + Sync {
    async fn on_monitor_event(&self, event: &MonitorEvent) -> HookOutcome;
}

/// Runs against every decoded flow before it is counted and buffered.
#[async_trait]
pub trait OnDecodedFlow: Send + Sync {
    async fn on_decoded_flow(&self, flow: &Flow) -> HookOutcome;
}

/// Runs against every decoded event of any kind before it is buffered.
#[async_trait]
pub trait OnDecodedEvent: Send + Sync {
    async fn on_decoded_event(&self, event: &Event) -> HookOutcome;
}

/// Runs against every flow about to be delivered on the flows endpoint.
#[async_trait]
pub trait OnFlowDelivery: Send + Sync {
    async fn on_flow_delivery(&self, flow: &Flow) -> HookOutcome;
}

/// Admission hook for the flows endpoint; a failure rejects the query.
#[async_trait]
pub trait OnGetFlows: Send + Sync {
    async fn on_get_flows(&self, request: &GetFlowsRequest) -> Result<(), HookError>;
}

/// Runs once at server construction; a failure aborts construction.
pub trait OnServerInit: Send + Sync {
    fn on_server_init(&self, server: &crate::observer::ObserverServer) -> Result<(), HookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let pass = HookOutcome::pass();
        assert!(!pass.stop);
        assert!(pass.error.is_none());

        let stop = HookOutcome::stop();
        assert!(stop.stop);
        assert!(stop.error.is_none());

        let fail = HookOutcome::fail(HookError::new("boom"));
        assert!(!fail.stop);
        assert_eq!(fail.error.unwrap().to_string(), "boom");
    }

    #[test]
    fn test_stop_with_error_keeps_both() {
        let outcome = HookOutcome::stop().with_error(HookError::new("rate limited"));
        assert!(outcome.stop);
        assert_eq!(outcome.error.unwrap().to_string(), "rate limited");
    }
}
