//! Observer options: capacity knobs, node identity, and hook chains.

use std::sync::Arc;

use crate::config::ObserverConfig;
use crate::filters::FilterBuilder;
use crate::hooks::{
    OnDecodedEvent, OnDecodedFlow, OnFlowDelivery, OnGetFlows, OnMonitorEvent, OnServerInit,
};

/// Default ring buffer capacity.
pub const DEFAULT_MAX_FLOWS: u64 = 4096;

/// Default inbound monitor-event channel capacity.
pub const DEFAULT_MONITOR_BUFFER: usize = 1024;

/// Default cluster name reported in namespaces.
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Options applied at server construction.
///
/// Hook chains run in the order they were added and cannot be mutated after
/// construction.
#[derive(Clone, Default)]
pub struct ObserverOptions {
    /// Ring buffer capacity (rounded up to a power of two).
    pub max_flows: u64,
    /// Inbound monitor-event channel capacity.
    pub monitor_buffer: usize,
    /// Name of the local node, stamped on responses without a flow-provided
    /// node name.
    pub node_name: String,
    /// Cluster name used when tracking namespaces.
    pub cluster_name: String,
    /// Hooks run once at construction.
    pub on_server_init: Vec<Arc<dyn OnServerInit>>,
    /// Hooks run against every raw monitor event.
    pub on_monitor_event: Vec<Arc<dyn OnMonitorEvent>>,
    /// Hooks run against every decoded flow.
    pub on_decoded_flow: Vec<Arc<dyn OnDecodedFlow>>,
    /// Hooks run against every decoded event.
    pub on_decoded_event: Vec<Arc<dyn OnDecodedEvent>>,
    /// Admission hooks for the flows endpoint.
    pub on_get_flows: Vec<Arc<dyn OnGetFlows>>,
    /// Hooks run against every flow about to be delivered.
    pub on_flow_delivery: Vec<Arc<dyn OnFlowDelivery>>,
    /// Filter builders appended to the defaults when compiling request
    /// filter expressions.
    pub on_build_filter: Vec<Arc<dyn FilterBuilder>>,
}

impl ObserverOptions {
    /// Options with default capacities and no hooks.
    pub fn new() -> Self {
        Self {
            max_flows: DEFAULT_MAX_FLOWS,
            monitor_buffer: DEFAULT_MONITOR_BUFFER,
            node_name: String::new(),
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Options taken from an [`ObserverConfig`].
    pub fn from_config(config: &ObserverConfig) -> Self {
        Self {
            max_flows: config.max_flows,
            monitor_buffer: config.monitor_buffer,
            node_name: config.node_name.clone(),
            cluster_name: config.cluster_name.clone(),
            ..Self::default()
        }
    }

    /// Set the ring buffer capacity.
    pub fn with_max_flows(mut self, max_flows: u64) -> Self {
        self.max_flows = max_flows;
        self
    }

    /// Set the inbound channel capacity.
    pub fn with_monitor_buffer(mut self, monitor_buffer: usize) -> Self {
        self.monitor_buffer = monitor_buffer;
        self
    }

    /// Set the local node name.
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Set the cluster name.
    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = cluster_name.into();
        self
    }

    /// Append a construction hook.
    pub fn with_on_server_init(mut self, hook: Arc<dyn OnServerInit>) -> Self {
        self.on_server_init.push(hook);
        self
    }

    /// Append a raw monitor-event hook.
    pub fn with_on_monitor_event(mut self, hook: Arc<dyn OnMonitorEvent>) -> Self {
        self.on_monitor_event.push(hook);
        self
    }

    /// Append a decoded-flow hook.
    pub fn with_on_decoded_flow(mut self, hook: Arc<dyn OnDecodedFlow>) -> Self {
        self.on_decoded_flow.push(hook);
        self
    }

    /// Append a decoded-event hook.
    pub fn with_on_decoded_event(mut self, hook: Arc<dyn OnDecodedEvent>) -> Self {
        self.on_decoded_event.push(hook);
        self
    }

    /// Append a flows-endpoint admission hook.
    pub fn with_on_get_flows(mut self, hook: Arc<dyn OnGetFlows>) -> Self {
        self.on_get_flows.push(hook);
        self
    }

    /// Append a flow-delivery hook.
    pub fn with_on_flow_delivery(mut self, hook: Arc<dyn OnFlowDelivery>) -> Self {
        self.on_flow_delivery.push(hook);
        self
    }

    /// Append a filter builder.
    pub fn with_on_build_filter(mut self, builder: Arc<dyn FilterBuilder>) -> Self {
        self.on_build_filter.push(builder);
        self
    }
}

impl std::fmt::Debug for ObserverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverOptions")
            .field("max_flows", &self.max_flows)
            .field("monitor_buffer", &self.monitor_buffer)
            .field("node_name", &self.node_name)
            .field("cluster_name", &self.cluster_name)
            .field("on_server_init", &self.on_server_init.len())
            .field("on_monitor_event", &self.on_monitor_event.len())
            .field("on_decoded_flow", &self.on_decoded_flow.len())
            .field("on_decoded_event", &self.on_decoded_event.len())
            .field("on_get_flows", &self.on_get_flows.len())
            .field("on_flow_delivery", &self.on_flow_delivery.len())
            .field("on_build_filter", &self.on_build_filter.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let opts = ObserverOptions::new();
        assert_eq!(opts.max_flows, DEFAULT_MAX_FLOWS);
        assert_eq!(opts.monitor_buffer, DEFAULT_MONITOR_BUFFER);
        assert_eq!(opts.cluster_name, DEFAULT_CLUSTER_NAME);
        assert!(opts.on_monitor_event.is_empty());
    }

    #[test]
    fn test_builder_methods() {
        let opts = ObserverOptions::new()
            .with_max_flows(64)
            .with_monitor_buffer(16)
            .with_node_name("node-1")
            .with_cluster_name("west");
        assert_eq!(opts.max_flows, 64);
        assert_eq!(opts.monitor_buffer, 16);
        assert_eq!(opts.node_name, "node-1");
        assert_eq!(opts.cluster_name, "west");
    }
}
