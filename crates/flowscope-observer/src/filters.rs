//! Include/exclude predicate evaluation for decoded events.
//!
//! A request carries a whitelist and a blacklist of [`FlowFilter`]
//! expressions. Expressions are compiled into predicates by an ordered list
//! of builders; the default builders cover the expression fields the core
//! understands and hook-supplied builders can extend them. Predicates are
//! pure: they never observe wall-clock time or mutate state.
//!
//! Acceptance rule: an event passes iff the whitelist is empty or any
//! whitelist predicate matches, and the blacklist is empty or no blacklist
//! predicate matches. Lost-event markers are never run through predicates;
//! the events reader bypasses filtering for them entirely.

use std::sync::Arc;

use thiserror::Error;

use flowscope_common::{Event, FlowFilter};

/// A compiled predicate over decoded events.
pub type FilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Errors raised while compiling filter expressions.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The expression contains a field value the builders cannot compile.
    #[error("invalid filter expression: {0}")]
    InvalidExpression(String),
}

/// An ordered list of compiled predicates.
#[derive(Clone, Default)]
pub struct FilterFns(Vec<FilterFn>);

impl FilterFns {
    /// Returns true if no predicates are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if any predicate matches the event.
    pub fn match_any(&self, event: &Event) -> bool {
        self.0.iter().any(|f| f(event))
    }

    /// Returns true if no predicate matches the event.
    pub fn match_none(&self, event: &Event) -> bool {
        !self.match_any(event)
    }
}

impl std::fmt::Debug for FilterFns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FilterFns").field(&self.0.len()).finish()
    }
}

/// Evaluate the full chain: whitelist (empty or any) and blacklist (empty or
/// none).
pub fn apply(whitelist: &FilterFns, blacklist: &FilterFns, event: &Event) -> bool {
    (whitelist.is_empty() || whitelist.match_any(event))
        && (blacklist.is_empty() || blacklist.match_none(event))
}

/// Compiles one aspect of a [`FlowFilter`] expression into predicates.
///
/// Builders are consulted in order for every expression; each returns the
/// predicates for the fields it recognizes (none when the expression leaves
/// them unset). The `on_build_filter` hook chain appends builders to the
/// default list.
pub trait FilterBuilder: Send + Sync {
    /// Compile the aspects of `filter` this builder understands.
    fn build(&self, filter: &FlowFilter) -> Result<Vec<FilterFn>, FilterError>;
}

/// The builders every request starts from.
pub fn default_builders() -> Vec<Arc<dyn FilterBuilder>> {
    vec![
        Arc::new(NamespaceFilter),
        Arc::new(PodFilter),
        Arc::new(VerdictFilter),
        Arc::new(NodeNameFilter),
    ]
}

/// Compile a list of filter expressions into predicates, one combined
/// predicate per expression. Within an expression every compiled part must
/// match; across expressions any may match.
pub fn build_filter_list(
    filters: &[FlowFilter],
    builders: &[Arc<dyn FilterBuilder>],
) -> Result<FilterFns, FilterError> {
    let mut fns: Vec<FilterFn> = Vec::with_capacity(filters.len());
    for filter in filters {
        let mut parts: Vec<FilterFn> = Vec::new();
        for builder in builders {
            parts.extend(builder.build(filter)?);
        }
        fns.push(Arc::new(move |event: &Event| {
            parts.iter().all(|part| part(event))
        }));
    }
    Ok(FilterFns(fns))
}

/// Matches source/destination namespaces.
struct NamespaceFilter;

impl FilterBuilder for NamespaceFilter {
    fn build(&self, filter: &FlowFilter) -> Result<Vec<FilterFn>, FilterError> {
        let mut fns: Vec<FilterFn> = Vec::new();
        if !filter.source_namespace.is_empty() {
            let namespaces = filter.source_namespace.clone();
            fns.push(Arc::new(move |event: &Event| {
                event
                    .payload
                    .flow()
                    .is_some_and(|flow| namespaces.contains(&flow.source.namespace))
            }));
        }
        if !filter.destination_namespace.is_empty() {
            let namespaces = filter.destination_namespace.clone();
            fns.push(Arc::new(move |event: &Event| {
                event
                    .payload
                    .flow()
                    .is_some_and(|flow| namespaces.contains(&flow.destination.namespace))
            }));
        }
        Ok(fns)
    }
}

/// Matches source/destination pod name prefixes.
struct PodFilter;

impl FilterBuilder for PodFilter {
    fn build(&self, filter: &FlowFilter) -> Result<Vec<FilterFn>, FilterError> {
        let mut fns: Vec<FilterFn> = Vec::new();
        if !filter.source_pod.is_empty() {
            let prefixes = filter.source_pod.clone();
            fns.push(Arc::new(move |event: &Event| {
                event.payload.flow().is_some_and(|flow| {
                    prefixes.iter().any(|p| flow.source.pod_name.starts_with(p))
                })
            }));
        }
        if !filter.destination_pod.is_empty() {
            let prefixes = filter.destination_pod.clone();
            fns.push(Arc::new(move |event: &Event| {
                event.payload.flow().is_some_and(|flow| {
                    prefixes
                        .iter()
                        .any(|p| flow.destination.pod_name.starts_with(p))
                })
            }));
        }
        Ok(fns)
    }
}

/// Matches the dataplane verdict.
struct VerdictFilter;

impl FilterBuilder for VerdictFilter {
    fn build(&self, filter: &FlowFilter) -> Result<Vec<FilterFn>, FilterError> {
        if filter.verdict.is_empty() {
            return Ok(Vec::new());
        }
        let verdicts = filter.verdict.clone();
        Ok(vec![Arc::new(move |event: &Event| {
            event
                .payload
                .flow()
                .is_some_and(|flow| verdicts.contains(&flow.verdict))
        })])
    }
}

/// Matches the reporting node name.
struct NodeNameFilter;

impl FilterBuilder for NodeNameFilter {
    fn build(&self, filter: &FlowFilter) -> Result<Vec<FilterFn>, FilterError> {
        if filter.node_name.is_empty() {
            return Ok(Vec::new());
        }
        let nodes = filter.node_name.clone();
        Ok(vec![Arc::new(move |event: &Event| {
            event
                .payload
                .flow()
                .is_some_and(|flow| nodes.contains(&flow.node_name))
        })])
    }
}
