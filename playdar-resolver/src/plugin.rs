//! # Plugin Module
//!
//! Defines the `ResolverPlugin` trait every resolver implementation must
//! satisfy, and `PluginAdaptor`, the wrapper that carries the dispatch
//! metadata (weight, preference, target time, scope) the pipeline needs
//! around a plugin instance.
//!
//! The original daemon loaded plugins as shared libraries through
//! `PDL::DynamicClass` (`resolver_service.h`). That loader is out of scope
//! here (spec.md §1); this module models only the trait the loaded object
//! would have to implement, per the REDESIGN note in spec.md §9.

use crate::error::ResolverError;
use crate::id::QueryId;
use crate::item::ResolvedItem;
use crate::query::ResolverQuery;
use crate::registry::QueryRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Whether a plugin may participate in queries whose origin is not this
/// daemon (e.g. a query forwarded from a peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only resolves queries originating on this daemon.
    Local,
    /// Resolves any query regardless of origin.
    Any,
}

/// Handle a plugin uses to report results for the one query it was handed.
///
/// Appending straight to `rq`'s own item list would skip the registry's
/// sid → (qid, plugin name) index (`registry.rs`'s `add_results`), leaving
/// `/sid/<sid>` lookups unable to find their way back to this plugin. A
/// `ResultSink` is the only path a plugin has to report results, so that
/// index insertion can't be bypassed.
pub struct ResultSink {
    registry: Arc<QueryRegistry>,
    qid: QueryId,
    plugin_name: Arc<str>,
}

impl ResultSink {
    pub(crate) fn new(registry: Arc<QueryRegistry>, qid: QueryId, plugin_name: Arc<str>) -> Self {
        Self { registry, qid, plugin_name }
    }

    /// Report results for the query this sink was created for. Returns
    /// `false` if the query has since been cancelled or evicted — the
    /// plugin should stop resolving rather than keep reporting into it.
    pub async fn report(&self, items: Vec<ResolvedItem>) -> Result<bool, ResolverError> {
        self.registry.add_results(self.qid, items, &self.plugin_name).await
    }
}

/// Interface every resolver plugin must implement.
///
/// A plugin is handed a query and asynchronously reports zero or more
/// results back through the registry by calling [`ResultSink::report`]; it
/// does not return results directly from `start_resolving`, since
/// resolution is inherently asynchronous and may outlive the call.
#[async_trait]
pub trait ResolverPlugin: Send + Sync {
    /// Unique plugin name, used as the key in `PluginAdaptor` and in
    /// `ResolvedItem::plugin_name`.
    fn name(&self) -> &str;

    /// Begin resolving `rq`. Must not block synchronously for long; any
    /// blocking I/O should happen inside the returned future, which the
    /// plugin's dispatch worker (`crate::worker`) drives to completion off
    /// the pipeline's calling thread. Results are reported back through
    /// `sink`, not by mutating `rq` directly.
    async fn start_resolving(
        &self,
        rq: Arc<ResolverQuery>,
        sink: ResultSink,
    ) -> Result<(), ResolverError>;

    /// Obtain a streaming strategy for a source this plugin previously
    /// reported, identified by the fields that were attached to the
    /// `ResolvedItem` (commonly a `url` or local `source` path field).
    async fn get_stream(
        &self,
        item: &ResolvedItem,
    ) -> Result<Box<dyn crate::streaming::StreamingStrategy>, ResolverError>;
}

/// Wraps a `ResolverPlugin` with the dispatch metadata the pipeline needs:
/// weight (0 disables dispatch participation but keeps HTTP sub-handlers),
/// preference (tie-break within equal weight), target_time (advisory hint),
/// and scope (local-only vs any).
pub struct PluginAdaptor {
    pub name: String,
    pub classname: String,
    pub weight: u32,
    pub preference: i32,
    pub target_time_ms: u64,
    pub scope: Scope,
    pub plugin: Arc<dyn ResolverPlugin>,
}

impl PluginAdaptor {
    pub fn new(
        classname: impl Into<String>,
        weight: u32,
        preference: i32,
        target_time_ms: u64,
        scope: Scope,
        plugin: Arc<dyn ResolverPlugin>,
    ) -> Self {
        Self {
            name: plugin.name().to_string(),
            classname: classname.into(),
            weight,
            preference,
            target_time_ms,
            scope,
            plugin,
        }
    }

    /// Dispatch ordering key: `(weight desc, preference desc, name asc)`.
    /// Used once at pipeline construction to produce a stable plugin order,
    /// per spec.md §4.1.
    pub(crate) fn dispatch_key(&self) -> (std::cmp::Reverse<u32>, std::cmp::Reverse<i32>, &str) {
        (
            std::cmp::Reverse(self.weight),
            std::cmp::Reverse(self.preference),
            self.name.as_str(),
        )
    }

    pub fn participates_in_dispatch(&self) -> bool {
        self.weight > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopPlugin(&'static str);

    #[async_trait]
    impl ResolverPlugin for NoopPlugin {
        fn name(&self) -> &str {
            self.0
        }

        async fn start_resolving(
            &self,
            _rq: Arc<ResolverQuery>,
            _sink: ResultSink,
        ) -> Result<(), ResolverError> {
            Ok(())
        }

        async fn get_stream(
            &self,
            _item: &ResolvedItem,
        ) -> Result<Box<dyn crate::streaming::StreamingStrategy>, ResolverError> {
            Err(ResolverError::NotFound("no stream".into()))
        }
    }

    #[test]
    fn weight_zero_disables_dispatch_but_not_the_adaptor() {
        let adaptor = PluginAdaptor::new(
            "noop",
            0,
            0,
            1000,
            Scope::Any,
            Arc::new(NoopPlugin("noop")),
        );
        assert!(!adaptor.participates_in_dispatch());
    }

    #[test]
    fn dispatch_key_orders_by_weight_then_preference_then_name() {
        let a = PluginAdaptor::new("a", 10, 5, 0, Scope::Any, Arc::new(NoopPlugin("a")));
        let b = PluginAdaptor::new("b", 10, 9, 0, Scope::Any, Arc::new(NoopPlugin("b")));
        let c = PluginAdaptor::new("c", 20, 1, 0, Scope::Any, Arc::new(NoopPlugin("c")));
        let mut v = vec![a, b, c];
        v.sort_by(|x, y| x.dispatch_key().cmp(&y.dispatch_key()));
        let names: Vec<_> = v.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }
}
