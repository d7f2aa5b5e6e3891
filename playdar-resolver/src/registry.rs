//! # Query Registry Module
//!
//! The registry is the addressable home for every live query and every
//! source it has produced: `qid -> Query`, `sid -> (qid, plugin name)`, plus
//! atime-driven eviction. Readers (`get_query`, `get_results`, sid lookup)
//! take a read guard; writers (`register`, `add_results`, `cancel`, `sweep`)
//! take a write guard — no I/O is ever performed while holding it, matching
//! spec.md §5 and grounded in the teacher's `ConnectionManager`
//! (`ultrafast-gateway/src/dashboard/websocket/connection_manager.rs`),
//! which uses the same read/write-lock-around-a-HashMap shape for its
//! connection table.

use crate::error::ResolverError;
use crate::id::{QueryId, SourceId};
use crate::item::ResolvedItem;
use crate::query::{ResolverQuery, SubscriptionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Where a sid resolves back to: its owning query and the plugin that
/// produced it (needed to fetch a `StreamingStrategy` on demand).
#[derive(Clone)]
struct SourceEntry {
    qid: QueryId,
    plugin_name: Arc<str>,
}

struct Inner {
    queries: HashMap<QueryId, Arc<ResolverQuery>>,
    sources: HashMap<SourceId, SourceEntry>,
}

/// Configuration for a [`QueryRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a query may go unaccessed before `sweep()` evicts it.
    /// spec.md §9 leaves this unspecified in the source; we require every
    /// caller to choose one explicitly rather than hardcoding a default.
    pub retention_window: Duration,
}

impl RegistryConfig {
    pub fn new(retention_window: Duration) -> Self {
        Self { retention_window }
    }
}

/// In-memory index of every live query and source, guarded by a single
/// read-write lock per spec.md §5.
pub struct QueryRegistry {
    inner: RwLock<Inner>,
    config: RegistryConfig,
}

impl QueryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                queries: HashMap::new(),
                sources: HashMap::new(),
            }),
            config,
        }
    }

    /// Register a query, assigning it a qid if the caller didn't attach one
    /// via `ResolverQuery::with_id` beforehand. Fails with `AlreadyExists`
    /// only when an explicit qid collides with a query still live in the
    /// registry.
    pub async fn register(&self, rq: ResolverQuery) -> Result<Arc<ResolverQuery>, ResolverError> {
        let rq = Arc::new(rq);
        let mut inner = self.inner.write().await;
        if inner.queries.contains_key(&rq.qid()) {
            return Err(ResolverError::AlreadyExists(rq.qid().to_string()));
        }
        inner.queries.insert(rq.qid(), rq.clone());
        Ok(rq)
    }

    pub async fn get_query(&self, qid: QueryId) -> Option<Arc<ResolverQuery>> {
        let inner = self.inner.read().await;
        inner.queries.get(&qid).cloned()
    }

    pub async fn get_results(&self, qid: QueryId) -> Result<Vec<ResolvedItem>, ResolverError> {
        let rq = self
            .get_query(qid)
            .await
            .ok_or_else(|| ResolverError::NotFound(qid.to_string()))?;
        Ok(rq.results().await)
    }

    /// Record that `items` were produced by `plugin_name` for `qid`,
    /// indexing each item's sid so a later `/sid/<sid>` lookup can find its
    /// way back to this query and plugin. Returns `false` if the query is
    /// cancelled or absent, matching `ResolverPipeline::report_results` in
    /// spec.md §4.1.
    pub async fn add_results(
        &self,
        qid: QueryId,
        items: Vec<ResolvedItem>,
        plugin_name: &str,
    ) -> Result<bool, ResolverError> {
        let rq = match self.get_query(qid).await {
            Some(rq) => rq,
            None => return Ok(false),
        };
        if rq.cancelled() {
            return Ok(false);
        }

        {
            let mut inner = self.inner.write().await;
            for item in &items {
                inner.sources.insert(
                    item.sid,
                    SourceEntry {
                        qid,
                        plugin_name: plugin_name.into(),
                    },
                );
            }
        }

        Ok(rq.add_results(items).await)
    }

    /// Resolve a sid back to its owning query and producing plugin name.
    /// Fails with `NotFound` if the sid is unknown, or if its parent query
    /// has since been evicted.
    pub async fn get_source(&self, sid: SourceId) -> Result<(QueryId, Arc<str>), ResolverError> {
        let inner = self.inner.read().await;
        let entry = inner
            .sources
            .get(&sid)
            .ok_or_else(|| ResolverError::NotFound(sid.to_string()))?;
        if !inner.queries.contains_key(&entry.qid) {
            return Err(ResolverError::NotFound(sid.to_string()));
        }
        Ok((entry.qid, entry.plugin_name.clone()))
    }

    /// Mark a query cancelled; it is actually dropped from the map at the
    /// next `sweep()`.
    pub async fn cancel(&self, qid: QueryId) -> Result<(), ResolverError> {
        let rq = self
            .get_query(qid)
            .await
            .ok_or_else(|| ResolverError::NotFound(qid.to_string()))?;
        rq.cancel().await;
        Ok(())
    }

    pub async fn subscribe(
        &self,
        qid: QueryId,
        buffer: usize,
    ) -> Result<(SubscriptionHandle, tokio::sync::mpsc::Receiver<ResolvedItem>), ResolverError> {
        let rq = self
            .get_query(qid)
            .await
            .ok_or_else(|| ResolverError::NotFound(qid.to_string()))?;
        Ok(rq.subscribe(buffer).await)
    }

    pub async fn unsubscribe(&self, qid: QueryId, handle: SubscriptionHandle) {
        if let Some(rq) = self.get_query(qid).await {
            rq.unsubscribe(handle).await;
        }
    }

    /// Remove queries that have gone unaccessed for longer than
    /// `retention_window` and have no live subscribers. Sources belonging
    /// to swept queries become unreachable — a later `get_source` for them
    /// returns `NotFound`.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut to_remove = Vec::new();
        {
            let inner = self.inner.read().await;
            for (qid, rq) in inner.queries.iter() {
                let stale = now.saturating_duration_since(rq.atime()) > self.config.retention_window;
                if stale && rq.subscriber_count().await == 0 {
                    to_remove.push(*qid);
                }
            }
        }

        let mut inner = self.inner.write().await;
        for qid in &to_remove {
            inner.queries.remove(qid);
        }
        let Inner { queries, sources } = &mut *inner;
        sources.retain(|_, entry| queries.contains_key(&entry.qid));
        to_remove.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.queries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ResolvedItem;
    use std::collections::HashMap as StdHashMap;

    fn registry(retention: Duration) -> QueryRegistry {
        QueryRegistry::new(RegistryConfig::new(retention))
    }

    #[tokio::test]
    async fn register_then_get_query_succeeds() {
        let reg = registry(Duration::from_secs(3600));
        let rq = ResolverQuery::new("a", "", "b");
        let qid = rq.qid();
        reg.register(rq).await.unwrap();
        assert!(reg.get_query(qid).await.is_some());
    }

    #[tokio::test]
    async fn duplicate_explicit_qid_is_already_exists() {
        let reg = registry(Duration::from_secs(3600));
        let qid = QueryId::new();
        let rq1 = ResolverQuery::new("a", "", "b").with_id(qid);
        let rq2 = ResolverQuery::new("c", "", "d").with_id(qid);
        reg.register(rq1).await.unwrap();
        let err = reg.register(rq2).await.unwrap_err();
        assert!(matches!(err, ResolverError::AlreadyExists(_)));
        // first query remains intact
        assert!(reg.get_query(qid).await.is_some());
        assert_eq!(reg.get_query(qid).await.unwrap().artist(), "a");
    }

    #[tokio::test]
    async fn sid_round_trips_to_its_query() {
        let reg = registry(Duration::from_secs(3600));
        let rq = ResolverQuery::new("a", "", "b");
        let qid = rq.qid();
        reg.register(rq).await.unwrap();

        let sid = SourceId::new();
        let item = ResolvedItem::new(sid, 1.0, StdHashMap::new(), "local", 0);
        reg.add_results(qid, vec![item], "local").await.unwrap();

        let (found_qid, plugin) = reg.get_source(sid).await.unwrap();
        assert_eq!(found_qid, qid);
        assert_eq!(&*plugin, "local");
    }

    #[tokio::test]
    async fn sid_lookup_fails_after_eviction() {
        let reg = registry(Duration::from_millis(1));
        let rq = ResolverQuery::new("a", "", "b");
        let qid = rq.qid();
        reg.register(rq).await.unwrap();
        let sid = SourceId::new();
        let item = ResolvedItem::new(sid, 1.0, StdHashMap::new(), "local", 0);
        reg.add_results(qid, vec![item], "local").await.unwrap();
        reg.cancel(qid).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        reg.sweep().await;

        assert!(reg.get_query(qid).await.is_none());
        assert!(matches!(
            reg.get_source(sid).await,
            Err(ResolverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sweep_respects_live_subscribers() {
        let reg = registry(Duration::from_millis(1));
        let rq = ResolverQuery::new("a", "", "b");
        let qid = rq.qid();
        reg.register(rq).await.unwrap();
        let (_handle, _rx) = reg.subscribe(qid, 4).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        reg.sweep().await;

        assert!(reg.get_query(qid).await.is_some());
    }

    #[tokio::test]
    async fn cancel_then_sweep_evicts_query() {
        let reg = registry(Duration::from_millis(1));
        let rq = ResolverQuery::new("a", "", "b");
        let qid = rq.qid();
        reg.register(rq).await.unwrap();
        reg.cancel(qid).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        reg.sweep().await;
        assert!(reg.get_query(qid).await.is_none());
    }
}
