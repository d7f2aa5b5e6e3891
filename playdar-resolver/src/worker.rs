//! # Plugin Worker Module
//!
//! Each plugin gets its own bounded queue and background task, so a plugin
//! that blocks or panics while resolving one query cannot stall dispatch to
//! any other plugin. Grounded in the teacher's per-connection task model
//! (`ultrafast-gateway/src/dashboard/websocket/connection_manager.rs` spawns
//! one task per connection reading off its own channel); here the channel
//! carries queries instead of socket frames.

use crate::plugin::{PluginAdaptor, ResultSink, Scope};
use crate::query::ResolverQuery;
use crate::registry::QueryRegistry;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

enum WorkItem {
    Query(Arc<ResolverQuery>),
    Shutdown,
}

/// Owns one plugin's dispatch queue and background worker task.
pub struct PluginWorker {
    name: String,
    scope: Scope,
    weight: u32,
    tx: mpsc::Sender<WorkItem>,
    handle: JoinHandle<()>,
}

impl PluginWorker {
    pub fn spawn(adaptor: PluginAdaptor, queue_capacity: usize, registry: Arc<QueryRegistry>) -> Self {
        let name = adaptor.name.clone();
        let scope = adaptor.scope;
        let weight = adaptor.weight;
        let (tx, mut rx) = mpsc::channel::<WorkItem>(queue_capacity);
        let plugin = adaptor.plugin;
        let worker_name = name.clone();
        let plugin_name_arc: Arc<str> = Arc::from(worker_name.as_str());

        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let rq = match item {
                    WorkItem::Query(rq) => rq,
                    WorkItem::Shutdown => break,
                };
                let plugin = plugin.clone();
                let plugin_name = worker_name.clone();
                let sink = ResultSink::new(registry.clone(), rq.qid(), plugin_name_arc.clone());
                // Isolate each call: a panicking plugin must not take down
                // its own worker loop, let alone any other plugin's.
                let result = AssertUnwindSafe(plugin.start_resolving(rq.clone(), sink))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(plugin = %plugin_name, qid = %rq.qid(), error = %e, "plugin returned an error");
                    }
                    Err(_) => {
                        error!(plugin = %plugin_name, qid = %rq.qid(), "plugin panicked while resolving");
                    }
                }
            }
        });

        Self { name, scope, weight, tx, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn participates_in_dispatch(&self) -> bool {
        self.weight > 0
    }

    /// Enqueue a query for this plugin. Uses `try_send` rather than a
    /// blocking `send`, so a full queue on one plugin cannot stall the
    /// pipeline's dispatch loop over the others; the caller is expected to
    /// log the failure and move on.
    pub async fn enqueue(&self, rq: Arc<ResolverQuery>) -> Result<(), crate::error::ResolverError> {
        self.tx.try_send(WorkItem::Query(rq)).map_err(|e| {
            crate::error::ResolverError::PluginError {
                plugin: self.name.clone(),
                message: format!("dispatch queue full or closed: {e}"),
            }
        })
    }

    /// Stop accepting new work and drain whatever is already queued before
    /// returning.
    pub async fn shutdown(self) {
        let _ = self.tx.send(WorkItem::Shutdown).await;
        drop(self.tx);
        let _ = self.handle.await;
    }
}
