//! # Playdar Resolver
//!
//! In-memory query resolution engine: the pipeline that fans a query out to
//! resolver plugins, the registry that tracks every live query and the
//! sources it has produced, and the streaming strategies used to pull bytes
//! out of a resolved source once a client wants to play it.
//!
//! ## Overview
//!
//! - [`query::ResolverQuery`] — an (artist, album, track) search plus its
//!   accumulated, ranked results.
//! - [`item::ResolvedItem`] — a single candidate match reported by a plugin.
//! - [`plugin::ResolverPlugin`] — the trait a resolver implementation
//!   satisfies; [`plugin::PluginAdaptor`] wraps one with its dispatch
//!   metadata (weight, preference, scope).
//! - [`pipeline::ResolverPipeline`] — dispatches queries to plugins in
//!   weight/preference order and receives their results back.
//! - [`registry::QueryRegistry`] — the addressable qid/sid index, with
//!   atime-driven eviction.
//! - [`streaming::StreamingStrategy`] — pulls bytes for a resolved source,
//!   from either the local filesystem or a remote HTTP URL.
//!
//! ```rust
//! use playdar_resolver::{
//!     pipeline::ResolverPipeline,
//!     query::Mode,
//!     registry::{QueryRegistry, RegistryConfig},
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), playdar_resolver::error::ResolverError> {
//! let registry = Arc::new(QueryRegistry::new(RegistryConfig::new(Duration::from_secs(3600))));
//! let pipeline = ResolverPipeline::new(registry, vec![], 64);
//! let rq = pipeline.dispatch("Radiohead", "", "Karma Police", Mode::Normal).await?;
//! println!("qid: {}", rq.qid());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod id;
pub mod item;
pub mod pipeline;
pub mod plugin;
pub mod query;
pub mod registry;
pub mod streaming;
pub mod worker;

pub use error::{ResolverError, StreamError, StreamErrorKind};
pub use id::{QueryId, SourceId};
pub use item::{FieldValue, ResolvedItem};
pub use pipeline::ResolverPipeline;
pub use plugin::{PluginAdaptor, ResolverPlugin, ResultSink, Scope};
pub use query::{Mode, Origin, ResolverQuery, SubscriptionHandle};
pub use registry::{QueryRegistry, RegistryConfig};
pub use streaming::{LocalFileStrategy, RemoteFetchStrategy, StreamingStrategy};

/// Result type for resolver engine operations.
pub type Result<T> = std::result::Result<T, ResolverError>;
