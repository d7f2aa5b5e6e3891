//! # Resolver Query Module
//!
//! `ResolverQuery` is the unit of work the pipeline dispatches and the
//! registry indexes: a typed (artist, album, track) search plus the
//! append-only list of results it accumulates as plugins report back.
//!
//! Grounded in `original_source/includes/playdar/resolver_query.hpp`: the
//! `valid()` trim-then-check rule, the `get_json`/`from_json` round-trip
//! shape, and the "score == 1.0 means solved, forever" rule are all carried
//! over unchanged; the mutex-per-query discipline (`m_mut` guarding only
//! `m_results`) is preserved as a `tokio::sync::RwLock` around this query's
//! own mutable state, per spec.md §5's "per-Query item list, own lock" rule.

use crate::id::QueryId;
use crate::item::ResolvedItem;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

/// Where a query originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// Resolution mode. `Normal` is the default; `Spamme` mirrors the original
/// daemon's `"spamme"` mode, used by plugins that want to be told to return
/// every match they have rather than stopping once solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Spamme,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

/// A single pending or in-flight subscriber: an owned sender half of a
/// channel, so cancellation just drops the handle rather than needing a
/// back-reference into whoever is listening (spec.md §9 REDESIGN note).
pub type SubscriberTx = mpsc::Sender<ResolvedItem>;

/// Opaque handle returned from [`ResolverQuery::subscribe`], used to remove
/// a subscriber with [`ResolverQuery::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

#[derive(Default)]
struct MutableState {
    items: Vec<ResolvedItem>,
    solved: bool,
    subscribers: Vec<(u64, SubscriberTx)>,
    next_sub_id: u64,
}

/// A search for a specific (artist, album, track), together with the
/// results plugins have reported for it so far.
pub struct ResolverQuery {
    qid: QueryId,
    origin: Origin,
    from_name: String,
    mode: Mode,
    artist: String,
    album: String,
    track: String,
    created_at: Instant,
    atime: std::sync::Mutex<Instant>,
    cancelled: AtomicBool,
    state: RwLock<MutableState>,
}

impl ResolverQuery {
    pub fn new(artist: impl Into<String>, album: impl Into<String>, track: impl Into<String>) -> Self {
        Self::with_origin(artist, album, track, Origin::Local, String::new())
    }

    pub fn with_origin(
        artist: impl Into<String>,
        album: impl Into<String>,
        track: impl Into<String>,
        origin: Origin,
        from_name: impl Into<String>,
    ) -> Self {
        let now = Instant::now();
        Self {
            qid: QueryId::new(),
            origin,
            from_name: from_name.into(),
            mode: Mode::Normal,
            artist: artist.into().trim().to_string(),
            album: album.into().trim().to_string(),
            track: track.into().trim().to_string(),
            created_at: now,
            atime: std::sync::Mutex::new(now),
            cancelled: AtomicBool::new(false),
            state: RwLock::new(MutableState::default()),
        }
    }

    /// Use an explicit qid rather than a freshly generated one. Used by
    /// `dispatch_with_id` / `from_json` when the caller supplies one.
    pub fn with_id(mut self, qid: QueryId) -> Self {
        self.qid = qid;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// A query is well-formed only if artist and track are non-empty after
    /// trimming — album may be empty. Mirrors `ResolverQuery::valid()`.
    pub fn is_valid(&self) -> bool {
        self.touch();
        !self.artist.is_empty() && !self.track.is_empty()
    }

    pub fn qid(&self) -> QueryId {
        self.qid
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn track(&self) -> &str {
        &self.track
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last-access time, touched on every externally-visible read. Used by
    /// the registry's atime sweep.
    pub fn atime(&self) -> Instant {
        *self.atime.lock().unwrap()
    }

    fn touch(&self) {
        *self.atime.lock().unwrap() = Instant::now();
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Idempotent, immediate: marks the query cancelled, drops all
    /// subscribers so no further callback can fire. Does not touch the
    /// accumulated item list — callers may still read whatever was
    /// collected (spec.md §7: "a cancelled query is not an error").
    pub async fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.subscribers.clear();
    }

    pub async fn solved(&self) -> bool {
        self.state.read().await.solved
    }

    /// Append new results, ranked by `(score desc, preference desc,
    /// insertion order)`. Returns `false` without mutating state if the
    /// query was already cancelled.
    pub async fn add_results(&self, items: Vec<ResolvedItem>) -> bool {
        if self.cancelled() {
            return false;
        }
        self.touch();
        let mut state = self.state.write().await;
        if self.cancelled() {
            // re-check: cancel() may have raced us between the first check
            // and taking the write lock.
            return false;
        }
        for item in items {
            if item.is_solving() {
                state.solved = true;
            }
            state.items.push(item.clone());
            // A full queue just drops this item for that subscriber (it's
            // still in `results()`); a closed one means the subscriber
            // disconnected, so we prune it here rather than waiting for a
            // sweep to notice a stale entry.
            state.subscribers.retain(|(_, tx)| {
                !matches!(tx.try_send(item.clone()), Err(mpsc::error::TrySendError::Closed(_)))
            });
        }
        state.items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.plugin_preference.cmp(&a.plugin_preference))
        });
        true
    }

    /// Current results, sorted `(score desc, preference desc, insertion
    /// order)`. The stable sort in `add_results` already maintains this
    /// order, so reads here are just a touch + clone.
    pub async fn results(&self) -> Vec<ResolvedItem> {
        self.touch();
        self.state.read().await.items.clone()
    }

    pub async fn num_results(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// Register a subscriber; it receives every result appended after this
    /// call until it is unsubscribed or the query is cancelled.
    pub async fn subscribe(&self, buffer: usize) -> (SubscriptionHandle, mpsc::Receiver<ResolvedItem>) {
        let (tx, rx) = mpsc::channel(buffer);
        let mut state = self.state.write().await;
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.subscribers.push((id, tx));
        (SubscriptionHandle(id), rx)
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state.write().await;
        state.subscribers.retain(|(id, _)| *id != handle.0);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Serialize the query's identity fields to JSON. Mirrors
    /// `ResolverQuery::get_json()`: `_msgtype`, qid, artist, album, track,
    /// mode, solved, from_name.
    pub async fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "_msgtype": "rq",
            "qid": self.qid.to_string(),
            "artist": self.artist,
            "album": self.album,
            "track": self.track,
            "mode": match self.mode { Mode::Normal => "normal", Mode::Spamme => "spamme" },
            "solved": self.solved().await,
            "from_name": self.from_name,
        })
    }

    /// Reconstruct a query from JSON. Mirrors `ResolverQuery::from_json`:
    /// artist and track are required, album/qid/mode/from_name are
    /// optional.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, crate::error::ResolverError> {
        let artist = value
            .get("artist")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let track = value
            .get("track")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let album = value
            .get("album")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if artist.trim().is_empty() || track.trim().is_empty() {
            return Err(crate::error::ResolverError::BadRequest(
                "artist and track are required".to_string(),
            ));
        }

        let from_name = value
            .get("from_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mode = match value.get("mode").and_then(|v| v.as_str()) {
            Some("spamme") => Mode::Spamme,
            _ => Mode::Normal,
        };

        let mut rq = Self::with_origin(artist, album, track, Origin::Local, from_name).with_mode(mode);
        if let Some(qid_str) = value.get("qid").and_then(|v| v.as_str()) {
            if let Ok(qid) = QueryId::parse(qid_str) {
                rq = rq.with_id(qid);
            }
        }
        Ok(rq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ResolvedItem;
    use std::collections::HashMap;

    #[test]
    fn validity_requires_artist_and_track() {
        let rq = ResolverQuery::new("The Beatles", "", "Yellow Submarine");
        assert!(rq.is_valid());
        let rq = ResolverQuery::new("", "", "Yellow Submarine");
        assert!(!rq.is_valid());
        let rq = ResolverQuery::new("The Beatles", "", "");
        assert!(!rq.is_valid());
    }

    #[test]
    fn trims_whitespace_from_fields() {
        let rq = ResolverQuery::new("  The Beatles  ", " ", " Yellow Submarine ");
        assert_eq!(rq.artist(), "The Beatles");
        assert_eq!(rq.album(), "");
        assert_eq!(rq.track(), "Yellow Submarine");
    }

    #[tokio::test]
    async fn add_results_sorts_by_score_then_preference() {
        let rq = ResolverQuery::new("a", "", "b");
        let low = ResolvedItem::new(crate::id::SourceId::new(), 0.5, HashMap::new(), "p1", 0);
        let high_low_pref = ResolvedItem::new(crate::id::SourceId::new(), 0.8, HashMap::new(), "p2", 50);
        let high_high_pref = ResolvedItem::new(crate::id::SourceId::new(), 0.8, HashMap::new(), "p1", 100);
        rq.add_results(vec![low.clone(), high_low_pref.clone(), high_high_pref.clone()])
            .await;
        let results = rq.results().await;
        assert_eq!(results[0].plugin_preference, 100);
        assert_eq!(results[1].plugin_preference, 50);
        assert_eq!(results[2].plugin_preference, 0);
    }

    #[tokio::test]
    async fn solved_is_sticky() {
        let rq = ResolverQuery::new("a", "", "b");
        let item = ResolvedItem::new(crate::id::SourceId::new(), 1.0, HashMap::new(), "p1", 0);
        rq.add_results(vec![item]).await;
        assert!(rq.solved().await);
        let partial = ResolvedItem::new(crate::id::SourceId::new(), 0.1, HashMap::new(), "p1", 0);
        rq.add_results(vec![partial]).await;
        assert!(rq.solved().await);
    }

    #[tokio::test]
    async fn cancel_drops_subscribers_and_blocks_future_appends() {
        let rq = ResolverQuery::new("a", "", "b");
        let (_handle, mut rx) = rq.subscribe(8).await;
        let item = ResolvedItem::new(crate::id::SourceId::new(), 0.5, HashMap::new(), "p1", 0);
        rq.add_results(vec![item.clone()]).await;
        assert!(rx.try_recv().is_ok());

        rq.cancel().await;
        assert_eq!(rq.subscriber_count().await, 0);
        let accepted = rq.add_results(vec![item]).await;
        assert!(!accepted);
        assert_eq!(rq.num_results().await, 1);
    }

    #[tokio::test]
    async fn json_round_trip_preserves_identity_fields() {
        let rq = ResolverQuery::new("The Beatles", "", "Yellow Submarine").with_mode(Mode::Normal);
        let json = rq.to_json().await;
        let restored = ResolverQuery::from_json(&json).unwrap();
        assert_eq!(restored.artist(), rq.artist());
        assert_eq!(restored.album(), rq.album());
        assert_eq!(restored.track(), rq.track());
        assert_eq!(restored.qid(), rq.qid());
        assert_eq!(restored.from_name(), rq.from_name());
    }

    #[test]
    fn from_json_requires_artist_and_track() {
        let value = serde_json::json!({"artist": "", "track": "x"});
        assert!(ResolverQuery::from_json(&value).is_err());
    }
}
