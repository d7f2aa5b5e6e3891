//! # Resolved Item Module
//!
//! A single candidate result a plugin reports back for a query: a score,
//! a field bag (artist/album/track/bitrate/...), and a reference back to
//! the plugin that can produce a byte stream for it on demand.

use crate::id::SourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Scalar value held in a [`ResolvedItem`]'s field bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// A single candidate match for a query, as reported by a resolver plugin.
///
/// Immutable after construction. `score` must lie in `[0.0, 1.0]`; a score
/// of exactly `1.0` marks the owning query as solved (spec invariant: solved
/// becomes and remains true the first time such an item is appended).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedItem {
    pub sid: SourceId,
    pub score: f32,
    pub fields: HashMap<String, FieldValue>,
    /// Name of the plugin that produced this item, used to route `/sid/<sid>`
    /// lookups back to the right plugin for streaming.
    pub plugin_name: Arc<str>,
    /// Preference of the producing plugin at the time this item was
    /// reported, used as the secondary ranking key.
    pub plugin_preference: i32,
}

impl ResolvedItem {
    pub fn new(
        sid: SourceId,
        score: f32,
        fields: HashMap<String, FieldValue>,
        plugin_name: impl Into<Arc<str>>,
        plugin_preference: i32,
    ) -> Self {
        Self {
            sid,
            score: score.clamp(0.0, 1.0),
            fields,
            plugin_name: plugin_name.into(),
            plugin_preference,
        }
    }

    pub fn is_solving(&self) -> bool {
        self.score >= 1.0
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect();
        fields.insert("sid".to_string(), serde_json::Value::String(self.sid.to_string()));
        fields.insert(
            "score".to_string(),
            serde_json::json!(self.score),
        );
        fields.insert(
            "source".to_string(),
            serde_json::Value::String(self.plugin_name.to_string()),
        );
        serde_json::Value::Object(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_clamped() {
        let item = ResolvedItem::new(SourceId::new(), 1.5, HashMap::new(), "local", 0);
        assert_eq!(item.score, 1.0);
        let item = ResolvedItem::new(SourceId::new(), -1.0, HashMap::new(), "local", 0);
        assert_eq!(item.score, 0.0);
    }

    #[test]
    fn is_solving_only_at_full_score() {
        let item = ResolvedItem::new(SourceId::new(), 0.99, HashMap::new(), "local", 0);
        assert!(!item.is_solving());
        let item = ResolvedItem::new(SourceId::new(), 1.0, HashMap::new(), "local", 0);
        assert!(item.is_solving());
    }
}
