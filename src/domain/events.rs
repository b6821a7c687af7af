//! Update Notifications
//!
//! Every map mutation is bracketed by a `PreUpdate` and a `PostUpdate`
//! event. The secondary key index and test cleanup tooling consume them.
//!
//! # Example
//!
//! ```ignore
//! let event = UpdateEvent::post("orders", "a", UpdateAction::Put);
//! bus.publish(&event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When the event fires relative to the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    PreUpdate,
    PostUpdate,
}

/// What the mutation did to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    /// Value written, incremented or had members changed; key is live.
    Put,
    /// Key removed.
    Delete,
}

impl std::fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateAction::Put => write!(f, "put"),
            UpdateAction::Delete => write!(f, "delete"),
        }
    }
}

/// A single update notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub phase: UpdatePhase,
    /// Logical map name (without any test-namespace prefix).
    pub map_name: String,
    /// Canonical key text.
    pub key: String,
    pub action: UpdateAction,
    pub timestamp: DateTime<Utc>,
}

impl UpdateEvent {
    pub fn new(
        phase: UpdatePhase,
        map_name: impl Into<String>,
        key: impl Into<String>,
        action: UpdateAction,
    ) -> Self {
        Self {
            phase,
            map_name: map_name.into(),
            key: key.into(),
            action,
            timestamp: Utc::now(),
        }
    }

    /// Create a pre-update event.
    pub fn pre(map_name: impl Into<String>, key: impl Into<String>, action: UpdateAction) -> Self {
        Self::new(UpdatePhase::PreUpdate, map_name, key, action)
    }

    /// Create a post-update event.
    pub fn post(map_name: impl Into<String>, key: impl Into<String>, action: UpdateAction) -> Self {
        Self::new(UpdatePhase::PostUpdate, map_name, key, action)
    }

    pub fn is_post_update(&self) -> bool {
        self.phase == UpdatePhase::PostUpdate
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self.phase {
            UpdatePhase::PreUpdate => "PreUpdate",
            UpdatePhase::PostUpdate => "PostUpdate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_set_phase() {
        let pre = UpdateEvent::pre("orders", "a", UpdateAction::Put);
        let post = UpdateEvent::post("orders", "a", UpdateAction::Delete);
        assert!(!pre.is_post_update());
        assert!(post.is_post_update());
        assert_eq!(pre.event_type(), "PreUpdate");
        assert_eq!(post.action, UpdateAction::Delete);
    }

    #[test]
    fn test_event_serialization() {
        let event = UpdateEvent::post("orders", "a", UpdateAction::Put);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""phase":"post_update""#));
        assert!(json.contains(r#""action":"put""#));

        let back: UpdateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
