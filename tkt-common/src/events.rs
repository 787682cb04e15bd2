//! Push event types
//!
//! Messages delivered over the push channel (`/ws` and `/events`). The
//! configuration-changed signal deliberately carries no datafile payload:
//! receivers re-fetch their own decision when they see it.

use serde::{Deserialize, Serialize};

/// Push channel message
///
/// Serialized with an internal `type` tag:
/// - `{"type":"connected"}`
/// - `{"type":"datafile_updated","timestamp":1718000000000}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Handshake sent once to every newly attached session
    ///
    /// Lets a client tell "freshly connected" apart from "missed an update".
    Connected,

    /// A new datafile revision was applied
    DatafileUpdated {
        /// When the swap happened (milliseconds since Unix epoch)
        timestamp: i64,
    },
}

impl PushEvent {
    /// Build a `DatafileUpdated` event stamped with the current time
    pub fn datafile_updated_now() -> Self {
        PushEvent::DatafileUpdated {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Event name used for the SSE `event:` field
    pub fn event_name(&self) -> &'static str {
        match self {
            PushEvent::Connected => "connected",
            PushEvent::DatafileUpdated { .. } => "datafile_updated",
        }
    }

    /// Whether this event should trigger a client re-fetch
    pub fn is_config_change(&self) -> bool {
        matches!(self, PushEvent::DatafileUpdated { .. })
    }

    /// Serialize to the JSON text sent on the wire
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
