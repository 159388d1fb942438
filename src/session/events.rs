//! Session lifecycle event records.
//!
//! Delivered as structured records containing at minimum
//! `{session_id, hook_event_name}` at three points: start-of-session,
//! immediately-before-external-operation, end-of-session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three session lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionHookEvent {
    /// Session is starting; resolve and record its environment
    SessionStart,
    /// An external-interpreter operation is about to run
    PreExternalOperation,
    /// Session is ending; remove its record
    SessionEnd,
}

impl SessionHookEvent {
    pub fn all() -> &'static [SessionHookEvent] {
        &[
            SessionHookEvent::SessionStart,
            SessionHookEvent::PreExternalOperation,
            SessionHookEvent::SessionEnd,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionHookEvent::SessionStart => "session_start",
            SessionHookEvent::PreExternalOperation => "pre_external_operation",
            SessionHookEvent::SessionEnd => "session_end",
        }
    }
}

impl std::fmt::Display for SessionHookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionHookEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session_start" | "sessionstart" => Ok(SessionHookEvent::SessionStart),
            "pre_external_operation" | "preexternaloperation" => {
                Ok(SessionHookEvent::PreExternalOperation)
            }
            "session_end" | "sessionend" => Ok(SessionHookEvent::SessionEnd),
            _ => anyhow::bail!(
                "Invalid session hook event '{}'. Valid values: session_start, pre_external_operation, session_end",
                s
            ),
        }
    }
}

/// One delivered lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub hook_event_name: SessionHookEvent,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session_id: &str, hook_event_name: SessionHookEvent) -> Self {
        Self {
            session_id: session_id.to_string(),
            hook_event_name,
            timestamp: Utc::now(),
        }
    }
}
