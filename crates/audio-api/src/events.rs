//! Notification events published by audio sessions.

use std::sync::Arc;

use serde::Serialize;

use crate::state::AudioSessionState;

/// Point-in-time copy of a session's cached properties.
///
/// Events carry a snapshot rather than a reference to the session so that a
/// subscriber can never extend the session's lifetime or touch its native
/// handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Native session identifier.
    pub id: String,
    /// Id of the owning process.
    pub process_id: u32,
    /// Display name after the file-description fallback.
    pub display_name: String,
    /// Executable path of the owning process, empty if unknown.
    pub executable_path: String,
    /// Whether this is the system sounds session.
    pub is_system_session: bool,
    /// Lifecycle state at the time of the snapshot.
    pub state: AudioSessionState,
    /// Cached volume, 0 to 100.
    pub volume: u8,
    /// Cached mute flag.
    pub is_muted: bool,
}

/// A session moved to a new lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSessionStateChanged {
    /// The session that changed.
    pub session: Arc<SessionSnapshot>,
    /// The state reported by the native callback.
    pub state: AudioSessionState,
}

impl AudioSessionStateChanged {
    pub fn new(session: Arc<SessionSnapshot>, state: AudioSessionState) -> Self {
        Self { session, state }
    }
}

/// A session was disconnected by the audio subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSessionDisconnected {
    /// The session that was disconnected.
    pub session: Arc<SessionSnapshot>,
}

impl AudioSessionDisconnected {
    pub fn new(session: Arc<SessionSnapshot>) -> Self {
        Self { session }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_serialize<T: Serialize>() {}

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            id: "session-1".to_string(),
            process_id: 42,
            display_name: "Player".to_string(),
            executable_path: "/usr/bin/player".to_string(),
            is_system_session: false,
            state: AudioSessionState::Active,
            volume: 70,
            is_muted: false,
        }
    }

    #[test]
    fn test_events_are_serializable() {
        assert_serialize::<SessionSnapshot>();
        assert_serialize::<AudioSessionStateChanged>();
        assert_serialize::<AudioSessionDisconnected>();
    }

    #[test]
    fn test_events_share_one_snapshot() {
        let session = Arc::new(snapshot());
        let changed = AudioSessionStateChanged::new(Arc::clone(&session), AudioSessionState::Active);
        let disconnected = AudioSessionDisconnected::new(Arc::clone(&session));

        assert!(Arc::ptr_eq(&changed.session, &disconnected.session));
        assert_eq!(changed.clone(), changed);
        assert_eq!(Arc::strong_count(&session), 3);
    }
}
