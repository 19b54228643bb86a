//! Native callback sink.
//!
//! The subsystem calls [`NotificationBridge`] on its own threads. The bridge
//! updates the property cache in place and hands state and disconnect events
//! to the registries, which deliver them on the fan-out dispatcher. It never
//! blocks and never calls back into the confinement thread.

use std::sync::{Arc, Weak};

use audio_api::{AudioSessionDisconnected, AudioSessionState, AudioSessionStateChanged};

use crate::native::{NativeResult, NativeSessionEvent, SessionEventSink};

use super::audio_session::SessionInner;

/// Sink registered with the native session.
///
/// Holds the session weakly: the subsystem keeping the sink alive must not
/// keep a dropped session alive.
pub(crate) struct NotificationBridge {
    session: Weak<SessionInner>,
}

impl NotificationBridge {
    pub fn new(session: Weak<SessionInner>) -> Self {
        Self { session }
    }

    fn handle(&self, session: &SessionInner, event: NativeSessionEvent) {
        match event {
            NativeSessionEvent::DisplayNameChanged(name) => {
                tracing::debug!(session_id = %session.id(), name = %name, "Display name changed");
                session.cache.update(|p| p.display_name = name);
            }
            NativeSessionEvent::SimpleVolumeChanged { volume, muted } => {
                let percent = session.cache.set_volume_state(volume, muted);
                tracing::trace!(
                    session_id = %session.id(),
                    volume = percent,
                    muted = muted,
                    "Volume changed"
                );
            }
            NativeSessionEvent::StateChanged(code) => match AudioSessionState::from_native(code) {
                Some(state) => {
                    session.cache.update(|p| p.state = state);
                    tracing::debug!(session_id = %session.id(), state = %state, "Session state changed");

                    let event =
                        AudioSessionStateChanged::new(Arc::new(session.cache.snapshot()), state);
                    session.state_registry.publish(event, &session.dispatcher);
                }
                None => {
                    tracing::warn!(session_id = %session.id(), code = code, "Ignoring unknown session state");
                }
            },
            NativeSessionEvent::Disconnected(reason) => {
                tracing::info!(session_id = %session.id(), reason = ?reason, "Session disconnected");

                let event = AudioSessionDisconnected::new(Arc::new(session.cache.snapshot()));
                session.disconnect_registry.publish(event, &session.dispatcher);
            }
            ignored @ (NativeSessionEvent::IconPathChanged(_)
            | NativeSessionEvent::ChannelVolumeChanged { .. }
            | NativeSessionEvent::GroupingParamChanged) => {
                tracing::trace!(session_id = %session.id(), event = ?ignored, "Ignoring session event");
            }
        }
    }
}

impl SessionEventSink for NotificationBridge {
    fn on_session_event(&self, event: NativeSessionEvent) -> NativeResult<()> {
        match self.session.upgrade() {
            Some(session) => self.handle(&session, event),
            None => tracing::trace!(event = ?event, "Event for a dropped session"),
        }
        Ok(())
    }
}
