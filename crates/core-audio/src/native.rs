//! Contracts for the native audio subsystem.
//!
//! A platform backend supplies a [`NativeSessionHandle`] for every session it
//! enumerates. The bridge only ever calls these traits from the confinement
//! thread; backends may rely on that.

use std::sync::Arc;

use audio_api::NativeError;

/// Result of a native call.
pub type NativeResult<T> = Result<T, NativeError>;

/// An already-resolved native session object.
///
/// A session must expose both capabilities; the bridge refuses a handle that
/// lacks either one.
pub trait NativeSessionHandle: Send + Sync {
    /// Session control capability (identity, state, notifications).
    fn session_control(&self) -> Option<Arc<dyn SessionControl>>;

    /// Simple volume capability.
    fn simple_volume(&self) -> Option<Arc<dyn SimpleVolume>>;
}

/// Identity, state and notification registration of a session.
pub trait SessionControl: Send + Sync {
    /// Display name set by the owning application. May be blank.
    fn display_name(&self) -> NativeResult<String>;

    /// Id of the owning process.
    fn process_id(&self) -> NativeResult<u32>;

    /// Session identifier string.
    fn session_identifier(&self) -> NativeResult<String>;

    /// Raw lifecycle state code.
    fn state(&self) -> NativeResult<u32>;

    /// Whether this is the system sounds session.
    fn is_system_sounds_session(&self) -> NativeResult<bool>;

    /// Registers `sink` to receive session events.
    fn register_notification(&self, sink: Arc<dyn SessionEventSink>) -> NativeResult<()>;

    /// Removes a previously registered sink.
    fn unregister_notification(&self, sink: &Arc<dyn SessionEventSink>) -> NativeResult<()>;
}

/// Master volume and mute of a session.
pub trait SimpleVolume: Send + Sync {
    /// Master volume, 0.0 to 1.0.
    fn master_volume(&self) -> NativeResult<f32>;

    /// Sets the master volume, 0.0 to 1.0.
    fn set_master_volume(&self, level: f32) -> NativeResult<()>;

    /// Mute flag.
    fn is_muted(&self) -> NativeResult<bool>;
}

/// Why the subsystem disconnected a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    DeviceRemoval,
    ServerShutdown,
    FormatChanged,
    SessionLogoff,
    SessionDisconnected,
    ExclusiveModeOverride,
    Other(u32),
}

impl DisconnectReason {
    /// Translates a native reason code.
    pub fn from_native(code: u32) -> Self {
        match code {
            0 => DisconnectReason::DeviceRemoval,
            1 => DisconnectReason::ServerShutdown,
            2 => DisconnectReason::FormatChanged,
            3 => DisconnectReason::SessionLogoff,
            4 => DisconnectReason::SessionDisconnected,
            5 => DisconnectReason::ExclusiveModeOverride,
            other => DisconnectReason::Other(other),
        }
    }
}

/// One native session callback.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSessionEvent {
    /// The application changed its display name.
    DisplayNameChanged(String),
    /// The application changed its icon.
    IconPathChanged(String),
    /// Master volume or mute changed.
    SimpleVolumeChanged { volume: f32, muted: bool },
    /// One channel's volume changed.
    ChannelVolumeChanged { channel_count: u32, channel: u32 },
    /// The session's grouping parameter changed.
    GroupingParamChanged,
    /// The session's lifecycle state changed; carries the raw state code.
    StateChanged(u32),
    /// The session was disconnected.
    Disconnected(DisconnectReason),
}

/// Target of native session callbacks.
///
/// Called on threads owned by the subsystem. Implementations must return
/// promptly and must not call into the confinement thread synchronously.
pub trait SessionEventSink: Send + Sync {
    /// Handles one callback. Returning an error tells the subsystem the sink
    /// is faulty.
    fn on_session_event(&self, event: NativeSessionEvent) -> NativeResult<()>;
}
