//! The audio session contract implemented by backends.

use std::sync::Arc;

use crate::error::Result;
use crate::events::{AudioSessionDisconnected, AudioSessionStateChanged, SessionSnapshot};
use crate::observer::{Observer, Subscription};
use crate::state::AudioSessionState;

/// One audio stream owned by a single process.
///
/// Property reads return the cached snapshot and never touch the native
/// subsystem. Implementations must be usable from any thread.
pub trait AudioSession: Send + Sync {
    /// Native session identifier, stable for the life of the session.
    fn id(&self) -> String;

    /// Id of the owning process. May be stale if the process has exited.
    fn process_id(&self) -> u32;

    /// Display name, falling back to the owning process' file description
    /// when the native name is blank.
    fn display_name(&self) -> String;

    /// Executable path of the owning process, empty if it could not be resolved.
    fn executable_path(&self) -> String;

    /// Whether this is the system sounds session.
    fn is_system_session(&self) -> bool;

    /// Last known lifecycle state.
    fn session_state(&self) -> AudioSessionState;

    /// Last known volume on a linear 0 to 100 scale.
    fn volume(&self) -> u8;

    /// Last known mute flag.
    fn is_muted(&self) -> bool;

    /// Requests a new volume. The change is applied asynchronously and shows
    /// up in [`volume`](Self::volume) once the subsystem reports it back.
    fn set_volume(&self, percent: i32) -> Result<()>;

    /// Copies every cached property in one consistent read.
    fn snapshot(&self) -> SessionSnapshot;

    /// Registers an observer for lifecycle state changes.
    fn subscribe_state_changes(
        &self,
        observer: Arc<dyn Observer<AudioSessionStateChanged>>,
    ) -> Result<Subscription>;

    /// Registers an observer for disconnection.
    fn subscribe_disconnected(
        &self,
        observer: Arc<dyn Observer<AudioSessionDisconnected>>,
    ) -> Result<Subscription>;

    /// Completes all observers and releases the native session. Calling it
    /// again does nothing.
    fn dispose(&self);
}
