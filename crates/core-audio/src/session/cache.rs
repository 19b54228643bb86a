//! Cached session properties.
//!
//! Identity and state live in a copy-on-write snapshot. Volume and mute are
//! packed into one atomic word so a reader always sees a pair written by the
//! same callback. Readers never wait on the confinement thread.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use audio_api::{AudioError, AudioSessionState, SessionSnapshot};
use parking_lot::RwLock;

use crate::confinement::ConfinementThread;
use crate::native::{SessionControl, SimpleVolume};
use crate::process::ProcessResolver;

/// Identity and state read from the native session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionProperties {
    pub id: String,
    pub process_id: u32,
    /// Name as reported by the subsystem, possibly blank.
    pub display_name: String,
    /// File description of the owning process, empty if unresolved.
    pub file_description: String,
    pub executable_path: String,
    pub is_system_session: bool,
    pub state: AudioSessionState,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self {
            id: String::new(),
            process_id: 0,
            display_name: String::new(),
            file_description: String::new(),
            executable_path: String::new(),
            is_system_session: false,
            state: AudioSessionState::Inactive,
        }
    }
}

impl SessionProperties {
    /// Native display name, or the file description when it is blank.
    pub fn resolved_display_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.file_description
        } else {
            &self.display_name
        }
    }
}

/// Converts a native 0.0..=1.0 level to the cached 0..=100 scale.
///
/// Truncates like the subsystem's own percentage display; out-of-range and
/// non-finite levels are clamped.
pub(crate) fn level_to_percent(level: f32) -> u8 {
    if !level.is_finite() {
        return 0;
    }
    ((level * 100.0) as i32).clamp(0, 100) as u8
}

/// Mute flag inside the packed volume word; the low byte holds the percentage.
const MUTED_BIT: u16 = 1 << 8;

fn pack(percent: u8, muted: bool) -> u16 {
    u16::from(percent) | if muted { MUTED_BIT } else { 0 }
}

fn unpack(word: u16) -> (u8, bool) {
    ((word & 0xFF) as u8, word & MUTED_BIT != 0)
}

/// Last known properties of one session.
pub(crate) struct PropertyCache {
    properties: RwLock<Arc<SessionProperties>>,
    volume: AtomicU16,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self {
            properties: RwLock::new(Arc::new(SessionProperties::default())),
            volume: AtomicU16::new(pack(0, false)),
        }
    }

    /// Current identity/state snapshot.
    pub fn properties(&self) -> Arc<SessionProperties> {
        Arc::clone(&self.properties.read())
    }

    /// Replaces the whole snapshot.
    pub fn replace(&self, properties: SessionProperties) {
        *self.properties.write() = Arc::new(properties);
    }

    /// Applies `f` to a copy of the snapshot and publishes the copy.
    pub fn update(&self, f: impl FnOnce(&mut SessionProperties)) {
        let mut guard = self.properties.write();
        let mut next = SessionProperties::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Cached percentage and mute flag, read together.
    pub fn volume_state(&self) -> (u8, bool) {
        unpack(self.volume.load(Ordering::Acquire))
    }

    pub fn volume(&self) -> u8 {
        self.volume_state().0
    }

    pub fn is_muted(&self) -> bool {
        self.volume_state().1
    }

    /// Stores a native level and mute flag in one write and returns the
    /// cached percentage.
    pub fn set_volume_state(&self, level: f32, muted: bool) -> u8 {
        let percent = level_to_percent(level);
        self.volume.store(pack(percent, muted), Ordering::Release);
        percent
    }

    /// Copies everything into a public snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        let properties = self.properties();
        let (volume, is_muted) = self.volume_state();
        SessionSnapshot {
            id: properties.id.clone(),
            process_id: properties.process_id,
            display_name: properties.resolved_display_name().to_string(),
            executable_path: properties.executable_path.clone(),
            is_system_session: properties.is_system_session,
            state: properties.state,
            volume,
            is_muted,
        }
    }

    /// Reads identity and state from the native session and replaces the
    /// snapshot.
    ///
    /// Native reads happen on the confinement thread. Process lookup happens
    /// on the caller's thread afterwards; its failure only empties the
    /// executable path and file description.
    pub fn refresh_properties(
        &self,
        confinement: &ConfinementThread,
        control: Arc<dyn SessionControl>,
        resolver: &dyn ProcessResolver,
    ) -> Result<(), AudioError> {
        let mut properties = confinement.invoke(move || read_properties(control.as_ref()))??;

        if properties.process_id > 0 {
            match resolver.resolve(properties.process_id) {
                Ok(info) => {
                    properties.executable_path = info.executable_path.to_string_lossy().into_owned();
                    properties.file_description = info.description;
                }
                Err(e) => {
                    tracing::debug!(
                        session_id = %properties.id,
                        pid = properties.process_id,
                        error = %e,
                        "Owning process unavailable, display name falls back to empty"
                    );
                }
            }
        }

        self.replace(properties);
        Ok(())
    }

    /// Reads master volume and mute from the native session.
    pub fn refresh_volume(
        &self,
        confinement: &ConfinementThread,
        volume: Arc<dyn SimpleVolume>,
    ) -> Result<(), AudioError> {
        let (level, muted) = confinement.invoke(move || -> Result<(f32, bool), AudioError> {
            let level = volume
                .master_volume()
                .map_err(|e| AudioError::native("GetMasterVolume", e))?;
            let muted = volume.is_muted().map_err(|e| AudioError::native("GetMute", e))?;
            Ok((level, muted))
        })??;

        self.set_volume_state(level, muted);
        Ok(())
    }
}

fn read_properties(control: &dyn SessionControl) -> Result<SessionProperties, AudioError> {
    let is_system_session = control
        .is_system_sounds_session()
        .map_err(|e| AudioError::native("IsSystemSoundsSession", e))?;
    let display_name = control
        .display_name()
        .map_err(|e| AudioError::native("GetDisplayName", e))?;
    let code = control.state().map_err(|e| AudioError::native("GetState", e))?;
    let process_id = control
        .process_id()
        .map_err(|e| AudioError::native("GetProcessId", e))?;
    let id = control
        .session_identifier()
        .map_err(|e| AudioError::native("GetSessionIdentifier", e))?;

    let state = AudioSessionState::from_native(code).unwrap_or_else(|| {
        tracing::warn!(session_id = %id, code = code, "Unknown native session state, assuming inactive");
        AudioSessionState::Inactive
    });

    Ok(SessionProperties {
        id,
        process_id,
        display_name,
        file_description: String::new(),
        executable_path: String::new(),
        is_system_session,
        state,
    })
}
