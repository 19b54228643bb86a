//! Audio session backed by a native session handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use audio_api::{
    AudioError, AudioSession, AudioSessionDisconnected, AudioSessionState,
    AudioSessionStateChanged, Observer, SessionSnapshot, Subscription,
};
use parking_lot::Mutex;

use crate::config::{Config, DispatchConfig, VolumePolicy};
use crate::confinement::ConfinementThread;
use crate::dispatch::FanoutDispatcher;
use crate::native::{NativeSessionHandle, SessionControl, SessionEventSink, SimpleVolume};
use crate::process::{ProcessResolver, SystemProcessResolver};

use super::bridge::NotificationBridge;
use super::cache::PropertyCache;
use super::registry::{QueuePolicy, Registry};

/// Shared services a session is built with.
///
/// One context normally serves every session of a process: they share the
/// confinement thread and the fan-out pool.
#[derive(Clone)]
pub struct SessionContext {
    /// Thread that owns all native calls.
    pub confinement: Arc<ConfinementThread>,
    /// Pool that delivers notifications.
    pub dispatcher: Arc<FanoutDispatcher>,
    /// Lookup of owning processes.
    pub resolver: Arc<dyn ProcessResolver>,
    /// Pending-event queue settings for each registry.
    pub dispatch: DispatchConfig,
    /// Handling of out-of-range `set_volume` arguments.
    pub volume_policy: VolumePolicy,
}

impl SessionContext {
    /// Creates a context with default queue and volume settings.
    pub fn new(
        confinement: Arc<ConfinementThread>,
        dispatcher: Arc<FanoutDispatcher>,
        resolver: Arc<dyn ProcessResolver>,
    ) -> Self {
        Self {
            confinement,
            dispatcher,
            resolver,
            dispatch: DispatchConfig::default(),
            volume_policy: VolumePolicy::Clamp,
        }
    }

    /// Starts a confinement thread and a dispatcher as configured, using the
    /// operating system's process resolver.
    ///
    /// Fails with a [`ConfigError`](crate::ConfigError) before starting anything if `config` does
    /// not validate.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let confinement = ConfinementThread::spawn(config.confinement.thread_name.clone())
            .context("Failed to start confinement thread")?;
        let dispatcher =
            FanoutDispatcher::new(&config.dispatch).context("Failed to start fan-out pool")?;

        Ok(Self {
            confinement,
            dispatcher,
            resolver: Arc::new(SystemProcessResolver),
            dispatch: config.dispatch.clone(),
            volume_policy: config.volume.policy,
        })
    }
}

/// Native objects owned by a live session. Taken exactly once on disposal.
struct NativeParts {
    control: Arc<dyn SessionControl>,
    volume: Arc<dyn SimpleVolume>,
    sink: Arc<dyn SessionEventSink>,
}

/// State shared between the session and its notification bridge.
pub(crate) struct SessionInner {
    pub(super) confinement: Arc<ConfinementThread>,
    pub(super) dispatcher: Arc<FanoutDispatcher>,
    pub(super) cache: PropertyCache,
    pub(super) state_registry: Registry<AudioSessionStateChanged>,
    pub(super) disconnect_registry: Registry<AudioSessionDisconnected>,
    native: Mutex<Option<NativeParts>>,
    disposed: AtomicBool,
    volume_policy: VolumePolicy,
}

impl SessionInner {
    pub(super) fn id(&self) -> String {
        self.cache.properties().id.clone()
    }

    fn simple_volume(&self) -> Option<Arc<dyn SimpleVolume>> {
        self.native.lock().as_ref().map(|parts| Arc::clone(&parts.volume))
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let session_id = self.id();
        let state_completed = self.state_registry.complete();
        let disconnect_completed = self.disconnect_registry.complete();

        let parts = self.native.lock().take();
        if let Some(NativeParts {
            control,
            volume,
            sink,
        }) = parts
        {
            let release_id = session_id.clone();
            let release = move || {
                if let Err(e) = control.unregister_notification(&sink) {
                    tracing::warn!(session_id = %release_id, error = %e, "Failed to unregister session notifications");
                }
                drop(volume);
                drop(control);
                tracing::debug!(session_id = %release_id, "Native session released");
            };

            if let Err(e) = self.confinement.post(release) {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Confinement thread gone, native session released in place"
                );
            }
        }

        tracing::info!(
            session_id = %session_id,
            state_subscribers = state_completed,
            disconnect_subscribers = disconnect_completed,
            "Audio session disposed"
        );
    }
}

/// An audio session backed by a native session handle.
///
/// Construction registers a [`NotificationBridge`] with the native session
/// and reads every property once. Afterwards the cache follows native
/// notifications. Dropping the session disposes it.
pub struct CoreAudioSession {
    inner: Arc<SessionInner>,
}

impl CoreAudioSession {
    /// Wraps a native session handle.
    ///
    /// Blocks while the confinement thread registers the callback sink and
    /// reads the initial properties, so it must not be called from inside an
    /// async task.
    ///
    /// # Errors
    /// - [`AudioError::InvalidHandle`] if the handle lacks session control or
    ///   simple volume.
    /// - [`AudioError::Native`] if registration or an initial read fails.
    /// - [`AudioError::Shutdown`] if the confinement thread is gone.
    pub fn new(handle: &dyn NativeSessionHandle, context: SessionContext) -> Result<Self, AudioError> {
        let control = handle
            .session_control()
            .ok_or(AudioError::InvalidHandle("session control"))?;
        let volume = handle
            .simple_volume()
            .ok_or(AudioError::InvalidHandle("simple volume"))?;

        let queue = QueuePolicy::from(&context.dispatch);
        let inner = Arc::new(SessionInner {
            confinement: context.confinement,
            dispatcher: context.dispatcher,
            cache: PropertyCache::new(),
            state_registry: Registry::new("state", queue),
            disconnect_registry: Registry::new("disconnect", queue),
            native: Mutex::new(None),
            disposed: AtomicBool::new(false),
            volume_policy: context.volume_policy,
        });

        let sink: Arc<dyn SessionEventSink> =
            Arc::new(NotificationBridge::new(Arc::downgrade(&inner)));
        {
            let control = Arc::clone(&control);
            let sink = Arc::clone(&sink);
            inner
                .confinement
                .invoke(move || control.register_notification(sink))?
                .map_err(|e| AudioError::native("RegisterAudioSessionNotification", e))?;
        }

        *inner.native.lock() = Some(NativeParts {
            control: Arc::clone(&control),
            volume: Arc::clone(&volume),
            sink,
        });

        // From here on a failure drops `session`, which unregisters the sink.
        let session = Self { inner };
        session
            .inner
            .cache
            .refresh_properties(&session.inner.confinement, control, context.resolver.as_ref())?;
        session
            .inner
            .cache
            .refresh_volume(&session.inner.confinement, volume)?;

        let properties = session.inner.cache.properties();
        tracing::info!(
            session_id = %properties.id,
            pid = properties.process_id,
            display_name = %properties.resolved_display_name(),
            state = %properties.state,
            volume = session.inner.cache.volume(),
            "Audio session created"
        );

        Ok(session)
    }

    /// Returns true once [`dispose`](AudioSession::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of live state-change subscriptions.
    pub fn state_subscriber_count(&self) -> usize {
        self.inner.state_registry.len()
    }

    /// Number of live disconnect subscriptions.
    pub fn disconnect_subscriber_count(&self) -> usize {
        self.inner.disconnect_registry.len()
    }

    /// Events discarded by either registry because its queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.inner.state_registry.dropped_events() + self.inner.disconnect_registry.dropped_events()
    }

    fn checked_percent(&self, percent: i32) -> Result<i32, AudioError> {
        match self.inner.volume_policy {
            VolumePolicy::Clamp => Ok(percent.clamp(0, 100)),
            VolumePolicy::Reject if (0..=100).contains(&percent) => Ok(percent),
            VolumePolicy::Reject => Err(AudioError::VolumeOutOfRange(percent)),
        }
    }
}

impl AudioSession for CoreAudioSession {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn process_id(&self) -> u32 {
        self.inner.cache.properties().process_id
    }

    fn display_name(&self) -> String {
        self.inner.cache.properties().resolved_display_name().to_string()
    }

    fn executable_path(&self) -> String {
        self.inner.cache.properties().executable_path.clone()
    }

    fn is_system_session(&self) -> bool {
        self.inner.cache.properties().is_system_session
    }

    fn session_state(&self) -> AudioSessionState {
        self.inner.cache.properties().state
    }

    fn volume(&self) -> u8 {
        self.inner.cache.volume()
    }

    fn is_muted(&self) -> bool {
        self.inner.cache.is_muted()
    }

    /// Posts the new level to the confinement thread and returns without
    /// waiting. If the confinement thread is gone the request is dropped and
    /// `Ok` is returned.
    fn set_volume(&self, percent: i32) -> Result<(), AudioError> {
        let percent = self.checked_percent(percent)?;
        let volume = self.inner.simple_volume().ok_or(AudioError::Disposed)?;
        let level = percent as f32 / 100.0;

        let session_id = self.id();
        let result = self.inner.confinement.post(move || {
            if let Err(e) = volume.set_master_volume(level) {
                tracing::warn!(session_id = %session_id, level = level, error = %e, "Failed to set volume");
            }
        });

        match result {
            Err(AudioError::Shutdown) => {
                tracing::debug!(percent = percent, "Confinement thread gone, volume change dropped");
                Ok(())
            }
            other => other,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.inner.cache.snapshot()
    }

    fn subscribe_state_changes(
        &self,
        observer: Arc<dyn Observer<AudioSessionStateChanged>>,
    ) -> Result<Subscription, AudioError> {
        self.inner.state_registry.subscribe(observer)
    }

    fn subscribe_disconnected(
        &self,
        observer: Arc<dyn Observer<AudioSessionDisconnected>>,
    ) -> Result<Subscription, AudioError> {
        self.inner.disconnect_registry.subscribe(observer)
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for CoreAudioSession {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for CoreAudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let properties = self.inner.cache.properties();
        f.debug_struct("CoreAudioSession")
            .field("id", &properties.id)
            .field("process_id", &properties.process_id)
            .field("state", &properties.state)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
