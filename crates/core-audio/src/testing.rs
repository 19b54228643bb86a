//! In-memory doubles for the native subsystem.
//!
//! [`FakeSession`] implements every native contract, records how it was
//! called and lets a test fire callbacks the way the subsystem would.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use audio_api::{AudioError, AudioSessionState, NativeError, Notification};
use parking_lot::Mutex;
use tokio::runtime;
use tokio::sync::mpsc;
use tokio::time;

use crate::confinement::ConfinementThread;
use crate::native::{
    NativeResult, NativeSessionEvent, NativeSessionHandle, SessionControl, SessionEventSink,
    SimpleVolume,
};
use crate::process::{ProcessInfo, ProcessResolver};

/// Generic failure code returned by injected native errors.
pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;

/// Builder for [`FakeSession`].
pub struct FakeSessionBuilder {
    id: String,
    process_id: u32,
    display_name: String,
    state: u32,
    level: f32,
    muted: bool,
    system: bool,
    has_control: bool,
    has_volume: bool,
    failing: HashSet<&'static str>,
    echo_volume: bool,
}

impl FakeSessionBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn process_id(mut self, pid: u32) -> Self {
        self.process_id = pid;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn state(mut self, state: AudioSessionState) -> Self {
        self.state = state.as_native();
        self
    }

    /// Reports a raw state code, including ones outside the known range.
    pub fn raw_state(mut self, code: u32) -> Self {
        self.state = code;
        self
    }

    pub fn level(mut self, level: f32) -> Self {
        self.level = level;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn system_session(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    pub fn without_session_control(mut self) -> Self {
        self.has_control = false;
        self
    }

    pub fn without_simple_volume(mut self) -> Self {
        self.has_volume = false;
        self
    }

    /// Makes the named native call fail with [`E_FAIL`]. Names match the
    /// trait methods, e.g. `"display_name"` or `"register_notification"`.
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing.insert(call);
        self
    }

    /// Fires a volume callback after every successful `set_master_volume`,
    /// like the real subsystem does.
    pub fn echo_volume_changes(mut self) -> Self {
        self.echo_volume = true;
        self
    }

    /// Builds a session whose native calls are expected on `confinement`.
    pub fn build(self, confinement: &Arc<ConfinementThread>) -> Arc<FakeSession> {
        let confinement = Arc::clone(confinement);
        Arc::new_cyclic(|this| FakeSession {
            this: this.clone(),
            id: self.id,
            process_id: self.process_id,
            display_name: self.display_name,
            state: AtomicU32::new(self.state),
            level: Mutex::new(self.level),
            muted: self.muted,
            system: self.system,
            has_control: self.has_control,
            has_volume: self.has_volume,
            failing: self.failing,
            echo_volume: self.echo_volume,
            confinement,
            native_calls: AtomicUsize::new(0),
            off_thread_calls: AtomicUsize::new(0),
            register_count: AtomicUsize::new(0),
            unregister_count: AtomicUsize::new(0),
            set_volume_calls: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        })
    }
}

/// A native session living in memory.
pub struct FakeSession {
    this: Weak<FakeSession>,
    id: String,
    process_id: u32,
    display_name: String,
    state: AtomicU32,
    level: Mutex<f32>,
    muted: bool,
    system: bool,
    has_control: bool,
    has_volume: bool,
    failing: HashSet<&'static str>,
    echo_volume: bool,
    confinement: Arc<ConfinementThread>,
    native_calls: AtomicUsize,
    off_thread_calls: AtomicUsize,
    register_count: AtomicUsize,
    unregister_count: AtomicUsize,
    set_volume_calls: Mutex<Vec<f32>>,
    sink: Mutex<Option<Arc<dyn SessionEventSink>>>,
}

impl FakeSession {
    pub fn builder() -> FakeSessionBuilder {
        FakeSessionBuilder {
            id: "{0.0.0.00000000}.{fake-session}".to_string(),
            process_id: 1234,
            display_name: String::new(),
            state: AudioSessionState::Inactive.as_native(),
            level: 1.0,
            muted: false,
            system: false,
            has_control: true,
            has_volume: true,
            failing: HashSet::new(),
            echo_volume: false,
        }
    }

    /// Delivers `event` to the registered sink on the calling thread.
    /// Returns false if no sink is registered.
    pub fn fire(&self, event: NativeSessionEvent) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                if let Err(e) = sink.on_session_event(event) {
                    tracing::debug!(error = %e, "Sink rejected event");
                }
                true
            }
            None => false,
        }
    }

    /// Delivers `event` from a freshly spawned callback thread and waits for
    /// the sink to return.
    pub fn fire_from_thread(self: &Arc<Self>, event: NativeSessionEvent) -> bool {
        let this = Arc::clone(self);
        std::thread::Builder::new()
            .name("native-callback".to_string())
            .spawn(move || this.fire(event))
            .map(|handle| handle.join().unwrap_or(false))
            .unwrap_or(false)
    }

    /// Master volume currently stored in the fake.
    pub fn level(&self) -> f32 {
        *self.level.lock()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Native calls made so far.
    pub fn native_calls(&self) -> usize {
        self.native_calls.load(Ordering::SeqCst)
    }

    /// Native calls made from any thread other than the confinement thread.
    pub fn off_thread_calls(&self) -> usize {
        self.off_thread_calls.load(Ordering::SeqCst)
    }

    pub fn register_count(&self) -> usize {
        self.register_count.load(Ordering::SeqCst)
    }

    pub fn unregister_count(&self) -> usize {
        self.unregister_count.load(Ordering::SeqCst)
    }

    /// Levels passed to `set_master_volume`, in call order.
    pub fn set_volume_calls(&self) -> Vec<f32> {
        self.set_volume_calls.lock().clone()
    }

    fn enter(&self, call: &'static str) -> NativeResult<()> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        if !self.confinement.is_current() {
            self.off_thread_calls.fetch_add(1, Ordering::SeqCst);
            let current = std::thread::current();
            tracing::error!(call = call, thread = ?current.name(), "Native call off the confinement thread");
        }
        if self.failing.contains(call) {
            return Err(NativeError::new(E_FAIL, format!("{} failed", call)));
        }
        Ok(())
    }
}

impl NativeSessionHandle for FakeSession {
    fn session_control(&self) -> Option<Arc<dyn SessionControl>> {
        if !self.has_control {
            return None;
        }
        self.this
            .upgrade()
            .map(|this| this as Arc<dyn SessionControl>)
    }

    fn simple_volume(&self) -> Option<Arc<dyn SimpleVolume>> {
        if !self.has_volume {
            return None;
        }
        self.this.upgrade().map(|this| this as Arc<dyn SimpleVolume>)
    }
}

impl SessionControl for FakeSession {
    fn display_name(&self) -> NativeResult<String> {
        self.enter("display_name")?;
        Ok(self.display_name.clone())
    }

    fn process_id(&self) -> NativeResult<u32> {
        self.enter("process_id")?;
        Ok(self.process_id)
    }

    fn session_identifier(&self) -> NativeResult<String> {
        self.enter("session_identifier")?;
        Ok(self.id.clone())
    }

    fn state(&self) -> NativeResult<u32> {
        self.enter("state")?;
        Ok(self.state.load(Ordering::SeqCst))
    }

    fn is_system_sounds_session(&self) -> NativeResult<bool> {
        self.enter("is_system_sounds_session")?;
        Ok(self.system)
    }

    fn register_notification(&self, sink: Arc<dyn SessionEventSink>) -> NativeResult<()> {
        self.enter("register_notification")?;
        self.register_count.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn unregister_notification(&self, sink: &Arc<dyn SessionEventSink>) -> NativeResult<()> {
        self.enter("unregister_notification")?;
        let mut current = self.sink.lock();
        match current.as_ref() {
            Some(registered) if Arc::ptr_eq(registered, sink) => {
                self.unregister_count.fetch_add(1, Ordering::SeqCst);
                *current = None;
                Ok(())
            }
            _ => Err(NativeError::new(E_FAIL, "sink not registered")),
        }
    }
}

impl SimpleVolume for FakeSession {
    fn master_volume(&self) -> NativeResult<f32> {
        self.enter("master_volume")?;
        Ok(*self.level.lock())
    }

    fn set_master_volume(&self, level: f32) -> NativeResult<()> {
        self.enter("set_master_volume")?;
        self.set_volume_calls.lock().push(level);
        *self.level.lock() = level;

        if self.echo_volume {
            let muted = self.muted;
            self.fire(NativeSessionEvent::SimpleVolumeChanged {
                volume: level,
                muted,
            });
        }
        Ok(())
    }

    fn is_muted(&self) -> NativeResult<bool> {
        self.enter("is_muted")?;
        Ok(self.muted)
    }
}

/// Resolver answering from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessResolver {
    processes: HashMap<u32, ProcessInfo>,
}

impl FakeProcessResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(
        mut self,
        pid: u32,
        executable_path: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        self.processes.insert(
            pid,
            ProcessInfo {
                executable_path: executable_path.into(),
                description: description.into(),
            },
        );
        self
    }
}

impl ProcessResolver for FakeProcessResolver {
    fn resolve(&self, pid: u32) -> Result<ProcessInfo, AudioError> {
        self.processes
            .get(&pid)
            .cloned()
            .ok_or_else(|| AudioError::ProcessUnavailable {
                pid,
                reason: "no such process".to_string(),
            })
    }
}

/// Runs `future` to completion on a private current-thread runtime with
/// timers enabled. Must not be called from inside an async task.
fn block_on_timed<F: std::future::Future>(future: F) -> Option<F::Output> {
    match runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => Some(rt.block_on(future)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build test runtime");
            None
        }
    }
}

/// Waits up to `timeout` for the next notification from synchronous code.
///
/// Returns `None` on timeout or when every sender is gone.
pub fn recv_timeout<T>(
    rx: &mut mpsc::UnboundedReceiver<Notification<T>>,
    timeout: Duration,
) -> Option<Notification<T>> {
    block_on_timed(time::timeout(timeout, rx.recv()))?
        .ok()
        .flatten()
}

/// Re-checks `condition` every millisecond until it holds or `timeout`
/// passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let wait = time::timeout(timeout, async {
        let mut ticks = time::interval(Duration::from_millis(1));
        while !condition() {
            ticks.tick().await;
        }
    });
    matches!(block_on_timed(wait), Some(Ok(())))
}
