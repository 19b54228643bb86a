//! # Core Audio Session Bridge
//!
//! This crate turns native per-application audio sessions into
//! [`audio_api::AudioSession`] objects that any thread may read, adjust and
//! observe.
//!
//! ## Overview
//!
//! The native audio subsystem hands out session objects that may only be
//! called from the thread that created them, and reports changes through
//! callbacks on threads of its own. The bridge provides:
//!
//! - **Confinement**: a dedicated thread that runs every native call
//! - **Property Cache**: identity, state, volume and mute readable without
//!   touching native objects
//! - **Notification Bridge**: the callback sink that keeps the cache current
//!   and publishes state and disconnect events
//! - **Fan-out**: subscriber registries delivering events on a bounded
//!   worker pool, isolating failing subscribers
//! - **Lifecycle**: exactly-once disposal that completes every subscriber and
//!   releases native resources on the confinement thread
//!
//! ## Architecture
//!
//! ```text
//!  consumers ──► CoreAudioSession ──► PropertyCache (read)
//!                     │
//!                     ├── set_volume / refresh ──► ConfinementThread ──► native
//!                     │
//!  native callbacks ──► NotificationBridge ──► Registry ──► FanoutDispatcher ──► observers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audio_api::{AudioSession, FnObserver};
//! use core_audio::{Config, CoreAudioSession, NativeSessionHandle, SessionContext};
//!
//! fn watch(handle: &dyn NativeSessionHandle) -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     core_audio::logging::init(&config.logging);
//!
//!     let context = SessionContext::from_config(&config)?;
//!     let session = CoreAudioSession::new(handle, context)?;
//!
//!     let _subscription = session.subscribe_state_changes(Arc::new(FnObserver::new(
//!         |event: &audio_api::AudioSessionStateChanged| {
//!             println!("{} is now {}", event.session.display_name, event.state);
//!             Ok(())
//!         },
//!     )))?;
//!
//!     session.set_volume(50)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`logging`]: Tracing subscriber setup
//! - [`confinement`]: The thread that owns native calls
//! - [`dispatch`]: The fan-out worker pool
//! - [`native`]: Contracts a platform backend implements
//! - [`process`]: Owning-process lookup
//! - [`session`]: The session implementation

use std::any::Any;

pub mod config;
pub mod confinement;
pub mod dispatch;
pub mod logging;
pub mod native;
pub mod process;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export the API crate for convenience
pub use audio_api;

// Re-export config types for convenience
pub use config::{Config, ConfigError, OverflowPolicy, VolumePolicy};

// Re-export runtime types for convenience
pub use confinement::ConfinementThread;
pub use dispatch::FanoutDispatcher;

// Re-export native contracts for convenience
pub use native::{
    DisconnectReason, NativeResult, NativeSessionEvent, NativeSessionHandle, SessionControl,
    SessionEventSink, SimpleVolume,
};
pub use process::{ProcessInfo, ProcessResolver, SystemProcessResolver};

// Re-export session types for convenience
pub use session::{CoreAudioSession, SessionContext};

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
