//! Audio sessions backed by native session handles.
//!
//! A [`CoreAudioSession`] is assembled from four parts:
//!
//! - a property cache that readers use without touching native objects
//! - a notification bridge registered with the native session, which keeps
//!   the cache current and publishes events
//! - one subscriber registry per event kind, delivering on the fan-out pool
//! - the native handles themselves, only ever called on the confinement
//!   thread and released exactly once on disposal

mod audio_session;
mod bridge;
mod cache;
mod registry;

pub use audio_session::{CoreAudioSession, SessionContext};
