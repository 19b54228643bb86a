//! # Audio API
//!
//! Backend-neutral vocabulary for per-application audio sessions.
//!
//! ## Overview
//!
//! This crate defines what a consumer sees of an audio session, independent
//! of the platform backend that drives it:
//!
//! - **Session Contract**: the [`AudioSession`] trait with cached properties,
//!   volume control and subscriptions
//! - **Lifecycle State**: [`AudioSessionState`] and its native code mapping
//! - **Events**: [`AudioSessionStateChanged`] and [`AudioSessionDisconnected`]
//! - **Observers**: the [`Observer`] contract, [`Subscription`] handles and a
//!   channel-backed adapter
//! - **Errors**: [`AudioError`], [`NativeError`] and [`DeliveryError`]
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use audio_api::{AudioSessionStateChanged, ChannelObserver, Observer};
//!
//! let (observer, mut rx) = ChannelObserver::<AudioSessionStateChanged>::new();
//! let observer: Arc<dyn Observer<AudioSessionStateChanged>> = Arc::new(observer);
//!
//! // Pass `observer` to `AudioSession::subscribe_state_changes` and keep the
//! // returned `Subscription` alive for as long as notifications are wanted.
//! observer.on_completed();
//! assert!(rx.try_recv().unwrap().is_completed());
//! ```
//!
//! ## Modules
//!
//! - [`session`]: The audio session trait
//! - [`state`]: Lifecycle state
//! - [`events`]: Notification events and session snapshots
//! - [`observer`]: Observer contract and subscription handles
//! - [`error`]: Error types

pub mod error;
pub mod events;
pub mod observer;
pub mod session;
pub mod state;

pub use error::{AudioError, DeliveryError, NativeError, Result};
pub use events::{AudioSessionDisconnected, AudioSessionStateChanged, SessionSnapshot};
pub use observer::{ChannelObserver, FnObserver, Notification, Observer, Subscription};
pub use session::AudioSession;
pub use state::AudioSessionState;
