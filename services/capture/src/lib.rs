//! Client core of the keystroke/emotion capture pipeline
//!
//! Keystroke and emotion events flow through [`tracker::KeystrokeTracker`]
//! and the [`emotion`] sources into [`composer::SessionComposer`], and the
//! resulting session is delivered by [`persistence::PersistenceClient`],
//! which parks it in the [`local_store::LocalStore`] whenever the server
//! cannot take it.

pub mod clock;
pub mod composer;
pub mod config;
pub mod controller;
pub mod emotion;
pub mod error;
pub mod identity;
pub mod local_store;
pub mod persistence;
pub mod replay;
pub mod tracker;

pub use controller::CaptureController;
pub use error::{ComposeError, PersistenceError, SaveError};
pub use persistence::{SaveResult, StoredWhere};
