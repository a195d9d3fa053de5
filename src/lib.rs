//! speech-relay - continuous speech recognition adapter
//!
//! Wraps a platform recognition engine, relays its events to a listener
//! and optionally restarts it after errors or final results.

pub mod config;
pub mod display;
pub mod error;
pub mod speech;

pub use config::{RecognitionConfig, RestartPolicy};
pub use error::AdapterError;
pub use speech::{
    CapabilityProvider, DemoProvider, EventKind, ListenerConfig, PlatformProvider,
    RecognitionAdapter, SessionState,
};
