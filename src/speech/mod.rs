//! Speech recognition adapter with platform-specific engines.
//!
//! - macOS: Native Speech framework via objc2-speech
//! - Windows: Native Windows.Media.SpeechRecognition API
//! - Linux: Vosk offline speech recognition (`vosk` feature)
//! - Any platform: Demo engine for testing/development

mod adapter;
mod engine;
mod event;
mod listener;
mod mock;
mod scheduler;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(all(target_os = "linux", feature = "vosk"))]
mod linux;

use std::sync::Arc;

pub use adapter::{RecognitionAdapter, SessionState};
pub use engine::{
    probe_capability, CapabilityProvider, EventHandler, HandlerTable, RecognitionEngine,
    RecognitionSession, SessionOptions,
};
pub use event::{
    Alternative, ErrorEvent, EventKind, RecognitionErrorKind, RecognitionEvent,
    RecognitionResult, ResultEvent, StatusEvent,
};
pub use listener::{ErrorHandler, ListenerConfig, ResultHandler, Slot, StatusHandler};
pub use mock::DemoEngine;
pub use scheduler::{RestartScheduler, Task, ThreadScheduler};

/// Engines compiled into this build.
///
/// The OS engine on macOS and Windows counts as the standard capability.
/// Linux has no standard one; Vosk stands in as the vendor engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformProvider;

impl CapabilityProvider for PlatformProvider {
    fn standard(&self) -> Option<Arc<dyn RecognitionEngine>> {
        #[cfg(target_os = "macos")]
        {
            Some(Arc::new(macos::SpeechFrameworkEngine))
        }

        #[cfg(target_os = "windows")]
        {
            Some(Arc::new(self::windows::WindowsSpeechEngine))
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            None
        }
    }

    fn vendor_prefixed(&self) -> Option<Arc<dyn RecognitionEngine>> {
        #[cfg(all(target_os = "linux", feature = "vosk"))]
        {
            match linux::VoskEngine::from_env() {
                Ok(engine) => Some(Arc::new(engine)),
                Err(e) => {
                    tracing::warn!("Vosk engine unavailable: {}", e);
                    None
                }
            }
        }

        #[cfg(not(all(target_os = "linux", feature = "vosk")))]
        {
            None
        }
    }
}

/// Exposes only the scripted demo engine
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoProvider;

impl CapabilityProvider for DemoProvider {
    fn standard(&self) -> Option<Arc<dyn RecognitionEngine>> {
        Some(Arc::new(DemoEngine::default()))
    }

    fn vendor_prefixed(&self) -> Option<Arc<dyn RecognitionEngine>> {
        None
    }
}
