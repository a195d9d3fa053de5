use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::speech::{RecognitionErrorKind, SessionOptions};

/// Language used when nothing else is configured
pub const DEFAULT_LANG: &str = "ja-JP";

/// Delay applied to automatic restarts
pub const DEFAULT_RESTART_DELAY_MS: u64 = 500;

/// Adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Keep listening across utterances
    pub continuous: bool,
    /// Deliver partial hypotheses
    pub interim_results: bool,
    /// Language tag handed to each new session
    pub lang: String,
    pub restart: RestartPolicy,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            lang: DEFAULT_LANG.to_string(),
            restart: RestartPolicy::default(),
        }
    }
}

/// When the adapter restarts its session on its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Master switch; nothing below applies while false
    pub auto_restart: bool,
    pub delay_ms: u64,
    /// Error kinds that trigger a restart. `None` restarts on every error.
    pub on_errors: Option<Vec<RecognitionErrorKind>>,
    /// Restart once a result event finalizes an entry
    pub on_final_result: bool,
    /// Restart when the engine stops hearing sound
    pub on_sound_end: bool,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            auto_restart: false,
            delay_ms: DEFAULT_RESTART_DELAY_MS,
            on_errors: None,
            on_final_result: true,
            on_sound_end: false,
        }
    }
}

impl RestartPolicy {
    /// Policy with auto-restart switched on and everything else default
    pub fn enabled() -> Self {
        Self {
            auto_restart: true,
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn restarts_on_error(&self, kind: &RecognitionErrorKind) -> bool {
        if !self.auto_restart {
            return false;
        }
        match &self.on_errors {
            None => true,
            Some(kinds) => kinds.contains(kind),
        }
    }

    pub fn restarts_on_final_result(&self) -> bool {
        self.auto_restart && self.on_final_result
    }

    pub fn restarts_on_sound_end(&self) -> bool {
        self.auto_restart && self.on_sound_end
    }
}

impl RecognitionConfig {
    /// Load from an optional file, then `SPEECH_RELAY_*` environment overrides.
    ///
    /// Nested keys use a double underscore, e.g. `SPEECH_RELAY_RESTART__DELAY_MS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SPEECH_RELAY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            continuous: self.continuous,
            interim_results: self.interim_results,
            lang: Some(self.lang.clone()).filter(|lang| !lang.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecognitionConfig::default();
        assert!(config.continuous);
        assert!(config.interim_results);
        assert_eq!(config.lang, "ja-JP");
        assert!(!config.restart.auto_restart);
        assert_eq!(config.restart.delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_disabled_policy_never_restarts() {
        let policy = RestartPolicy {
            on_sound_end: true,
            ..RestartPolicy::default()
        };
        assert!(!policy.restarts_on_error(&RecognitionErrorKind::Network));
        assert!(!policy.restarts_on_final_result());
        assert!(!policy.restarts_on_sound_end());
    }

    #[test]
    fn test_enabled_policy_restarts_on_every_error_kind() {
        let policy = RestartPolicy::enabled();
        assert!(policy.restarts_on_error(&RecognitionErrorKind::NoSpeech));
        assert!(policy.restarts_on_error(&RecognitionErrorKind::NotAllowed));
        assert!(policy.restarts_on_error(&RecognitionErrorKind::Other("x".into())));
        assert!(policy.restarts_on_final_result());
        assert!(!policy.restarts_on_sound_end());
    }

    #[test]
    fn test_error_filter_restricts_kinds() {
        let policy = RestartPolicy {
            on_errors: Some(vec![RecognitionErrorKind::NoSpeech, RecognitionErrorKind::Network]),
            ..RestartPolicy::enabled()
        };
        assert!(policy.restarts_on_error(&RecognitionErrorKind::NoSpeech));
        assert!(!policy.restarts_on_error(&RecognitionErrorKind::NotAllowed));
    }

    #[test]
    fn test_empty_lang_means_engine_default() {
        let config = RecognitionConfig {
            lang: String::new(),
            ..RecognitionConfig::default()
        };
        assert_eq!(config.session_options().lang, None);
        assert_eq!(
            RecognitionConfig::default().session_options().lang.as_deref(),
            Some("ja-JP")
        );
    }
}
