//! Recognition events delivered by engines and relayed to listeners.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The eleven event kinds a recognition session can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Audio capture started
    AudioStart,
    /// Audio capture ended
    AudioEnd,
    /// Any sound (possibly speech) detected
    SoundStart,
    /// Sound no longer detected
    SoundEnd,
    /// Speech detected
    SpeechStart,
    /// Speech no longer detected
    SpeechEnd,
    /// A result or set of interim results changed
    Result,
    /// Final result without a significant match
    NoMatch,
    /// Recognition error
    Error,
    /// Session started listening
    Start,
    /// Session ended
    End,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::AudioStart,
        EventKind::AudioEnd,
        EventKind::SoundStart,
        EventKind::SoundEnd,
        EventKind::SpeechStart,
        EventKind::SpeechEnd,
        EventKind::Result,
        EventKind::NoMatch,
        EventKind::Error,
        EventKind::Start,
        EventKind::End,
    ];

    /// Name used in logs, matching the engine-side handler names.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::AudioStart => "audiostart",
            EventKind::AudioEnd => "audioend",
            EventKind::SoundStart => "soundstart",
            EventKind::SoundEnd => "soundend",
            EventKind::SpeechStart => "speechstart",
            EventKind::SpeechEnd => "speechend",
            EventKind::Result => "result",
            EventKind::NoMatch => "nomatch",
            EventKind::Error => "error",
            EventKind::Start => "start",
            EventKind::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload for lifecycle events that carry no data beyond their kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub kind: EventKind,
}

impl StatusEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind }
    }
}

/// One transcription hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// A result entry: alternatives ordered best first, plus the finality flag
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

impl RecognitionResult {
    /// Single-alternative result, the shape every bundled engine produces.
    pub fn new(transcript: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        Self {
            alternatives: vec![Alternative {
                transcript: transcript.into(),
                confidence,
            }],
            is_final,
        }
    }

    /// Best-guess transcript, empty if the engine reported no alternatives
    pub fn transcript(&self) -> &str {
        self.alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .unwrap_or("")
    }
}

/// Result payload (also used for no-match)
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEvent {
    /// Index of the first entry that changed with this event
    pub result_index: usize,
    pub results: Vec<RecognitionResult>,
}

impl ResultEvent {
    /// Entries from `result_index` to the end.
    pub fn changed(&self) -> &[RecognitionResult] {
        self.results.get(self.result_index..).unwrap_or(&[])
    }

    pub fn has_final(&self) -> bool {
        self.changed().iter().any(|r| r.is_final)
    }
}

/// Kind of a recognition failure reported by an engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    Other(String),
}

impl RecognitionErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            RecognitionErrorKind::NoSpeech => "no-speech",
            RecognitionErrorKind::Aborted => "aborted",
            RecognitionErrorKind::AudioCapture => "audio-capture",
            RecognitionErrorKind::Network => "network",
            RecognitionErrorKind::NotAllowed => "not-allowed",
            RecognitionErrorKind::ServiceNotAllowed => "service-not-allowed",
            RecognitionErrorKind::BadGrammar => "bad-grammar",
            RecognitionErrorKind::LanguageNotSupported => "language-not-supported",
            RecognitionErrorKind::Other(s) => s,
        }
    }
}

impl FromStr for RecognitionErrorKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "no-speech" => RecognitionErrorKind::NoSpeech,
            "aborted" => RecognitionErrorKind::Aborted,
            "audio-capture" => RecognitionErrorKind::AudioCapture,
            "network" => RecognitionErrorKind::Network,
            "not-allowed" => RecognitionErrorKind::NotAllowed,
            "service-not-allowed" => RecognitionErrorKind::ServiceNotAllowed,
            "bad-grammar" => RecognitionErrorKind::BadGrammar,
            "language-not-supported" => RecognitionErrorKind::LanguageNotSupported,
            other => RecognitionErrorKind::Other(other.to_string()),
        })
    }
}

impl From<String> for RecognitionErrorKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<RecognitionErrorKind> for String {
    fn from(kind: RecognitionErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub error: RecognitionErrorKind,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(error: RecognitionErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// Everything a session can deliver to a registered handler
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Status(StatusEvent),
    Result(ResultEvent),
    NoMatch(ResultEvent),
    Error(ErrorEvent),
}

impl RecognitionEvent {
    pub fn status(kind: EventKind) -> Self {
        RecognitionEvent::Status(StatusEvent::new(kind))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RecognitionEvent::Status(ev) => ev.kind,
            RecognitionEvent::Result(_) => EventKind::Result,
            RecognitionEvent::NoMatch(_) => EventKind::NoMatch,
            RecognitionEvent::Error(_) => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_range_starts_at_result_index() {
        let ev = ResultEvent {
            result_index: 1,
            results: vec![
                RecognitionResult::new("old", 0.9, true),
                RecognitionResult::new("new", 0.5, false),
            ],
        };
        assert_eq!(ev.changed().len(), 1);
        assert_eq!(ev.changed()[0].transcript(), "new");
        assert!(!ev.has_final(), "final entry before result_index is ignored");
    }

    #[test]
    fn test_result_index_past_end_has_no_changes() {
        let ev = ResultEvent {
            result_index: 5,
            results: vec![RecognitionResult::new("a", 1.0, true)],
        };
        assert!(ev.changed().is_empty());
        assert!(!ev.has_final());
    }

    #[test]
    fn test_error_kind_round_trips_known_names() {
        for name in ["no-speech", "audio-capture", "network", "not-allowed"] {
            let kind: RecognitionErrorKind = name.parse().unwrap();
            assert!(!matches!(kind, RecognitionErrorKind::Other(_)));
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn test_unknown_error_kind_is_preserved() {
        let kind: RecognitionErrorKind = "phrases-not-supported".parse().unwrap();
        assert_eq!(
            kind,
            RecognitionErrorKind::Other("phrases-not-supported".to_string())
        );
        assert_eq!(kind.as_str(), "phrases-not-supported");
    }

    #[test]
    fn test_event_kind_names_are_unique() {
        let mut names: Vec<_> = EventKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn test_recognition_event_kind() {
        assert_eq!(
            RecognitionEvent::status(EventKind::SoundEnd).kind(),
            EventKind::SoundEnd
        );
        let err = RecognitionEvent::Error(ErrorEvent::new(RecognitionErrorKind::Network, ""));
        assert_eq!(err.kind(), EventKind::Error);
    }
}
