//! Caller-supplied callbacks, one optional slot per event kind.

use std::sync::Arc;

use super::event::{ErrorEvent, EventKind, ResultEvent, StatusEvent};

pub type StatusHandler = Arc<dyn Fn(&StatusEvent) + Send + Sync>;
pub type ResultHandler = Arc<dyn Fn(&ResultEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// A listener slot resolved for one event kind
#[derive(Clone)]
pub enum Slot {
    Status(StatusHandler),
    Result(ResultHandler),
    Error(ErrorHandler),
}

/// Set of optional handlers. Empty slots mean the event is not forwarded.
#[derive(Clone, Default)]
pub struct ListenerConfig {
    pub on_audio_start: Option<StatusHandler>,
    pub on_audio_end: Option<StatusHandler>,
    pub on_sound_start: Option<StatusHandler>,
    pub on_sound_end: Option<StatusHandler>,
    pub on_speech_start: Option<StatusHandler>,
    pub on_speech_end: Option<StatusHandler>,
    pub on_result: Option<ResultHandler>,
    pub on_no_match: Option<ResultHandler>,
    pub on_error: Option<ErrorHandler>,
    pub on_start: Option<StatusHandler>,
    pub on_end: Option<StatusHandler>,
}

impl ListenerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handler for `kind`, if the slot is filled
    pub fn slot(&self, kind: EventKind) -> Option<Slot> {
        let status = |h: &Option<StatusHandler>| h.clone().map(Slot::Status);
        match kind {
            EventKind::AudioStart => status(&self.on_audio_start),
            EventKind::AudioEnd => status(&self.on_audio_end),
            EventKind::SoundStart => status(&self.on_sound_start),
            EventKind::SoundEnd => status(&self.on_sound_end),
            EventKind::SpeechStart => status(&self.on_speech_start),
            EventKind::SpeechEnd => status(&self.on_speech_end),
            EventKind::Result => self.on_result.clone().map(Slot::Result),
            EventKind::NoMatch => self.on_no_match.clone().map(Slot::Result),
            EventKind::Error => self.on_error.clone().map(Slot::Error),
            EventKind::Start => status(&self.on_start),
            EventKind::End => status(&self.on_end),
        }
    }

    /// Fill a status slot. Ignored for result, no-match and error kinds.
    pub fn on_status(mut self, kind: EventKind, f: impl Fn(&StatusEvent) + Send + Sync + 'static) -> Self {
        let handler: StatusHandler = Arc::new(f);
        let slot = match kind {
            EventKind::AudioStart => &mut self.on_audio_start,
            EventKind::AudioEnd => &mut self.on_audio_end,
            EventKind::SoundStart => &mut self.on_sound_start,
            EventKind::SoundEnd => &mut self.on_sound_end,
            EventKind::SpeechStart => &mut self.on_speech_start,
            EventKind::SpeechEnd => &mut self.on_speech_end,
            EventKind::Start => &mut self.on_start,
            EventKind::End => &mut self.on_end,
            EventKind::Result | EventKind::NoMatch | EventKind::Error => return self,
        };
        *slot = Some(handler);
        self
    }

    pub fn on_start(self, f: impl Fn(&StatusEvent) + Send + Sync + 'static) -> Self {
        self.on_status(EventKind::Start, f)
    }

    pub fn on_end(self, f: impl Fn(&StatusEvent) + Send + Sync + 'static) -> Self {
        self.on_status(EventKind::End, f)
    }

    pub fn on_result(mut self, f: impl Fn(&ResultEvent) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(f));
        self
    }

    pub fn on_no_match(mut self, f: impl Fn(&ResultEvent) + Send + Sync + 'static) -> Self {
        self.on_no_match = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Kinds with a filled slot
    pub fn registered_kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.slot(*kind).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_listener_has_no_slots() {
        assert!(ListenerConfig::new().registered_kinds().is_empty());
    }

    #[test]
    fn test_builder_fills_matching_slots() {
        let listener = ListenerConfig::new()
            .on_result(|_| {})
            .on_error(|_| {})
            .on_status(EventKind::SoundEnd, |_| {});

        assert_eq!(
            listener.registered_kinds(),
            vec![EventKind::SoundEnd, EventKind::Result, EventKind::Error]
        );
        assert!(matches!(listener.slot(EventKind::Result), Some(Slot::Result(_))));
        assert!(matches!(listener.slot(EventKind::Error), Some(Slot::Error(_))));
        assert!(matches!(listener.slot(EventKind::SoundEnd), Some(Slot::Status(_))));
    }

    #[test]
    fn test_on_status_ignores_payload_kinds() {
        let listener = ListenerConfig::new().on_status(EventKind::Result, |_| {});
        assert!(listener.slot(EventKind::Result).is_none());
    }
}
