//! The seam between the adapter and a platform recognition engine.
//!
//! An engine is the capability itself (the thing a host either has or
//! doesn't). A session is one live, configured instance of it.

use std::sync::Arc;

use anyhow::Result;

use super::event::{EventKind, RecognitionEvent};

/// Callback a session invokes for a registered event kind
pub type EventHandler = Arc<dyn Fn(&RecognitionEvent) + Send + Sync>;

/// Configuration fixed at session creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Keep listening across utterances
    pub continuous: bool,
    /// Deliver partial hypotheses before an utterance is final
    pub interim_results: bool,
    /// BCP 47 language tag; `None` uses the engine's default locale
    pub lang: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            lang: None,
        }
    }
}

/// A platform speech recognition capability
pub trait RecognitionEngine: Send + Sync {
    /// Create a fresh, unstarted session
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// One live recognition instance.
///
/// Sessions deliver events from whatever thread the engine uses; handlers
/// registered for a kind are called synchronously in that delivery.
pub trait RecognitionSession: Send + Sync {
    /// Register (or replace) the handler for one event kind
    fn set_handler(&self, kind: EventKind, handler: EventHandler);

    /// Begin capturing audio and recognizing
    fn start(&self) -> Result<()>;

    /// Stop capturing; pending audio may still yield a final result
    fn stop(&self) -> Result<()>;

    fn options(&self) -> &SessionOptions;
}

/// Where the adapter looks for an engine.
///
/// Hosts may expose the capability under a standard name or a
/// vendor-specific one; the adapter accepts either.
pub trait CapabilityProvider {
    fn standard(&self) -> Option<Arc<dyn RecognitionEngine>>;

    fn vendor_prefixed(&self) -> Option<Arc<dyn RecognitionEngine>>;
}

/// Standard engine if present, otherwise the vendor-prefixed one.
pub fn probe_capability(provider: &dyn CapabilityProvider) -> Option<Arc<dyn RecognitionEngine>> {
    provider.standard().or_else(|| provider.vendor_prefixed())
}

/// Handler table shared by session implementations.
///
/// Lookups clone the handler out so it is never called with the lock held.
#[derive(Default)]
pub struct HandlerTable {
    handlers: std::sync::Mutex<Vec<(EventKind, EventHandler)>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EventKind, EventHandler)>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, kind: EventKind, handler: EventHandler) {
        let mut handlers = self.lock();
        handlers.retain(|(k, _)| *k != kind);
        handlers.push((kind, handler));
    }

    pub fn get(&self, kind: EventKind) -> Option<EventHandler> {
        self.lock()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
    }

    /// Deliver an event to its registered handler, if any
    pub fn emit(&self, event: RecognitionEvent) {
        if let Some(handler) = self.get(event.kind()) {
            handler(&event);
        }
    }

    pub fn emit_status(&self, kind: EventKind) {
        self.emit(RecognitionEvent::status(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedEngine(&'static str);

    impl RecognitionEngine for NamedEngine {
        fn create_session(&self, _options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
            anyhow::bail!("not used")
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Provider {
        standard: bool,
        vendor: bool,
    }

    impl CapabilityProvider for Provider {
        fn standard(&self) -> Option<Arc<dyn RecognitionEngine>> {
            self.standard
                .then(|| Arc::new(NamedEngine("standard")) as Arc<dyn RecognitionEngine>)
        }

        fn vendor_prefixed(&self) -> Option<Arc<dyn RecognitionEngine>> {
            self.vendor
                .then(|| Arc::new(NamedEngine("vendor")) as Arc<dyn RecognitionEngine>)
        }
    }

    #[test]
    fn test_probe_prefers_standard() {
        let engine = probe_capability(&Provider { standard: true, vendor: true }).unwrap();
        assert_eq!(engine.name(), "standard");
    }

    #[test]
    fn test_probe_falls_back_to_vendor() {
        let engine = probe_capability(&Provider { standard: false, vendor: true }).unwrap();
        assert_eq!(engine.name(), "vendor");
    }

    #[test]
    fn test_probe_finds_nothing() {
        assert!(probe_capability(&Provider { standard: false, vendor: false }).is_none());
    }

    #[test]
    fn test_handler_table_replaces_and_emits() {
        let table = HandlerTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        table.set(EventKind::Start, Arc::new(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = Arc::clone(&second);
        table.set(EventKind::Start, Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        table.emit_status(EventKind::Start);
        table.emit_status(EventKind::End);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_table_survives_poisoned_lock() {
        let table = Arc::new(HandlerTable::new());
        let t = Arc::clone(&table);
        let _ = std::thread::spawn(move || {
            let _guard = t.handlers.lock().unwrap();
            panic!("poison the handler table");
        })
        .join();
        assert!(table.handlers.is_poisoned());

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        table.set(EventKind::Error, Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        table.emit_status(EventKind::Error);

        assert!(table.get(EventKind::Error).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
