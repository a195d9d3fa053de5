//! Demo engine for platforms without native support.
//!
//! Simulates continuous recognition by "hearing" a scripted text word by
//! word, emitting the same event sequence a real engine would.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};

use super::engine::{EventHandler, HandlerTable, RecognitionEngine, RecognitionSession, SessionOptions};
use super::event::{EventKind, RecognitionEvent, RecognitionResult, ResultEvent};

const DEMO_SENTENCES: [&[&str]; 2] = [
    &[
        "Hello", "world,", "this", "is", "a", "demo", "of", "speech", "recognition.",
    ],
    &["The", "words", "fade", "in", "as", "they", "are", "transcribed..."],
];

#[derive(Debug, Clone)]
pub struct DemoEngine {
    word_delay: Duration,
}

impl DemoEngine {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }
}

impl Default for DemoEngine {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

impl RecognitionEngine for DemoEngine {
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
        Ok(Arc::new(DemoSession {
            options: options.clone(),
            inner: Arc::new(Inner {
                handlers: HandlerTable::new(),
                started: AtomicBool::new(false),
                stop_signal: AtomicBool::new(false),
                word_delay: self.word_delay,
            }),
        }))
    }

    fn name(&self) -> &str {
        "demo"
    }
}

struct Inner {
    handlers: HandlerTable,
    started: AtomicBool,
    stop_signal: AtomicBool,
    word_delay: Duration,
}

pub struct DemoSession {
    options: SessionOptions,
    inner: Arc<Inner>,
}

impl RecognitionSession for DemoSession {
    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.inner.handlers.set(kind, handler);
    }

    fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            bail!("Recognition has already started");
        }
        self.inner.stop_signal.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let options = self.options.clone();
        thread::spawn(move || inner.run(&options));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop_signal.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl Drop for DemoSession {
    fn drop(&mut self) {
        self.inner.stop_signal.store(true, Ordering::SeqCst);
    }
}

impl Inner {
    fn stopped(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    fn run(&self, options: &SessionOptions) {
        self.handlers.emit_status(EventKind::Start);
        self.handlers.emit_status(EventKind::AudioStart);

        let mut finals: Vec<RecognitionResult> = Vec::new();

        'sentences: for sentence in DEMO_SENTENCES.iter().cycle() {
            self.handlers.emit_status(EventKind::SoundStart);
            self.handlers.emit_status(EventKind::SpeechStart);

            let mut heard = String::new();
            for word in sentence.iter() {
                thread::sleep(self.word_delay);
                if self.stopped() {
                    break 'sentences;
                }

                if !heard.is_empty() {
                    heard.push(' ');
                }
                heard.push_str(word);

                if options.interim_results {
                    self.emit_results(&finals, RecognitionResult::new(heard.clone(), 0.5, false));
                }
            }

            let final_result = RecognitionResult::new(heard, 0.9, true);
            self.emit_results(&finals, final_result.clone());
            finals.push(final_result);

            self.handlers.emit_status(EventKind::SpeechEnd);
            self.handlers.emit_status(EventKind::SoundEnd);

            if !options.continuous || self.stopped() {
                break;
            }
        }

        self.handlers.emit_status(EventKind::AudioEnd);
        self.handlers.emit_status(EventKind::End);
    }

    /// Results accumulate across the session; only the last entry changes.
    fn emit_results(&self, finals: &[RecognitionResult], latest: RecognitionResult) {
        let mut results = finals.to_vec();
        results.push(latest);
        self.handlers.emit(RecognitionEvent::Result(ResultEvent {
            result_index: finals.len(),
            results,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn record_all(session: &Arc<dyn RecognitionSession>) -> mpsc::Receiver<RecognitionEvent> {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let handler: EventHandler = Arc::new(move |ev: &RecognitionEvent| {
            let _ = tx.lock().unwrap().send(ev.clone());
        });
        for kind in EventKind::ALL {
            session.set_handler(kind, Arc::clone(&handler));
        }
        rx
    }

    fn collect_until_end(rx: &mpsc::Receiver<RecognitionEvent>) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.recv_timeout(Duration::from_secs(5)) {
            let done = ev.kind() == EventKind::End;
            events.push(ev);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn test_single_utterance_session_ends_after_first_sentence() {
        let engine = DemoEngine::new(Duration::from_millis(1));
        let options = SessionOptions {
            continuous: false,
            ..SessionOptions::default()
        };
        let session = engine.create_session(&options).unwrap();
        let rx = record_all(&session);

        session.start().unwrap();
        let events = collect_until_end(&rx);

        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.first(), Some(&EventKind::Start));
        assert_eq!(kinds.last(), Some(&EventKind::End));

        let finals: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                RecognitionEvent::Result(r) if r.has_final() => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(
            finals[0].changed()[0].transcript(),
            "Hello world, this is a demo of speech recognition."
        );
    }

    #[test]
    fn test_without_interim_results_only_finals_are_reported() {
        let engine = DemoEngine::new(Duration::from_millis(1));
        let options = SessionOptions {
            continuous: false,
            interim_results: false,
            lang: None,
        };
        let session = engine.create_session(&options).unwrap();
        let rx = record_all(&session);

        session.start().unwrap();
        let events = collect_until_end(&rx);

        assert!(events.iter().all(|e| match e {
            RecognitionEvent::Result(r) => r.has_final(),
            _ => true,
        }));
    }

    #[test]
    fn test_start_twice_fails() {
        let engine = DemoEngine::new(Duration::from_millis(50));
        let session = engine.create_session(&SessionOptions::default()).unwrap();
        session.start().unwrap();
        assert!(session.start().is_err());
        session.stop().unwrap();
    }

    #[test]
    fn test_stop_ends_continuous_session() {
        let engine = DemoEngine::new(Duration::from_millis(5));
        let session = engine.create_session(&SessionOptions::default()).unwrap();
        let rx = record_all(&session);

        session.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        session.stop().unwrap();

        let events = collect_until_end(&rx);
        assert_eq!(events.last().map(|e| e.kind()), Some(EventKind::End));
    }
}
