// Test doubles: a scriptable engine and a scheduler that runs on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use speech_relay::speech::{
    CapabilityProvider, EventHandler, EventKind, HandlerTable, RecognitionEngine,
    RecognitionEvent, RecognitionSession, RestartScheduler, SessionOptions, Task,
};

/// Engine-side calls, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(usize),
    Start(usize),
    Stop(usize),
}

/// Sessions currently inside `start`, and the most seen at once
#[derive(Default)]
pub struct StartGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Default)]
pub struct FakeEngine {
    calls: Arc<Mutex<Vec<Call>>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    start_delay: Duration,
    end_on_stop: bool,
    gauge: Arc<StartGauge>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sessions take `delay` to start, like an engine acquiring the microphone
    pub fn with_start_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            start_delay: delay,
            ..Self::default()
        })
    }

    /// Sessions deliver `end` from inside `stop`
    pub fn ending_on_stop() -> Arc<Self> {
        Arc::new(Self {
            end_on_stop: true,
            ..Self::default()
        })
    }

    pub fn peak_concurrent_starts(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    pub fn started_sessions(&self) -> Vec<usize> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_started())
            .map(|s| s.index)
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn latest(&self) -> Arc<FakeSession> {
        let sessions = self.sessions.lock().unwrap();
        Arc::clone(sessions.last().expect("no session created"))
    }
}

impl RecognitionEngine for FakeEngine {
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let index = sessions.len();
        let session = Arc::new(FakeSession {
            index,
            options: options.clone(),
            handlers: HandlerTable::new(),
            registered: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            calls: Arc::clone(&self.calls),
            start_delay: self.start_delay,
            end_on_stop: self.end_on_stop,
            gauge: Arc::clone(&self.gauge),
        });
        sessions.push(Arc::clone(&session));
        self.calls.lock().unwrap().push(Call::Create(index));
        Ok(session)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeSession {
    pub index: usize,
    options: SessionOptions,
    handlers: HandlerTable,
    registered: Mutex<Vec<EventKind>>,
    started: AtomicBool,
    calls: Arc<Mutex<Vec<Call>>>,
    start_delay: Duration,
    end_on_stop: bool,
    gauge: Arc<StartGauge>,
}

impl FakeSession {
    /// Deliver an event as the engine would
    pub fn fire(&self, event: RecognitionEvent) {
        self.handlers.emit(event);
    }

    pub fn registered_kinds(&self) -> Vec<EventKind> {
        self.registered.lock().unwrap().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl RecognitionSession for FakeSession {
    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.registered.lock().unwrap().push(kind);
        self.handlers.set(kind, handler);
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("InvalidStateError: recognition has already started");
        }
        if !self.start_delay.is_zero() {
            let active = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.gauge.peak.fetch_max(active, Ordering::SeqCst);
            thread::sleep(self.start_delay);
            self.gauge.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(Call::Start(self.index));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call::Stop(self.index));
        if self.end_on_stop {
            self.handlers.emit_status(EventKind::End);
        }
        Ok(())
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }
}

pub struct FakeProvider {
    pub standard: Option<Arc<FakeEngine>>,
    pub vendor: Option<Arc<FakeEngine>>,
}

impl FakeProvider {
    pub fn standard(engine: &Arc<FakeEngine>) -> Self {
        Self {
            standard: Some(Arc::clone(engine)),
            vendor: None,
        }
    }

    pub fn none() -> Self {
        Self {
            standard: None,
            vendor: None,
        }
    }
}

impl CapabilityProvider for FakeProvider {
    fn standard(&self) -> Option<Arc<dyn RecognitionEngine>> {
        self.standard
            .as_ref()
            .map(|e| Arc::clone(e) as Arc<dyn RecognitionEngine>)
    }

    fn vendor_prefixed(&self) -> Option<Arc<dyn RecognitionEngine>> {
        self.vendor
            .as_ref()
            .map(|e| Arc::clone(e) as Arc<dyn RecognitionEngine>)
    }
}

/// Holds scheduled tasks until the test fires them
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, Task)>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.pending.lock().unwrap().iter().map(|(d, _)| *d).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Run every task scheduled so far, as if their delays elapsed
    pub fn fire_all(&self) {
        let tasks: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        for (_, task) in tasks {
            task();
        }
    }
}

impl RestartScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        self.pending.lock().unwrap().push((delay, task));
    }
}
