//! Recognition adapter: owns the live session, relays its events to the
//! listener and restarts it on demand or per the restart policy.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::engine::{
    probe_capability, CapabilityProvider, EventHandler, RecognitionEngine, RecognitionSession,
};
use super::event::{EventKind, RecognitionEvent};
use super::listener::{ListenerConfig, Slot};
use super::scheduler::{RestartScheduler, ThreadScheduler};
use crate::config::RecognitionConfig;
use crate::error::{AdapterError, Result};

/// Lifecycle of the adapter's current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Active,
    Ended,
}

struct Current {
    id: u64,
    session: Arc<dyn RecognitionSession>,
    state: SessionState,
}

struct Shared {
    engine: Arc<dyn RecognitionEngine>,
    listener: ListenerConfig,
    config: RecognitionConfig,
    scheduler: Arc<dyn RestartScheduler>,
    current: Mutex<Option<Current>>,
    /// Cancellation flag of the one pending delayed restart
    pending: Mutex<Option<Arc<AtomicBool>>>,
    /// Held for the whole stop, init and start sequence
    restart_lock: Mutex<()>,
    restart_owner: Mutex<Option<ThreadId>>,
    next_id: AtomicU64,
}

/// Exclusive right to run a restart sequence
struct RestartGuard<'a> {
    shared: &'a Shared,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.shared.restart_owner) = None;
    }
}

/// Continuous speech recognition adapter.
///
/// Cloning is cheap and yields a handle to the same adapter, so handlers
/// can capture one and call back into it.
#[derive(Clone)]
pub struct RecognitionAdapter {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecognitionAdapter {
    /// Create an adapter using the first engine `provider` exposes.
    ///
    /// Fails with [`AdapterError::UnsupportedCapability`] when the provider
    /// has neither a standard nor a vendor-prefixed engine.
    pub fn new(
        listener: ListenerConfig,
        provider: &dyn CapabilityProvider,
        config: RecognitionConfig,
    ) -> Result<Self> {
        Self::with_scheduler(listener, provider, config, Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(
        listener: ListenerConfig,
        provider: &dyn CapabilityProvider,
        config: RecognitionConfig,
        scheduler: Arc<dyn RestartScheduler>,
    ) -> Result<Self> {
        let engine = probe_capability(provider).ok_or(AdapterError::UnsupportedCapability)?;
        info!(engine = engine.name(), "[RecognitionAdapter] using engine");

        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                listener,
                config,
                scheduler,
                current: Mutex::new(None),
                pending: Mutex::new(None),
                restart_lock: Mutex::new(()),
                restart_owner: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create a new session and wire the listener to it, replacing any
    /// previous session.
    pub fn init_recognition(&self) -> Result<()> {
        self.shared.init_recognition()
    }

    pub fn start(&self) -> Result<()> {
        self.shared.start()
    }

    /// Stop the current session. The session is kept, so `start` may be
    /// called again where the engine allows it.
    pub fn stop(&self) -> Result<()> {
        self.shared.stop()
    }

    /// Stop, reinitialize and start.
    ///
    /// A zero delay runs the sequence before returning. Otherwise the whole
    /// sequence is deferred by `delay`; a later restart replaces a pending
    /// one rather than running alongside it.
    ///
    /// Sequences never overlap: an immediate restart waits for one already
    /// running on another thread. Called from a handler while this adapter
    /// is restarting on the same thread, it returns `Ok(())` without doing
    /// anything, since that sequence already ends with a fresh session.
    pub fn restart(&self, delay: Duration) -> Result<()> {
        info!(?delay, "[RecognitionAdapter] restart");
        if delay.is_zero() {
            self.shared.cancel_pending_restart();
            match self.shared.enter_restart() {
                Some(_guard) => self.shared.run_restart(),
                None => Ok(()),
            }
        } else {
            self.shared.schedule_restart(delay);
            Ok(())
        }
    }

    /// Cancel a pending delayed restart. Returns whether one was pending.
    pub fn cancel_pending_restart(&self) -> bool {
        self.shared.cancel_pending_restart()
    }

    pub fn has_pending_restart(&self) -> bool {
        lock(&self.shared.pending).is_some()
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.current)
            .as_ref()
            .map(|c| c.state)
            .unwrap_or(SessionState::Uninitialized)
    }

    /// Identifier of the current session; each init yields a new one
    pub fn session_id(&self) -> Option<u64> {
        lock(&self.shared.current).as_ref().map(|c| c.id)
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.shared.config
    }

    pub fn engine_name(&self) -> &str {
        self.shared.engine.name()
    }
}

impl Shared {
    fn init_recognition(self: &Arc<Self>) -> Result<()> {
        info!("[RecognitionAdapter] initRecognition");

        let options = self.config.session_options();
        let session = self.engine.create_session(&options)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        for kind in EventKind::ALL {
            let slot = self.listener.slot(kind);
            if slot.is_none() && !self.policy_watches(kind) {
                continue;
            }
            session.set_handler(kind, self.trampoline(id, kind, slot));
        }

        debug!(session = id, ?options, "[RecognitionAdapter] session created");
        *lock(&self.current) = Some(Current {
            id,
            session,
            state: SessionState::Initialized,
        });
        Ok(())
    }

    /// Whether the restart policy needs to see `kind` even without a listener slot
    fn policy_watches(&self, kind: EventKind) -> bool {
        let policy = &self.config.restart;
        if !policy.auto_restart {
            return false;
        }
        match kind {
            EventKind::Error => true,
            EventKind::Result => policy.on_final_result,
            EventKind::SoundEnd => policy.on_sound_end,
            _ => false,
        }
    }

    fn trampoline(self: &Arc<Self>, id: u64, kind: EventKind, slot: Option<Slot>) -> EventHandler {
        let adapter = Arc::downgrade(self);
        Arc::new(move |event: &RecognitionEvent| {
            debug!(event = kind.name(), "[RecognitionAdapter] on{}", kind.name());
            match (&slot, event) {
                (None, _) => {}
                (Some(Slot::Status(handler)), RecognitionEvent::Status(ev)) => handler(ev),
                (Some(Slot::Result(handler)), RecognitionEvent::Result(ev)) => handler(ev),
                (Some(Slot::Result(handler)), RecognitionEvent::NoMatch(ev)) => handler(ev),
                (Some(Slot::Error(handler)), RecognitionEvent::Error(ev)) => handler(ev),
                (Some(_), other) => {
                    warn!(
                        registered = kind.name(),
                        delivered = other.kind().name(),
                        "[RecognitionAdapter] engine delivered mismatched payload"
                    );
                }
            }
            after_event(&adapter, id, event);
        })
    }

    fn current_session(&self) -> Result<(u64, Arc<dyn RecognitionSession>)> {
        lock(&self.current)
            .as_ref()
            .map(|c| (c.id, Arc::clone(&c.session)))
            .ok_or(AdapterError::NotInitialized)
    }

    fn set_state(&self, id: u64, state: SessionState) {
        if let Some(current) = lock(&self.current).as_mut() {
            if current.id == id {
                current.state = state;
            }
        }
    }

    fn start(&self) -> Result<()> {
        info!("[RecognitionAdapter] start");
        let (id, session) = self.current_session()?;
        session.start()?;
        self.set_state(id, SessionState::Active);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        info!("[RecognitionAdapter] stop");
        let (id, session) = self.current_session()?;
        session.stop()?;
        self.set_state(id, SessionState::Ended);
        Ok(())
    }

    /// Take the restart lock, or `None` when this thread already holds it.
    fn enter_restart(&self) -> Option<RestartGuard<'_>> {
        let guard = match self.restart_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                if *lock(&self.restart_owner) == Some(thread::current().id()) {
                    debug!("[RecognitionAdapter] restart already running on this thread");
                    return None;
                }
                lock(&self.restart_lock)
            }
        };
        *lock(&self.restart_owner) = Some(thread::current().id());
        Some(RestartGuard {
            shared: self,
            _lock: guard,
        })
    }

    /// Caller holds a `RestartGuard`.
    fn run_restart(self: &Arc<Self>) -> Result<()> {
        self.stop()?;
        self.init_recognition()?;
        self.start()
    }

    fn schedule_restart(self: &Arc<Self>, delay: Duration) {
        let token = Arc::new(AtomicBool::new(false));
        if let Some(previous) = lock(&self.pending).replace(Arc::clone(&token)) {
            previous.store(true, Ordering::SeqCst);
            debug!("[RecognitionAdapter] replaced pending restart");
        }

        let adapter = Arc::downgrade(self);
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(shared) = adapter.upgrade() else {
                    return;
                };
                let Some(_guard) = shared.enter_restart() else {
                    return;
                };
                {
                    let mut pending = lock(&shared.pending);
                    if token.load(Ordering::SeqCst) {
                        return;
                    }
                    if pending.as_ref().is_some_and(|t| Arc::ptr_eq(t, &token)) {
                        *pending = None;
                    }
                }
                if let Err(e) = shared.run_restart() {
                    error!("[RecognitionAdapter] delayed restart failed: {}", e);
                }
            }),
        );
    }

    fn cancel_pending_restart(&self) -> bool {
        match lock(&self.pending).take() {
            Some(token) => {
                token.store(true, Ordering::SeqCst);
                debug!("[RecognitionAdapter] cancelled pending restart");
                true
            }
            None => false,
        }
    }
}

/// Apply the restart policy once the listener has seen the event.
///
/// Only events from the current session count; a replaced session may
/// still flush results while it shuts down.
fn after_event(adapter: &Weak<Shared>, id: u64, event: &RecognitionEvent) {
    let Some(shared) = adapter.upgrade() else {
        return;
    };
    if lock(&shared.current).as_ref().map(|c| c.id) != Some(id) {
        debug!(session = id, "[RecognitionAdapter] ignoring policy for replaced session");
        return;
    }
    let policy = &shared.config.restart;
    let reason = match event {
        RecognitionEvent::Error(ev) if policy.restarts_on_error(&ev.error) => "error",
        RecognitionEvent::Result(ev) if policy.restarts_on_final_result() && ev.has_final() => {
            "final result"
        }
        RecognitionEvent::Status(ev)
            if ev.kind == EventKind::SoundEnd && policy.restarts_on_sound_end() =>
        {
            "sound end"
        }
        _ => return,
    };
    info!(reason, "[RecognitionAdapter] auto-restart");
    shared.schedule_restart(policy.delay());
}
