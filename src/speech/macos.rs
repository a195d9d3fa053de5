//! macOS speech recognition using the native Speech framework.

use std::ptr::NonNull;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use block2::RcBlock;
use objc2::rc::Retained;
use objc2::AllocAnyThread;
use objc2_avf_audio::{AVAudioEngine, AVAudioPCMBuffer, AVAudioTime};
use objc2_foundation::{NSError, NSLocale, NSOperationQueue, NSString};
use objc2_speech::{
    SFSpeechAudioBufferRecognitionRequest, SFSpeechRecognitionResult, SFSpeechRecognitionTask,
    SFSpeechRecognizer, SFSpeechRecognizerAuthorizationStatus,
};
use tracing::debug;

use super::engine::{EventHandler, HandlerTable, RecognitionEngine, RecognitionSession, SessionOptions};
use super::event::{
    ErrorEvent, EventKind, RecognitionErrorKind, RecognitionEvent, RecognitionResult, ResultEvent,
};

// SFSpeechRecognizerAuthorizationStatus raw values
const AUTH_NOT_DETERMINED: isize = 0;
const AUTH_AUTHORIZED: isize = 3;

/// Buffers to wait for before reporting audio start (~200ms at 1024 frames)
const WARMUP_BUFFERS: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct SpeechFrameworkEngine;

impl RecognitionEngine for SpeechFrameworkEngine {
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
        Ok(Arc::new(SpeechFrameworkSession::new(options.clone())?))
    }

    fn name(&self) -> &str {
        "macos-speech"
    }
}

struct Native {
    recognizer: Retained<SFSpeechRecognizer>,
    audio_engine: Retained<AVAudioEngine>,
    request: Option<Retained<SFSpeechAudioBufferRecognitionRequest>>,
    task: Option<Retained<SFSpeechRecognitionTask>>,
    // Keep blocks alive
    _tap_block: Option<RcBlock<dyn Fn(NonNull<AVAudioPCMBuffer>, NonNull<AVAudioTime>)>>,
    _handler: Option<RcBlock<dyn Fn(*mut SFSpeechRecognitionResult, *mut NSError)>>,
}

pub struct SpeechFrameworkSession {
    options: SessionOptions,
    handlers: Arc<HandlerTable>,
    native: Mutex<Native>,
    started: AtomicBool,
    ended: Arc<AtomicBool>,
}

// The Objective-C objects are only touched while holding `native`, and
// the Speech framework delivers callbacks on its own operation queue.
unsafe impl Send for SpeechFrameworkSession {}
unsafe impl Sync for SpeechFrameworkSession {}

impl SpeechFrameworkSession {
    fn new(options: SessionOptions) -> Result<Self> {
        let recognizer = unsafe {
            let locale = match &options.lang {
                Some(lang) => NSLocale::initWithLocaleIdentifier(
                    NSLocale::alloc(),
                    &NSString::from_str(lang),
                ),
                None => NSLocale::currentLocale(),
            };
            SFSpeechRecognizer::initWithLocale(SFSpeechRecognizer::alloc(), &locale)
        }
        .ok_or_else(|| anyhow!("Failed to create speech recognizer"))?;

        let available = unsafe { recognizer.isAvailable() };
        if !available {
            return Err(anyhow!(
                "Speech recognition is not available. Please check system permissions."
            ));
        }

        // CLI apps don't have a main run loop
        let queue = NSOperationQueue::new();
        unsafe {
            recognizer.setQueue(&queue);
        }

        let audio_engine = unsafe { AVAudioEngine::new() };

        Ok(Self {
            options,
            handlers: Arc::new(HandlerTable::new()),
            native: Mutex::new(Native {
                recognizer,
                audio_engine,
                request: None,
                task: None,
                _tap_block: None,
                _handler: None,
            }),
            started: AtomicBool::new(false),
            ended: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_authorized() -> Result<()> {
        let auth_status = unsafe { SFSpeechRecognizer::authorizationStatus() };

        if auth_status.0 == AUTH_NOT_DETERMINED {
            let auth_granted = Arc::new(Mutex::new(None));
            let auth_granted_clone = Arc::clone(&auth_granted);

            let handler = RcBlock::new(move |status: SFSpeechRecognizerAuthorizationStatus| {
                if let Ok(mut granted) = auth_granted_clone.lock() {
                    *granted = Some(status.0 == AUTH_AUTHORIZED);
                }
            });

            unsafe {
                SFSpeechRecognizer::requestAuthorization(&handler);
            }

            // Wait for authorization response (with timeout)
            for _ in 0..50 {
                thread::sleep(Duration::from_millis(100));
                if let Ok(granted) = auth_granted.lock() {
                    if let Some(is_granted) = *granted {
                        if !is_granted {
                            bail!(
                                "Speech recognition permission denied. Please grant permission in System Settings."
                            );
                        }
                        break;
                    }
                }
            }

            let final_status = unsafe { SFSpeechRecognizer::authorizationStatus() };
            if final_status.0 != AUTH_AUTHORIZED {
                bail!("Speech recognition not authorized. Please grant permission when prompted.");
            }
        } else if auth_status.0 != AUTH_AUTHORIZED {
            bail!(
                "Speech recognition permission denied. Please enable it in System Settings > Privacy & Security > Speech Recognition."
            );
        }
        Ok(())
    }

    fn finish(handlers: &HandlerTable, ended: &AtomicBool) {
        if !ended.swap(true, Ordering::SeqCst) {
            handlers.emit_status(EventKind::AudioEnd);
            handlers.emit_status(EventKind::End);
        }
    }
}

impl RecognitionSession for SpeechFrameworkSession {
    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.set(kind, handler);
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("Recognition has already started");
        }
        Self::ensure_authorized()?;

        let mut native = self.native.lock().map_err(|_| anyhow!("session state poisoned"))?;

        let request = unsafe { SFSpeechAudioBufferRecognitionRequest::new() };
        unsafe {
            request.setShouldReportPartialResults(self.options.interim_results);
        }

        let input_node = unsafe { native.audio_engine.inputNode() };
        let format = unsafe { input_node.outputFormatForBus(0) };

        // Each task reports one growing transcription; finalized ones are
        // kept so the result list accumulates like a continuous session.
        let handlers = Arc::clone(&self.handlers);
        let ended = Arc::clone(&self.ended);
        let finals: Arc<Mutex<Vec<RecognitionResult>>> = Arc::new(Mutex::new(Vec::new()));

        let handler = RcBlock::new(
            move |result: *mut SFSpeechRecognitionResult, error: *mut NSError| {
                if !error.is_null() {
                    let (code, message) = unsafe {
                        let error = &*error;
                        (error.code(), error.localizedDescription().to_string())
                    };
                    if !ended.load(Ordering::SeqCst) {
                        handlers.emit(RecognitionEvent::Error(ErrorEvent::new(
                            RecognitionErrorKind::Other(format!("ns-error-{}", code)),
                            message,
                        )));
                    }
                    Self::finish(&handlers, &ended);
                    return;
                }

                if result.is_null() {
                    return;
                }

                let result = unsafe { &*result };
                let best_transcription = unsafe { result.bestTranscription() };
                let text = unsafe { best_transcription.formattedString() }.to_string();
                let is_final = unsafe { result.isFinal() };

                let entry = RecognitionResult::new(text, if is_final { 1.0 } else { 0.0 }, is_final);
                let event = match finals.lock() {
                    Ok(mut finals) => {
                        let result_index = finals.len();
                        let mut results = finals.clone();
                        results.push(entry.clone());
                        if is_final {
                            finals.push(entry);
                        }
                        ResultEvent { result_index, results }
                    }
                    Err(_) => return,
                };
                handlers.emit(RecognitionEvent::Result(event));

                if is_final {
                    handlers.emit_status(EventKind::SpeechEnd);
                    Self::finish(&handlers, &ended);
                }
            },
        );

        let task = unsafe {
            native
                .recognizer
                .recognitionTaskWithRequest_resultHandler(&request, &handler)
        };

        // Install tap on input node to capture audio
        let request_for_tap = request.clone();
        let handlers_for_tap = Arc::clone(&self.handlers);
        let buffer_count = Arc::new(AtomicUsize::new(0));
        let tap_block = RcBlock::new(
            move |buffer: NonNull<AVAudioPCMBuffer>, _when: NonNull<AVAudioTime>| {
                let count = buffer_count.fetch_add(1, Ordering::SeqCst);
                if count == WARMUP_BUFFERS {
                    handlers_for_tap.emit_status(EventKind::AudioStart);
                }
                unsafe {
                    request_for_tap.appendAudioPCMBuffer(buffer.as_ref());
                }
            },
        );

        unsafe {
            // Convert RcBlock to raw pointer for the C API
            let tap_block_ptr = &*tap_block as *const block2::Block<_> as *mut block2::Block<_>;
            input_node.installTapOnBus_bufferSize_format_block(0, 1024, Some(&format), tap_block_ptr);
        }

        unsafe {
            native.audio_engine.prepare();
            native
                .audio_engine
                .startAndReturnError()
                .map_err(|e| anyhow!("Failed to start audio engine: {:?}", e))?;
        }

        native.request = Some(request);
        native.task = Some(task);
        native._tap_block = Some(tap_block);
        native._handler = Some(handler);
        drop(native);

        debug!(lang = ?self.options.lang, "Speech framework session started");
        self.handlers.emit_status(EventKind::Start);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut native = self.native.lock().map_err(|_| anyhow!("session state poisoned"))?;

        unsafe {
            native.audio_engine.stop();
            let input_node = native.audio_engine.inputNode();
            input_node.removeTapOnBus(0);
        }

        // Ending the audio lets the task deliver its final result
        if let Some(ref request) = native.request {
            unsafe {
                request.endAudio();
            }
        }

        native.request = None;
        native._tap_block = None;
        drop(native);

        if self.started.load(Ordering::SeqCst) {
            Self::finish(&self.handlers, &self.ended);
        }
        Ok(())
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl Drop for SpeechFrameworkSession {
    fn drop(&mut self) {
        if let Ok(mut native) = self.native.lock() {
            if let Some(ref task) = native.task {
                unsafe {
                    task.cancel();
                }
            }
            native.task = None;
            native._handler = None;
        }
    }
}
