//! Windows speech recognition using the native Windows.Media.SpeechRecognition API.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, bail, Result};
use windows::{
    core::HSTRING,
    Foundation::TypedEventHandler,
    Globalization::Language,
    Media::SpeechRecognition::{
        SpeechContinuousRecognitionCompletedEventArgs,
        SpeechContinuousRecognitionResultGeneratedEventArgs,
        SpeechRecognitionHypothesisGeneratedEventArgs, SpeechRecognitionResultStatus,
        SpeechRecognizer as WinSpeechRecognizer, SpeechRecognizerState,
    },
};

use super::engine::{EventHandler, HandlerTable, RecognitionEngine, RecognitionSession, SessionOptions};
use super::event::{
    ErrorEvent, EventKind, RecognitionErrorKind, RecognitionEvent, RecognitionResult, ResultEvent,
};

const DEFAULT_LANG: &str = "en-US";

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsSpeechEngine;

impl RecognitionEngine for WindowsSpeechEngine {
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
        Ok(Arc::new(WindowsSpeechSession {
            options: options.clone(),
            handlers: Arc::new(HandlerTable::new()),
            recognizer: Mutex::new(None),
            started: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "windows-speech"
    }
}

pub struct WindowsSpeechSession {
    options: SessionOptions,
    handlers: Arc<HandlerTable>,
    recognizer: Mutex<Option<WinSpeechRecognizer>>,
    started: AtomicBool,
}

/// Finalized results so far, shared between the result and hypothesis handlers
type Finals = Arc<Mutex<Vec<RecognitionResult>>>;

fn emit_results(handlers: &HandlerTable, finals: &Finals, latest: RecognitionResult) {
    let Ok(mut finals) = finals.lock() else {
        return;
    };
    let result_index = finals.len();
    let mut results = finals.clone();
    results.push(latest.clone());
    if latest.is_final {
        finals.push(latest);
    }
    drop(finals);
    handlers.emit(RecognitionEvent::Result(ResultEvent { result_index, results }));
}

fn completion_error(status: SpeechRecognitionResultStatus) -> Option<RecognitionErrorKind> {
    match status {
        SpeechRecognitionResultStatus::Success => None,
        SpeechRecognitionResultStatus::UserCanceled => Some(RecognitionErrorKind::Aborted),
        SpeechRecognitionResultStatus::TimeoutExceeded
        | SpeechRecognitionResultStatus::PauseLimitExceeded => Some(RecognitionErrorKind::NoSpeech),
        SpeechRecognitionResultStatus::NetworkFailure => Some(RecognitionErrorKind::Network),
        SpeechRecognitionResultStatus::MicrophoneUnavailable => {
            Some(RecognitionErrorKind::AudioCapture)
        }
        SpeechRecognitionResultStatus::TopicLanguageNotSupported
        | SpeechRecognitionResultStatus::GrammarLanguageMismatch => {
            Some(RecognitionErrorKind::LanguageNotSupported)
        }
        SpeechRecognitionResultStatus::GrammarCompilationFailure => {
            Some(RecognitionErrorKind::BadGrammar)
        }
        other => Some(RecognitionErrorKind::Other(format!("status-{}", other.0))),
    }
}

impl RecognitionSession for WindowsSpeechSession {
    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.set(kind, handler);
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("Recognition has already started");
        }

        let lang = self.options.lang.as_deref().unwrap_or(DEFAULT_LANG);
        let language = Language::CreateLanguage(&HSTRING::from(lang))
            .map_err(|e| anyhow!("Failed to create language: {}", e))?;
        let recognizer = WinSpeechRecognizer::Create(&language)
            .map_err(|e| anyhow!("Failed to create speech recognizer: {}", e))?;

        // Compile the default dictation grammar
        recognizer
            .CompileConstraintsAsync()
            .map_err(|e| anyhow!("Failed to compile constraints: {}", e))?
            .get()
            .map_err(|e| anyhow!("Failed to compile grammar: {}", e))?;

        let session = recognizer
            .ContinuousRecognitionSession()
            .map_err(|e| anyhow!("Failed to get recognition session: {}", e))?;

        let finals: Finals = Arc::new(Mutex::new(Vec::new()));

        // Final results
        let handlers = Arc::clone(&self.handlers);
        let finals_for_result = Arc::clone(&finals);
        let result_handler = TypedEventHandler::new(
            move |_sender: &Option<_>,
                  args: &Option<SpeechContinuousRecognitionResultGeneratedEventArgs>| {
                if let Some(args) = args {
                    let result = args.Result()?;
                    let text = result.Text()?.to_string();
                    if text.is_empty() {
                        handlers.emit(RecognitionEvent::NoMatch(ResultEvent {
                            result_index: 0,
                            results: Vec::new(),
                        }));
                    } else {
                        let confidence = result.RawConfidence().unwrap_or(0.0) as f32;
                        emit_results(
                            &handlers,
                            &finals_for_result,
                            RecognitionResult::new(text, confidence, true),
                        );
                    }
                }
                Ok(())
            },
        );
        session
            .ResultGenerated(&result_handler)
            .map_err(|e| anyhow!("Failed to register result handler: {}", e))?;

        // Interim hypotheses
        if self.options.interim_results {
            let handlers = Arc::clone(&self.handlers);
            let finals_for_hypothesis = Arc::clone(&finals);
            let hypothesis_handler = TypedEventHandler::new(
                move |_sender: &Option<_>,
                      args: &Option<SpeechRecognitionHypothesisGeneratedEventArgs>| {
                    if let Some(args) = args {
                        let text = args.Hypothesis()?.Text()?.to_string();
                        if !text.is_empty() {
                            emit_results(
                                &handlers,
                                &finals_for_hypothesis,
                                RecognitionResult::new(text, 0.0, false),
                            );
                        }
                    }
                    Ok(())
                },
            );
            recognizer
                .HypothesisGenerated(&hypothesis_handler)
                .map_err(|e| anyhow!("Failed to register hypothesis handler: {}", e))?;
        }

        // Completion: continuous sessions end on timeout, error or stop
        let handlers = Arc::clone(&self.handlers);
        let completed_handler = TypedEventHandler::new(
            move |_sender: &Option<_>,
                  args: &Option<SpeechContinuousRecognitionCompletedEventArgs>| {
                if let Some(args) = args {
                    if let Some(kind) = completion_error(args.Status()?) {
                        handlers.emit(RecognitionEvent::Error(ErrorEvent::new(
                            kind,
                            "continuous recognition completed abnormally",
                        )));
                    }
                }
                handlers.emit_status(EventKind::AudioEnd);
                handlers.emit_status(EventKind::End);
                Ok(())
            },
        );
        session
            .Completed(&completed_handler)
            .map_err(|e| anyhow!("Failed to register completion handler: {}", e))?;

        session
            .StartAsync()
            .map_err(|e| anyhow!("Failed to start recognition: {}", e))?
            .get()
            .map_err(|e| anyhow!("Failed to start recognition session: {}", e))?;

        if let Ok(mut slot) = self.recognizer.lock() {
            *slot = Some(recognizer);
        }

        self.handlers.emit_status(EventKind::Start);
        self.handlers.emit_status(EventKind::AudioStart);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let recognizer = match self.recognizer.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        if let Some(recognizer) = recognizer {
            // Only a capturing recognizer can be stopped
            if let Ok(state) = recognizer.State() {
                if state == SpeechRecognizerState::Capturing
                    || state == SpeechRecognizerState::SoundStarted
                    || state == SpeechRecognizerState::SpeechDetected
                {
                    recognizer
                        .ContinuousRecognitionSession()
                        .and_then(|session| session.StopAsync())
                        .and_then(|op| op.get())
                        .map_err(|e| anyhow!("Failed to stop recognition session: {}", e))?;
                }
            }
        }
        Ok(())
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }
}
