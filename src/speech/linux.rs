//! Linux speech recognition using Vosk offline speech recognition.
//!
//! Requires a Vosk model to be downloaded and available. The model path
//! can be configured via:
//! 1. `VOSK_MODEL_PATH` environment variable
//! 2. `~/.local/share/vosk/model` (default)
//!
//! Vosk models are single-language, so the session language tag is
//! informational only.
//!
//! Download models from: https://alphacephei.com/vosk/models

use std::env;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, warn};
use vosk::{DecodingState, Model, Recognizer};

use super::engine::{EventHandler, HandlerTable, RecognitionEngine, RecognitionSession, SessionOptions};
use super::event::{
    ErrorEvent, EventKind, RecognitionErrorKind, RecognitionEvent, RecognitionResult, ResultEvent,
};

#[derive(Debug, Clone)]
pub struct VoskEngine {
    model_path: PathBuf,
}

impl VoskEngine {
    /// Locate the model; fails when no model is installed.
    pub fn from_env() -> Result<Self> {
        let model_path = Self::get_model_path()?;
        if !model_path.exists() {
            return Err(anyhow!(
                "Vosk model not found at: {}\n\
                 Download a model from https://alphacephei.com/vosk/models\n\
                 and extract it to ~/.local/share/vosk/model\n\
                 or set VOSK_MODEL_PATH environment variable",
                model_path.display()
            ));
        }
        Ok(Self { model_path })
    }

    fn get_model_path() -> Result<PathBuf> {
        if let Ok(path) = env::var("VOSK_MODEL_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = env::var("HOME").map_err(|_| anyhow!("HOME environment variable not set"))?;
        Ok(PathBuf::from(home).join(".local/share/vosk/model"))
    }
}

impl RecognitionEngine for VoskEngine {
    fn create_session(&self, options: &SessionOptions) -> Result<Arc<dyn RecognitionSession>> {
        Ok(Arc::new(VoskSession {
            options: options.clone(),
            model_path: self.model_path.clone(),
            handlers: Arc::new(HandlerTable::new()),
            started: AtomicBool::new(false),
            stop_signal: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn name(&self) -> &str {
        "vosk"
    }
}

pub struct VoskSession {
    options: SessionOptions,
    model_path: PathBuf,
    handlers: Arc<HandlerTable>,
    started: AtomicBool,
    stop_signal: Arc<AtomicBool>,
}

impl RecognitionSession for VoskSession {
    fn set_handler(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.set(kind, handler);
    }

    fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("Recognition has already started");
        }
        self.stop_signal.store(false, Ordering::SeqCst);

        let model_path = self.model_path.clone();
        let options = self.options.clone();
        let handlers = Arc::clone(&self.handlers);
        let stop_signal = Arc::clone(&self.stop_signal);

        // Spawn audio capture thread
        thread::spawn(move || {
            handlers.emit_status(EventKind::Start);
            if let Err(e) = run_recognition(model_path, &options, &handlers, &stop_signal) {
                warn!("Speech recognition error: {}", e);
                handlers.emit(RecognitionEvent::Error(ErrorEvent::new(
                    RecognitionErrorKind::AudioCapture,
                    e.to_string(),
                )));
            }
            handlers.emit_status(EventKind::AudioEnd);
            handlers.emit_status(EventKind::End);
        });

        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stop_signal.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl Drop for VoskSession {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }
}

fn emit_results(handlers: &HandlerTable, finals: &mut Vec<RecognitionResult>, latest: RecognitionResult) {
    let result_index = finals.len();
    let mut results = finals.clone();
    results.push(latest.clone());
    if latest.is_final {
        finals.push(latest);
    }
    handlers.emit(RecognitionEvent::Result(ResultEvent { result_index, results }));
}

fn run_recognition(
    model_path: PathBuf,
    options: &SessionOptions,
    handlers: &HandlerTable,
    stop_signal: &AtomicBool,
) -> Result<()> {
    let model = Model::new(model_path.to_string_lossy())
        .ok_or_else(|| anyhow!("Failed to load Vosk model from {}", model_path.display()))?;

    // Set up audio capture
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    let config = device.default_input_config()?;
    let sample_rate = config.sample_rate().0 as f32;
    let channels = config.channels() as usize;

    let mut recognizer =
        Recognizer::new(&model, sample_rate).ok_or_else(|| anyhow!("Failed to create Vosk recognizer"))?;
    recognizer.set_words(true);
    recognizer.set_partial_words(true);

    let audio_buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let audio_buffer_for_callback = Arc::clone(&audio_buffer);

    let stream = device.build_input_stream(
        &config.into(),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            // Average channels to mono, convert to i16
            let samples: Vec<i16> = data
                .chunks(channels)
                .map(|frame| {
                    let sum: f32 = frame.iter().sum();
                    let mono = sum / channels as f32;
                    (mono * 32767.0) as i16
                })
                .collect();

            if let Ok(mut buffer) = audio_buffer_for_callback.lock() {
                buffer.extend(samples);
            }
        },
        |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;

    stream.play()?;
    handlers.emit_status(EventKind::AudioStart);
    debug!(sample_rate, channels, "Vosk capture running");

    let mut finals: Vec<RecognitionResult> = Vec::new();
    let mut last_partial = String::new();
    let mut in_speech = false;

    while !stop_signal.load(Ordering::SeqCst) {
        let samples: Vec<i16> = match audio_buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => bail!("audio buffer poisoned"),
        };

        if !samples.is_empty() {
            let state = recognizer
                .accept_waveform(&samples)
                .map_err(|e| anyhow!("Vosk rejected audio: {:?}", e))?;

            match state {
                DecodingState::Finalized => {
                    let text = recognizer
                        .result()
                        .single()
                        .map(|r| r.text.to_string())
                        .unwrap_or_default();
                    if text.is_empty() {
                        handlers.emit(RecognitionEvent::NoMatch(ResultEvent {
                            result_index: finals.len(),
                            results: finals.clone(),
                        }));
                    } else {
                        emit_results(handlers, &mut finals, RecognitionResult::new(text, 1.0, true));
                    }
                    if in_speech {
                        handlers.emit_status(EventKind::SpeechEnd);
                        handlers.emit_status(EventKind::SoundEnd);
                        in_speech = false;
                    }
                    last_partial.clear();
                    if !options.continuous {
                        break;
                    }
                }
                _ => {
                    let partial = recognizer.partial_result().partial.to_string();
                    if !partial.is_empty() && partial != last_partial {
                        if !in_speech {
                            handlers.emit_status(EventKind::SoundStart);
                            handlers.emit_status(EventKind::SpeechStart);
                            in_speech = true;
                        }
                        if options.interim_results {
                            emit_results(
                                handlers,
                                &mut finals,
                                RecognitionResult::new(partial.clone(), 0.0, false),
                            );
                        }
                        last_partial = partial;
                    }
                }
            }
        }

        // Small sleep to avoid busy-waiting
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);

    // Flush whatever is still buffered in the recognizer
    if let Some(result) = recognizer.final_result().single() {
        if !result.text.is_empty() {
            emit_results(handlers, &mut finals, RecognitionResult::new(result.text, 1.0, true));
        }
    }
    if in_speech {
        handlers.emit_status(EventKind::SpeechEnd);
        handlers.emit_status(EventKind::SoundEnd);
    }

    Ok(())
}
