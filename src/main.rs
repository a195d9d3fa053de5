//! speech-relay - live speech recognition status in the terminal
//!
//! Listens via the platform recognition engine, mirrors each event into an
//! inline status display and prints the last transcript on exit.

use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use termwiz::caps::Capabilities;
use termwiz::input::{InputEvent, KeyCode, KeyEvent, Modifiers};
use termwiz::terminal::{new_terminal, Terminal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use speech_relay::display::{self, DisplayState, RenderState, INTERIM_PREFIX};
use speech_relay::{
    AdapterError, CapabilityProvider, DemoProvider, PlatformProvider, RecognitionAdapter,
    RecognitionConfig,
};

const TICK: Duration = Duration::from_millis(33); // ~30 FPS

#[derive(Debug, Parser)]
#[command(name = "speech-relay", version, about = "Continuous speech recognition status display")]
struct Args {
    /// Configuration file (toml, json or yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recognition language tag, e.g. en-US
    #[arg(long)]
    lang: Option<String>,

    /// Restart the session after errors and final results
    #[arg(long)]
    auto_restart: bool,

    /// Delay before an automatic restart
    #[arg(long, value_name = "MS")]
    restart_delay_ms: Option<u64>,

    /// Also restart when the engine stops hearing sound
    #[arg(long)]
    restart_on_sound_end: bool,

    /// Only report final results
    #[arg(long)]
    no_interim: bool,

    /// Stop after the first utterance
    #[arg(long)]
    single: bool,

    /// Use the scripted demo engine instead of the platform engine
    #[arg(long)]
    demo: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(&self, config: &mut RecognitionConfig) {
        if let Some(lang) = &self.lang {
            config.lang = lang.clone();
        }
        if self.auto_restart {
            config.restart.auto_restart = true;
        }
        if let Some(delay) = self.restart_delay_ms {
            config.restart.delay_ms = delay;
        }
        if self.restart_on_sound_end {
            config.restart.on_sound_end = true;
        }
        if self.no_interim {
            config.interim_results = false;
        }
        if self.single {
            config.continuous = false;
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = RecognitionConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    info!(?config, "configuration loaded");

    let state = Arc::new(Mutex::new(DisplayState::default()));
    let listener = display::display_listener(Arc::clone(&state));

    let provider: &dyn CapabilityProvider = if args.demo { &DemoProvider } else { &PlatformProvider };

    let caps = Capabilities::new_from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut term = new_terminal(caps).map_err(|e| anyhow::anyhow!("{}", e))?;

    let adapter = match RecognitionAdapter::new(listener, provider, config) {
        Ok(adapter) => adapter,
        Err(e @ AdapterError::UnsupportedCapability) => {
            // Show the raw message in the error element
            if let Ok(mut s) = state.lock() {
                s.error_state = e.to_string();
            }
            let snapshot = state.lock().map(|s| s.clone()).unwrap_or_default();
            let mut render_state = RenderState::default();
            display::render(&mut term, &mut render_state, &snapshot)?;
            display::release(&mut term, render_state.rendered_lines)?;
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = adapter.init_recognition().and_then(|_| adapter.start()) {
        eprintln!("Failed to start speech recognition: {}", e);
        eprintln!("Make sure you have granted microphone and speech recognition permissions.");
        process::exit(1);
    }

    let exit_code = run_display(&mut term, &adapter, &state)?;

    adapter.cancel_pending_restart();
    if let Err(e) = adapter.stop() {
        error!("Failed to stop recognition: {}", e);
    }

    if exit_code == 0 {
        let transcript = state
            .lock()
            .map(|s| s.interim.trim_start_matches(INTERIM_PREFIX).to_string())
            .unwrap_or_default();
        if !transcript.is_empty() {
            println!("{}", transcript);
        }
    }
    process::exit(exit_code);
}

/// Render until the user finishes or cancels; returns the exit code.
fn run_display(
    term: &mut impl Terminal,
    adapter: &RecognitionAdapter,
    state: &Arc<Mutex<DisplayState>>,
) -> Result<i32> {
    term.set_raw_mode().map_err(|e| anyhow::anyhow!("{}", e))?;
    display::hide_cursor(term)?;

    let mut render_state = RenderState::default();
    let exit_code = loop {
        let snapshot = state.lock().map(|s| s.clone()).unwrap_or_default();
        display::render(term, &mut render_state, &snapshot)?;

        let event = term.poll_input(Some(TICK)).map_err(|e| anyhow::anyhow!("{}", e))?;
        match event {
            Some(InputEvent::Key(KeyEvent {
                key: KeyCode::Enter,
                ..
            })) => break 0,
            Some(InputEvent::Key(KeyEvent {
                key: KeyCode::Char('c'),
                modifiers,
            })) if modifiers.contains(Modifiers::CTRL) => break 130, // Standard Ctrl+C exit code
            Some(InputEvent::Key(KeyEvent {
                key: KeyCode::Char('r'),
                modifiers,
            })) if modifiers.contains(Modifiers::CTRL) => {
                // Restart with a fresh recognition session
                if let Err(e) = adapter.restart(Duration::ZERO) {
                    error!("Failed to restart: {}", e);
                    if let Ok(mut s) = state.lock() {
                        s.error_state = e.to_string();
                    }
                }
            }
            _ => {}
        }
    };

    display::cleanup(term, render_state.rendered_lines)?;
    term.set_cooked_mode().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(exit_code)
}
