//! Status display mirroring recognition events, rendered with termwiz
//!
//! Three display elements: the last error, the last recognition state and
//! the latest transcript. Rendering is inline and works with piped stdout
//! because termwiz uses /dev/tty on Unix and CONIN$/CONOUT$ on Windows.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use termwiz::cell::AttributeChange;
use termwiz::color::ColorAttribute;
use termwiz::surface::{Change, CursorVisibility, Position};
use termwiz::terminal::Terminal;
use tracing::debug;

use crate::speech::{EventKind, ListenerConfig};

/// Prefix marking a transcript the engine may still revise
pub const INTERIM_PREFIX: &str = "[interim] ";

/// Contents of the three display elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub error_state: String,
    pub reco_state: String,
    pub interim: String,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            error_state: "None".to_string(),
            reco_state: String::new(),
            interim: String::new(),
        }
    }
}

/// Listener that mirrors events into `state`.
pub fn display_listener(state: Arc<Mutex<DisplayState>>) -> ListenerConfig {
    let update = move |f: &dyn Fn(&mut DisplayState)| {
        if let Ok(mut state) = state.lock() {
            f(&mut *state);
        }
    };
    let update = Arc::new(update);

    let mut listener = ListenerConfig::new();
    for kind in [
        EventKind::AudioStart,
        EventKind::AudioEnd,
        EventKind::SoundStart,
        EventKind::SoundEnd,
        EventKind::SpeechStart,
        EventKind::SpeechEnd,
    ] {
        listener = listener.on_status(kind, move |_| debug!("on{}", kind.name()));
    }

    let u = Arc::clone(&update);
    listener = listener.on_start(move |_| {
        u(&|s: &mut DisplayState| {
            s.error_state = "None".to_string();
            s.reco_state = "onStart".to_string();
        })
    });

    let u = Arc::clone(&update);
    listener = listener.on_end(move |_| u(&|s: &mut DisplayState| s.reco_state = "onEnd".to_string()));

    let u = Arc::clone(&update);
    listener = listener.on_result(move |ev| {
        u(&|s: &mut DisplayState| {
            s.reco_state = "onResult".to_string();
            for result in ev.changed() {
                s.interim = if result.is_final {
                    result.transcript().to_string()
                } else {
                    format!("{}{}", INTERIM_PREFIX, result.transcript())
                };
            }
        })
    });

    listener = listener.on_no_match(|_| debug!("onnomatch"));

    let u = Arc::clone(&update);
    listener.on_error(move |ev| {
        u(&|s: &mut DisplayState| {
            s.error_state = ev.error.to_string();
            s.reco_state = "onError".to_string();
        })
    })
}

/// Styled text segment
struct Segment {
    text: String,
    color: ColorAttribute,
}

impl Segment {
    fn new(text: impl Into<String>, color: ColorAttribute) -> Self {
        Self { text: text.into(), color }
    }
}

/// Render state for the display
#[derive(Default)]
pub struct RenderState {
    pub rendered_lines: usize,
}

/// Hide cursor for rendering
pub fn hide_cursor(term: &mut dyn Terminal) -> Result<()> {
    term.render(&[Change::CursorVisibility(CursorVisibility::Hidden)])
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

/// Show cursor (for cleanup)
pub fn show_cursor(term: &mut dyn Terminal) -> Result<()> {
    term.render(&[Change::CursorVisibility(CursorVisibility::Visible)])
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

/// Render the display inline at current cursor position
pub fn render(term: &mut dyn Terminal, state: &mut RenderState, display: &DisplayState) -> Result<()> {
    let mut changes = Vec::new();

    // Move cursor up to start of our rendering area
    if state.rendered_lines > 0 {
        changes.push(Change::CursorPosition {
            x: Position::Absolute(0),
            y: Position::Relative(-(state.rendered_lines as isize)),
        });
    }

    let lines = build_lines(display);
    for line in &lines {
        changes.push(Change::ClearToEndOfLine(Default::default()));

        for seg in line {
            changes.push(Change::Attribute(AttributeChange::Foreground(seg.color)));
            changes.push(Change::Text(seg.text.clone()));
        }

        changes.push(Change::Attribute(AttributeChange::Foreground(ColorAttribute::Default)));
        changes.push(Change::Text("\r\n".to_string()));
    }

    state.rendered_lines = lines.len();

    // Move cursor back to start for next frame
    changes.push(Change::CursorPosition {
        x: Position::Absolute(0),
        y: Position::Relative(-(state.rendered_lines as isize)),
    });

    term.render(&changes).map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

/// Move the cursor below the rendered lines so they stay on screen
pub fn release(term: &mut dyn Terminal, lines: usize) -> Result<()> {
    term.render(&release_changes(lines))
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}

fn release_changes(lines: usize) -> Vec<Change> {
    if lines == 0 {
        return Vec::new();
    }
    vec![Change::CursorPosition {
        x: Position::Absolute(0),
        y: Position::Relative(lines as isize),
    }]
}

/// Clear rendered lines on exit
pub fn cleanup(term: &mut dyn Terminal, lines: usize) -> Result<()> {
    let mut changes = Vec::new();

    for _ in 0..lines {
        changes.push(Change::ClearToEndOfLine(Default::default()));
        changes.push(Change::CursorPosition {
            x: Position::Absolute(0),
            y: Position::Relative(1),
        });
    }

    if lines > 0 {
        changes.push(Change::CursorPosition {
            x: Position::Absolute(0),
            y: Position::Relative(-(lines as isize)),
        });
    }

    term.render(&changes).map_err(|e| anyhow::anyhow!("{}", e))?;
    show_cursor(term)?;
    Ok(())
}

fn build_lines(display: &DisplayState) -> Vec<Vec<Segment>> {
    let label = ColorAttribute::PaletteIndex(8);
    let error_color = if display.error_state == "None" {
        ColorAttribute::PaletteIndex(2)
    } else {
        ColorAttribute::PaletteIndex(1)
    };
    let transcript_color = if display.interim.starts_with(INTERIM_PREFIX) {
        ColorAttribute::TrueColorWithDefaultFallback(
            termwiz::color::SrgbaTuple(120.0 / 255.0, 160.0 / 255.0, 180.0 / 255.0, 1.0).into(),
        )
    } else {
        ColorAttribute::Default
    };

    vec![
        vec![
            Segment::new("error  ", label),
            Segment::new(display.error_state.as_str(), error_color),
        ],
        vec![
            Segment::new("state  ", label),
            Segment::new(display.reco_state.as_str(), ColorAttribute::PaletteIndex(4)),
        ],
        vec![
            Segment::new("text   ", label),
            Segment::new(display.interim.as_str(), transcript_color),
        ],
        vec![
            Segment::new("Enter", ColorAttribute::PaletteIndex(3)),
            Segment::new(" finish • ", label),
            Segment::new("Ctrl+R", ColorAttribute::PaletteIndex(4)),
            Segment::new(" restart • ", label),
            Segment::new("Ctrl+C", ColorAttribute::PaletteIndex(1)),
            Segment::new(" cancel", label),
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{
        ErrorEvent, RecognitionErrorKind, RecognitionResult, ResultEvent, StatusEvent,
    };

    fn setup() -> (Arc<Mutex<DisplayState>>, ListenerConfig) {
        let state = Arc::new(Mutex::new(DisplayState::default()));
        let listener = display_listener(Arc::clone(&state));
        (state, listener)
    }

    #[test]
    fn test_display_listener_fills_every_slot() {
        let (_, listener) = setup();
        assert_eq!(listener.registered_kinds().len(), 11);
    }

    #[test]
    fn test_interim_and_final_transcripts() {
        let (state, listener) = setup();
        let on_result = listener.on_result.unwrap();

        on_result(&ResultEvent {
            result_index: 0,
            results: vec![RecognitionResult::new("hel", 0.3, false)],
        });
        assert_eq!(state.lock().unwrap().interim, "[interim] hel");
        assert_eq!(state.lock().unwrap().reco_state, "onResult");

        on_result(&ResultEvent {
            result_index: 0,
            results: vec![RecognitionResult::new("hello", 0.9, true)],
        });
        assert_eq!(state.lock().unwrap().interim, "hello");
    }

    #[test]
    fn test_error_then_start_resets_error_state() {
        let (state, listener) = setup();

        (listener.on_error.unwrap())(&ErrorEvent::new(RecognitionErrorKind::NoSpeech, ""));
        {
            let s = state.lock().unwrap();
            assert_eq!(s.error_state, "no-speech");
            assert_eq!(s.reco_state, "onError");
        }

        (listener.on_start.unwrap())(&StatusEvent::new(EventKind::Start));
        let s = state.lock().unwrap();
        assert_eq!(s.error_state, "None");
        assert_eq!(s.reco_state, "onStart");
    }

    #[test]
    fn test_end_sets_state() {
        let (state, listener) = setup();
        (listener.on_end.unwrap())(&StatusEvent::new(EventKind::End));
        assert_eq!(state.lock().unwrap().reco_state, "onEnd");
    }

    #[test]
    fn test_release_moves_below_rendered_lines() {
        assert!(release_changes(0).is_empty());

        let changes = release_changes(4);
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0],
            Change::CursorPosition {
                x: Position::Absolute(0),
                y: Position::Relative(4),
            }
        ));
    }

    #[test]
    fn test_build_lines_has_three_elements_and_controls() {
        let lines = build_lines(&DisplayState::default());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0][1].text, "None");
    }
}
