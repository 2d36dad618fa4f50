use crate::model::{
    Canvas, OutcomeSummary, RenderButton, StatusSnapshot, StudioEvent, MAX_CANVAS_SIDE,
};
use crate::orchestrator::UiCommand;
use crate::variation;
use crossterm::event::{KeyCode, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    /// Size entry as `WIDTHxHEIGHT`.
    Size { input: String },
    /// Variation entry as a letter code.
    Variation { input: String },
    ConfirmClose,
}

/// Owned by the UI thread only; updated from controller events.
#[derive(Debug)]
pub struct UiState {
    pub info: String,
    pub button: RenderButton,
    pub busy: bool,
    pub status: Option<StatusSnapshot>,
    pub frame: u8,
    pub progress: Option<u8>,
    pub variation_code: String,
    pub last_summary: Option<OutcomeSummary>,
    pub canvas: Option<Canvas>,
    /// Preferences changed since launch.
    pub modified: bool,
    pub dialog: Option<Dialog>,
    pub show_help: bool,
    pub closed: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            info: "Press r to render, ? for help".into(),
            button: RenderButton::Render,
            busy: false,
            status: None,
            frame: 0,
            progress: None,
            variation_code: String::new(),
            last_summary: None,
            canvas: None,
            modified: false,
            dialog: None,
            show_help: false,
            closed: false,
        }
    }
}

impl UiState {
    pub fn apply_event(&mut self, ev: StudioEvent) {
        match ev {
            StudioEvent::JobStarted { params, .. } => {
                self.busy = true;
                self.status = None;
                self.progress = None;
                self.variation_code = variation::to_code(params.variation);
                self.info = format!(
                    "{:?} {} x {}, variation {}",
                    params.action, params.width, params.height, self.variation_code
                );
            }
            StudioEvent::Status {
                snapshot,
                button,
                frame,
                progress,
            } => {
                self.status = Some(snapshot);
                self.button = button;
                self.frame = frame;
                self.progress = progress;
            }
            StudioEvent::JobFinished {
                summary, canvas, ..
            } => {
                self.busy = false;
                self.progress = None;
                if let Some(canvas) = canvas {
                    self.canvas = Some(canvas);
                }
                self.last_summary = Some(*summary);
            }
            StudioEvent::Button(button) => {
                self.button = button;
                self.busy = button != RenderButton::Render;
            }
            StudioEvent::Info(info) => self.info = info.to_message(),
            StudioEvent::SizeDialogRequested { width, height } => {
                self.dialog = Some(Dialog::Size {
                    input: format!("{width}x{height}"),
                });
            }
            StudioEvent::CloseConfirmation => self.dialog = Some(Dialog::ConfirmClose),
            StudioEvent::WindowClosed | StudioEvent::ApplicationExited => self.closed = true,
        }
    }

    /// Map a key press to a controller command, updating dialog state on the way.
    pub fn key_command(&mut self, modifiers: KeyModifiers, code: KeyCode) -> Option<UiCommand> {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Some(UiCommand::Exit {
                unsaved: self.modified,
            });
        }
        match self.dialog.take() {
            Some(Dialog::Size { input }) => self.size_dialog_key(input, code),
            Some(Dialog::Variation { input }) => self.variation_dialog_key(input, code),
            Some(Dialog::ConfirmClose) => self.confirm_key(code),
            None => self.main_key(code),
        }
    }

    fn size_dialog_key(&mut self, mut input: String, code: KeyCode) -> Option<UiCommand> {
        match code {
            KeyCode::Enter => match parse_size(&input) {
                Some((width, height)) => {
                    self.modified = true;
                    return Some(UiCommand::RenderSized { width, height });
                }
                None => {
                    self.info = format!("'{input}' is not a size; use WIDTHxHEIGHT");
                }
            },
            KeyCode::Esc => return None,
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == 'x' => input.push(c),
            _ => {}
        }
        self.dialog = Some(Dialog::Size { input });
        None
    }

    fn variation_dialog_key(&mut self, mut input: String, code: KeyCode) -> Option<UiCommand> {
        match code {
            KeyCode::Enter => match variation::from_code(&input) {
                Some(v) => return Some(UiCommand::SetVariation(v)),
                None => {
                    self.info = format!(
                        "'{input}' is not a variation; use 1 to {} letters",
                        variation::MAX_LETTERS
                    );
                }
            },
            KeyCode::Esc => return None,
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) if c.is_ascii_alphabetic() && input.len() < variation::MAX_LETTERS => {
                input.push(c.to_ascii_uppercase());
            }
            _ => {}
        }
        self.dialog = Some(Dialog::Variation { input });
        None
    }

    fn confirm_key(&mut self, code: KeyCode) -> Option<UiCommand> {
        match code {
            KeyCode::Char('y') => {
                self.modified = false;
                Some(UiCommand::ConfirmClose { save: true })
            }
            KeyCode::Char('n') => Some(UiCommand::ConfirmClose { save: false }),
            KeyCode::Char('c') | KeyCode::Esc => Some(UiCommand::CancelClose),
            _ => {
                self.dialog = Some(Dialog::ConfirmClose);
                None
            }
        }
    }

    fn main_key(&mut self, code: KeyCode) -> Option<UiCommand> {
        if self.show_help {
            self.show_help = false;
            return None;
        }
        let cmd = match code {
            KeyCode::Char('r') => UiCommand::Render,
            KeyCode::Char('a') => UiCommand::RenderAgain,
            KeyCode::Char('s') => UiCommand::OpenSizeDialog,
            KeyCode::Char(' ') | KeyCode::Enter => UiCommand::RenderButton,
            KeyCode::Char('x') => UiCommand::Stop,
            KeyCode::Char('i') => UiCommand::SaveImage { path: None },
            KeyCode::Char('v') => UiCommand::SaveVector { path: None },
            KeyCode::Char('m') => UiCommand::SaveMovie { path: None },
            KeyCode::Char('n') | KeyCode::Right => UiCommand::NextVariation,
            KeyCode::Char('p') | KeyCode::Left => UiCommand::PrevVariation,
            KeyCode::Char('e') => {
                self.dialog = Some(Dialog::Variation {
                    input: self.variation_code.clone(),
                });
                return None;
            }
            KeyCode::Char('q') => UiCommand::Close {
                unsaved: self.modified,
            },
            KeyCode::Char('Q') => UiCommand::Exit {
                unsaved: self.modified,
            },
            KeyCode::Char('?') => {
                self.show_help = true;
                return None;
            }
            _ => return None,
        };
        Some(cmd)
    }

    /// Spinner glyph for the poller's busy frame.
    pub fn spinner(&self) -> char {
        const FRAMES: [char; 8] = ['⠁', '⠂', '⠄', '⡀', '⢀', '⠠', '⠐', '⠈'];
        FRAMES[(self.frame.max(1) as usize - 1) % FRAMES.len()]
    }
}

fn parse_size(input: &str) -> Option<(u32, u32)> {
    let (w, h) = input.split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    let sides = 1..=MAX_CANVAS_SIDE;
    (sides.contains(&w) && sides.contains(&h)).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InfoEvent, JobParameters};

    fn press(state: &mut UiState, code: KeyCode) -> Option<UiCommand> {
        state.key_command(KeyModifiers::NONE, code)
    }

    #[test]
    fn size_dialog_edits_and_submits() {
        let mut state = UiState::default();
        state.apply_event(StudioEvent::SizeDialogRequested {
            width: 10,
            height: 20,
        });
        press(&mut state, KeyCode::Backspace);
        press(&mut state, KeyCode::Char('5'));
        assert_eq!(
            state.dialog,
            Some(Dialog::Size {
                input: "10x25".into()
            })
        );
        let cmd = press(&mut state, KeyCode::Enter);
        assert!(matches!(
            cmd,
            Some(UiCommand::RenderSized {
                width: 10,
                height: 25
            })
        ));
        assert!(state.dialog.is_none());
        assert!(state.modified);
    }

    #[test]
    fn invalid_size_keeps_dialog_open() {
        let mut state = UiState {
            dialog: Some(Dialog::Size { input: "0x".into() }),
            ..Default::default()
        };
        assert!(press(&mut state, KeyCode::Enter).is_none());
        assert!(state.dialog.is_some());
    }

    #[test]
    fn oversized_canvas_is_refused() {
        assert_eq!(parse_size("16384x2"), Some((16_384, 2)));
        assert_eq!(parse_size("16385x2"), None);
        assert_eq!(parse_size("100000x100000"), None);
    }

    #[test]
    fn variation_dialog_sets_the_typed_code() {
        let mut state = UiState {
            variation_code: "ABC".into(),
            ..Default::default()
        };
        assert!(press(&mut state, KeyCode::Char('e')).is_none());
        assert_eq!(
            state.dialog,
            Some(Dialog::Variation {
                input: "ABC".into()
            })
        );
        press(&mut state, KeyCode::Backspace);
        press(&mut state, KeyCode::Backspace);
        press(&mut state, KeyCode::Char('7'));
        press(&mut state, KeyCode::Char('a'));
        assert_eq!(
            state.dialog,
            Some(Dialog::Variation { input: "AA".into() })
        );
        assert!(matches!(
            press(&mut state, KeyCode::Enter),
            Some(UiCommand::SetVariation(27))
        ));
        assert!(state.dialog.is_none());
    }

    #[test]
    fn empty_variation_keeps_dialog_open() {
        let mut state = UiState {
            dialog: Some(Dialog::Variation {
                input: String::new(),
            }),
            ..Default::default()
        };
        assert!(press(&mut state, KeyCode::Enter).is_none());
        assert!(state.dialog.is_some());
        assert!(press(&mut state, KeyCode::Esc).is_none());
        assert!(state.dialog.is_none());
    }

    #[test]
    fn close_confirmation_answers() {
        let mut state = UiState {
            modified: true,
            ..Default::default()
        };
        assert!(matches!(
            press(&mut state, KeyCode::Char('q')),
            Some(UiCommand::Close { unsaved: true })
        ));
        state.apply_event(StudioEvent::CloseConfirmation);
        assert!(press(&mut state, KeyCode::Char('z')).is_none());
        assert_eq!(state.dialog, Some(Dialog::ConfirmClose));
        assert!(matches!(
            press(&mut state, KeyCode::Char('y')),
            Some(UiCommand::ConfirmClose { save: true })
        ));
        assert!(!state.modified);
    }

    #[test]
    fn events_track_job_state() {
        let mut state = UiState::default();
        state.apply_event(StudioEvent::JobStarted {
            job_id: 1,
            params: JobParameters {
                variation: 27,
                ..Default::default()
            },
        });
        assert!(state.busy);
        assert_eq!(state.variation_code, "AA");

        state.apply_event(StudioEvent::Button(RenderButton::StopNow));
        assert!(state.busy);
        state.apply_event(StudioEvent::Info(InfoEvent::Stopped));
        assert_eq!(state.info, "Render stopped.");
        state.apply_event(StudioEvent::Button(RenderButton::Render));
        assert!(!state.busy);

        state.apply_event(StudioEvent::WindowClosed);
        assert!(state.closed);
    }

    #[test]
    fn help_is_dismissed_by_any_key() {
        let mut state = UiState::default();
        assert!(press(&mut state, KeyCode::Char('?')).is_none());
        assert!(state.show_help);
        assert!(press(&mut state, KeyCode::Char('r')).is_none());
        assert!(!state.show_help);
        assert!(matches!(press(&mut state, KeyCode::Char('r')), Some(UiCommand::Render)));
    }

    #[test]
    fn spinner_cycles_through_frames() {
        let mut state = UiState::default();
        state.frame = 1;
        let first = state.spinner();
        state.frame = 9;
        assert_eq!(state.spinner(), first);
    }
}
