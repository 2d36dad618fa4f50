mod help;
mod preview;
mod state;

use crate::cli::Cli;
use crate::model::{RenderButton, StudioEvent};
use crate::orchestrator::{self, UiCommand};
use crate::text_summary;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph},
    Terminal,
};
use state::{Dialog, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let (prefs, prefs_path) = crate::cli::load_prefs(&args)?;
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<StudioEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (session, done_rx) = crate::cli::build_session(&args, prefs, prefs_path, event_tx);

    if args.render_on_launch {
        let _ = cmd_tx.send(UiCommand::Render);
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(event_rx, cmd_tx));

    let res = orchestrator::run_controller(session, done_rx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread. Returns once the controller reports
/// the window closed, or when the controller goes away.
pub fn run_threaded(
    mut event_rx: UnboundedReceiver<StudioEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut redraw = true;

    let res = loop {
        // Drain events without blocking to keep UI responsive; unbounded channel avoids backpressure.
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    state.closed = true;
                    break;
                }
            }
        }
        if state.closed {
            break Ok(());
        }

        if redraw || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            redraw = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(cmd) = state.key_command(k.modifiers, k.code) {
                    if cmd_tx.send(cmd).is_err() {
                        break Ok(());
                    }
                }
                redraw = true;
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // Title and button
                Constraint::Min(4),    // Canvas preview
                Constraint::Length(3), // Progress
                Constraint::Length(4), // Status
            ]
            .as_ref(),
        )
        .split(area);

    draw_header(chunks[0], f, state);
    draw_canvas(chunks[1], f, state);
    draw_progress(chunks[2], f, state);
    draw_status(chunks[3], f, state);

    if state.show_help {
        help::draw_help(centered(area, 60, 20), f);
    }
    match &state.dialog {
        Some(Dialog::Size { input }) => {
            let p = Paragraph::new(vec![
                Line::from(format!("Size: {input}_")),
                Line::from(Span::styled(
                    "Enter to render, Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(Block::default().borders(Borders::ALL).title("Render size"));
            let r = centered(area, 40, 4);
            f.render_widget(Clear, r);
            f.render_widget(p, r);
        }
        Some(Dialog::Variation { input }) => {
            let p = Paragraph::new(vec![
                Line::from(format!("Code: {input}_")),
                Line::from(Span::styled(
                    "Enter to use, Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(Block::default().borders(Borders::ALL).title("Variation"));
            let r = centered(area, 40, 4);
            f.render_widget(Clear, r);
            f.render_widget(p, r);
        }
        Some(Dialog::ConfirmClose) => {
            let p = Paragraph::new(vec![
                Line::from("Preferences have changed. Save them before closing?"),
                Line::from(Span::styled(
                    "y save, n discard, c cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(Block::default().borders(Borders::ALL).title("Close"));
            let r = centered(area, 56, 4);
            f.render_widget(Clear, r);
            f.render_widget(p, r);
        }
        None => {}
    }
}

fn draw_header(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let button_style = match state.button {
        RenderButton::Render => Style::default().fg(Color::Green),
        RenderButton::Stop => Style::default().fg(Color::Yellow),
        RenderButton::StopNow => Style::default().fg(Color::Red),
    };
    let mut spans = vec![
        Span::styled(format!("[ {} ]", state.button.label()), button_style),
        Span::raw("  "),
    ];
    if state.busy {
        spans.push(Span::raw(format!("{} ", state.spinner())));
    }
    if !state.variation_code.is_empty() {
        spans.push(Span::styled("Variation: ", Style::default().fg(Color::Gray)));
        spans.push(Span::raw(state.variation_code.clone()));
    }
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("cfdg-studio"));
    f.render_widget(p, area);
}

fn draw_canvas(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Canvas");
    let inner = block.inner(area);
    f.render_widget(block, area);
    match &state.canvas {
        Some(canvas) => {
            let lines = preview::preview_lines(canvas, inner.width, inner.height);
            f.render_widget(Paragraph::new(lines), inner);
        }
        None => {
            let p = Paragraph::new(Span::styled(
                "Nothing rendered yet",
                Style::default().fg(Color::Gray),
            ));
            f.render_widget(p, inner);
        }
    }
}

fn draw_progress(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title("Progress");
    match state.progress {
        Some(pct) => {
            let g = Gauge::default()
                .block(block)
                .gauge_style(Style::default().fg(Color::Cyan))
                .percent(u16::from(pct.min(100)));
            f.render_widget(g, area);
        }
        None => {
            let text = match (&state.status, state.busy) {
                (Some(snapshot), _) => text_summary::status_line(snapshot),
                (None, true) => "Starting…".into(),
                (None, false) => String::new(),
            };
            f.render_widget(Paragraph::new(text).block(block), area);
        }
    }
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines = vec![Line::from(state.info.clone())];
    if let Some(summary) = &state.last_summary {
        lines.push(Line::from(vec![
            Span::styled("Last: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "job {} {} ({:?}, {} shapes, {} x {})",
                summary.job_id,
                summary.status,
                summary.action,
                summary.shape_count,
                summary.width,
                summary.height
            )),
        ]));
    }
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}
