use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("r", "Render next variation"),
    ("a", "Render again at the same size"),
    ("s", "Render at a custom size"),
    ("space", "Render / Stop / Stop Now"),
    ("x", "Stop now"),
    ("i", "Save image"),
    ("v", "Save SVG"),
    ("m", "Save movie"),
    ("n / p", "Next / previous variation"),
    ("e", "Type a variation code"),
    ("q", "Close window"),
    ("Q / Ctrl-C", "Exit"),
    ("?", "Show this help"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYS.iter().map(|(key, what)| {
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<11}"), Style::default().fg(Color::Magenta)),
            Span::raw(" "),
            Span::raw(*what),
        ])
    }));
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Requests made while a render runs are remembered and run when it ends.",
    ));
    lines.push(Line::from("Press any key to close."));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
