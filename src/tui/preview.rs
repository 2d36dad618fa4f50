use crate::model::Canvas;
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

/// Downsample a canvas into terminal cells, two pixel rows per cell using the
/// upper half block (foreground is the top pixel, background the bottom one).
pub fn preview_lines(canvas: &Canvas, cols: u16, rows: u16) -> Vec<Line<'static>> {
    if cols == 0 || rows == 0 || canvas.width == 0 || canvas.height == 0 {
        return Vec::new();
    }
    // Keep the aspect ratio: a cell is one pixel wide and two pixels tall. Never upscale.
    let scale = (f64::from(canvas.width) / f64::from(cols))
        .max(f64::from(canvas.height) / (f64::from(rows) * 2.0))
        .max(1.0);
    let out_cols = ((f64::from(canvas.width) / scale).floor() as u16).clamp(1, cols);
    let out_rows = ((f64::from(canvas.height) / scale / 2.0).floor() as u16).clamp(1, rows);

    let sample = |cx: u16, py: u32| -> Color {
        let x = ((f64::from(cx) + 0.5) * scale) as u32;
        let y = ((f64::from(py) + 0.5) * scale) as u32;
        match canvas.rgb_at(x.min(canvas.width - 1), y.min(canvas.height - 1)) {
            Some([r, g, b]) => Color::Rgb(r, g, b),
            None => Color::Reset,
        }
    };

    (0..out_rows)
        .map(|row| {
            let spans: Vec<Span<'static>> = (0..out_cols)
                .map(|col| {
                    let top = sample(col, u32::from(row) * 2);
                    let bottom = sample(col, u32::from(row) * 2 + 1);
                    Span::styled("▀", Style::default().fg(top).bg(bottom))
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}
