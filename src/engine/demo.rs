//! Built-in demonstration engine.
//!
//! Grows a seeded tree of squares by repeated expansion, then paints the
//! finished shapes. The variation seeds the generator, so the same variation
//! always produces the same picture.

use super::{CancellationToken, JobContext, RenderEngine};
use crate::error::EngineFault;
use crate::model::{
    Artifact, Canvas, JobParameters, RenderAction, RenderOutcome, StatusSnapshot, MAX_CANVAS_SIDE,
};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

/// Expansions between FinishUp checks.
const FINISH_UP_CHECK_EVERY: u64 = 64;
const DEFAULT_SHAPE_LIMIT: usize = 200_000;

#[derive(Debug, Clone, Copy)]
struct Shape {
    x: f64,
    y: f64,
    size: f64,
    hue: f64,
}

#[derive(Debug, Default)]
struct Progress {
    shapes: AtomicI64,
    pending: AtomicI64,
    in_output: AtomicBool,
    output_done: AtomicI64,
    output_total: AtomicI64,
    width: AtomicU32,
    height: AtomicU32,
    has_canvas: AtomicBool,
}

impl Progress {
    fn reset(&self, job: &JobParameters) {
        self.shapes.store(0, Ordering::Relaxed);
        self.pending.store(1, Ordering::Relaxed);
        self.in_output.store(false, Ordering::Relaxed);
        self.output_done.store(0, Ordering::Relaxed);
        self.output_total.store(0, Ordering::Relaxed);
        self.width.store(job.width, Ordering::Relaxed);
        self.height.store(job.height, Ordering::Relaxed);
        self.has_canvas.store(job.action.has_canvas(), Ordering::Relaxed);
    }

    fn begin_output(&self, total: i64) {
        self.output_done.store(0, Ordering::Relaxed);
        self.output_total.store(total, Ordering::Relaxed);
        self.in_output.store(true, Ordering::Relaxed);
    }
}

pub struct DemoEngine {
    shape_limit: usize,
    progress: Progress,
}

impl Default for DemoEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SHAPE_LIMIT)
    }
}

impl DemoEngine {
    pub fn new(shape_limit: usize) -> Self {
        Self {
            shape_limit: shape_limit.max(1),
            progress: Progress::default(),
        }
    }

    /// Expansion phase. Returns the finished shapes and whether FinishUp cut it short,
    /// or `None` when StopNow was observed.
    fn expand(
        &self,
        job: &JobParameters,
        ctx: &JobContext,
        scale: f64,
    ) -> Option<(Vec<Shape>, bool)> {
        let mut rng = StdRng::seed_from_u64(job.variation as u64);
        let mut todo = VecDeque::from([Shape {
            x: 0.0,
            y: 0.0,
            size: 1.0,
            hue: rng.gen_range(0.0..360.0),
        }]);
        let mut done = Vec::new();
        let mut expansions = 0u64;

        while let Some(shape) = todo.pop_front() {
            if ctx.stop_requested() {
                return None;
            }
            expansions += 1;
            if expansions % FINISH_UP_CHECK_EVERY == 0 && ctx.should_wind_down() {
                return Some((done, true));
            }

            done.push(shape);
            if shape.size * scale >= job.minimum_size && done.len() + todo.len() < self.shape_limit
            {
                for _ in 0..rng.gen_range(1..=3) {
                    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                    let size = shape.size * rng.gen_range(0.45..0.7);
                    todo.push_back(Shape {
                        x: shape.x + angle.cos() * shape.size * 0.9,
                        y: shape.y + angle.sin() * shape.size * 0.9,
                        size,
                        hue: (shape.hue + rng.gen_range(-25.0..25.0)).rem_euclid(360.0),
                    });
                }
            }

            self.progress
                .shapes
                .store(done.len() as i64, Ordering::Relaxed);
            self.progress
                .pending
                .store(todo.len() as i64, Ordering::Relaxed);
            ctx.report_status(|| self.snapshot(ctx.token()));
        }
        Some((done, false))
    }

    /// Paint shapes onto a fresh canvas. `None` when StopNow was observed.
    fn paint(
        &self,
        job: &JobParameters,
        ctx: &JobContext,
        shapes: &[Shape],
        scale: f64,
        zoom: f64,
        count_shapes: bool,
    ) -> Option<Canvas> {
        let (w, h) = (job.width as usize, job.height as usize);
        let mut pixels = vec![255u8; w * h * 3];
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        let scale = scale * zoom;

        for shape in shapes {
            if ctx.stop_requested() {
                return None;
            }
            let half = (shape.size * scale / 2.0).max(0.5);
            let px = cx + shape.x * scale;
            let py = cy + shape.y * scale;
            let x0 = (px - half).floor().max(0.0) as usize;
            let y0 = (py - half).floor().max(0.0) as usize;
            let x1 = ((px + half).ceil().max(0.0) as usize).min(w);
            let y1 = ((py + half).ceil().max(0.0) as usize).min(h);
            let rgb = hue_to_rgb(shape.hue);
            for y in y0..y1 {
                for x in x0..x1 {
                    let i = (y * w + x) * 3;
                    pixels[i..i + 3].copy_from_slice(&rgb);
                }
            }
            if count_shapes {
                self.progress.output_done.fetch_add(1, Ordering::Relaxed);
            }
            ctx.report_status(|| self.snapshot(ctx.token()));
        }

        Some(Canvas {
            width: job.width,
            height: job.height,
            pixels: Bytes::from(pixels),
        })
    }

    fn draw_vector(
        &self,
        job: &JobParameters,
        ctx: &JobContext,
        shapes: &[Shape],
        scale: f64,
    ) -> Option<String> {
        let (cx, cy) = (f64::from(job.width) / 2.0, f64::from(job.height) / 2.0);
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n<rect width=\"100%\" height=\"100%\" fill=\"#ffffff\"/>\n",
            w = job.width,
            h = job.height
        );
        for shape in shapes {
            if ctx.stop_requested() {
                return None;
            }
            let side = shape.size * scale;
            let [r, g, b] = hue_to_rgb(shape.hue);
            let _ = writeln!(
                svg,
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{side:.2}\" height=\"{side:.2}\" fill=\"#{r:02x}{g:02x}{b:02x}\"/>",
                cx + shape.x * scale - side / 2.0,
                cy + shape.y * scale - side / 2.0,
            );
            self.progress.output_done.fetch_add(1, Ordering::Relaxed);
            ctx.report_status(|| self.snapshot(ctx.token()));
        }
        svg.push_str("</svg>\n");
        Some(svg)
    }

    /// Movie frames reveal the shapes in expansion order. FinishUp ends the
    /// movie after the frame in progress.
    fn animate(
        &self,
        job: &JobParameters,
        ctx: &JobContext,
        shapes: &[Shape],
        scale: f64,
    ) -> Option<(Vec<Canvas>, bool)> {
        let count = job.animate_frame_count.max(1) as usize;
        self.progress.begin_output(count as i64);
        let mut frames = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 && ctx.should_wind_down() {
                if ctx.stop_requested() {
                    return None;
                }
                return Some((frames, true));
            }
            let visible = (shapes.len() * (i + 1)).div_ceil(count);
            let zoom = if job.animate_zoom {
                1.0 + i as f64 / count as f64
            } else {
                1.0
            };
            frames.push(self.paint(job, ctx, &shapes[..visible], scale, zoom, false)?);
            self.progress.output_done.fetch_add(1, Ordering::Relaxed);
        }
        Some((frames, false))
    }

    fn outcome(
        &self,
        job: &JobParameters,
        shape_count: usize,
        finished_early: bool,
        artifact: Artifact,
    ) -> RenderOutcome {
        RenderOutcome {
            action: job.action,
            width: job.width,
            height: job.height,
            shape_count: shape_count as i64,
            finished_early,
            artifact,
            finished_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
        }
    }
}

impl RenderEngine for DemoEngine {
    fn run(&self, job: &JobParameters, ctx: &JobContext) -> Result<RenderOutcome, EngineFault> {
        let sides = 1..=MAX_CANVAS_SIDE;
        if !sides.contains(&job.width) || !sides.contains(&job.height) {
            return Err(EngineFault::InvalidSize {
                width: job.width,
                height: job.height,
            });
        }
        if job.minimum_size.is_nan() || job.minimum_size <= 0.0 {
            return Err(EngineFault::InvalidMinimumSize(job.minimum_size));
        }
        self.progress.reset(job);

        // Border is measured in 1/64ths of the short side.
        let short = f64::from(job.width.min(job.height));
        let border = job.border_size.clamp(0.0, 8.0) * short / 64.0;
        let scale = ((short - 2.0 * border) / 4.0).max(1.0);

        let Some((shapes, mut finished_early)) = self.expand(job, ctx, scale) else {
            return Ok(self.outcome(job, 0, true, Artifact::None));
        };
        let abandoned = |n: usize| self.outcome(job, n, true, Artifact::None);

        let artifact = match job.action {
            RenderAction::Render | RenderAction::SaveRaster => {
                self.progress.begin_output(shapes.len() as i64);
                match self.paint(job, ctx, &shapes, scale, 1.0, true) {
                    Some(canvas) => Artifact::Raster(canvas),
                    None => return Ok(abandoned(shapes.len())),
                }
            }
            RenderAction::SaveVector => {
                self.progress.begin_output(shapes.len() as i64);
                match self.draw_vector(job, ctx, &shapes, scale) {
                    Some(svg) => Artifact::Vector(svg),
                    None => return Ok(abandoned(shapes.len())),
                }
            }
            RenderAction::Animate => match self.animate(job, ctx, &shapes, scale) {
                Some((frames, cut)) => {
                    finished_early |= cut;
                    Artifact::Frames(frames)
                }
                None => return Ok(abandoned(shapes.len())),
            },
        };
        self.progress.in_output.store(false, Ordering::Relaxed);

        Ok(self.outcome(job, shapes.len(), finished_early, artifact))
    }

    fn snapshot(&self, _token: &CancellationToken) -> StatusSnapshot {
        let p = &self.progress;
        StatusSnapshot {
            shape_count: p.shapes.load(Ordering::Relaxed),
            pending_expansion_count: p.pending.load(Ordering::Relaxed),
            is_writing_output: p.in_output.load(Ordering::Relaxed),
            output_done: p.output_done.load(Ordering::Relaxed),
            output_total: p.output_total.load(Ordering::Relaxed),
            canvas_width: p.width.load(Ordering::Relaxed),
            canvas_height: p.height.load(Ordering::Relaxed),
            has_canvas: p.has_canvas.load(Ordering::Relaxed),
        }
    }
}

fn hue_to_rgb(hue: f64) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let (s, v) = (0.65, 0.9);
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let to_u8 = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}
