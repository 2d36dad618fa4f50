//! File writers for finished outputs.
//!
//! Only called from the control thread while handling a completion or a
//! save command, never from a worker.

use crate::error::JobError;
use crate::model::Canvas;
use crate::variation;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default export directory: `<data_dir>/cfdg-studio/exports`.
pub fn default_export_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cfdg-studio")
        .join("exports")
}

/// `<dir>/<stem>[-<variation code>].<ext>`
pub fn export_path(dir: &Path, stem: &str, variation: Option<i64>, ext: &str) -> PathBuf {
    let name = match variation {
        Some(v) => format!("{stem}-{}.{ext}", variation::to_code(v).to_lowercase()),
        None => format!("{stem}.{ext}"),
    };
    dir.join(name)
}

fn ensure_parent(path: &Path, what: &str) -> Result<(), JobError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| JobError::unavailable(what, e))?;
    }
    Ok(())
}

fn write_ppm(canvas: &Canvas, path: &Path, what: &str) -> Result<(), JobError> {
    let expected = canvas.width as usize * canvas.height as usize * 3;
    if canvas.pixels.len() != expected {
        return Err(JobError::unavailable(
            what,
            format!(
                "canvas has {} bytes, expected {expected}",
                canvas.pixels.len()
            ),
        ));
    }
    let file = fs::File::create(path).map_err(|e| JobError::unavailable(what, e))?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{} {}\n255\n", canvas.width, canvas.height)
        .and_then(|_| out.write_all(&canvas.pixels))
        .and_then(|_| out.flush())
        .map_err(|e| JobError::unavailable(what, e))
}

/// Write a raster as binary PPM.
pub fn save_raster(canvas: &Canvas, path: &Path) -> Result<PathBuf, JobError> {
    ensure_parent(path, "Image")?;
    write_ppm(canvas, path, "Image")?;
    Ok(path.to_path_buf())
}

pub fn save_vector(svg: &str, path: &Path) -> Result<PathBuf, JobError> {
    ensure_parent(path, "SVG")?;
    fs::write(path, svg).map_err(|e| JobError::unavailable("SVG", e))?;
    Ok(path.to_path_buf())
}

/// Write a movie as a directory of numbered frames.
pub fn save_movie(frames: &[Canvas], dir: &Path) -> Result<PathBuf, JobError> {
    if frames.is_empty() {
        return Err(JobError::unavailable("Movie", "no frames were rendered"));
    }
    fs::create_dir_all(dir).map_err(|e| JobError::unavailable("Movie", e))?;
    for (i, frame) in frames.iter().enumerate() {
        let path = dir.join(format!("frame-{:05}.ppm", i + 1));
        write_ppm(frame, &path, "Movie")?;
    }
    Ok(dir.to_path_buf())
}
