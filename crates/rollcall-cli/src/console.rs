//! Console front-end: detail tables, per-frame annotation lines, snapshots
//! and the stdin line reader shared by the menu and the live quit key.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rollcall_core::{Annotation, BoxError, Gallery, IdentityRecord, MatchResult, PersonMetadata, Presenter, Renderer};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

const MATCHED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Field/value table for a recognized person.
pub fn detail_table(record: &IdentityRecord, distance: f32) -> String {
    let m = &record.metadata;
    let distance = format!("{distance:.3}");
    let portrait = record.portrait_path.display().to_string();
    let rows: [(&str, &str); 10] = [
        ("Name", &record.name),
        ("Age", &m.age),
        ("University", &m.university),
        ("Major", &m.major),
        ("ID Number", &m.id_number),
        ("Marital Status", &m.marital_status),
        ("Surname", &m.surname),
        ("Level", &m.level),
        ("Portrait", &portrait),
        ("Distance", &distance),
    ];

    let field_w = rows.iter().map(|(f, _)| f.len()).max().unwrap_or(0).max("Field".len());
    let value_w = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0).max("Value".len());
    let rule = format!("+-{}-+-{}-+", "-".repeat(field_w), "-".repeat(value_w));
    let row = |f: &str, v: &str| format!("| {f:<field_w$} | {v:<value_w$} |");

    let mut lines = vec![rule.clone(), row("Field", "Value"), rule.clone()];
    lines.extend(rows.iter().map(|(f, v)| row(f, v)));
    lines.push(rule);
    lines.join("\n")
}

/// Prints a detail table per recognized face.
#[derive(Debug, Default)]
pub struct TablePresenter {
    pub recognized: usize,
    pub unknown: usize,
}

impl Presenter for TablePresenter {
    fn show_identity(&mut self, record: &IdentityRecord, distance: f32) {
        self.recognized += 1;
        println!("{}", detail_table(record, distance));
    }

    fn not_recognized(&mut self) {
        self.unknown += 1;
        println!("Face not recognized.");
    }
}

/// Collects outcomes silently. Used when results are printed as JSON.
#[derive(Debug, Default)]
pub struct QuietPresenter;

impl Presenter for QuietPresenter {
    fn show_identity(&mut self, _record: &IdentityRecord, _distance: f32) {}
    fn not_recognized(&mut self) {}
}

/// JSON view of a match, without the raw descriptor.
#[derive(Debug, Serialize)]
pub struct MatchView<'a> {
    pub matched: bool,
    pub name: &'a str,
    /// `null` for an empty gallery.
    pub distance: Option<f32>,
    pub metadata: Option<&'a PersonMetadata>,
    pub portrait_path: Option<&'a Path>,
}

impl<'a> From<&'a MatchResult> for MatchView<'a> {
    fn from(result: &'a MatchResult) -> Self {
        Self {
            matched: result.matched,
            name: result.display_name(),
            distance: result.distance.is_finite().then_some(result.distance),
            metadata: result.identity.as_ref().map(|r| &r.metadata),
            portrait_path: result.identity.as_ref().map(|r| r.portrait_path.as_path()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityView<'a> {
    pub name: &'a str,
    pub dimension: usize,
    pub metadata: &'a PersonMetadata,
    pub portrait_path: &'a Path,
}

pub fn gallery_views(gallery: &Gallery) -> Vec<IdentityView<'_>> {
    gallery
        .iter()
        .map(|r| IdentityView {
            name: &r.name,
            dimension: r.descriptor.dimension(),
            metadata: &r.metadata,
            portrait_path: &r.portrait_path,
        })
        .collect()
}

/// Prints one line per frame listing the labelled faces, optionally saving
/// each annotated frame as a JPEG.
pub struct ConsoleRenderer {
    frames: usize,
    snapshot_dir: Option<PathBuf>,
}

impl ConsoleRenderer {
    pub fn new(snapshot_dir: Option<PathBuf>) -> std::io::Result<Self> {
        if let Some(dir) = &snapshot_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self { frames: 0, snapshot_dir })
    }
}

pub fn annotation_line(frame: usize, annotations: &[Annotation]) -> String {
    if annotations.is_empty() {
        return format!("frame {frame}: no faces");
    }
    let faces: Vec<String> = annotations
        .iter()
        .map(|a| {
            format!(
                "{} [{:.0},{:.0} {:.0}x{:.0}]",
                a.label, a.bbox.x, a.bbox.y, a.bbox.width, a.bbox.height
            )
        })
        .collect();
    format!("frame {frame}: {}", faces.join(", "))
}

/// Copy of `frame` with a rectangle around each face.
pub fn draw_annotations(frame: &RgbImage, annotations: &[Annotation]) -> RgbImage {
    let mut canvas = frame.clone();
    for a in annotations {
        let width = a.bbox.width.round().max(1.0) as u32;
        let height = a.bbox.height.round().max(1.0) as u32;
        let rect = Rect::at(a.bbox.x.round() as i32, a.bbox.y.round() as i32).of_size(width, height);
        let color = if a.matched { MATCHED_COLOR } else { UNKNOWN_COLOR };
        draw_hollow_rect_mut(&mut canvas, rect, color);
    }
    canvas
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, frame: &RgbImage, annotations: &[Annotation]) -> Result<(), BoxError> {
        self.frames += 1;
        println!("{}", annotation_line(self.frames, annotations));

        if let Some(dir) = &self.snapshot_dir {
            let path = dir.join(format!("frame_{:06}.jpg", self.frames));
            draw_annotations(frame, annotations).save(&path)?;
            tracing::trace!(path = %path.display(), "snapshot written");
        }
        Ok(())
    }

    fn close(&mut self) {
        println!("Camera closed after {} frames.", self.frames);
    }
}

/// Lines from stdin, read on a background thread so the live loop can poll
/// for the quit key without blocking.
pub struct Input {
    lines: Receiver<String>,
}

impl Input {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            tracing::debug!("stdin closed");
        });
        Self { lines: rx }
    }

    #[cfg(test)]
    fn from_receiver(lines: Receiver<String>) -> Self {
        Self { lines }
    }

    /// Block for the next line. `None` once stdin is closed.
    pub fn read_line(&self) -> Option<String> {
        self.lines.recv().ok()
    }

    /// Drain pending lines; true if any of them was `q`.
    ///
    /// Other lines typed while the camera runs are discarded.
    pub fn quit_requested(&self) -> bool {
        let mut quit = false;
        loop {
            match self.lines.try_recv() {
                Ok(line) => quit |= line.trim().eq_ignore_ascii_case("q"),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return quit,
            }
        }
    }
}
