//! Enrollment pipeline: metadata rows + images → gallery.
//!
//! Per-row failures never abort the run. Each skipped row is reported as an
//! [`EnrollmentWarning`] and logged.

use crate::analyzer::{load_image, FaceAnalyzer};
use crate::gallery::{Gallery, GalleryError, Insertion};
use crate::metadata::{ImageResolver, MalformedRow, MetadataRow, MetadataTable};
use crate::types::IdentityRecord;
use std::fmt;
use std::path::PathBuf;

/// Why a row was left out of the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningReason {
    /// The metadata row itself could not be decoded.
    Malformed(String),
    /// The image is missing or could not be decoded.
    ImageLoad(String),
    /// The analyzer found no face in the image.
    NoFace,
    /// The analyzer failed on this image.
    Analyzer(String),
    /// The gallery refused the record (empty name, wrong dimensionality).
    Rejected(GalleryError),
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed metadata row: {e}"),
            Self::ImageLoad(e) => write!(f, "error loading image: {e}"),
            Self::NoFace => f.write_str("no face found in image"),
            Self::Analyzer(e) => write!(f, "face analysis failed: {e}"),
            Self::Rejected(e) => write!(f, "record rejected: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentWarning {
    /// 1-based row position in the metadata table.
    pub row: usize,
    pub name: String,
    pub image: PathBuf,
    pub reason: WarningReason,
}

impl fmt::Display for EnrollmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({}, {}): {}",
            self.row,
            self.name,
            self.image.display(),
            self.reason
        )
    }
}

/// Result of an enrollment run.
#[derive(Debug, Default)]
pub struct Enrollment {
    pub gallery: Gallery,
    pub warnings: Vec<EnrollmentWarning>,
    /// Rows that overwrote an earlier row with the same name.
    pub replaced: usize,
}

impl Enrollment {
    pub fn skipped(&self) -> usize {
        self.warnings.len()
    }

    /// Warnings for the given 1-based row position.
    pub fn warnings_for(&self, row: usize) -> impl Iterator<Item = &EnrollmentWarning> {
        self.warnings.iter().filter(move |w| w.row == row)
    }
}

/// Build a gallery from metadata rows, resolving each row's image by position.
pub fn enroll<R, A>(rows: &[MetadataRow], resolver: &R, analyzer: &mut A) -> Enrollment
where
    R: ImageResolver + ?Sized,
    A: FaceAnalyzer + ?Sized,
{
    enroll_with_progress(rows, resolver, analyzer, |_| {})
}

/// [`enroll`], calling `on_row` with each 1-based position once it is processed.
pub fn enroll_with_progress<R, A, F>(
    rows: &[MetadataRow],
    resolver: &R,
    analyzer: &mut A,
    on_row: F,
) -> Enrollment
where
    R: ImageResolver + ?Sized,
    A: FaceAnalyzer + ?Sized,
    F: FnMut(usize),
{
    enroll_entries(rows.iter().map(Ok), resolver, analyzer, on_row)
}

/// Enroll a loaded table. Malformed rows become warnings and keep their
/// position, so later rows are still paired with their own images.
pub fn enroll_table<R, A, F>(
    table: &MetadataTable,
    resolver: &R,
    analyzer: &mut A,
    on_row: F,
) -> Enrollment
where
    R: ImageResolver + ?Sized,
    A: FaceAnalyzer + ?Sized,
    F: FnMut(usize),
{
    enroll_entries(table.entries.iter().map(Result::as_ref), resolver, analyzer, on_row)
}

fn enroll_entries<'r, I, R, A, F>(entries: I, resolver: &R, analyzer: &mut A, mut on_row: F) -> Enrollment
where
    I: Iterator<Item = Result<&'r MetadataRow, &'r MalformedRow>>,
    R: ImageResolver + ?Sized,
    A: FaceAnalyzer + ?Sized,
    F: FnMut(usize),
{
    let mut enrollment = Enrollment::default();
    let mut total = 0;

    for (index, entry) in entries.enumerate() {
        let position = index + 1;
        total = position;
        let image = resolver.resolve(position);

        let (name, outcome) = match entry {
            Ok(row) => (
                row.name.as_str(),
                enroll_row(&mut enrollment.gallery, row, image.clone(), analyzer),
            ),
            Err(bad) => ("", Err(WarningReason::Malformed(bad.to_string()))),
        };

        match outcome {
            Ok(Insertion::Added) => {
                tracing::debug!(row = position, name, "enrolled");
            }
            Ok(Insertion::Replaced) => {
                enrollment.replaced += 1;
                tracing::warn!(
                    row = position,
                    name,
                    "duplicate name; later row replaces the earlier record"
                );
            }
            Err(reason) => {
                tracing::warn!(
                    row = position,
                    name,
                    image = %image.display(),
                    %reason,
                    "skipping enrollment row"
                );
                enrollment.warnings.push(EnrollmentWarning {
                    row: position,
                    name: name.to_string(),
                    image,
                    reason,
                });
            }
        }
        on_row(position);
    }

    tracing::info!(
        rows = total,
        enrolled = enrollment.gallery.len(),
        skipped = enrollment.skipped(),
        replaced = enrollment.replaced,
        "enrollment complete"
    );

    enrollment
}

fn enroll_row<A: FaceAnalyzer + ?Sized>(
    gallery: &mut Gallery,
    row: &MetadataRow,
    image_path: PathBuf,
    analyzer: &mut A,
) -> Result<Insertion, WarningReason> {
    if row.name.trim().is_empty() {
        return Err(WarningReason::Rejected(GalleryError::EmptyName));
    }

    let image = load_image(&image_path).map_err(|e| WarningReason::ImageLoad(e.to_string()))?;
    let faces = analyzer
        .detect_and_embed(&image)
        .map_err(|e| WarningReason::Analyzer(e.to_string()))?;

    let mut faces = faces.into_iter();
    let face = faces.next().ok_or(WarningReason::NoFace)?;
    let discarded = faces.count();
    if discarded > 0 {
        tracing::debug!(name = %row.name, discarded, "keeping first face only");
    }

    gallery
        .insert(IdentityRecord {
            name: row.name.clone(),
            descriptor: face.descriptor,
            metadata: row.metadata(),
            portrait_path: image_path,
        })
        .map_err(WarningReason::Rejected)
}
