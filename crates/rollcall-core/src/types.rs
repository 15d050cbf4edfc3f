use crate::descriptor::Descriptor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Label shown for a face that did not match any enrolled identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Fixed metadata fields carried with each enrolled person.
///
/// Values are opaque: no validation beyond presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonMetadata {
    pub age: String,
    pub university: String,
    pub major: String,
    pub id_number: String,
    pub marital_status: String,
    pub surname: String,
    pub level: String,
}

/// One enrolled person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    /// Descriptor of the first face found in the enrollment image.
    pub descriptor: Descriptor,
    pub metadata: PersonMetadata,
    /// Image used for display. The gallery never holds the image bytes.
    pub portrait_path: PathBuf,
}

/// Outcome of matching one probe descriptor against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub name: Option<String>,
    /// Distance to the nearest gallery entry; `f32::INFINITY` for an empty gallery.
    pub distance: f32,
    pub identity: Option<IdentityRecord>,
}

impl MatchResult {
    /// Rejection carrying the nearest distance (if any) for diagnostics.
    pub fn unmatched(distance: f32) -> Self {
        Self {
            matched: false,
            name: None,
            distance,
            identity: None,
        }
    }

    pub fn accepted(record: &IdentityRecord, distance: f32) -> Self {
        Self {
            matched: true,
            name: Some(record.name.clone()),
            distance,
            identity: Some(record.clone()),
        }
    }

    /// Name to draw next to the face: the matched name or [`UNKNOWN_LABEL`].
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}
