//! rollcall-core: identity matching engine.
//!
//! Builds a gallery of enrolled face descriptors from a metadata table and
//! labeled images, then matches probe descriptors against it by Euclidean
//! distance. Detection and embedding are external, behind [`FaceAnalyzer`].

pub mod analyzer;
pub mod descriptor;
pub mod enrollment;
pub mod gallery;
pub mod matcher;
pub mod metadata;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalyzerError, BoxError, DetectedFace, FaceAnalyzer};
pub use descriptor::{Descriptor, DescriptorError};
pub use enrollment::{enroll, enroll_table, enroll_with_progress, Enrollment, EnrollmentWarning, WarningReason};
pub use gallery::{Gallery, GalleryError, Insertion};
pub use matcher::{LinearScan, Matcher, MatcherConfig, NearestNeighbor, Neighbor, DEFAULT_DISTANCE_THRESHOLD};
pub use metadata::{
    load_metadata, parse_metadata, ImageResolver, MalformedRow, MetadataError, MetadataRow, MetadataTable,
    PositionalResolver,
};
pub use session::{
    Annotation, FrameSource, FrameSourceError, LiveSummary, Presenter, RecognitionSession, Renderer,
    SessionError, SessionState, StopSignal,
};
pub use types::{BoundingBox, IdentityRecord, MatchResult, PersonMetadata, UNKNOWN_LABEL};
