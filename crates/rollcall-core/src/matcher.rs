//! Nearest-descriptor matching with a distance threshold.

use crate::descriptor::{Descriptor, DescriptorError};
use crate::gallery::Gallery;
use crate::types::MatchResult;
use serde::{Deserialize, Serialize};

/// Default acceptance threshold.
///
/// Calibrated for 128-D dlib-style face descriptors. Other embedding spaces
/// need their own value.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// A probe is accepted only if its nearest distance is strictly below this.
    pub threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

/// Nearest gallery entry for a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in gallery iteration order.
    pub index: usize,
    pub distance: f32,
}

/// Strategy for finding the nearest gallery entry to a probe.
///
/// Returns `None` only for an empty gallery.
pub trait NearestNeighbor {
    fn nearest(&self, probe: &Descriptor, gallery: &Gallery) -> Result<Option<Neighbor>, DescriptorError>;
}

/// Exhaustive scan over the gallery, O(|G|·D) per probe.
///
/// Among equal minimum distances the record enrolled first wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl NearestNeighbor for LinearScan {
    fn nearest(&self, probe: &Descriptor, gallery: &Gallery) -> Result<Option<Neighbor>, DescriptorError> {
        let mut best: Option<Neighbor> = None;

        for (index, record) in gallery.iter().enumerate() {
            let distance = record.descriptor.distance(probe)?;
            // Strict comparison keeps the earliest record on ties.
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Neighbor { index, distance });
            }
        }

        Ok(best)
    }
}

/// Applies the accept/reject policy on top of a [`NearestNeighbor`] strategy.
#[derive(Debug, Clone)]
pub struct Matcher<N = LinearScan> {
    config: MatcherConfig,
    index: N,
}

impl Matcher<LinearScan> {
    pub fn new(config: MatcherConfig) -> Self {
        Self::with_index(config, LinearScan)
    }
}

impl Default for Matcher<LinearScan> {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl<N: NearestNeighbor> Matcher<N> {
    pub fn with_index(config: MatcherConfig, index: N) -> Self {
        Self { config, index }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match one probe. An empty gallery is a rejection, never an error.
    pub fn match_probe(&self, probe: &Descriptor, gallery: &Gallery) -> Result<MatchResult, DescriptorError> {
        let Some(neighbor) = self.index.nearest(probe, gallery)? else {
            return Ok(MatchResult::unmatched(f32::INFINITY));
        };

        match gallery.record(neighbor.index) {
            Some(record) if neighbor.distance < self.config.threshold => {
                Ok(MatchResult::accepted(record, neighbor.distance))
            }
            _ => Ok(MatchResult::unmatched(neighbor.distance)),
        }
    }

    /// Match each probe independently. `result[i]` belongs to `probes[i]`.
    pub fn match_all(&self, probes: &[Descriptor], gallery: &Gallery) -> Result<Vec<MatchResult>, DescriptorError> {
        probes.iter().map(|p| self.match_probe(p, gallery)).collect()
    }
}
