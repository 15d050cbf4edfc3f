//! Face descriptors and the distance metric used to compare them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("descriptor has no components")]
    Empty,
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
}

/// Fixed-length face descriptor produced by an external embedder.
///
/// Descriptors compared against one another must share the same
/// dimensionality; see [`Descriptor::distance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Wrap raw embedder output. Rejects empty and non-finite vectors.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance in D-dimensional space. Lower = more similar.
    pub fn distance(&self, other: &Descriptor) -> Result<f32, DescriptorError> {
        other.check_dimension(self.dimension())?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }

    /// Fails unless this descriptor has exactly `expected` components.
    pub fn check_dimension(&self, expected: usize) -> Result<(), DescriptorError> {
        if self.dimension() == expected {
            Ok(())
        } else {
            Err(DescriptorError::DimensionMismatch {
                expected,
                actual: self.dimension(),
            })
        }
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = d(&[0.25, -1.5, 3.0, 0.0]);
        assert_eq!(a.distance(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        let a = d(&[0.0, 0.0]);
        let b = d(&[3.0, 4.0]);
        assert!((a.distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = d(&[1.0, 2.0, 3.0]);
        let b = d(&[-1.0, 0.5, 7.0]);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = d(&[1.0, 2.0, 3.0]);
        let b = d(&[1.0, 2.0]);
        assert_eq!(
            a.distance(&b),
            Err(DescriptorError::DimensionMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(Descriptor::new(vec![]), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_new_rejects_nan() {
        assert_eq!(
            Descriptor::new(vec![0.0, f32::NAN]),
            Err(DescriptorError::NonFinite { index: 1 })
        );
    }
}
