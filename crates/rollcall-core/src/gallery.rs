//! In-memory gallery of enrolled identities.
//!
//! Records are kept in enrollment order in a `Vec`, with a secondary
//! name → index map for lookups. Iteration order is the tie-break order
//! used by the matcher.

use crate::descriptor::DescriptorError;
use crate::types::IdentityRecord;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GalleryError {
    #[error("identity name must not be empty")]
    EmptyName,
    #[error("descriptor rejected: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// What [`Gallery::insert`] did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// A record with the same name existed and was overwritten in place.
    Replaced,
}

#[derive(Debug, Clone, Default)]
pub struct Gallery {
    records: Vec<IdentityRecord>,
    by_name: HashMap<String, usize>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, overwriting any existing record with the same name.
    ///
    /// The replacement keeps the slot of the record it overwrites. Every
    /// descriptor must match the dimensionality of the records already held.
    pub fn insert(&mut self, record: IdentityRecord) -> Result<Insertion, GalleryError> {
        if record.name.trim().is_empty() {
            return Err(GalleryError::EmptyName);
        }
        if let Some(dim) = self.dimension() {
            record.descriptor.check_dimension(dim)?;
        }

        match self.by_name.get(&record.name) {
            Some(&idx) => {
                self.records[idx] = record;
                Ok(Insertion::Replaced)
            }
            None => {
                self.by_name.insert(record.name.clone(), self.records.len());
                self.records.push(record);
                Ok(Insertion::Added)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&IdentityRecord> {
        self.by_name.get(name).map(|&idx| &self.records[idx])
    }

    pub fn record(&self, index: usize) -> Option<&IdentityRecord> {
        self.records.get(index)
    }

    /// Records in enrollment order.
    pub fn iter(&self) -> std::slice::Iter<'_, IdentityRecord> {
        self.records.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Shared descriptor dimensionality, or `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.descriptor.dimension())
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a IdentityRecord;
    type IntoIter = std::slice::Iter<'a, IdentityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::types::PersonMetadata;
    use std::path::PathBuf;

    fn record(name: &str, values: &[f32], age: &str) -> IdentityRecord {
        IdentityRecord {
            name: name.into(),
            descriptor: Descriptor::new(values.to_vec()).unwrap(),
            metadata: PersonMetadata { age: age.into(), ..Default::default() },
            portrait_path: PathBuf::from(format!("image/{name}.jpg")),
        }
    }

    #[test]
    fn test_insert_preserves_enrollment_order() {
        let mut gallery = Gallery::new();
        for name in ["carol", "alice", "bob"] {
            gallery.insert(record(name, &[0.0, 1.0], "20")).unwrap();
        }
        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["carol", "alice", "bob"]);
        assert_eq!(gallery.dimension(), Some(2));
    }

    #[test]
    fn test_duplicate_name_last_write_wins() {
        let mut gallery = Gallery::new();
        assert_eq!(gallery.insert(record("Alice", &[0.0, 0.0], "20")).unwrap(), Insertion::Added);
        gallery.insert(record("Bob", &[1.0, 1.0], "30")).unwrap();
        assert_eq!(
            gallery.insert(record("Alice", &[2.0, 2.0], "21")).unwrap(),
            Insertion::Replaced
        );

        assert_eq!(gallery.len(), 2);
        let alice = gallery.get("Alice").unwrap();
        assert_eq!(alice.metadata.age, "21");
        assert_eq!(alice.descriptor.values(), &[2.0, 2.0]);
        // Replacement keeps the original slot.
        assert_eq!(gallery.record(0).unwrap().name, "Alice");
    }

    #[test]
    fn test_insert_rejects_dimension_mismatch() {
        let mut gallery = Gallery::new();
        gallery.insert(record("a", &[0.0, 0.0, 0.0], "1")).unwrap();
        let err = gallery.insert(record("b", &[0.0, 0.0], "1")).unwrap_err();
        assert_eq!(
            err,
            GalleryError::Descriptor(DescriptorError::DimensionMismatch { expected: 3, actual: 2 })
        );
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn test_insert_rejects_empty_name() {
        let mut gallery = Gallery::new();
        assert_eq!(gallery.insert(record("  ", &[0.0], "1")), Err(GalleryError::EmptyName));
        assert!(gallery.is_empty());
        assert_eq!(gallery.dimension(), None);
    }

    #[test]
    fn test_get_missing() {
        let gallery = Gallery::new();
        assert!(gallery.get("nobody").is_none());
    }
}
