//! Enrollment source: the metadata table and the row → image convention.

use crate::types::PersonMetadata;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata table not found: {0}")]
    SourceMissing(PathBuf),
    #[error("malformed metadata table {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("metadata table {path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },
}

pub const COLUMNS: [&str; 8] = [
    "name",
    "age",
    "university",
    "major",
    "id_number",
    "marital_status",
    "surname",
    "level",
];

/// A data row that could not be decoded. It keeps its position in the table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct MalformedRow {
    /// Line in the source file, when known.
    pub line: Option<u64>,
    pub message: String,
}

/// Every data row of the table in file order, decoded or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    pub entries: Vec<Result<MetadataRow, MalformedRow>>,
}

impl MetadataTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &MetadataRow> {
        self.entries.iter().filter_map(|e| e.as_ref().ok())
    }

    pub fn malformed(&self) -> usize {
        self.entries.iter().filter(|e| e.is_err()).count()
    }
}

/// One row of the metadata table.
///
/// Columns: `name, age, university, major, id_number, marital_status, surname, level`.
/// Every column is read as text, numeric ones included. Trailing fields
/// missing from a short row are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataRow {
    pub name: String,
    pub age: String,
    pub university: String,
    pub major: String,
    pub id_number: String,
    pub marital_status: String,
    pub surname: String,
    pub level: String,
}

impl MetadataRow {
    pub fn metadata(&self) -> PersonMetadata {
        PersonMetadata {
            age: self.age.clone(),
            university: self.university.clone(),
            major: self.major.clone(),
            id_number: self.id_number.clone(),
            marital_status: self.marital_status.clone(),
            surname: self.surname.clone(),
            level: self.level.clone(),
        }
    }
}

/// Read the metadata table from a CSV file with a header row.
///
/// A missing file, an unreadable header or a missing column fails the whole
/// table. A bad data row only fails its own entry.
pub fn load_metadata(path: &Path) -> Result<MetadataTable, MetadataError> {
    if !path.exists() {
        return Err(MetadataError::SourceMissing(path.to_path_buf()));
    }

    let reader = reader_builder()
        .from_path(path)
        .map_err(|source| classify(path, source))?;

    let table = read_table(reader, path)?;
    tracing::info!(
        path = %path.display(),
        rows = table.len(),
        malformed = table.malformed(),
        "loaded metadata table"
    );
    Ok(table)
}

/// Parse a metadata table from any reader (CSV with a header row).
/// Errors name the source `-`.
pub fn parse_metadata<R: io::Read>(input: R) -> Result<MetadataTable, MetadataError> {
    read_table(reader_builder().from_reader(input), Path::new("-"))
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.trim(csv::Trim::All).flexible(true);
    builder
}

fn read_table<R: io::Read>(mut reader: csv::Reader<R>, path: &Path) -> Result<MetadataTable, MetadataError> {
    let headers = reader.headers().map_err(|source| classify(path, source))?.clone();
    if let Some(column) = COLUMNS.into_iter().find(|c| !headers.iter().any(|h| h == *c)) {
        return Err(MetadataError::MissingColumn {
            path: path.to_path_buf(),
            column,
        });
    }

    let entries = reader
        .deserialize::<MetadataRow>()
        .map(|record| {
            record.map_err(|e| {
                let line = e.position().map(|p| p.line());
                tracing::warn!(?line, error = %e, "malformed metadata row");
                MalformedRow {
                    line,
                    message: e.to_string(),
                }
            })
        })
        .collect();
    Ok(MetadataTable { entries })
}

/// Maps a 1-based row position to the image enrolled for that row.
pub trait ImageResolver {
    fn resolve(&self, position: usize) -> PathBuf;
}

impl<F> ImageResolver for F
where
    F: Fn(usize) -> PathBuf,
{
    fn resolve(&self, position: usize) -> PathBuf {
        self(position)
    }
}

/// `{dir}/{position}.jpg`, position counted from 1.
#[derive(Debug, Clone)]
pub struct PositionalResolver {
    dir: PathBuf,
}

impl PositionalResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImageResolver for PositionalResolver {
    fn resolve(&self, position: usize) -> PathBuf {
        self.dir.join(format!("{position}.jpg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "name,age,university,major,id_number,marital_status,surname,level";

    fn rows(table: &MetadataTable) -> Vec<&MetadataRow> {
        table.rows().collect()
    }

    #[test]
    fn test_parse_metadata_rows() {
        let csv = format!(
            "{HEADER}\nAlice,22,Sana'a University,CS,1001,single,Saleh,3\nBob, 25 ,Aden University,Math,1002,married,Ali,4\n"
        );
        let table = parse_metadata(csv.as_bytes()).unwrap();
        let rows = rows(&table);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].university, "Sana'a University");
        assert_eq!(rows[1].age, "25");
        assert_eq!(rows[1].metadata().surname, "Ali");
    }

    #[test]
    fn test_parse_metadata_missing_column() {
        let csv = "name,age\nAlice,22\n";
        match parse_metadata(csv.as_bytes()) {
            Err(MetadataError::MissingColumn { column, .. }) => assert_eq!(column, "university"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_short_row_keeps_neighbours() {
        let csv = format!("{HEADER}\nAlice,22,U,CS,1,single,S,3\nBob,23,U\nCarol,24,U,Math,3,married,T,2\n");
        let table = parse_metadata(csv.as_bytes()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.malformed(), 0);
        let names: Vec<&str> = table.rows().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
        let bob = table.entries[1].as_ref().unwrap();
        assert_eq!(bob.university, "U");
        assert_eq!(bob.major, "");
        assert_eq!(bob.level, "");
    }

    #[test]
    fn test_undecodable_row_is_a_per_row_entry() {
        let mut csv = format!("{HEADER}\nAlice,22,U,CS,1,single,S,3\n").into_bytes();
        csv.extend_from_slice(b"B\xffb,23,U,CS,2,single,S,3\n");
        csv.extend_from_slice(b"Carol,24,U,Math,3,married,T,2\n");

        let table = parse_metadata(csv.as_slice()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.malformed(), 1);
        let bad = table.entries[1].as_ref().unwrap_err();
        assert!(!bad.message.is_empty());
        assert_eq!(table.entries[2].as_ref().unwrap().name, "Carol");
    }

    #[test]
    fn test_load_metadata_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people_data.csv");
        match load_metadata(&path) {
            Err(MetadataError::SourceMissing(p)) => assert_eq!(p, path),
            other => panic!("expected SourceMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_load_metadata_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people_data.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "Alice,22,U,CS,1,single,S,3").unwrap();
        drop(file);

        let table = load_metadata(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(rows(&table)[0].level, "3");
    }

    #[test]
    fn test_positional_resolver_is_one_based() {
        let resolver = PositionalResolver::new("image");
        assert_eq!(resolver.resolve(1), PathBuf::from("image/1.jpg"));
        assert_eq!(resolver.resolve(12), PathBuf::from("image/12.jpg"));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |pos: usize| PathBuf::from(format!("faces/p{pos}.png"));
        assert_eq!(resolver.resolve(3), PathBuf::from("faces/p3.png"));
    }
}
