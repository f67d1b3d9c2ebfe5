//! CSV reading and writing for [`Table`].
//!
//! The first column is written under an empty header and carries the row
//! index. On read, an empty first header marks that column as the index;
//! otherwise rows are numbered `0..n`.
//!
//! Columns are typed while the file streams in. A cell only counts as a number
//! when it formats back to the exact same text, so a loaded table is written
//! back byte for byte.

use super::{Column, ColumnData, Table};
use crate::error::{TableError, WrangleError};
use crate::persistence::atomic_write_with;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_EXACT_INT: u64 = 1 << 53;

/// Header layout of a table CSV file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CsvLayout {
    pub has_index: bool,
    pub names: Vec<String>,
}

impl CsvLayout {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let has_index = headers.get(0).is_some_and(str::is_empty);
        let names = headers
            .iter()
            .skip(usize::from(has_index))
            .map(str::to_string)
            .collect();
        Self { has_index, names }
    }
}

/// Open `path` and read its header layout.
pub(crate) fn open_csv(path: &Path) -> Result<(csv::Reader<File>, CsvLayout), TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| csv_error(path, source))?;
    let layout = CsvLayout::from_headers(reader.headers().map_err(|e| csv_error(path, e))?);
    Ok((reader, layout))
}

pub(crate) fn csv_error(path: &Path, source: csv::Error) -> TableError {
    TableError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse the index field of a record.
pub(crate) fn parse_index(raw: &str, record: &csv::StringRecord) -> Result<u64, TableError> {
    raw.parse::<u64>().map_err(|_| TableError::InvalidIndex {
        value: raw.to_string(),
        line: record.position().map_or(0, |p| p.line()),
    })
}

/// Write the header row: an empty index header followed by `names`.
pub(crate) fn write_header<W: Write, S: AsRef<str>>(
    writer: &mut csv::Writer<W>,
    names: &[S],
) -> csv::Result<()> {
    writer.write_record(std::iter::once("").chain(names.iter().map(|name| name.as_ref())))
}

impl Table {
    /// Load a CSV file, typing each column as its cells stream in.
    pub fn read_csv(path: &Path) -> Result<Table, TableError> {
        let (mut reader, layout) = open_csv(path)?;

        let mut index = Vec::new();
        let mut builders: Vec<ColumnBuilder> =
            layout.names.iter().map(|_| ColumnBuilder::new()).collect();
        let mut record = csv::StringRecord::new();
        while reader
            .read_record(&mut record)
            .map_err(|e| csv_error(path, e))?
        {
            let mut fields = record.iter();
            if layout.has_index {
                let raw = fields.next().unwrap_or_default();
                index.push(parse_index(raw, &record)?);
            } else {
                index.push(index.len() as u64);
            }
            for (builder, field) in builders.iter_mut().zip(fields) {
                builder.push(field);
            }
        }

        let columns = layout
            .names
            .into_iter()
            .zip(builders)
            .map(|(name, builder)| Column::new(name, builder.finish()))
            .collect();
        let table = Table::with_index(index, columns)?;
        tracing::debug!(
            path = %path.display(),
            rows = table.height(),
            columns = table.width(),
            "loaded table"
        );
        Ok(table)
    }

    /// Atomically write the table as CSV, index first.
    pub fn write_csv(&self, path: &Path) -> Result<(), WrangleError> {
        atomic_write_with(path, |out| {
            let mut writer = csv::Writer::from_writer(out);
            let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
            write_header(&mut writer, &names)?;
            for row in 0..self.height() {
                writer.write_field(self.index[row].to_string())?;
                for column in &self.columns {
                    writer.write_field(column.data.format_cell(row).unwrap_or_default())?;
                }
                writer.write_record(None::<&[u8]>)?;
            }
            writer.flush()
        })
        .map_err(|source| WrangleError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), rows = self.height(), "wrote table");
        Ok(())
    }
}

fn canonical_int(field: &str) -> Option<i64> {
    field
        .parse::<i64>()
        .ok()
        .filter(|n| n.to_string() == field)
}

fn canonical_float(field: &str) -> Option<f64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|f| f.to_string() == field)
}

fn exact_as_f64(values: &[Option<i64>]) -> bool {
    values.iter().flatten().all(|n| n.unsigned_abs() <= MAX_EXACT_INT)
}

/// A column being typed cell by cell, widening Int -> Float -> Text.
#[derive(Debug)]
enum ColumnBuilder {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuilder {
    fn new() -> Self {
        ColumnBuilder::Int(Vec::new())
    }

    fn push(&mut self, field: &str) {
        if field.is_empty() {
            match self {
                ColumnBuilder::Int(v) => v.push(None),
                ColumnBuilder::Float(v) => v.push(None),
                ColumnBuilder::Text(v) => v.push(None),
            }
            return;
        }
        loop {
            let accepted = match self {
                ColumnBuilder::Int(v) => match canonical_int(field) {
                    Some(n) => {
                        v.push(Some(n));
                        true
                    }
                    None => false,
                },
                ColumnBuilder::Float(v) => match canonical_float(field) {
                    Some(f) => {
                        v.push(Some(f));
                        true
                    }
                    None => false,
                },
                ColumnBuilder::Text(v) => {
                    v.push(Some(field.to_string()));
                    true
                }
            };
            if accepted {
                return;
            }
            self.widen();
        }
    }

    /// Move to the next wider kind, re-rendering the cells seen so far.
    fn widen(&mut self) {
        let widened = match std::mem::replace(self, ColumnBuilder::Text(Vec::new())) {
            ColumnBuilder::Int(v) if exact_as_f64(&v) => {
                ColumnBuilder::Float(v.into_iter().map(|c| c.map(|n| n as f64)).collect())
            }
            ColumnBuilder::Int(v) => {
                ColumnBuilder::Text(v.into_iter().map(|c| c.map(|n| n.to_string())).collect())
            }
            ColumnBuilder::Float(v) => {
                ColumnBuilder::Text(v.into_iter().map(|c| c.map(|f| f.to_string())).collect())
            }
            text => text,
        };
        *self = widened;
    }

    fn finish(self) -> ColumnData {
        match self {
            // no values at all
            ColumnBuilder::Int(v) if v.iter().all(Option::is_none) => {
                ColumnData::Float(vec![None; v.len()])
            }
            ColumnBuilder::Int(v) => ColumnData::Int(v),
            ColumnBuilder::Float(v) => ColumnData::Float(v),
            ColumnBuilder::Text(v) => ColumnData::Text(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const RAW: &str = "IPV4_SRC_ADDR,L4_SRC_PORT,FLOW_DURATION_MILLISECONDS,Attack\n\
                       10.0.0.1,443,1.5,Benign\n\
                       0.0.0.0,,inf,DDoS\n\
                       10.0.0.2,-1,NaN,Benign\n";

    #[test]
    fn test_read_infers_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, RAW).unwrap();

        let table = Table::read_csv(&path).unwrap();
        assert_eq!(table.index(), &[0, 1, 2]);
        let kinds: Vec<ColumnKind> = table.columns().iter().map(Column::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ColumnKind::Text,
                ColumnKind::Int,
                ColumnKind::Float,
                ColumnKind::Text
            ]
        );
        assert_eq!(
            table.column("L4_SRC_PORT").unwrap().data,
            ColumnData::Int(vec![Some(443), None, Some(-1)])
        );
        let duration = &table.column("FLOW_DURATION_MILLISECONDS").unwrap().data;
        assert!(duration.is_null(2));
        assert_eq!(duration.format_cell(1).as_deref(), Some("inf"));
    }

    #[test]
    fn test_index_column_roundtrip_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.csv");
        std::fs::write(&raw, RAW).unwrap();

        let table = Table::read_csv(&raw).unwrap().take(&[2, 0]);
        let first = dir.path().join("first.csv");
        table.write_csv(&first).unwrap();

        let reloaded = Table::read_csv(&first).unwrap();
        assert_eq!(reloaded.index(), &[2, 0]);
        let second = dir.path().join("second.csv");
        reloaded.write_csv(&second).unwrap();

        assert_eq!(
            std::fs::read_to_string(&first).unwrap(),
            std::fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_write_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let table = Table::new(vec![
            Column::float("x", [1.0, 2.5]),
            Column::text("label", ["a,b", "c"]),
        ])
        .unwrap();

        table.write_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            ",x,label\n0,1,\"a,b\"\n1,2.5,c\n"
        );
    }

    #[test]
    fn test_invalid_index_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, ",a\nx,1\n").unwrap();

        let err = Table::read_csv(&path).unwrap_err();
        assert!(matches!(err, TableError::InvalidIndex { .. }));
    }

    fn build(fields: &[&str]) -> ColumnData {
        let mut builder = ColumnBuilder::new();
        for field in fields {
            builder.push(field);
        }
        builder.finish()
    }

    #[test]
    fn test_all_empty_column_is_null_float() {
        assert_eq!(build(&["", ""]), ColumnData::Float(vec![None, None]));
    }

    #[test]
    fn test_column_widens_mid_stream() {
        assert_eq!(
            build(&["3", "", "2.5"]),
            ColumnData::Float(vec![Some(3.0), None, Some(2.5)])
        );
        assert_eq!(
            build(&["3", "1.5", "tcp"]),
            ColumnData::Text(vec![Some("3".into()), Some("1.5".into()), Some("tcp".into())])
        );
    }

    #[test]
    fn test_non_canonical_numbers_stay_text() {
        assert_eq!(build(&["007"]).kind(), ColumnKind::Text);
        assert_eq!(build(&["+3"]).kind(), ColumnKind::Text);
        assert_eq!(build(&["1e-7"]).kind(), ColumnKind::Text);
        assert_eq!(build(&["1.50"]).kind(), ColumnKind::Text);
        assert_eq!(build(&["-0"]).kind(), ColumnKind::Float);
    }

    #[test]
    fn test_huge_int_widens_to_text() {
        let data = build(&["9007199254740993", "0.5"]);
        assert_eq!(
            data,
            ColumnData::Text(vec![Some("9007199254740993".into()), Some("0.5".into())])
        );
    }

    #[test]
    fn test_arbitrary_text_roundtrips_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("raw.csv");
        std::fs::write(
            &raw,
            ",a,b,c,d\n4,007,1e-7,NaN,x y\n9,12,0.5,,\"q,r\"\n",
        )
        .unwrap();

        let table = Table::read_csv(&raw).unwrap();
        let out = dir.path().join("out.csv");
        table.write_csv(&out).unwrap();
        assert_eq!(
            std::fs::read_to_string(&raw).unwrap(),
            std::fs::read_to_string(&out).unwrap()
        );
    }
}
