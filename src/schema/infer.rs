//! Describe delimited data files: header names, inferred types, typed row streams.

use crate::error::ConfigError;
use crate::schema::types::{DataResource, Field, FieldType, Schema};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Rows inspected for type inference.
pub const INFER_SAMPLE_ROWS: usize = 100;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataFileFormat {
    pub delimiter: u8,
}

impl DataFileFormat {
    /// Pick the format from the file extension; `.csv` sniffs the delimiter from the header line.
    pub fn detect(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "tsv" | "tab" => Ok(DataFileFormat { delimiter: b'\t' }),
            "csv" | "txt" => {
                let mut header = String::new();
                BufReader::new(File::open(path)?).read_line(&mut header)?;
                Ok(DataFileFormat {
                    delimiter: sniff_delimiter(&header),
                })
            }
            _ => Err(ConfigError::UnsupportedDataFile(path.display().to_string())),
        }
    }

    fn reader(&self, path: &Path) -> Result<csv::Reader<File>, ConfigError> {
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(path)?)
    }
}

fn sniff_delimiter(header: &str) -> u8 {
    CANDIDATE_DELIMITERS
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.as_bytes().contains(d))
        .unwrap_or(b',')
}

fn infer_type(cells: &[&str]) -> FieldType {
    let values: Vec<&str> = cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
    if values.is_empty() {
        return FieldType::Any;
    }
    for ty in [FieldType::Integer, FieldType::Number, FieldType::Boolean] {
        if values.iter().all(|v| ty.parse_str(v).is_some()) {
            // "0"/"1" columns are integers, not booleans
            return ty;
        }
    }
    FieldType::String
}

/// Describe a data file: one field per header column, types inferred from a row sample.
/// Field names are kept as they appear; normalization is a separate stage.
pub fn describe_datafile(path: &Path) -> Result<DataResource, ConfigError> {
    let format = DataFileFormat::detect(path)?;
    let mut reader = format.reader(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(ConfigError::UnsupportedDataFile(format!("{}: no header row", path.display())));
    }
    let mut sample: Vec<csv::StringRecord> = Vec::new();
    for record in reader.records().take(INFER_SAMPLE_ROWS) {
        sample.push(record?);
    }
    let fields = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells: Vec<&str> = sample.iter().map(|r| r.get(i).unwrap_or("")).collect();
            Field::new(name.clone(), infer_type(&cells))
        })
        .collect();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data")
        .to_lowercase();
    tracing::debug!(path = %path.display(), columns = headers.len(), sampled = sample.len(), "described data file");
    Ok(DataResource {
        name,
        path: path.file_name().and_then(|f| f.to_str()).map(str::to_string),
        schema: Schema::new(fields),
    })
}

/// Convert one textual cell to a typed value; empty cells become null.
pub fn typed_cell(ty: FieldType, cell: &str) -> Result<Value, ConfigError> {
    if cell.trim().is_empty() {
        return Ok(Value::Null);
    }
    ty.parse_str(cell)
        .ok_or_else(|| ConfigError::Validation(format!("value '{}' is not a valid {}", cell, ty)))
}

/// A data row as read: the source cells plus their typed values.
pub type RawRow = (Vec<String>, Vec<Value>);

/// Stream data rows with both the source cells and values typed per `types`.
pub fn read_records(
    path: &Path,
    types: Vec<FieldType>,
) -> Result<impl Iterator<Item = Result<RawRow, ConfigError>>, ConfigError> {
    let format = DataFileFormat::detect(path)?;
    let reader = format.reader(path)?;
    Ok(reader.into_records().map(move |record| {
        let record = record?;
        let typed = types
            .iter()
            .enumerate()
            .map(|(i, ty)| typed_cell(*ty, record.get(i).unwrap_or("")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((record.iter().map(str::to_string).collect(), typed))
    }))
}

/// Stream typed data rows laid out per `types` (one entry per column).
pub fn read_rows(
    path: &Path,
    types: Vec<FieldType>,
) -> Result<impl Iterator<Item = Result<Vec<Value>, ConfigError>>, ConfigError> {
    Ok(read_records(path, types)?.map(|r| r.map(|(_, typed)| typed)))
}

/// First data row, typed per `types`; `None` for a header-only file.
pub fn first_row(path: &Path, types: Vec<FieldType>) -> Result<Option<Vec<Value>>, ConfigError> {
    read_rows(path, types)?.next().transpose()
}

/// Write a header plus rows of cells to `path` in the given format, replacing its contents.
pub fn write_rows<I>(path: &Path, format: DataFileFormat, header: &[String], rows: I) -> Result<u64, ConfigError>
where
    I: IntoIterator<Item = Result<Vec<String>, ConfigError>>,
{
    let mut writer = csv::WriterBuilder::new().delimiter(format.delimiter).from_path(path)?;
    writer.write_record(header)?;
    let mut n = 0u64;
    for row in rows {
        writer.write_record(row?)?;
        n += 1;
    }
    writer.flush()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn describes_header_and_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "People.csv", "name,age,income,member,note\nPatrick,28,3550.50,true,\nVivienne,36,2852.35,false,\n");
        let res = describe_datafile(&path).unwrap();
        assert_eq!(res.name, "people");
        assert_eq!(res.path.as_deref(), Some("People.csv"));
        let types: Vec<_> = res.schema.fields.iter().map(|f| f.ty).collect();
        assert_eq!(
            types,
            vec![FieldType::String, FieldType::Integer, FieldType::Number, FieldType::Boolean, FieldType::Any]
        );
    }

    #[test]
    fn semicolon_files_are_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "x.csv", "a;b\n1;2\n");
        assert_eq!(DataFileFormat::detect(&path).unwrap().delimiter, b';');
        let res = describe_datafile(&path).unwrap();
        assert_eq!(res.schema.field_names(), vec!["a", "b"]);
    }

    #[test]
    fn unsupported_extension_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "x.xlsx", "");
        assert!(matches!(describe_datafile(&path), Err(ConfigError::UnsupportedDataFile(_))));
    }

    #[test]
    fn rows_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.csv", "no,name\n1,a\n2,\n");
        let types = vec![FieldType::Integer, FieldType::String];
        let rows: Vec<_> = read_rows(&path, types.clone()).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![vec![json!(1), json!("a")], vec![json!(2), Value::Null]]);
        assert_eq!(first_row(&path, types).unwrap(), Some(vec![json!(1), json!("a")]));
    }

    #[test]
    fn records_keep_source_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "t.csv", "zip,price\n01234,3.50\n");
        let types = vec![FieldType::Integer, FieldType::Number];
        let records: Vec<_> = read_records(&path, types).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(records[0].0, vec!["01234", "3.50"]);
        assert_eq!(records[0].1, vec![json!(1234), json!(3.5)]);

        let out = dir.path().join("out.csv");
        let header = vec!["zip".to_string(), "price".to_string()];
        let cells = records.into_iter().map(|(cells, _)| Ok(cells));
        let n = write_rows(&out, DataFileFormat { delimiter: b',' }, &header, cells).unwrap();
        assert_eq!(n, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "zip,price\n01234,3.50\n");
    }
}
