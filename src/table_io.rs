use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use polars::prelude::*;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::frame;

const NA_MARKERS: &[&str] = &["NA", "N/A", "nan", "NaN", "None", "null", "NULL"];
const INFER_ROWS: usize = 10_000;

pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_csv_from(file).with_context(|| format!("parse csv {}", path.display()))
}

pub fn read_csv_from<R: Read>(mut reader: R) -> Result<DataFrame> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).context("read csv")?;
    let names = header_names(&bytes)?;

    let null_values = NullValues::AllColumns(NA_MARKERS.iter().map(|m| (*m).into()).collect());
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_ROWS))
        .with_parse_options(CsvParseOptions::default().with_null_values(Some(null_values)))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .context("decode csv")?;
    df.set_column_names(names)?;
    Ok(frame::standardize(df)?)
}

/// Trimmed header names. Blank names (a pandas index) become `unnamed_{idx}`;
/// a repeated name is an error.
fn header_names(bytes: &[u8]) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = rdr.headers().context("read csv header")?;
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());
    for (idx, h) in headers.iter().enumerate() {
        let name = if h.trim().is_empty() {
            format!("unnamed_{idx}")
        } else {
            h.trim().to_string()
        };
        if !seen.insert(name.clone()) {
            bail!("duplicate csv column `{name}`");
        }
        names.push(name);
    }
    Ok(names)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    Ok(())
}

pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    create_parent(path)?;
    let mut file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut out)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("decode parquet {}", path.display()))?;
    Ok(frame::standardize(df)?)
}

pub fn write_xlsx(df: &DataFrame, path: &Path, sheet_name: &str) -> Result<()> {
    create_parent(path)?;
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name)?;
        write_rows(sheet, df)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn write_rows(worksheet: &mut Worksheet, df: &DataFrame) -> Result<()> {
    for (col_idx, column) in df.get_columns().iter().enumerate() {
        let col = col_idx as u16;
        let name = column.name().as_str();
        worksheet
            .write_string(0, col, name)
            .with_context(|| format!("write header ({col_idx})"))?;
        if *column.dtype() == DataType::String {
            for (row_idx, value) in frame::texts(df, name)?.into_iter().enumerate() {
                if let Some(value) = value {
                    worksheet
                        .write_string(row_idx as u32 + 1, col, value)
                        .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
                }
            }
        } else {
            for (row_idx, value) in frame::floats(df, name)?.into_iter().enumerate() {
                match value {
                    Some(v) if v.is_finite() => {
                        worksheet
                            .write_number(row_idx as u32 + 1, col, v)
                            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
                    }
                    Some(v) => {
                        worksheet
                            .write_string(row_idx as u32 + 1, col, v.to_string())
                            .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
                    }
                    None => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_round_trip_keeps_missing_and_ids() {
        let raw = "player_id,week,yards,note\n00-0031234,1,55.5,\n00-0031235,2,NA,ok\n";
        let df = read_csv_from(raw.as_bytes()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(frame::str_at(&df, "player_id", 0).as_deref(), Some("00-0031234"));
        assert_eq!(frame::f64_at(&df, "yards", 1), None);
        assert_eq!(df.column("week").unwrap().dtype(), &DataType::Int64);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_csv(&df, &path).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(frame::names(&back), frame::names(&df));
        assert_eq!(frame::floats(&back, "yards").unwrap(), vec![Some(55.5), None]);
        assert_eq!(frame::str_at(&back, "note", 1).as_deref(), Some("ok"));
    }

    #[test]
    fn unnamed_index_column_gets_a_name() {
        let raw = ",team\n0,KC\n";
        let df = read_csv_from(raw.as_bytes()).unwrap();
        assert!(frame::has(&df, "unnamed_0"));
        assert_eq!(frame::str_at(&df, "team", 0).as_deref(), Some("KC"));
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let raw = "player_id,week,week,team\np1,1,1,KC\n";
        let err = read_csv_from(raw.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("duplicate csv column `week`"));
    }

    #[test]
    fn write_reports_unwritable_parent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let df = df!("a" => [1.0]).unwrap();
        let err = write_csv(&df, &blocker.join("out.csv")).unwrap_err();
        assert!(err.to_string().starts_with("create "));
    }
}
