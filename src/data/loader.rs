use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Dimension, Record, RecordTable};
use super::pivot::LabeledMatrix;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a record table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row; `Cluster`, `Time Period`, `Frequency`,
///   `Stimulus`, `TargetScore` (and optionally `features`) are categorical,
///   every other named column is numeric
/// * `.parquet` – same columns; any Arrow type castable to text / float
pub fn load_table(path: &Path) -> Result<RecordTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load a square matrix whose rows and columns share labels.
///
/// CSV layout: the first line is a title and is skipped, the second holds the
/// column names, each further line one row of numbers. Cells that are not
/// numbers become NaN.
pub fn load_matrix_csv(path: &Path) -> Result<LabeledMatrix> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut lines = reader.records().skip(1);
    let header = lines
        .next()
        .context("matrix CSV has no header line")?
        .context("reading matrix CSV header")?;
    let columns: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (row_no, result) in lines.enumerate() {
        let record = result.with_context(|| format!("matrix CSV row {row_no}"))?;
        if record.len() != columns.len() {
            bail!(
                "matrix CSV row {row_no}: expected {} values, found {}",
                columns.len(),
                record.len()
            );
        }
        rows.push(
            record
                .iter()
                .map(|cell| cell.trim().parse::<f64>().unwrap_or(f64::NAN))
                .collect::<Vec<f64>>(),
        );
    }

    if rows.len() != columns.len() {
        bail!(
            "matrix must be square: {} rows but {} columns",
            rows.len(),
            columns.len()
        );
    }
    let row_labels = columns.iter().map(|c| vec![c.clone()]).collect();
    LabeledMatrix::from_rows(row_labels, columns, rows).context("building matrix")
}

// ---------------------------------------------------------------------------
// Load cache
// ---------------------------------------------------------------------------

/// Loaded tables keyed by path. Entries live until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<PathBuf, Arc<RecordTable>>,
}

impl TableCache {
    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<RecordTable>> {
        if let Some(table) = self.tables.get(path) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(load_table(path)?);
        log::info!(
            "Loaded {} records with value columns {:?} from {}",
            table.len(),
            table.value_columns,
            path.display()
        );
        self.tables.insert(path.to_path_buf(), Arc::clone(&table));
        Ok(table)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

// ---------------------------------------------------------------------------
// Column roles
// ---------------------------------------------------------------------------

/// Unnamed index columns carry no data.
fn is_index_column(name: &str) -> bool {
    name.is_empty() || name.starts_with("Unnamed:")
}

enum ColumnRole {
    Category(Dimension),
    Value(String),
    Ignored,
}

fn column_role(name: &str) -> ColumnRole {
    if is_index_column(name) {
        ColumnRole::Ignored
    } else if let Some(dim) = Dimension::from_column_name(name) {
        ColumnRole::Category(dim)
    } else {
        ColumnRole::Value(name.to_string())
    }
}

/// Assemble a record from its categorical cells and numeric cells.
fn build_record(
    row: usize,
    mut categories: BTreeMap<Dimension, String>,
    values: BTreeMap<String, Option<f64>>,
) -> Result<Record> {
    let mut take = |dim: Dimension| {
        categories
            .remove(&dim)
            .with_context(|| format!("row {row}: missing '{dim}' column"))
    };
    Ok(Record {
        cluster: take(Dimension::Cluster)?,
        time_period: take(Dimension::TimePeriod)?,
        frequency: take(Dimension::Frequency)?,
        stimulus: take(Dimension::Stimulus)?,
        target_score: take(Dimension::TargetScore)?,
        feature: take(Dimension::Feature).ok(),
        values,
    })
}

/// Numeric cell, `None` for blanks, text and NaN spellings (`NaN`, `nan`).
fn parse_value(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<RecordTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let roles: Vec<ColumnRole> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| column_role(h.trim()))
        .collect();

    for dim in Dimension::FILTERABLE {
        if !roles
            .iter()
            .any(|r| matches!(r, ColumnRole::Category(d) if *d == dim))
        {
            bail!("CSV missing '{dim}' column");
        }
    }

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;

        let mut categories = BTreeMap::new();
        let mut values = BTreeMap::new();
        for (role, cell) in roles.iter().zip(row.iter()) {
            match role {
                ColumnRole::Category(dim) => {
                    categories.insert(*dim, cell.trim().to_string());
                }
                ColumnRole::Value(name) => {
                    values.insert(name.clone(), parse_value(cell));
                }
                ColumnRole::Ignored => {}
            }
        }
        records.push(build_record(row_no, categories, values)?);
    }

    Ok(RecordTable::from_records(records))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Any Parquet file whose columns cast to text or float, including
/// dictionary-encoded categorical columns.
fn load_parquet(path: &Path) -> Result<RecordTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let mut category_cols: Vec<(Dimension, StringArray)> = Vec::new();
        let mut value_cols: Vec<(String, Float64Array)> = Vec::new();

        for (idx, field) in schema.fields().iter().enumerate() {
            let column = batch.column(idx);
            match column_role(field.name()) {
                ColumnRole::Category(dim) => {
                    category_cols.push((dim, as_strings(column, field.name())?));
                }
                ColumnRole::Value(name) => match as_floats(column) {
                    Some(values) => value_cols.push((name, values)),
                    None => log::warn!(
                        "Skipping parquet column '{name}' of type {:?}",
                        field.data_type()
                    ),
                },
                ColumnRole::Ignored => {}
            }
        }

        for row in 0..batch.num_rows() {
            let categories = category_cols
                .iter()
                .filter(|(_, arr)| !arr.is_null(row))
                .map(|(dim, arr)| (*dim, arr.value(row).to_string()))
                .collect();
            let values = value_cols
                .iter()
                .map(|(name, arr)| {
                    let v = (!arr.is_null(row))
                        .then(|| arr.value(row))
                        .filter(|v| !v.is_nan());
                    (name.clone(), v)
                })
                .collect();
            let row_no = records.len();
            records.push(build_record(row_no, categories, values)?);
        }
    }

    Ok(RecordTable::from_records(records))
}

// -- Arrow helpers --

fn as_strings(column: &ArrayRef, name: &str) -> Result<StringArray> {
    let casted = cast(column, &DataType::Utf8)
        .with_context(|| format!("column '{name}' cannot be read as text"))?;
    casted
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .context("expected StringArray after cast")
}

/// Numeric view of a column; unparseable entries become null.
fn as_floats(column: &ArrayRef) -> Option<Float64Array> {
    let casted = cast(column, &DataType::Float64).ok()?;
    casted.as_any().downcast_ref::<Float64Array>().cloned()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::data::model::SHAP_VALUE;

    fn temp_file(suffix: &str, contents: &str) -> NamedTempFile {
        let mut tmp = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(tmp, "{contents}").unwrap();
        tmp
    }

    const SHAP_CSV: &str = "\
,Cluster,Time Period,Frequency,Stimulus,TargetScore,SHAP_value
0,CL1,\"(-4, 0]\",delta,S1,T1,0.5
1,CL2,\"(0, 5]\",theta,S1,T1,n/a
2,CL1,\"(0, 5]\",theta,S2,T2,-1.25
";

    #[test]
    fn csv_categories_and_values() {
        let tmp = temp_file(".csv", SHAP_CSV);
        let table = load_table(tmp.path()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.value_columns, vec![SHAP_VALUE.to_string()]);
        assert_eq!(table.records[0].time_period, "(-4, 0]");
        assert_eq!(table.records[0].value(SHAP_VALUE), Some(0.5));
        // Non-numeric cells are kept as missing values.
        assert_eq!(table.records[1].values.get(SHAP_VALUE), Some(&None));
        assert_eq!(table.records[2].value(SHAP_VALUE), Some(-1.25));
        assert_eq!(table.domain(Dimension::Stimulus).len(), 2);
        assert!(table.records.iter().all(|r| r.feature.is_none()));
    }

    #[test]
    fn csv_nan_cells_are_missing() {
        let tmp = temp_file(
            ".csv",
            "Cluster,Time Period,Frequency,Stimulus,TargetScore,SHAP_value\n\
             CL1,early,delta,S1,T1,NaN\n\
             CL1,early,delta,S1,T1,nan\n\
             CL1,early,delta,S1,T1,2.5\n",
        );
        let table = load_table(tmp.path()).unwrap();
        assert_eq!(table.records[0].values.get(SHAP_VALUE), Some(&None));
        assert_eq!(table.records[1].values.get(SHAP_VALUE), Some(&None));
        assert_eq!(table.records[2].value(SHAP_VALUE), Some(2.5));
    }

    #[test]
    fn csv_with_features_and_two_value_columns() {
        let tmp = temp_file(
            ".csv",
            "features,Cluster,Time Period,Frequency,Stimulus,TargetScore,params_significant,SHAP_value\n\
             f1,CL1,early,alpha,S1,T1,0.3,0.1\n",
        );
        let table = load_table(tmp.path()).unwrap();
        assert_eq!(table.records[0].feature.as_deref(), Some("f1"));
        assert_eq!(table.records[0].value("params_significant"), Some(0.3));
        assert_eq!(table.value_columns.len(), 2);
    }

    #[test]
    fn csv_requires_every_filter_dimension() {
        let tmp = temp_file(".csv", "Cluster,Frequency,SHAP_value\nCL1,delta,1\n");
        let err = load_table(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Time Period"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let tmp = temp_file(".xlsx", "");
        assert!(load_table(tmp.path()).is_err());
    }

    #[test]
    fn parquet_round_trip_with_numeric_cast() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Cluster", DataType::Utf8, false),
            Field::new("Time Period", DataType::Utf8, false),
            Field::new("Frequency", DataType::Utf8, false),
            Field::new("Stimulus", DataType::Utf8, false),
            Field::new("TargetScore", DataType::Int64, false),
            Field::new("SHAP_value", DataType::Float64, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["CL1", "CL2"])),
            Arc::new(StringArray::from(vec!["(0, 5]", "(0, 5]"])),
            Arc::new(StringArray::from(vec!["delta", "theta"])),
            Arc::new(StringArray::from(vec!["S1", "S1"])),
            Arc::new(arrow::array::Int64Array::from(vec![1, 2])),
            Arc::new(Float64Array::from(vec![Some(0.25), None])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

        let tmp = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(tmp.as_file().try_clone().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(tmp.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].target_score, "1");
        assert_eq!(table.records[0].value(SHAP_VALUE), Some(0.25));
        assert_eq!(table.records[1].value(SHAP_VALUE), None);
    }

    #[test]
    fn parquet_nan_values_are_missing() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Cluster", DataType::Utf8, false),
            Field::new("Time Period", DataType::Utf8, false),
            Field::new("Frequency", DataType::Utf8, false),
            Field::new("Stimulus", DataType::Utf8, false),
            Field::new("TargetScore", DataType::Utf8, false),
            Field::new("SHAP_value", DataType::Float64, false),
        ]));
        let text = |v: &str| -> ArrayRef { Arc::new(StringArray::from(vec![v, v])) };
        let columns: Vec<ArrayRef> = vec![
            text("CL1"),
            text("early"),
            text("delta"),
            text("S1"),
            text("T1"),
            Arc::new(Float64Array::from(vec![f64::NAN, 1.5])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();

        let tmp = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(tmp.as_file().try_clone().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(tmp.path()).unwrap();
        assert_eq!(table.records[0].values.get(SHAP_VALUE), Some(&None));
        assert_eq!(table.records[1].value(SHAP_VALUE), Some(1.5));
    }

    #[test]
    fn square_matrix_skips_title_line() {
        let tmp = temp_file(
            ".csv",
            "Cross performance\nm1,m2\n0.9,0.6\nx,0.8\n",
        );
        let m = load_matrix_csv(tmp.path()).unwrap();
        assert_eq!(m.col_labels, vec!["m1", "m2"]);
        assert_eq!(m.row_labels, vec![vec!["m1".to_string()], vec!["m2".to_string()]]);
        assert_eq!(m.get(0, 0), 0.9);
        assert!(m.get(1, 0).is_nan());
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        let tmp = temp_file(".csv", "title\na,b\n1,2\n");
        assert!(load_matrix_csv(tmp.path()).is_err());
    }

    #[test]
    fn cache_loads_each_path_once() {
        let tmp = temp_file(".csv", SHAP_CSV);
        let mut cache = TableCache::default();
        let a = cache.get_or_load(tmp.path()).unwrap();
        let b = cache.get_or_load(tmp.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
