use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, Float32Array, Float64Array, Float64Builder, Int32Array, Int64Array,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Catalog, Pixel};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Read and parse a JSON catalog.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let file = File::open(path)
        .with_context(|| format!("opening catalog {}", path.display()))?;
    let catalog: Catalog = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    log::info!(
        "Loaded catalog {}: {} pixel sets, {} analyses, {} experiments, {} omics units, {} tags",
        path.display(),
        catalog.pixel_sets.len(),
        catalog.analyses.len(),
        catalog.experiments.len(),
        catalog.omics_units.len(),
        catalog.tags.len(),
    );
    Ok(catalog)
}

/// Write the catalog as pretty JSON, replacing `path` atomically.
pub fn save_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, catalog).context("serializing catalog")?;
        writer.flush().context("flushing catalog")?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pixel files – public entry-points
// ---------------------------------------------------------------------------

/// Lowercased extension of `path`, empty when there is none.
fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Load the pixel rows of one file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`            – comma separated, header row
/// * `.tsv` / `.txt`   – tab separated, header row
/// * `.json`           – `[{ "omics_unit": "...", "value": 1.0, "quality_score": 0.1 }, ...]`
/// * `.parquet` / `.pq` – `omics_unit`, `value` and optional `quality_score` columns
pub fn load_pixels(path: &Path) -> Result<Vec<Pixel>> {
    match extension(path).as_str() {
        "csv" => load_delimited(path, b','),
        "tsv" | "txt" => load_delimited(path, b'\t'),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported pixel file extension: .{other}"),
    }
}

/// Write pixel rows in the format implied by the extension of `path`.
pub fn save_pixels(path: &Path, pixels: &[Pixel]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    match extension(path).as_str() {
        "csv" => save_delimited(path, pixels, b','),
        "tsv" | "txt" => save_delimited(path, pixels, b'\t'),
        "json" => {
            let file = File::create(path).context("creating JSON pixel file")?;
            serde_json::to_writer_pretty(BufWriter::new(file), pixels)
                .context("writing JSON pixel file")
        }
        "parquet" | "pq" => save_parquet(path, pixels),
        other => bail!("Unsupported pixel file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// Delimited (CSV / TSV)
// ---------------------------------------------------------------------------

const OMICS_UNIT_HEADERS: &[&str] = &["omics_unit", "omics unit", "id"];
const VALUE_HEADERS: &[&str] = &["value"];
const QUALITY_SCORE_HEADERS: &[&str] = &["quality_score", "qs"];

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_ascii_lowercase().as_str()))
}

/// Header row with column names; any extra columns are ignored.
fn load_delimited(path: &Path, delimiter: u8) -> Result<Vec<Pixel>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let unit_idx = find_column(&headers, OMICS_UNIT_HEADERS)
        .with_context(|| format!("{} missing 'omics_unit' column", path.display()))?;
    let value_idx = find_column(&headers, VALUE_HEADERS)
        .with_context(|| format!("{} missing 'value' column", path.display()))?;
    let qs_idx = find_column(&headers, QUALITY_SCORE_HEADERS);

    let mut pixels = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{} row {row_no}", path.display()))?;

        let omics_unit = record.get(unit_idx).unwrap_or("").trim();
        if omics_unit.is_empty() {
            bail!("{} row {row_no}: empty omics unit", path.display());
        }
        let raw_value = record.get(value_idx).unwrap_or("").trim();
        let value = raw_value.parse::<f64>().with_context(|| {
            format!("{} row {row_no}: value '{raw_value}' is not a number", path.display())
        })?;
        let quality_score = match qs_idx.map(|i| record.get(i).unwrap_or("").trim()) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<f64>().with_context(|| {
                format!("{} row {row_no}: quality score '{raw}' is not a number", path.display())
            })?),
        };

        pixels.push(Pixel {
            omics_unit: omics_unit.to_string(),
            value,
            quality_score,
        });
    }
    Ok(pixels)
}

fn save_delimited(path: &Path, pixels: &[Pixel], delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["omics_unit", "value", "quality_score"])?;
    for px in pixels {
        let value = px.value.to_string();
        let qs = px.quality_score.map(|q| q.to_string()).unwrap_or_default();
        writer.write_record([px.omics_unit.as_str(), value.as_str(), qs.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Records-oriented JSON array, e.g. `df.to_json(orient='records')`.
fn load_json(path: &Path) -> Result<Vec<Pixel>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing JSON pixels in {}", path.display()))
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Load a Parquet pixel file.
///
/// Expected schema:
/// - `omics_unit`: Utf8 or LargeUtf8
/// - `value`: Float64, Float32 or an integer type
/// - `quality_score` (optional, nullable): same numeric types as `value`
fn load_parquet(path: &Path) -> Result<Vec<Pixel>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut pixels = Vec::new();
    let mut offset = 0usize;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let unit_idx = schema
            .index_of("omics_unit")
            .map_err(|_| anyhow!("Parquet file missing 'omics_unit' column"))?;
        let value_idx = schema
            .index_of("value")
            .map_err(|_| anyhow!("Parquet file missing 'value' column"))?;
        let qs_col = schema.index_of("quality_score").ok().map(|i| batch.column(i));

        let units = batch.column(unit_idx);
        let values = batch.column(value_idx);

        for row in 0..batch.num_rows() {
            let row_no = offset + row;
            let omics_unit = extract_string(units, row)
                .with_context(|| format!("Row {row_no}: failed to read 'omics_unit'"))?;
            let value = extract_f64(values, row)
                .with_context(|| format!("Row {row_no}: failed to read 'value'"))?
                .with_context(|| format!("Row {row_no}: null 'value'"))?;
            let quality_score = match qs_col {
                Some(col) => extract_f64(col, row)
                    .with_context(|| format!("Row {row_no}: failed to read 'quality_score'"))?,
                None => None,
            };
            pixels.push(Pixel {
                omics_unit,
                value,
                quality_score,
            });
        }
        offset += batch.num_rows();
    }

    Ok(pixels)
}

fn extract_string(col: &ArrayRef, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null value in string column");
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected Utf8 column, got {other:?}"),
    }
}

fn extract_f64(col: &ArrayRef, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        Ok(Some(arr.value(row)))
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        Ok(Some(arr.value(row) as f64))
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        Ok(Some(arr.value(row) as f64))
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        Ok(Some(arr.value(row) as f64))
    } else {
        bail!("Expected a numeric column, got {:?}", col.data_type())
    }
}

fn save_parquet(path: &Path, pixels: &[Pixel]) -> Result<()> {
    let mut units = StringBuilder::new();
    let mut values = Float64Builder::new();
    let mut scores = Float64Builder::new();
    for px in pixels {
        units.append_value(&px.omics_unit);
        values.append_value(px.value);
        scores.append_option(px.quality_score);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("omics_unit", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("quality_score", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(units.finish()),
            Arc::new(values.finish()),
            Arc::new(scores.finish()),
        ],
    )
    .context("building record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(unit: &str, value: f64, qs: Option<f64>) -> Pixel {
        Pixel {
            omics_unit: unit.to_string(),
            value,
            quality_score: qs,
        }
    }

    #[test]
    fn csv_with_display_headers_and_missing_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.csv");
        std::fs::write(
            &path,
            "Omics Unit,Value,QS,Comment\nYAL001C,1.5,0.01,x\nYAL002W,-2,,y\n",
        )
        .unwrap();

        let pixels = load_pixels(&path).unwrap();
        assert_eq!(
            pixels,
            vec![px("YAL001C", 1.5, Some(0.01)), px("YAL002W", -2.0, None)]
        );
    }

    #[test]
    fn tsv_without_quality_score_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.tsv");
        std::fs::write(&path, "id\tvalue\nYAL001C\t3.25\n").unwrap();

        let pixels = load_pixels(&path).unwrap();
        assert_eq!(pixels, vec![px("YAL001C", 3.25, None)]);
    }

    #[test]
    fn bad_value_names_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.csv");
        std::fs::write(&path, "omics_unit,value\nA,1\nB,oops\n").unwrap();

        let err = format!("{:#}", load_pixels(&path).unwrap_err());
        assert!(err.contains("row 1"), "{err}");
        assert!(err.contains("oops"), "{err}");
    }

    #[test]
    fn missing_value_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.csv");
        std::fs::write(&path, "omics_unit,score\nA,1\n").unwrap();
        assert!(load_pixels(&path).is_err());
    }

    #[test]
    fn json_and_parquet_files_are_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![px("YAL001C", 0.5, Some(0.2)), px("YAL003W", 7.0, None)];
        for name in ["pixels.json", "pixels.parquet"] {
            let path = dir.path().join(name);
            save_pixels(&path, &rows).unwrap();
            assert_eq!(load_pixels(&path).unwrap(), rows, "{name}");
        }
    }

    #[test]
    fn unsupported_extension() {
        let err = load_pixels(Path::new("pixels.xlsx")).unwrap_err();
        assert!(err.to_string().contains("xlsx"));
    }

    #[test]
    fn catalog_save_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "{}").unwrap();

        save_catalog(&path, &Catalog::default()).unwrap();
        let back = load_catalog(&path).unwrap();
        assert_eq!(back, Catalog::default());
        assert!(!dir.path().join("catalog.json.tmp").exists());
    }
}
