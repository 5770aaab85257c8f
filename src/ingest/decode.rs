//! Payload decoding
//!
//! Raw bytes are sniffed rather than trusted: gzip and ZIP are recognised by
//! their magic numbers, and an XLSX workbook is a ZIP with `xl/workbook.xml`.
//! Everything else that looks like text is read as CSV.

use std::io::{Cursor, Read};

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use super::source::SourceDescriptor;
use crate::error::IngestionError;
use crate::table::DataTable;

/// Rows beyond this are not loaded
pub const MAX_ROWS: usize = 1_000_000;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UNSUPPORTED_LABELS: &[&str] = &["json", "parquet", "pdf", "shapefile", "geojson"];

/// Container format of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Csv,
    GzipCsv,
    ZipCsv,
    Xlsx,
}

impl PayloadFormat {
    /// Identify the payload from its leading bytes, using the descriptor only
    /// to reject formats that are never tabular text
    pub fn detect(bytes: &[u8], descriptor: &SourceDescriptor) -> Result<Self, IngestionError> {
        if bytes.starts_with(GZIP_MAGIC) {
            return Ok(PayloadFormat::GzipCsv);
        }
        if bytes.starts_with(ZIP_MAGIC) {
            let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
            let is_workbook = archive.file_names().any(|n| n == "xl/workbook.xml");
            return Ok(if is_workbook {
                PayloadFormat::Xlsx
            } else {
                PayloadFormat::ZipCsv
            });
        }

        let label = format!("{} {}", descriptor.format, descriptor.url).to_lowercase();
        if let Some(unsupported) = UNSUPPORTED_LABELS.iter().find(|l| label.contains(*l)) {
            return Err(IngestionError::UnsupportedFormat(unsupported.to_string()));
        }
        if bytes.contains(&0) {
            return Err(IngestionError::UnsupportedFormat(
                "binary payload".to_string(),
            ));
        }
        Ok(PayloadFormat::Csv)
    }
}

/// Decode a payload into a table
pub fn decode_payload(
    bytes: &[u8],
    descriptor: &SourceDescriptor,
) -> Result<DataTable, IngestionError> {
    let format = PayloadFormat::detect(bytes, descriptor)?;
    debug!("Decoding {} bytes as {:?}", bytes.len(), format);

    let table = match format {
        PayloadFormat::Csv => decode_csv(bytes)?,
        PayloadFormat::GzipCsv => decode_csv(&gunzip(bytes)?)?,
        PayloadFormat::ZipCsv => decode_csv(&first_csv_member(bytes)?)?,
        PayloadFormat::Xlsx => decode_xlsx(bytes)?,
    };

    if table.columns().is_empty() || table.is_empty() {
        return Err(IngestionError::EmptyDataset);
    }
    info!(
        "Decoded {} rows x {} columns from {}",
        table.row_count(),
        table.columns().len(),
        descriptor.source_name
    );
    Ok(table)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, IngestionError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| IngestionError::Unreadable(format!("Gzip decompression failed: {}", e)))?;
    Ok(output)
}

fn first_csv_member(bytes: &[u8]) -> Result<Vec<u8>, IngestionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let name = archive
        .file_names()
        .filter(|n| !n.starts_with("__MACOSX/"))
        .find(|n| n.to_lowercase().ends_with(".csv"))
        .map(str::to_string)
        .ok_or(IngestionError::EmptyArchive)?;

    debug!("Extracting {} from archive", name);
    let mut member = archive.by_name(&name)?;
    let mut output = Vec::new();
    member.read_to_end(&mut output)?;
    Ok(output)
}

/// Parse CSV text; malformed records are skipped
pub fn decode_csv(bytes: &[u8]) -> Result<DataTable, IngestionError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        match record {
            Ok(record) => {
                if rows.len() >= MAX_ROWS {
                    warn!("Row limit {} reached; remaining rows ignored", MAX_ROWS);
                    break;
                }
                rows.push(record.iter().map(cell).collect());
            }
            Err(e) => {
                skipped += 1;
                debug!("Skipping malformed record: {}", e);
            }
        }
    }
    if skipped > 0 {
        warn!("Skipped {} malformed CSV records", skipped);
    }

    Ok(DataTable::new(columns, rows))
}

fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn decode_xlsx(bytes: &[u8]) -> Result<DataTable, IngestionError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestionError::Unreadable("workbook has no sheets".to_string()))??;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|c| xlsx_cell(c).unwrap_or_default())
            .collect(),
        None => return Err(IngestionError::EmptyDataset),
    };
    let rows = rows
        .take(MAX_ROWS)
        .map(|row| row.iter().map(xlsx_cell).collect())
        .collect();

    Ok(DataTable::new(columns, rows))
}

fn xlsx_cell(value: &Data) -> Option<String> {
    match value {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => cell(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => cell(&other.to_string()),
    }
}
