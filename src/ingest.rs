//! Spreadsheet ingestion: positional row mapping and the transactional
//! year replace.

use std::collections::HashSet;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FitnessError, Result};
use crate::models::{Gender, ImportOutcome, StudentRecord};
use crate::store::{RecordStore, ACTION_DELETE, ACTION_IMPORT};

/// Rows with fewer cells than this are skipped instead of imported.
pub const MIN_ROW_FIELDS: usize = 10;

/// Reads every row of a CSV export, header included, without
/// interpreting it. Rows may have differing lengths. Cells that are not
/// valid UTF-8 (GBK exports, mostly) are decoded lossily so the rest of
/// the row still imports.
pub fn read_csv_rows(path: &Path) -> Result<Vec<StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (index, result) in reader.byte_records().enumerate() {
        let raw = result?;
        if raw.iter().any(|cell| std::str::from_utf8(cell).is_err()) {
            warn!(line = index + 1, "row is not valid UTF-8, decoded lossily");
        }
        let cells: Vec<String> = raw
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect();
        rows.push(StringRecord::from(cells));
    }
    Ok(rows)
}

fn text(row: &StringRecord, index: usize) -> String {
    row.get(index).map(str::trim).unwrap_or_default().to_string()
}

/// Length of the leading decimal number in `cell`: optional sign, digits
/// with an optional fraction, and an optional exponent.
fn numeric_prefix_len(cell: &str) -> usize {
    let bytes = cell.as_bytes();
    let digits = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits(end);
    let mut mantissa = int_end > end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits(end + 1);
        if frac_end > end + 1 || mantissa {
            mantissa = true;
            end = frac_end;
        }
    }
    if !mantissa {
        return 0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    end
}

/// Numeric cell read by its leading number, so `85分` is 85; a cell with no
/// leading number becomes 0.
fn number(row: &StringRecord, index: usize) -> f64 {
    row.get(index)
        .map(str::trim)
        .and_then(|cell| cell[..numeric_prefix_len(cell)].parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn score(row: &StringRecord, index: usize) -> Option<f64> {
    Some(number(row, index))
}

/// Maps one sheet row onto a record by column position, or `None` when the
/// row is too short to be a student.
pub fn map_row(year: i32, row: &StringRecord) -> Option<StudentRecord> {
    if row.len() < MIN_ROW_FIELDS {
        return None;
    }

    let gender_cell = text(row, 7);
    if Gender::parse(&gender_cell).is_none() {
        warn!(student_id = %text(row, 5), gender = %gender_cell, "unrecognised gender, using female items");
    }

    Some(StudentRecord {
        year,
        grade_id: text(row, 0),
        grade: text(row, 1),
        college: text(row, 2),
        major: text(row, 3),
        class_name: text(row, 4),
        student_id: text(row, 5),
        name: text(row, 6),
        gender: Gender::from_cell(&gender_cell),
        total_score: score(row, 8),
        status: text(row, 9),
        level: text(row, 10),
        height: number(row, 11),
        weight: number(row, 12),
        height_weight_score: score(row, 13),
        height_weight_level: text(row, 14),
        vital_capacity: number(row, 15),
        vital_capacity_score: score(row, 16),
        vital_capacity_level: text(row, 17),
        sprint_50m: number(row, 18),
        sprint_50m_score: score(row, 19),
        sprint_50m_level: text(row, 20),
        long_jump: number(row, 21),
        long_jump_score: score(row, 22),
        long_jump_level: text(row, 23),
        sit_reach: number(row, 24),
        sit_reach_score: score(row, 25),
        sit_reach_level: text(row, 26),
        run_800m: text(row, 27),
        run_800m_score: score(row, 28),
        run_800m_level: text(row, 29),
        run_1000m: text(row, 30),
        run_1000m_score: score(row, 31),
        run_1000m_level: text(row, 32),
        situp: number(row, 33),
        situp_score: score(row, 34),
        situp_level: text(row, 35),
        pullup: number(row, 36),
        pullup_score: score(row, 37),
        pullup_level: text(row, 38),
    })
}

/// Replaces every record of `year` with the rows of a sheet whose first
/// row is a header. Short rows and repeated student ids are skipped and
/// counted; a storage failure leaves the previous records in place.
pub async fn import_rows<S: RecordStore>(
    store: &S,
    year: i32,
    rows: &[StringRecord],
) -> Result<ImportOutcome> {
    let mut records = Vec::with_capacity(rows.len());
    let mut seen = HashSet::new();
    let mut skipped_count = 0usize;

    for (index, row) in rows.iter().enumerate().skip(1) {
        let Some(record) = map_row(year, row) else {
            warn!(line = index + 1, fields = row.len(), "skipping short row");
            skipped_count += 1;
            continue;
        };
        if !seen.insert(record.student_id.clone()) {
            warn!(line = index + 1, student_id = %record.student_id, "skipping repeated student id");
            skipped_count += 1;
            continue;
        }
        records.push(record);
    }

    let batch_id = Uuid::new_v4();
    let imported_count = store.replace_year(year, &records, batch_id).await?;
    store
        .append_audit(
            Some(batch_id),
            ACTION_IMPORT,
            &format!(
                "Imported {imported_count} records for {year}, skipped {skipped_count}"
            ),
        )
        .await?;
    info!(year, imported_count, skipped_count, %batch_id, "import finished");

    Ok(ImportOutcome {
        batch_id,
        year,
        imported_count,
        skipped_count,
    })
}

pub async fn import_csv<S: RecordStore>(store: &S, year: i32, path: &Path) -> Result<ImportOutcome> {
    let rows = read_csv_rows(path)?;
    import_rows(store, year, &rows).await
}

/// Removes a year's records; a year without records is an error.
pub async fn delete_year<S: RecordStore>(store: &S, year: i32) -> Result<u64> {
    let deleted = store.delete_year(year).await?;
    if deleted == 0 {
        return Err(FitnessError::YearNotFound(year));
    }
    store
        .append_audit(None, ACTION_DELETE, &format!("Deleted {deleted} records for {year}"))
        .await?;
    info!(year, deleted, "deleted year");
    Ok(deleted)
}
