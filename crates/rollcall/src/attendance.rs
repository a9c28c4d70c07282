//! Attendance spreadsheet: read, append one row, rewrite.

use calamine::{open_workbook, Data, ExcelDateTime, Reader, Xlsx};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::ErrorLog;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const NAME_COLUMN: &str = "Name";
pub const DATE_COLUMN: &str = "Date";
pub const TIME_COLUMN: &str = "Time";
const STANDARD_COLUMNS: [&str; 3] = [NAME_COLUMN, DATE_COLUMN, TIME_COLUMN];

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },
    #[error("{0} contains no worksheet")]
    NoWorksheet(PathBuf),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// One attendance mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl AttendanceRecord {
    pub fn new(name: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            date: at.date(),
            time: at.time(),
        }
    }

    /// Stamped with the current local time.
    pub fn now(name: impl Into<String>) -> Self {
        Self::new(name, Local::now().naive_local())
    }

    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn time_string(&self) -> String {
        self.time.format("%H:%M:%S").to_string()
    }
}

/// The attendance sheet as text cells: a header plus rows of equal width.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl AttendanceTable {
    /// `Name`, `Date`, `Time` and no rows.
    pub fn empty() -> Self {
        Self {
            columns: STANDARD_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Read the first worksheet of `path`; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self, AttendanceError> {
        if !path.exists() {
            tracing::info!(file = %path.display(), "no attendance file yet; starting empty");
            return Ok(Self::empty());
        }

        let read_err = |source| AttendanceError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(read_err)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| AttendanceError::NoWorksheet(path.to_path_buf()))?
            .map_err(read_err)?;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            return Ok(Self {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        };

        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell_text(cell) {
                text if text.is_empty() => format!("Unnamed: {i}"),
                text => text,
            })
            .collect();

        let rows = rows
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(cell_text).collect();
                cells.resize(columns.len(), String::new());
                cells
            })
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell of `row` under `column`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Append a record. Missing standard columns are added; other columns stay blank.
    pub fn append(&mut self, record: &AttendanceRecord) {
        let name_col = self.ensure_column(NAME_COLUMN);
        let date_col = self.ensure_column(DATE_COLUMN);
        let time_col = self.ensure_column(TIME_COLUMN);

        let mut row = vec![String::new(); self.columns.len()];
        row[name_col] = record.name.clone();
        row[date_col] = record.date_string();
        row[time_col] = record.time_string();
        self.rows.push(row);
    }

    /// Rewrite `path` with this table on a single worksheet.
    pub fn save(&self, path: &Path) -> Result<(), AttendanceError> {
        let write_err = |source| AttendanceError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let header = Format::new().set_bold();

        for (col, name) in self.columns.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, name, &header)
                .map_err(write_err)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate().filter(|(_, v)| !v.is_empty()) {
                sheet
                    .write_string(r as u32 + 1, col as u16, value)
                    .map_err(write_err)?;
            }
        }
        sheet.autofit();

        workbook.save(path).map_err(write_err)?;
        tracing::debug!(file = %path.display(), rows = self.rows.len(), "attendance file written");
        Ok(())
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => datetime_text(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Date-formatted cells come back as the text `append` would have written.
///
/// A whole serial is a date, a serial below one is a time of day, anything
/// else is a full timestamp.
fn datetime_text(dt: &ExcelDateTime) -> String {
    let serial = dt.as_f64();
    if dt.is_duration() {
        if let Some(duration) = dt.as_duration() {
            let secs = duration.num_seconds();
            return format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60);
        }
    }
    match dt.as_datetime() {
        Some(at) if serial.fract() == 0.0 => at.date().format("%Y-%m-%d").to_string(),
        Some(at) if serial < 1.0 => at.time().format("%H:%M:%S").to_string(),
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => serial.to_string(),
    }
}

/// Read or start the table, append `record`, rewrite the file.
///
/// Failures are recorded in `log` and returned; on a read failure the file
/// is left untouched.
pub fn mark_attendance(path: &Path, record: &AttendanceRecord, log: &ErrorLog) -> Result<(), AttendanceError> {
    let mut table = match AttendanceTable::load(path) {
        Ok(table) => table,
        Err(e) => {
            log.record(&format!("Error reading the Excel file: {e}"));
            return Err(e);
        }
    };

    table.append(record);

    if let Err(e) = table.save(path) {
        log.record(&format!("Error saving the Excel file: {e}"));
        return Err(e);
    }

    tracing::info!(
        name = %record.name,
        date = %record.date_string(),
        time = %record.time_string(),
        rows = table.len(),
        "attendance marked"
    );
    Ok(())
}
