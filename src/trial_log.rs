//! Per-trial progress records, kept in memory and optionally appended to a
//! CSV file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

pub const CSV_HEADER: &str = "Trial,Error,Value_LB,Value_UB,Size_lower_bound,Size_upper_bound,Time";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrialRecord {
    pub trial: usize,
    /// Excess at the root plus the target error, i.e. the current gap.
    pub error: f64,
    pub value_lb: f64,
    pub value_ub: f64,
    pub size_lower_bound: usize,
    pub size_upper_bound: usize,
    pub time_secs: f64,
}

impl TrialRecord {
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.trial,
            self.error,
            self.value_lb,
            self.value_ub,
            self.size_lower_bound,
            self.size_upper_bound,
            self.time_secs
        )
    }
}

#[derive(Debug, Default)]
pub struct TrialLog {
    records: Vec<TrialRecord>,
    sink: Option<BufWriter<File>>,
}

impl TrialLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Append to `path`, writing the header first when the file is new or
    /// empty.
    pub fn to_csv(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        let mut sink = BufWriter::new(file);
        if empty {
            writeln!(sink, "{CSV_HEADER}")?;
        }
        Ok(Self {
            records: Vec::new(),
            sink: Some(sink),
        })
    }

    pub fn append(&mut self, record: TrialRecord) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            writeln!(sink, "{}", record.to_csv_row())?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TrialRecord> {
        self.records.last()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}
