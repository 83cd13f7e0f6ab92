// Copyright 2026 PPS Discipline Contributors
// SPDX-License-Identifier: Apache-2.0

//! Append-only per-day drift log.
//!
//! One file per local day, `drift-YYYY-MM-DD.log`, with one line per cycle:
//!
//! ```text
//! seconds_since_midnight drift offby slack
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use tracing::info;

use crate::error::Result;
use crate::sync::DriftRecord;

/// Writes drift records into a directory of daily files.
#[derive(Debug)]
pub struct DriftJournal {
    dir: PathBuf,
    current: Option<(NaiveDate, File)>,
}

impl DriftJournal {
    /// Create the journal, creating `dir` if needed. Files are opened lazily.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Drift journal enabled");
        Ok(Self { dir, current: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding records for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("drift-{}.log", date.format("%Y-%m-%d")))
    }

    /// Append `record` stamped with local time `at`.
    pub fn append(&mut self, at: NaiveDateTime, record: &DriftRecord) -> Result<()> {
        let date = at.date();
        if self.current.as_ref().map(|(d, _)| *d) != Some(date) {
            let path = self.path_for(date);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            info!(path = %path.display(), "Opened drift journal file");
            self.current = Some((date, file));
        }
        if let Some((_, file)) = &mut self.current {
            writeln!(
                file,
                "{} {} {} {}",
                at.num_seconds_from_midnight(),
                record.drift_micros,
                record.offby,
                record.slack_micros
            )?;
        }
        Ok(())
    }
}
