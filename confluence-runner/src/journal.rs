//! Trade journals.
//!
//! - `CsvJournal`: one append-only CSV file, one row per entry or exit
//! - `MemoryJournal`: keeps records in memory for tests and dry runs
//!
//! Both rows share one column layout; exit rows leave the entry-only columns
//! empty. Factor detail is stored as a JSON object in a single column.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use confluence_core::error::JournalError;
use confluence_core::terminal::{EntryRecord, ExitRecord, Journal};

const HEADER: [&str; 16] = [
    "kind",
    "ticket",
    "time",
    "symbol",
    "direction",
    "volume",
    "price",
    "stop_loss",
    "take_profit",
    "confluence",
    "ensemble",
    "probability",
    "regime",
    "profit",
    "factors",
    "config_fingerprint",
];

pub struct CsvJournal {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl std::fmt::Debug for CsvJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvJournal").field("path", &self.path).finish_non_exhaustive()
    }
}

impl CsvJournal {
    /// Open `path` for appending. The header is written only to a new or empty file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer.write_record(HEADER).map_err(write_err)?;
            writer.flush()?;
        }
        Ok(Self { path, writer: Mutex::new(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, row: [String; 16]) -> Result<(), JournalError> {
        let mut writer = self.writer.lock();
        writer.write_record(&row).map_err(write_err)?;
        writer.flush()?;
        Ok(())
    }
}

fn write_err(err: csv::Error) -> JournalError {
    JournalError::Write(err.to_string())
}

impl Journal for CsvJournal {
    fn log_entry(&self, e: &EntryRecord) -> Result<(), JournalError> {
        let factors = serde_json::to_string(&e.factors).map_err(|err| JournalError::Write(err.to_string()))?;
        self.append([
            "entry".into(),
            e.ticket.0.to_string(),
            e.opened_at.to_rfc3339(),
            e.symbol.clone(),
            e.direction.to_string(),
            e.volume.to_string(),
            format!("{:.6}", e.entry_price),
            format!("{:.6}", e.stop_loss),
            format!("{:.6}", e.take_profit),
            e.confluence.to_string(),
            format!("{:.4}", e.ensemble),
            format!("{:.4}", e.probability),
            e.regime.to_string(),
            String::new(),
            factors,
            e.config_fingerprint.clone(),
        ])
    }

    fn log_exit(&self, x: &ExitRecord) -> Result<(), JournalError> {
        self.append([
            "exit".into(),
            x.ticket.0.to_string(),
            x.closed_at.to_rfc3339(),
            x.symbol.clone(),
            String::new(),
            String::new(),
            format!("{:.6}", x.exit_price),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            format!("{:.2}", x.profit),
            String::new(),
            String::new(),
        ])
    }
}

#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<EntryRecord>>,
    exits: Mutex<Vec<ExitRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EntryRecord> {
        self.entries.lock().clone()
    }

    pub fn exits(&self) -> Vec<ExitRecord> {
        self.exits.lock().clone()
    }
}

impl Journal for MemoryJournal {
    fn log_entry(&self, entry: &EntryRecord) -> Result<(), JournalError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn log_exit(&self, exit: &ExitRecord) -> Result<(), JournalError> {
        self.exits.lock().push(exit.clone());
        Ok(())
    }
}
