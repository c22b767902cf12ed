//! Records of which partition versions a consumer run read.
//!
//! Lineage rows are copies taken from the catalog at record time, so they
//! stay meaningful after the catalog entry is replaced or deleted.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use duckdb::{Row, ToSql};
use ferrotick_core::{Granularity, Symbol, UtcDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::catalog::{path_text, CatalogEntry};
use crate::store::layout;
use crate::{MetadataDb, WarehouseError};

/// Identifier of one consumer run, for example a backtest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Fresh random (v4) id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A partition version a run depended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub file_path: PathBuf,
    pub content_hash: String,
    pub symbol: Symbol,
    pub granularity: Option<Granularity>,
    pub partition_key: String,
}

impl From<&CatalogEntry> for FileReference {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            file_path: entry.file_path.clone(),
            content_hash: entry.content_hash.clone(),
            symbol: entry.symbol.clone(),
            granularity: entry.granularity,
            partition_key: entry.partition_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageRecord {
    pub id: i64,
    pub run_id: RunId,
    pub file: FileReference,
    pub recorded_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReproducibilityReport {
    pub run_id: RunId,
    pub reproducible: bool,
    /// `Missing file: …`, `Unreadable file: …` and `Hash mismatch: …` lines,
    /// one per problem.
    pub issues: Vec<String>,
    pub verified_files: usize,
    pub total_files: usize,
}

/// Append-only lineage store on the shared [`MetadataDb`].
#[derive(Clone)]
pub struct DataLineage {
    db: MetadataDb,
    span: Span,
}

impl DataLineage {
    pub fn new(db: MetadataDb) -> Self {
        Self {
            db,
            span: info_span!("lineage"),
        }
    }

    pub fn in_span(db: MetadataDb, parent: &Span) -> Self {
        Self {
            db,
            span: info_span!(parent: parent, "lineage"),
        }
    }

    /// Append one row per file for `run_id` in a single transaction and
    /// return the number of rows written. Recording the same run twice
    /// writes the rows twice.
    pub fn record(&self, run_id: &RunId, files: &[FileReference]) -> Result<usize, WarehouseError> {
        let _entered = self.span.enter();
        if files.is_empty() {
            return Ok(0);
        }
        let now = UtcDateTime::now().unix_micros();

        let written = self.db.transaction(|connection| {
            let mut statement = connection.prepare(
                "INSERT INTO lineage (run_id, file_path, content_hash, symbol, granularity, \
                 partition_key, recorded_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for file in files {
                let path = path_text(&file.file_path);
                let symbol = file.symbol.as_str();
                let granularity = file.granularity.map(Granularity::as_str);
                let params: [&dyn ToSql; 7] = [
                    &run_id.as_str(),
                    &path,
                    &file.content_hash,
                    &symbol,
                    &granularity,
                    &file.partition_key,
                    &now,
                ];
                statement.execute(params.as_slice())?;
            }
            Ok(files.len())
        })?;

        debug!(run_id = %run_id, files = written, "recorded lineage");
        Ok(written)
    }

    pub fn records_for_run(&self, run_id: &RunId) -> Result<Vec<LineageRecord>, WarehouseError> {
        let connection = self.db.acquire()?;
        let mut statement = connection.prepare(
            "SELECT id, run_id, file_path, content_hash, symbol, granularity, partition_key, \
             recorded_at FROM lineage WHERE run_id = ? ORDER BY id",
        )?;
        let mut rows = statement.query([run_id.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }

    /// Check that every file recorded for `run_id` still exists with the
    /// recorded hash. Problems become issues in the report, not errors.
    ///
    /// # Errors
    /// [`WarehouseError::NotFound`] if nothing was recorded for `run_id`.
    pub fn can_reproduce(&self, run_id: &RunId) -> Result<ReproducibilityReport, WarehouseError> {
        let records = self.records_for_run(run_id)?;
        let _entered = self.span.enter();
        if records.is_empty() {
            return Err(WarehouseError::not_found("lineage run", run_id.as_str()));
        }

        let mut issues = Vec::new();
        let mut verified_files = 0;
        for record in &records {
            let path = &record.file.file_path;
            if !path.is_file() {
                issues.push(format!("Missing file: {}", path.display()));
                continue;
            }
            match layout::hash_canonical(path) {
                Ok(actual) if actual == record.file.content_hash => verified_files += 1,
                Ok(actual) => issues.push(format!(
                    "Hash mismatch: {} (recorded {}, current {actual})",
                    path.display(),
                    record.file.content_hash
                )),
                Err(error) => issues.push(layout::hash_failure_issue(path, &error)),
            }
        }

        let reproducible = issues.is_empty();
        if reproducible {
            info!(run_id = %run_id, files = records.len(), "run is reproducible");
        } else {
            warn!(run_id = %run_id, issues = issues.len(), "run is not reproducible");
        }
        Ok(ReproducibilityReport {
            run_id: run_id.clone(),
            reproducible,
            issues,
            verified_files,
            total_files: records.len(),
        })
    }

    /// Runs that read a file with `content_hash`, oldest first.
    pub fn find_runs_using(&self, content_hash: &str) -> Result<Vec<RunId>, WarehouseError> {
        self.distinct_runs(
            "SELECT run_id FROM lineage WHERE content_hash = ? GROUP BY run_id ORDER BY MIN(id)",
            Some(content_hash),
        )
    }

    pub fn list_runs(&self) -> Result<Vec<RunId>, WarehouseError> {
        self.distinct_runs(
            "SELECT run_id FROM lineage GROUP BY run_id ORDER BY MIN(id)",
            None,
        )
    }

    /// Remove every row of `run_id`; returns the number removed.
    pub fn delete_run(&self, run_id: &RunId) -> Result<usize, WarehouseError> {
        let _entered = self.span.enter();
        let removed = self.db.transaction(|connection| {
            Ok(connection.execute("DELETE FROM lineage WHERE run_id = ?", [run_id.as_str()])?)
        })?;
        debug!(run_id = %run_id, removed, "deleted lineage run");
        Ok(removed)
    }

    fn distinct_runs(&self, sql: &str, filter: Option<&str>) -> Result<Vec<RunId>, WarehouseError> {
        let connection = self.db.acquire()?;
        let mut statement = connection.prepare(sql)?;
        let mut rows = match filter {
            Some(value) => statement.query([value])?,
            None => statement.query([])?,
        };
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(RunId(row.get::<_, String>(0)?));
        }
        Ok(runs)
    }
}

fn read_record(row: &Row<'_>) -> Result<LineageRecord, WarehouseError> {
    let symbol: String = row.get(4)?;
    let granularity: Option<String> = row.get(5)?;
    let recorded_at: i64 = row.get(7)?;
    Ok(LineageRecord {
        id: row.get(0)?,
        run_id: RunId(row.get(1)?),
        file: FileReference {
            file_path: PathBuf::from(row.get::<_, String>(2)?),
            content_hash: row.get(3)?,
            symbol: Symbol::parse(&symbol)?,
            granularity: granularity
                .as_deref()
                .map(str::parse::<Granularity>)
                .transpose()?,
            partition_key: row.get(6)?,
        },
        recorded_at: UtcDateTime::from_unix_micros(recorded_at)?,
    })
}
