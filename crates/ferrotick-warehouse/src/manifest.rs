//! Portable snapshots of the catalog.
//!
//! A [`Manifest`] is a JSON document that stays readable without the live
//! catalog. Entries are keyed by `(symbol, granularity, partition_key)` and
//! kept in key order, so two manifests of the same catalog state serialize
//! to the same bytes apart from `generated_at`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ferrotick_core::{ContentHasher, Granularity, Symbol, UtcDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Span};

use crate::catalog::{CatalogEntry, DataCatalog};
use crate::store::layout;
use crate::{StorageFormat, WarehouseError};

/// Logical key shared by catalog and manifest entries.
pub type ManifestKey = (Symbol, Option<Granularity>, String);

/// Catalog entry frozen at generation time, without catalog-internal ids
/// and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub symbol: Symbol,
    pub granularity: Option<Granularity>,
    pub partition_key: String,
    pub file_path: PathBuf,
    pub storage_format: StorageFormat,
    pub row_count: u64,
    pub min_ts: Option<i64>,
    pub max_ts: Option<i64>,
    pub data_source: Option<String>,
    pub content_hash: String,
    pub file_size_bytes: u64,
}

impl ManifestEntry {
    pub fn key(&self) -> ManifestKey {
        (
            self.symbol.clone(),
            self.granularity,
            self.partition_key.clone(),
        )
    }
}

impl From<&CatalogEntry> for ManifestEntry {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            symbol: entry.symbol.clone(),
            granularity: entry.granularity,
            partition_key: entry.partition_key.clone(),
            file_path: entry.file_path.clone(),
            storage_format: entry.storage_format,
            row_count: entry.row_count,
            min_ts: entry.min_ts,
            max_ts: entry.max_ts,
            data_source: entry.data_source.clone(),
            content_hash: entry.content_hash.clone(),
            file_size_bytes: entry.file_size_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: UtcDateTime,
    pub producer_version: String,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from entries, sorting them by key. A later entry
    /// replaces an earlier one with the same key.
    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        let files: BTreeMap<ManifestKey, ManifestEntry> = entries
            .into_iter()
            .map(|entry| (entry.key(), entry))
            .collect();
        let files: Vec<ManifestEntry> = files.into_values().collect();
        Self {
            generated_at: UtcDateTime::now(),
            producer_version: env!("CARGO_PKG_VERSION").to_owned(),
            total_files: files.len(),
            total_size_bytes: files.iter().map(|entry| entry.file_size_bytes).sum(),
            files,
        }
    }

    /// SHA-256 of the JSON encoding of `files`. Independent of
    /// `generated_at` and `producer_version`.
    pub fn digest(&self) -> Result<String, WarehouseError> {
        Ok(ContentHasher::hash_bytes(&serde_json::to_vec(&self.files)?))
    }

    /// Write pretty JSON to `path` through a staging file.
    pub fn save(&self, path: &Path) -> Result<(), WarehouseError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staged = layout::staging_path(path);
        fs::write(&staged, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&staged, path)?;
        debug!(path = %path.display(), files = self.total_files, "saved manifest");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, WarehouseError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestVerification {
    pub valid: bool,
    pub issues: Vec<String>,
    pub verified_files: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestChange {
    pub before: ManifestEntry,
    pub after: ManifestEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestDiff {
    pub added: Vec<ManifestEntry>,
    pub removed: Vec<ManifestEntry>,
    pub modified: Vec<ManifestChange>,
    pub unchanged_count: usize,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Generates, verifies, merges and compares manifests.
#[derive(Debug, Clone)]
pub struct DataManifest {
    span: Span,
}

impl Default for DataManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManifest {
    pub fn new() -> Self {
        Self {
            span: info_span!("manifest"),
        }
    }

    pub fn in_span(parent: &Span) -> Self {
        Self {
            span: info_span!(parent: parent, "manifest"),
        }
    }

    /// Snapshot every catalog entry.
    pub fn generate(&self, catalog: &DataCatalog) -> Result<Manifest, WarehouseError> {
        let _entered = self.span.enter();
        let manifest = Manifest::from_entries(catalog.list_all()?.iter().map(ManifestEntry::from));
        debug!(files = manifest.total_files, "generated manifest");
        Ok(manifest)
    }

    /// Check every entry against the filesystem. Missing files, and hash
    /// mismatches or unreadable files when `check_hashes` is set, are
    /// reported as issues.
    pub fn verify(&self, manifest: &Manifest, check_hashes: bool) -> ManifestVerification {
        let _entered = self.span.enter();
        let mut issues = Vec::new();
        let mut verified_files = 0;

        for entry in &manifest.files {
            let path = &entry.file_path;
            if !path.is_file() {
                issues.push(format!("Missing file: {}", path.display()));
                continue;
            }
            if !check_hashes {
                verified_files += 1;
                continue;
            }
            match layout::hash_canonical(path) {
                Ok(actual) if actual == entry.content_hash => verified_files += 1,
                Ok(actual) => issues.push(format!(
                    "Hash mismatch: {} (expected {}, found {actual})",
                    path.display(),
                    entry.content_hash
                )),
                Err(error) => issues.push(layout::hash_failure_issue(path, &error)),
            }
        }

        if !issues.is_empty() {
            warn!(issues = issues.len(), "manifest verification found issues");
        }
        ManifestVerification {
            valid: issues.is_empty(),
            issues,
            verified_files,
            total_files: manifest.files.len(),
        }
    }

    /// Merge the current catalog into `existing`. Entries whose partition
    /// is no longer catalogued are kept.
    pub fn update(
        &self,
        existing: &Manifest,
        catalog: &DataCatalog,
    ) -> Result<Manifest, WarehouseError> {
        let _entered = self.span.enter();
        let current = catalog.list_all()?;
        let merged = Manifest::from_entries(
            existing
                .files
                .iter()
                .cloned()
                .chain(current.iter().map(ManifestEntry::from)),
        );
        debug!(
            before = existing.total_files,
            after = merged.total_files,
            "updated manifest"
        );
        Ok(merged)
    }

    /// Changes needed to turn `before` into `after`, by key.
    pub fn diff(&self, before: &Manifest, after: &Manifest) -> ManifestDiff {
        let old: BTreeMap<ManifestKey, &ManifestEntry> =
            before.files.iter().map(|entry| (entry.key(), entry)).collect();
        let new: BTreeMap<ManifestKey, &ManifestEntry> =
            after.files.iter().map(|entry| (entry.key(), entry)).collect();

        let mut diff = ManifestDiff::default();
        for (key, entry) in &new {
            match old.get(key) {
                None => diff.added.push((*entry).clone()),
                Some(previous) if previous != entry => diff.modified.push(ManifestChange {
                    before: (*previous).clone(),
                    after: (*entry).clone(),
                }),
                Some(_) => diff.unchanged_count += 1,
            }
        }
        diff.removed = old
            .iter()
            .filter(|(key, _)| !new.contains_key(*key))
            .map(|(_, entry)| (*entry).clone())
            .collect();
        diff
    }
}
