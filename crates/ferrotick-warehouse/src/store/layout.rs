//! Directory layout shared by every backend.
//!
//! ```text
//! {base}/{SYMBOL}/{granularity|ticks}/{partition}.{ext}            canonical
//! {base}/{SYMBOL}/{granularity|ticks}/{partition}.part-{NNNN}.{ext} appended
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ferrotick_core::{ContentHasher, Granularity, PartitionStrategy, Symbol, TICKS_DATASET};

use crate::StorageFormat;

const PART_MARKER: &str = ".part-";
const STAGING_SUFFIX: &str = "tmp";

pub fn dataset_dir(base: &Path, symbol: &Symbol, granularity: Option<Granularity>) -> PathBuf {
    base.join(symbol.as_str())
        .join(PartitionStrategy::dataset(granularity))
}

/// Inverse of [`PartitionStrategy::dataset`]; `None` for unknown names.
pub fn parse_dataset(name: &str) -> Option<Option<Granularity>> {
    if name == TICKS_DATASET {
        return Some(None);
    }
    name.parse::<Granularity>().ok().map(Some)
}

pub fn canonical_path(dir: &Path, partition: &str, format: StorageFormat) -> PathBuf {
    dir.join(format!("{partition}.{}", format.extension()))
}

fn part_path(dir: &Path, partition: &str, format: StorageFormat, sequence: u32) -> PathBuf {
    dir.join(format!(
        "{partition}{PART_MARKER}{sequence:04}.{}",
        format.extension()
    ))
}

/// Path a file is written to before being renamed over `target`.
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    target.with_file_name(name)
}

/// Existing files of `partition`: canonical first, then parts by sequence.
pub fn partition_files(
    dir: &Path,
    partition: &str,
    format: StorageFormat,
) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let canonical = canonical_path(dir, partition, format);
    if canonical.is_file() {
        files.push(canonical);
    }

    let mut parts: Vec<(u32, PathBuf)> = file_names(dir)?
        .into_iter()
        .filter_map(|name| {
            let (owner, sequence) = split_part_name(&name, format)?;
            (owner == partition).then(|| (sequence, dir.join(&name)))
        })
        .collect();
    parts.sort_by_key(|(sequence, _)| *sequence);
    files.extend(parts.into_iter().map(|(_, path)| path));
    Ok(files)
}

/// Path for the next incremental file after `existing`.
pub fn next_part_path(
    dir: &Path,
    partition: &str,
    format: StorageFormat,
    existing: &[PathBuf],
) -> PathBuf {
    let last = existing
        .iter()
        .filter_map(|path| path.file_name()?.to_str())
        .filter_map(|name| split_part_name(name, format).map(|(_, sequence)| sequence))
        .max()
        .unwrap_or(0);
    part_path(dir, partition, format, last + 1)
}

/// Partition keys with at least one file in `dir`, sorted.
pub fn list_partitions(dir: &Path, format: StorageFormat) -> io::Result<Vec<String>> {
    let suffix = format!(".{}", format.extension());
    let mut partitions: Vec<String> = file_names(dir)?
        .into_iter()
        .filter_map(|name| {
            let stem = name.strip_suffix(&suffix)?;
            let key = stem.split_once(PART_MARKER).map_or(stem, |(key, _)| key);
            PartitionStrategy::parse_partition_range(key)
                .is_ok()
                .then(|| key.to_owned())
        })
        .collect();
    partitions.sort();
    partitions.dedup();
    Ok(partitions)
}

pub fn subdirectories(dir: &Path) -> io::Result<Vec<String>> {
    entries(dir, true)
}

/// Remove `dir` and its parents up to (not including) `stop` while they are
/// empty. Failures are ignored; leftover empty directories are harmless.
pub fn remove_empty_dirs(dir: &Path, stop: &Path) {
    let mut current = Some(dir);
    while let Some(path) = current {
        if path == stop || !path.starts_with(stop) || fs::remove_dir(path).is_err() {
            break;
        }
        current = path.parent();
    }
}

/// Content hash of a partition: SHA-256 over its files' bytes in order.
/// Equal to the file hash when the partition is a single file.
pub fn hash_partition(files: &[PathBuf]) -> io::Result<String> {
    ContentHasher::hash_files_concatenated(files)
}

/// Files of the partition whose canonical path is `canonical`, found beside
/// it. Paths outside the layout resolve to themselves.
pub fn files_for_canonical(canonical: &Path) -> io::Result<Vec<PathBuf>> {
    let partition = canonical.file_stem().and_then(|stem| stem.to_str());
    let format = canonical
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.parse::<StorageFormat>().ok());
    match (canonical.parent(), partition, format) {
        (Some(dir), Some(partition), Some(format)) => partition_files(dir, partition, format),
        _ => Ok(vec![canonical.to_path_buf()]),
    }
}

/// Current content hash of the partition registered under `canonical`.
pub fn hash_canonical(canonical: &Path) -> io::Result<String> {
    let files = files_for_canonical(canonical)?;
    if files.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no files for {}", canonical.display()),
        ));
    }
    hash_partition(&files)
}

/// Issue line for a partition whose hash could not be computed. Only a
/// vanished file counts as missing.
pub fn hash_failure_issue(canonical: &Path, error: &io::Error) -> String {
    let label = match error.kind() {
        io::ErrorKind::NotFound => "Missing file",
        _ => "Unreadable file",
    };
    format!("{label}: {} ({error})", canonical.display())
}

fn split_part_name(name: &str, format: StorageFormat) -> Option<(&str, u32)> {
    let stem = name.strip_suffix(format.extension())?.strip_suffix('.')?;
    let (owner, sequence) = stem.split_once(PART_MARKER)?;
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((owner, sequence.parse().ok()?))
}

fn file_names(dir: &Path) -> io::Result<Vec<String>> {
    entries(dir, false)
}

fn entries(dir: &Path, directories: bool) -> io::Result<Vec<String>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };

    let mut names = Vec::new();
    for entry in read {
        let entry = entry?;
        if entry.file_type()?.is_dir() != directories {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn only_vanished_files_are_reported_missing() {
        let path = Path::new("/data/EURUSD/H1/2024.parquet");
        let gone = io::Error::new(io::ErrorKind::NotFound, "no files");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            hash_failure_issue(path, &gone),
            "Missing file: /data/EURUSD/H1/2024.parquet (no files)"
        );
        assert_eq!(
            hash_failure_issue(path, &denied),
            "Unreadable file: /data/EURUSD/H1/2024.parquet (denied)"
        );
    }

    #[test]
    fn hashing_a_partition_without_files_is_not_found() {
        let temp = tempdir().expect("tempdir");
        let error = hash_canonical(&temp.path().join("2024.parquet")).expect_err("no files");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
        assert!(hash_failure_issue(&temp.path().join("2024.parquet"), &error)
            .starts_with("Missing file:"));
    }

    #[test]
    fn dataset_dir_uses_granularity_or_ticks() {
        let symbol = Symbol::parse("eurusd").expect("symbol");
        let base = Path::new("/data");
        assert_eq!(
            dataset_dir(base, &symbol, Some(Granularity::H1)),
            Path::new("/data/EURUSD/H1")
        );
        assert_eq!(dataset_dir(base, &symbol, None), Path::new("/data/EURUSD/ticks"));
        assert_eq!(parse_dataset("ticks"), Some(None));
        assert_eq!(parse_dataset("H1"), Some(Some(Granularity::H1)));
        assert_eq!(parse_dataset("nope"), None);
    }

    #[test]
    fn parts_are_ordered_and_staging_files_ignored() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        for name in [
            "2024.parquet",
            "2024.part-0010.parquet",
            "2024.part-0002.parquet",
            "2024.part-0003.parquet.tmp",
            "2025.part-0001.parquet",
            "2024.ftb",
        ] {
            fs::write(dir.join(name), b"x").expect("write");
        }

        let files = partition_files(dir, "2024", StorageFormat::Parquet).expect("files");
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().expect("name").to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["2024.parquet", "2024.part-0002.parquet", "2024.part-0010.parquet"]
        );
        assert_eq!(
            next_part_path(dir, "2024", StorageFormat::Parquet, &files),
            dir.join("2024.part-0011.parquet")
        );
        assert_eq!(
            list_partitions(dir, StorageFormat::Parquet).expect("partitions"),
            vec!["2024", "2025"]
        );
    }

    #[test]
    fn single_file_partition_hash_equals_file_hash() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("all.ftb");
        fs::write(&path, b"payload").expect("write");
        assert_eq!(
            hash_partition(&[path.clone()]).expect("hash"),
            ContentHasher::hash_file(&path).expect("hash")
        );
    }

    #[test]
    fn canonical_hash_covers_incremental_parts() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        let canonical = dir.join("2024.ftb");
        fs::write(&canonical, b"head").expect("write");
        fs::write(dir.join("2024.part-0001.ftb"), b"tail").expect("write");

        assert_eq!(
            hash_canonical(&canonical).expect("hash"),
            ContentHasher::hash_bytes(b"headtail")
        );
        fs::remove_file(dir.join("2024.part-0001.ftb")).expect("remove");
        assert_eq!(
            hash_canonical(&canonical).expect("hash"),
            ContentHasher::hash_file(&canonical).expect("hash")
        );
        fs::remove_file(&canonical).expect("remove");
        assert!(hash_canonical(&canonical).is_err());
    }

    #[test]
    fn staging_path_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("/d/2024.parquet")),
            Path::new("/d/2024.parquet.tmp")
        );
    }
}
