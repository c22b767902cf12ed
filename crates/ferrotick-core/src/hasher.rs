//! SHA-256 content digests for bytes, files, and batches.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::RecordBatch;

const CHUNK_SIZE: usize = 64 * 1024;

/// What to verify a digest against.
#[derive(Debug, Clone, Copy)]
pub enum HashInput<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
    Batch(&'a RecordBatch),
}

/// Stateless digest helpers. All digests are lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn hash_bytes(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Stream a reader through the digest in fixed-size chunks.
    pub fn hash_reader<R: Read>(reader: R) -> io::Result<String> {
        let mut hasher = Sha256::new();
        update_from_reader(&mut hasher, reader)?;
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn hash_file(path: &Path) -> io::Result<String> {
        Self::hash_reader(File::open(path)?)
    }

    /// Digest of the byte concatenation of `paths`, in order. A single path
    /// yields the same digest as [`ContentHasher::hash_file`].
    pub fn hash_files_concatenated<P: AsRef<Path>>(paths: &[P]) -> io::Result<String> {
        let mut hasher = Sha256::new();
        for path in paths {
            update_from_reader(&mut hasher, File::open(path.as_ref())?)?;
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Digest over timestamps plus the batch's signature column (`close` for
    /// bars, `ask` for ticks), falling back to timestamps alone. Other columns
    /// do not contribute.
    pub fn hash_batch(batch: &RecordBatch) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"timestamp_us");
        hasher.update((batch.len() as u64).to_le_bytes());
        for ts in batch.timestamps() {
            hasher.update(ts.to_le_bytes());
        }

        let signature = batch.kind().signature_column();
        if let Some(values) = batch.column(signature) {
            hasher.update(signature.as_str().as_bytes());
            for value in values {
                hasher.update(canonical_bits(*value).to_le_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    pub fn verify(input: HashInput<'_>, expected: &str) -> io::Result<bool> {
        let actual = match input {
            HashInput::Bytes(data) => Self::hash_bytes(data),
            HashInput::File(path) => Self::hash_file(path)?,
            HashInput::Batch(batch) => Self::hash_batch(batch),
        };
        Ok(actual.eq_ignore_ascii_case(expected.trim()))
    }
}

fn update_from_reader<R: Read>(hasher: &mut Sha256, mut reader: R) -> io::Result<()> {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        hasher.update(&buffer[..read]);
    }
}

// All NaN payloads hash alike; -0.0 and 0.0 stay distinct.
fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::{BatchKind, Column};

    fn bars(closes: &[f64], volumes: &[f64]) -> RecordBatch {
        let mut columns = BTreeMap::new();
        columns.insert(Column::Close, closes.to_vec());
        columns.insert(Column::TickVolume, volumes.to_vec());
        let timestamps = (1..=closes.len() as i64).collect();
        RecordBatch::new(BatchKind::Bars, timestamps, columns).expect("batch")
    }

    #[test]
    fn hashes_known_vector() {
        assert_eq!(
            ContentHasher::hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data.bin");
        let payload: Vec<u8> = (0..200_000_u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &payload).expect("write");

        let from_file = ContentHasher::hash_file(&path).expect("hash file");
        assert_eq!(from_file, ContentHasher::hash_bytes(&payload));
        assert!(ContentHasher::verify(HashInput::File(&path), &from_file.to_uppercase())
            .expect("verify"));
    }

    #[test]
    fn concatenation_is_order_sensitive() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"left").expect("write");
        fs::write(&b, b"right").expect("write");

        let ab = ContentHasher::hash_files_concatenated(&[&a, &b]).expect("hash");
        let ba = ContentHasher::hash_files_concatenated(&[&b, &a]).expect("hash");
        assert_ne!(ab, ba);
        assert_eq!(ab, ContentHasher::hash_bytes(b"leftright"));
        assert_eq!(
            ContentHasher::hash_files_concatenated(&[&a]).expect("hash"),
            ContentHasher::hash_file(&a).expect("hash")
        );
    }

    #[test]
    fn batch_hash_ignores_non_signature_columns() {
        let base = ContentHasher::hash_batch(&bars(&[1.0, 2.0], &[10.0, 20.0]));
        let volume_changed = ContentHasher::hash_batch(&bars(&[1.0, 2.0], &[11.0, 20.0]));
        let close_changed = ContentHasher::hash_batch(&bars(&[1.0, 2.5], &[10.0, 20.0]));
        assert_eq!(base, volume_changed);
        assert_ne!(base, close_changed);
    }

    #[test]
    fn batch_hash_falls_back_to_timestamps() {
        let batch = bars(&[1.0], &[1.0])
            .select(&[Column::TickVolume])
            .expect("select");
        let other = bars(&[9.0], &[9.0])
            .select(&[Column::TickVolume])
            .expect("select");
        assert_eq!(ContentHasher::hash_batch(&batch), ContentHasher::hash_batch(&other));
    }
}
