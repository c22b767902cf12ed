//! Chunked binary partition files.
//!
//! ```text
//! [Header]  magic "FTBK" | version u16 | kind u8 | price digits u8 | n u8 | column ids [u8; n]
//! [Block]*  timestamp chunk | one chunk per column
//! [Footer]  block count u32 | per block: rows u32, min_ts i64, max_ts i64,
//!           (offset u64, len u32) for the timestamp chunk and each column
//! [Trailer] footer offset u64 | magic "FTBK"
//! ```
//!
//! A chunk is a flag byte (0 raw, 1 Snappy), the payload, and a CRC32 of
//! flag and payload. Integers are little-endian. Prices are fixed-point
//! `i64` with `i64::MIN` as null; quantities are `f64` bits.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use ferrotick_core::{BatchKind, Column, ColumnKind, PriceScale, RecordBatch, TimeRange};

use super::{fixed_price, FileInfo, PartitionCodec};
use crate::{StorageFormat, WarehouseError};

const MAGIC: &[u8; 4] = b"FTBK";
const VERSION: u16 = 1;
const TRAILER_LEN: u64 = 12;
const NULL_PRICE: i64 = i64::MIN;
const FLAG_RAW: u8 = 0;
const FLAG_SNAPPY: u8 = 1;

#[derive(Debug, Clone, Copy)]
pub struct BlockCodec {
    price_scale: PriceScale,
    block_rows: usize,
}

impl BlockCodec {
    pub fn new(price_scale: PriceScale, block_rows: usize) -> Self {
        Self {
            price_scale,
            block_rows: block_rows.max(1),
        }
    }
}

#[derive(Debug)]
struct Header {
    kind: BatchKind,
    price_scale: PriceScale,
    columns: Vec<Column>,
}

#[derive(Debug, Clone, Copy)]
struct ChunkRef {
    offset: u64,
    len: u32,
}

#[derive(Debug)]
struct BlockMeta {
    rows: u32,
    min_ts: i64,
    max_ts: i64,
    /// Timestamp chunk first, then one per header column.
    chunks: Vec<ChunkRef>,
}

impl PartitionCodec for BlockCodec {
    fn format(&self) -> StorageFormat {
        StorageFormat::Block
    }

    fn encode(&self, batch: &RecordBatch, path: &Path) -> Result<(), WarehouseError> {
        let columns = batch.column_names();
        let mut writer = CountingWriter::new(BufWriter::new(File::create(path)?));

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&[
            kind_code(batch.kind()),
            self.price_scale.digits() as u8,
            columns.len() as u8,
        ])?;
        for column in &columns {
            writer.write_all(&[column.id()])?;
        }

        let timestamps = batch.timestamps();
        let mut blocks = Vec::new();
        for start in (0..batch.len()).step_by(self.block_rows) {
            let end = (start + self.block_rows).min(batch.len());
            let slice = &timestamps[start..end];
            let mut chunks = Vec::with_capacity(columns.len() + 1);

            let raw: Vec<u8> = slice.iter().flat_map(|ts| ts.to_le_bytes()).collect();
            chunks.push(write_chunk(&mut writer, &raw)?);
            for column in &columns {
                let values = batch.column(*column).unwrap_or_default();
                let raw = encode_values(self.price_scale, *column, &values[start..end])?;
                chunks.push(write_chunk(&mut writer, &raw)?);
            }

            blocks.push(BlockMeta {
                rows: slice.len() as u32,
                min_ts: slice.iter().copied().min().unwrap_or_default(),
                max_ts: slice.iter().copied().max().unwrap_or_default(),
                chunks,
            });
        }

        let footer_offset = writer.position;
        writer.write_all(&(blocks.len() as u32).to_le_bytes())?;
        for block in &blocks {
            writer.write_all(&block.rows.to_le_bytes())?;
            writer.write_all(&block.min_ts.to_le_bytes())?;
            writer.write_all(&block.max_ts.to_le_bytes())?;
            for chunk in &block.chunks {
                writer.write_all(&chunk.offset.to_le_bytes())?;
                writer.write_all(&chunk.len.to_le_bytes())?;
            }
        }
        writer.write_all(&footer_offset.to_le_bytes())?;
        writer.write_all(MAGIC)?;
        writer.inner.flush()?;
        Ok(())
    }

    fn decode(
        &self,
        path: &Path,
        kind: BatchKind,
        range: Option<TimeRange>,
        columns: Option<&[Column]>,
    ) -> Result<RecordBatch, WarehouseError> {
        let mut file = File::open(path)?;
        let (header, blocks) = read_index(&mut file, path)?;
        if header.kind != kind {
            return Err(WarehouseError::corrupt(
                path,
                format!("holds {} but {} were requested", header.kind, kind),
            ));
        }

        let mut selected: Vec<(usize, Column)> = header
            .columns
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, column)| columns.map_or(true, |requested| requested.contains(column)))
            .collect();
        selected.sort_by_key(|(_, column)| *column);

        let mut timestamps = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); selected.len()];
        for block in &blocks {
            if let Some(range) = range {
                if block.rows == 0 || block.min_ts > range.end_us() || block.max_ts < range.start_us()
                {
                    continue;
                }
            }

            let raw = read_chunk(&mut file, block.chunks[0], path)?;
            let block_ts = decode_timestamps(&raw, block.rows, path)?;
            let keep: Vec<usize> = (0..block_ts.len())
                .filter(|&row| range.map_or(true, |range| range.contains(block_ts[row])))
                .collect();
            if keep.is_empty() {
                continue;
            }
            timestamps.extend(keep.iter().map(|&row| block_ts[row]));

            for (slot, (index, column)) in selected.iter().enumerate() {
                let raw = read_chunk(&mut file, block.chunks[index + 1], path)?;
                let decoded = decode_values(header.price_scale, *column, &raw, block.rows, path)?;
                values[slot].extend(keep.iter().map(|&row| decoded[row]));
            }
        }

        let columns: BTreeMap<Column, Vec<f64>> = selected
            .into_iter()
            .map(|(_, column)| column)
            .zip(values)
            .collect();
        RecordBatch::new(kind, timestamps, columns)
            .map_err(|error| WarehouseError::corrupt(path, error.to_string()))
    }

    fn describe(&self, path: &Path) -> Result<FileInfo, WarehouseError> {
        let mut file = File::open(path)?;
        let (header, blocks) = read_index(&mut file, path)?;

        let row_count = blocks.iter().map(|block| u64::from(block.rows)).sum();
        let populated = blocks.iter().filter(|block| block.rows > 0);
        let min = populated.clone().map(|block| block.min_ts).min();
        let max = populated.map(|block| block.max_ts).max();
        let time_range = match (min, max) {
            (Some(min), Some(max)) => Some(
                TimeRange::new(min, max)
                    .map_err(|error| WarehouseError::corrupt(path, error.to_string()))?,
            ),
            _ => None,
        };

        let mut columns = header.columns;
        columns.sort();
        Ok(FileInfo {
            row_count,
            byte_size: 0,
            time_range,
            columns,
        })
    }
}

struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}

fn kind_code(kind: BatchKind) -> u8 {
    match kind {
        BatchKind::Ticks => 0,
        BatchKind::Bars => 1,
    }
}

fn write_chunk<W: Write>(
    writer: &mut CountingWriter<W>,
    raw: &[u8],
) -> Result<ChunkRef, WarehouseError> {
    let compressed = snap::raw::Encoder::new()
        .compress_vec(raw)
        .map_err(|error| std::io::Error::other(format!("compression failed: {error}")))?;

    let mut chunk = Vec::with_capacity(raw.len() + 5);
    if compressed.len() < raw.len() {
        chunk.push(FLAG_SNAPPY);
        chunk.extend_from_slice(&compressed);
    } else {
        chunk.push(FLAG_RAW);
        chunk.extend_from_slice(raw);
    }
    let crc = crc32fast::hash(&chunk);
    chunk.extend_from_slice(&crc.to_le_bytes());

    let offset = writer.position;
    writer.write_all(&chunk)?;
    Ok(ChunkRef {
        offset,
        len: chunk.len() as u32,
    })
}

fn read_chunk(file: &mut File, chunk: ChunkRef, path: &Path) -> Result<Vec<u8>, WarehouseError> {
    if chunk.len < 5 {
        return Err(WarehouseError::corrupt(path, "chunk too small"));
    }
    let end = chunk.offset.checked_add(u64::from(chunk.len));
    let past_end = match end {
        None => true,
        Some(end) => end > file.metadata()?.len(),
    };
    if past_end {
        return Err(WarehouseError::corrupt(
            path,
            format!("chunk at offset {} runs past end of file", chunk.offset),
        ));
    }
    file.seek(SeekFrom::Start(chunk.offset))?;
    let mut stored = vec![0_u8; chunk.len as usize];
    file.read_exact(&mut stored)?;

    let (body, crc) = stored.split_at(stored.len() - 4);
    let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc32fast::hash(body) != expected {
        return Err(WarehouseError::corrupt(
            path,
            format!("checksum mismatch in chunk at offset {}", chunk.offset),
        ));
    }

    match body[0] {
        FLAG_RAW => Ok(body[1..].to_vec()),
        FLAG_SNAPPY => snap::raw::Decoder::new()
            .decompress_vec(&body[1..])
            .map_err(|error| WarehouseError::corrupt(path, format!("decompression failed: {error}"))),
        flag => Err(WarehouseError::corrupt(
            path,
            format!("unknown compression flag {flag}"),
        )),
    }
}

fn encode_values(
    scale: PriceScale,
    column: Column,
    values: &[f64],
) -> Result<Vec<u8>, WarehouseError> {
    let mut raw = Vec::with_capacity(values.len() * 8);
    for value in values {
        match column.kind() {
            ColumnKind::Price => {
                let fixed = fixed_price(scale, *value)?.unwrap_or(NULL_PRICE);
                raw.extend_from_slice(&fixed.to_le_bytes());
            }
            ColumnKind::Quantity => raw.extend_from_slice(&value.to_le_bytes()),
        }
    }
    Ok(raw)
}

fn decode_timestamps(raw: &[u8], rows: u32, path: &Path) -> Result<Vec<i64>, WarehouseError> {
    Ok(words(raw, rows, path)?
        .map(i64::from_le_bytes)
        .collect())
}

fn decode_values(
    scale: PriceScale,
    column: Column,
    raw: &[u8],
    rows: u32,
    path: &Path,
) -> Result<Vec<f64>, WarehouseError> {
    let words = words(raw, rows, path)?;
    Ok(match column.kind() {
        ColumnKind::Price => words
            .map(|word| match i64::from_le_bytes(word) {
                NULL_PRICE => f64::NAN,
                fixed => scale.from_fixed(fixed),
            })
            .collect(),
        ColumnKind::Quantity => words.map(f64::from_le_bytes).collect(),
    })
}

fn words<'a>(
    raw: &'a [u8],
    rows: u32,
    path: &Path,
) -> Result<impl Iterator<Item = [u8; 8]> + 'a, WarehouseError> {
    if raw.len() != rows as usize * 8 {
        return Err(WarehouseError::corrupt(
            path,
            format!("chunk holds {} bytes for {rows} rows", raw.len()),
        ));
    }
    Ok(raw.chunks_exact(8).map(|word| {
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(word);
        bytes
    }))
}

fn read_index(file: &mut File, path: &Path) -> Result<(Header, Vec<BlockMeta>), WarehouseError> {
    let file_len = file.metadata()?.len();
    if file_len < TRAILER_LEN + 9 {
        return Err(WarehouseError::corrupt(path, "file too small"));
    }

    let mut fixed = [0_u8; 9];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut fixed)?;
    let mut cursor = Cursor::new(&fixed);
    if cursor.take(4)? != MAGIC {
        return Err(WarehouseError::corrupt(path, "bad magic"));
    }
    let version = cursor.u16()?;
    if version != VERSION {
        return Err(WarehouseError::corrupt(
            path,
            format!("unsupported version {version}"),
        ));
    }
    let kind = match cursor.u8()? {
        0 => BatchKind::Ticks,
        1 => BatchKind::Bars,
        other => return Err(WarehouseError::corrupt(path, format!("unknown kind {other}"))),
    };
    let price_scale = PriceScale::new(u32::from(cursor.u8()?))
        .map_err(|error| WarehouseError::corrupt(path, error.to_string()))?;
    let column_count = cursor.u8()? as usize;

    let mut ids = vec![0_u8; column_count];
    file.read_exact(&mut ids)?;
    let columns = ids
        .iter()
        .map(|id| {
            Column::from_id(*id)
                .ok_or_else(|| WarehouseError::corrupt(path, format!("unknown column id {id}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut trailer = [0_u8; TRAILER_LEN as usize];
    file.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
    file.read_exact(&mut trailer)?;
    let mut cursor = Cursor::new(&trailer);
    let footer_offset = cursor.u64()?;
    if cursor.take(4)? != MAGIC {
        return Err(WarehouseError::corrupt(path, "bad trailer"));
    }
    if footer_offset > file_len - TRAILER_LEN {
        return Err(WarehouseError::corrupt(path, "footer offset out of bounds"));
    }

    let mut footer = vec![0_u8; (file_len - TRAILER_LEN - footer_offset) as usize];
    file.seek(SeekFrom::Start(footer_offset))?;
    file.read_exact(&mut footer)?;
    let mut cursor = Cursor::new(&footer);
    let block_count = cursor.u32()? as usize;
    // rows, min_ts, max_ts, then (offset, len) per chunk
    let entry_len = 20 + (column_count + 1) * 12;
    if block_count > cursor.remaining() / entry_len {
        return Err(WarehouseError::corrupt(
            path,
            format!("footer too short for {block_count} blocks"),
        ));
    }
    let mut blocks = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let rows = cursor.u32()?;
        let min_ts = cursor.i64()?;
        let max_ts = cursor.i64()?;
        let mut chunks = Vec::with_capacity(column_count + 1);
        for _ in 0..=column_count {
            let offset = cursor.u64()?;
            let len = cursor.u32()?;
            if offset
                .checked_add(u64::from(len))
                .map_or(true, |end| end > footer_offset)
            {
                return Err(WarehouseError::corrupt(path, "chunk outside data region"));
            }
            chunks.push(ChunkRef { offset, len });
        }
        blocks.push(BlockMeta {
            rows,
            min_ts,
            max_ts,
            chunks,
        });
    }

    Ok((
        Header {
            kind,
            price_scale,
            columns,
        },
        blocks,
    ))
}

/// Bounds-checked little-endian reader over an in-memory slice.
struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WarehouseError> {
        let end = self.position + len;
        let slice = self.bytes.get(self.position..end).ok_or_else(|| {
            WarehouseError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated block index",
            ))
        })?;
        self.position = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WarehouseError> {
        let mut bytes = [0_u8; N];
        bytes.copy_from_slice(self.take(N)?);
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, WarehouseError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, WarehouseError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, WarehouseError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, WarehouseError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, WarehouseError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
