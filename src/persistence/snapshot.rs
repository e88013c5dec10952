//! Snapshot Persistence
//!
//! Whole-database image for the in-process storage engine.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::store::{IndexSpec, NamedBank, Record, RecordField};

/// Snapshot file format (little endian):
/// - Magic: 4 bytes "FBNK"
/// - Version: 1 byte
/// - Timestamp: 8 bytes (unix millis)
/// - Schema version: 4 bytes
/// - Next record id: 8 bytes
/// - Collection flags: 1 byte (bit 0 memories, bit 1 custom banks)
/// - Memories: index count (4) + [name + field (1)]*,
///   record count (4) + [id (8) + seq (4) + bank + text + dim (4) + f32*dim]*
/// - Custom banks: count (4) + [name + entry count (4) + entries]*
///
/// Strings are a 4 byte length followed by UTF-8 bytes.
const SNAPSHOT_MAGIC: &[u8] = b"FBNK";
const SNAPSHOT_VERSION: u8 = 1;

const HAS_MEMORIES: u8 = 0b01;
const HAS_CUSTOM_BANKS: u8 = 0b10;

/// Contents of the `memories` collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoriesImage {
    pub indexes: Vec<IndexSpec>,
    pub records: Vec<Record>,
}

/// Everything the storage engine persists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseImage {
    pub schema_version: u32,
    pub next_id: u64,
    pub memories: Option<MemoriesImage>,
    pub custom_banks: Option<Vec<NamedBank>>,
}

/// Snapshot writer/reader bound to one file
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the image, replacing the previous snapshot atomically
    pub async fn save(&self, image: &DatabaseImage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, encode(image)).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Load the snapshot, `None` if no file exists yet
    pub async fn load(&self) -> Result<Option<DatabaseImage>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => decode(Bytes::from(data)).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encode an image to bytes
pub fn encode(image: &DatabaseImage) -> Bytes {
    let mut buf = BytesMut::new();

    buf.put_slice(SNAPSHOT_MAGIC);
    buf.put_u8(SNAPSHOT_VERSION);
    buf.put_u64_le(chrono::Utc::now().timestamp_millis().max(0) as u64);
    buf.put_u32_le(image.schema_version);
    buf.put_u64_le(image.next_id);

    let mut flags = 0u8;
    if image.memories.is_some() {
        flags |= HAS_MEMORIES;
    }
    if image.custom_banks.is_some() {
        flags |= HAS_CUSTOM_BANKS;
    }
    buf.put_u8(flags);

    if let Some(memories) = &image.memories {
        buf.put_u32_le(memories.indexes.len() as u32);
        for index in &memories.indexes {
            put_str(&mut buf, &index.name);
            buf.put_u8(index.field.as_u8());
        }

        buf.put_u32_le(memories.records.len() as u32);
        for record in &memories.records {
            buf.put_u64_le(record.id);
            buf.put_u32_le(record.seq);
            put_str(&mut buf, &record.bank);
            put_str(&mut buf, &record.text);
            buf.put_u32_le(record.embedding.len() as u32);
            for x in &record.embedding {
                buf.put_f32_le(*x);
            }
        }
    }

    if let Some(banks) = &image.custom_banks {
        buf.put_u32_le(banks.len() as u32);
        for bank in banks {
            put_str(&mut buf, &bank.name);
            buf.put_u32_le(bank.content.len() as u32);
            for entry in &bank.content {
                put_str(&mut buf, entry);
            }
        }
    }

    buf.freeze()
}

/// Decode bytes produced by [`encode`]
pub fn decode(mut buf: Bytes) -> Result<DatabaseImage> {
    need(&buf, 4)?;
    if &buf[..4] != SNAPSHOT_MAGIC {
        return Err(Error::Snapshot("Invalid snapshot magic".into()));
    }
    buf.advance(4);

    need(&buf, 1)?;
    let version = buf.get_u8();
    if version != SNAPSHOT_VERSION {
        return Err(Error::Snapshot(format!(
            "Unsupported snapshot version: {}",
            version
        )));
    }

    need(&buf, 8 + 4 + 8 + 1)?;
    let _timestamp = buf.get_u64_le();
    let schema_version = buf.get_u32_le();
    let next_id = buf.get_u64_le();
    let flags = buf.get_u8();

    let memories = if flags & HAS_MEMORIES != 0 {
        let index_count = get_u32(&mut buf)?;
        let mut indexes = Vec::with_capacity(index_count.min(64) as usize);
        for _ in 0..index_count {
            let name = get_str(&mut buf)?;
            need(&buf, 1)?;
            let tag = buf.get_u8();
            let field = RecordField::from_u8(tag)
                .ok_or_else(|| Error::Snapshot(format!("Unknown index field tag: {}", tag)))?;
            indexes.push(IndexSpec { name, field });
        }

        let record_count = get_u32(&mut buf)?;
        let mut records = Vec::with_capacity(record_count.min(4096) as usize);
        for _ in 0..record_count {
            need(&buf, 12)?;
            let id = buf.get_u64_le();
            let seq = buf.get_u32_le();
            let bank = get_str(&mut buf)?;
            let text = get_str(&mut buf)?;
            let dim = get_u32(&mut buf)? as usize;
            need(&buf, dim * 4)?;
            let embedding = (0..dim).map(|_| buf.get_f32_le()).collect();
            records.push(Record {
                id,
                text,
                embedding,
                bank,
                seq,
            });
        }
        Some(MemoriesImage { indexes, records })
    } else {
        None
    };

    let custom_banks = if flags & HAS_CUSTOM_BANKS != 0 {
        let count = get_u32(&mut buf)?;
        let mut banks = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let name = get_str(&mut buf)?;
            let entries = get_u32(&mut buf)?;
            let mut content = Vec::with_capacity(entries.min(1024) as usize);
            for _ in 0..entries {
                content.push(get_str(&mut buf)?);
            }
            banks.push(NamedBank { name, content });
        }
        Some(banks)
    } else {
        None
    };

    Ok(DatabaseImage {
        schema_version,
        next_id,
        memories,
        custom_banks,
    })
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn need(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::Snapshot("Truncated snapshot".into()));
    }
    Ok(())
}

fn get_u32(buf: &mut Bytes) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn get_str(buf: &mut Bytes) -> Result<String> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| Error::Snapshot(format!("Invalid UTF-8 in snapshot: {}", e)))
}
