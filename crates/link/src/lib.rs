//! The shared state region written by the bridge and polled by an external
//! voice client.
//!
//! The region is a memory-mapped file with a fixed little-endian layout:
//!
//! ```text
//! 0   magic            b"VCLK"
//! 4   protocol version u32
//! 8   capacity         u32
//! 12  (reserved)
//! 16  leading stamp    u64
//! 24  record count     u32 + 4 reserved bytes
//! 32  records          capacity * RECORD_SIZE bytes
//! end trailing stamp   u64
//! ```
//!
//! No lock is shared between the writer and its readers. Consistency comes
//! from the version stamps alone: the stable stamp value for snapshot
//! version `v` is `2v`, and the writer holds the leading stamp at the odd
//! value `2v - 1` while the payload is in flux. A reader that sees an odd
//! stamp, or mismatched stamps around its copy of the payload, retries a
//! bounded number of times and then reports [`LinkError::StaleRead`].

pub mod records;

use memmap2::{Mmap, MmapMut};
use records::{LinkRecord, LINK_MAGIC, PROTOCOL_VERSION, RECORD_SIZE};
use std::fs::{File, OpenOptions};
use std::hint;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link region has invalid magic bytes")]
    InvalidMagic,

    #[error("link protocol version {0} is unsupported")]
    UnsupportedVersion(u32),

    #[error("link region is smaller than its header claims")]
    Truncated,

    #[error("read overlapped concurrent writes {0} times, giving up")]
    StaleRead(u32),

    #[error("no snapshot has been published yet")]
    NoData,

    #[error("snapshot exceeded link capacity, evicted {evicted} oldest identities")]
    BufferOverflow { evicted: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

const CAPACITY_OFFSET: usize = 8;
const LEAD_STAMP_OFFSET: usize = 16;
const COUNT_OFFSET: usize = 24;
const RECORDS_OFFSET: usize = 32;

/// Attempts a reader makes before declaring the region too contended.
pub const MAX_READ_RETRIES: u32 = 8;

fn trail_stamp_offset(capacity: usize) -> usize {
    RECORDS_OFFSET + capacity * RECORD_SIZE
}

fn region_size(capacity: usize) -> usize {
    trail_stamp_offset(capacity) + 8
}

// Safety: `offset` must be 8-aligned and in bounds. All stamp offsets are
// multiples of 8 and the mapping itself is page-aligned.
unsafe fn stamp_at(base: *const u8, offset: usize) -> &'static AtomicU64 {
    unsafe { &*(base.add(offset) as *const AtomicU64) }
}

/// The single writer of a link region. Owns the backing file.
pub struct LinkWriter {
    map: MmapMut,
    capacity: usize,
    path: PathBuf,
}

impl LinkWriter {
    /// Creates (or resets) the region file at `path` with room for
    /// `capacity` identity records, and writes the header. Stamps start at
    /// zero, which readers report as [`LinkError::NoData`].
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> Result<LinkWriter, LinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(region_size(capacity) as u64)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };

        map[..4].copy_from_slice(LINK_MAGIC);
        map[4..8].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        map[CAPACITY_OFFSET..CAPACITY_OFFSET + 4].copy_from_slice(&(capacity as u32).to_le_bytes());

        Ok(LinkWriter { map, capacity, path })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one snapshot under the stamp protocol. `version` must be the
    /// next value of a monotonically increasing counter starting at 1;
    /// records beyond the region's capacity are ignored (the caller evicts
    /// before handing the snapshot over).
    pub fn write(&mut self, version: u64, records: &[LinkRecord]) {
        debug_assert!(version > 0, "version 0 is reserved for the empty region");
        let count = records.len().min(self.capacity);
        let stable = version * 2;

        self.lead_stamp().store(stable - 1, Ordering::Relaxed);
        fence(Ordering::Release);

        let mut payload = Vec::with_capacity(count * RECORD_SIZE);
        for record in &records[..count] {
            record.encode(&mut payload);
        }
        self.map[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&(count as u32).to_le_bytes());
        self.map[RECORDS_OFFSET..RECORDS_OFFSET + payload.len()].copy_from_slice(&payload);

        fence(Ordering::Release);
        self.trail_stamp().store(stable, Ordering::Relaxed);
        self.lead_stamp().store(stable, Ordering::Release);
    }

    /// Removes the region file. Readers holding a mapping keep their last
    /// view; new readers fail to open.
    pub fn unlink(self) -> Result<(), LinkError> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn lead_stamp(&self) -> &AtomicU64 {
        unsafe { stamp_at(self.map.as_ptr(), LEAD_STAMP_OFFSET) }
    }

    fn trail_stamp(&self) -> &AtomicU64 {
        unsafe { stamp_at(self.map.as_ptr(), trail_stamp_offset(self.capacity)) }
    }
}

/// One consistent view of the region.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkView {
    pub version: u64,
    pub records: Vec<LinkRecord>,
}

/// A read-only mapping of a link region, for the voice client side and for
/// tooling. Many readers may exist concurrently with the one writer.
pub struct LinkReader {
    map: Mmap,
    capacity: usize,
}

impl LinkReader {
    pub fn open(path: impl AsRef<Path>) -> Result<LinkReader, LinkError> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < RECORDS_OFFSET {
            return Err(LinkError::Truncated);
        }
        if &map[..4] != LINK_MAGIC {
            return Err(LinkError::InvalidMagic);
        }
        let version = u32::from_le_bytes(map[4..8].try_into().unwrap());
        if version != PROTOCOL_VERSION {
            return Err(LinkError::UnsupportedVersion(version));
        }
        let capacity = u32::from_le_bytes(
            map[CAPACITY_OFFSET..CAPACITY_OFFSET + 4].try_into().unwrap(),
        ) as usize;
        if map.len() < region_size(capacity) {
            return Err(LinkError::Truncated);
        }

        Ok(LinkReader { map, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies out one consistent snapshot. Never blocks; spins at most
    /// [`MAX_READ_RETRIES`] times before reporting the region as contended.
    pub fn read(&self) -> Result<LinkView, LinkError> {
        for _ in 0..MAX_READ_RETRIES {
            let lead = self.lead_stamp().load(Ordering::Acquire);
            if lead == 0 {
                return Err(LinkError::NoData);
            }
            if lead % 2 == 1 {
                // Write in progress
                hint::spin_loop();
                continue;
            }

            let count = u32::from_le_bytes(
                self.map[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().unwrap(),
            ) as usize;
            if count > self.capacity {
                // Torn header, treat like a stamp mismatch
                hint::spin_loop();
                continue;
            }
            let payload = self.map[RECORDS_OFFSET..RECORDS_OFFSET + count * RECORD_SIZE].to_vec();

            fence(Ordering::Acquire);
            let trail = self.trail_stamp().load(Ordering::Relaxed);
            let lead_after = self.lead_stamp().load(Ordering::Relaxed);
            if trail != lead || lead_after != lead {
                hint::spin_loop();
                continue;
            }

            let mut cursor = payload.as_slice();
            let mut records = Vec::with_capacity(count);
            for _ in 0..count {
                records.push(LinkRecord::decode(&mut cursor)?);
            }
            return Ok(LinkView {
                version: lead / 2,
                records,
            });
        }
        Err(LinkError::StaleRead(MAX_READ_RETRIES))
    }

    fn lead_stamp(&self) -> &AtomicU64 {
        unsafe { stamp_at(self.map.as_ptr(), LEAD_STAMP_OFFSET) }
    }

    fn trail_stamp(&self) -> &AtomicU64 {
        unsafe { stamp_at(self.map.as_ptr(), trail_stamp_offset(self.capacity)) }
    }
}
