// Sector addressing shared by the main file and the short-stream container.

use crate::error::{CfbError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Size of the fixed header region that precedes every sector of the main file.
pub const HEADER_SIZE: u64 = 512;

/// Raw on-disk values of the chain sentinels.
pub const FREE_SECT: i32 = 0;
pub const END_OF_CHAIN: i32 = -1;
pub const SAT_SECT: i32 = -2;
pub const MSAT_SECT: i32 = -3;

/// One chain link: either the next sector of a chain or a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum SectorRef {
    Chain(u32),
    Free,
    EndOfChain,
    SatSector,
    MsatSector,
    /// A negative value outside the known sentinels, kept until a walk reaches it.
    Invalid(i32),
}

impl SectorRef {
    /// Decode a signed link value. Any value <= 0 is a sentinel.
    pub fn decode(raw: i32) -> Self {
        match raw {
            r if r > 0 => SectorRef::Chain(r as u32),
            FREE_SECT => SectorRef::Free,
            END_OF_CHAIN => SectorRef::EndOfChain,
            SAT_SECT => SectorRef::SatSector,
            MSAT_SECT => SectorRef::MsatSector,
            other => SectorRef::Invalid(other),
        }
    }

    /// Like `decode`, but rejects values outside the known sentinels.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match Self::decode(raw) {
            SectorRef::Invalid(other) => Err(CfbError::ChainIntegrity(format!(
                "unknown sector sentinel {}",
                other
            ))),
            r => Ok(r),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            SectorRef::Chain(id) => id as i32,
            SectorRef::Free => FREE_SECT,
            SectorRef::EndOfChain => END_OF_CHAIN,
            SectorRef::SatSector => SAT_SECT,
            SectorRef::MsatSector => MSAT_SECT,
            SectorRef::Invalid(raw) => raw,
        }
    }

    /// The sector index if this is a real link.
    pub fn sector(self) -> Option<u32> {
        match self {
            SectorRef::Chain(id) => Some(id),
            _ => None,
        }
    }
}

/// Decode a buffer of consecutive little-endian 4-byte link entries.
///
/// Unknown negative values are kept as `SectorRef::Invalid`; only a chain
/// walk that reaches one reports it.
pub fn decode_links(buf: &[u8]) -> Result<Vec<SectorRef>> {
    let mut cur = Cursor::new(buf);
    let mut out = Vec::with_capacity(buf.len() / 4);
    for _ in 0..buf.len() / 4 {
        let raw = cur.read_i32::<LittleEndian>()?;
        out.push(SectorRef::decode(raw));
    }
    Ok(out)
}

/// A sector-addressed view over a seekable byte source.
///
/// The main file is addressed at `512 + id * sector_size`; the short-stream
/// container is addressed at `id * short_sector_size` with no base offset.
pub struct SectorSpace<R: Read + Seek> {
    inner: R,
    base: u64,
    sector_size: usize,
    label: &'static str,
}

impl<R: Read + Seek> SectorSpace<R> {
    pub fn new(inner: R, base: u64, sector_size: usize, label: &'static str) -> Self {
        Self {
            inner,
            base,
            sector_size,
            label,
        }
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn sector_offset(&self, id: u32) -> u64 {
        self.base + id as u64 * self.sector_size as u64
    }

    /// Read a full sector.
    pub fn read_sector(&mut self, id: u32) -> Result<Vec<u8>> {
        self.read_partial(id, self.sector_size)
    }

    /// Read the first `len` bytes of a sector (`len` <= sector size).
    pub fn read_partial(&mut self, id: u32, len: usize) -> Result<Vec<u8>> {
        let len = len.min(self.sector_size);
        let offset = self.sector_offset(id);
        trace!(
            "Reading {} bytes of {} sector #{} at 0x{:X}",
            len, self.label, id, offset
        );
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| CfbError::from_read(e, format!("{} sector #{}", self.label, id)))?;
        Ok(buf)
    }
}
