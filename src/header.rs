// Sources:
// - https://learn.microsoft.com/openspecs/windows_protocols/ms-cfb
// - https://en.wikipedia.org/wiki/Compound_File_Binary_Format

//! Parse the fixed 512-byte header of a compound file with std::io::Cursor

use crate::error::{CfbError, Result};
use crate::sector::{HEADER_SIZE, SectorRef};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, error};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::io::{Cursor, Read};

/// Offset of the first inline master-table slot; everything before it is fixed fields.
pub const MASTER_TABLE_OFFSET: usize = 76;
/// Bytes of inline master-table slots (109 entries of 4 bytes).
pub const MASTER_TABLE_INLINE_LEN: usize = 436;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
    Unknown(u16),
}

impl ByteOrder {
    fn from_bytes(b: [u8; 2]) -> Self {
        match b {
            [0xFE, 0xFF] => ByteOrder::LittleEndian,
            [0xFF, 0xFE] => ByteOrder::BigEndian,
            _ => ByteOrder::Unknown(u16::from_le_bytes(b)),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::LittleEndian => write!(f, "Little-endian (FE FF)"),
            ByteOrder::BigEndian => write!(f, "Big-endian (FF FE)"),
            ByteOrder::Unknown(v) => write!(f, "Unknown (0x{:04X})", v),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Header {
    /* -- 0x00-0x1D ------------------------------------------ */
    pub signature: [u8; 8], // D0 CF 11 E0 A1 B1 1A E1
    pub class_id: [u8; 16],
    pub revision: u16,         // 0x18
    pub version: u16,          // 0x1A
    pub byte_order: ByteOrder, // 0x1C

    /* -- Sizing – 0x1E-0x2B --------------------------------- */
    pub sector_shift: u16,       // 0x1E
    pub short_sector_shift: u16, // 0x20
    pub sector_size: usize,      // virtual, 2^sector_shift
    pub short_sector_size: usize, // virtual, 2^short_sector_shift

    /* -- Chains – 0x2C-0x4B --------------------------------- */
    pub sat_sector_count: u32,         // 0x2C
    pub directory_start: SectorRef,    // 0x30
    pub short_stream_threshold: u32,   // 0x38
    pub ssat_start: SectorRef,         // 0x3C
    pub ssat_sector_count: u32,        // 0x40
    pub msat_start: SectorRef,         // 0x44
    pub msat_sector_count: u32,        // 0x48

    /// First inline master-table slot (0x4C): the first SAT sector.
    pub first_sat_sector: i32,
}

impl Header {
    pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

    /// Read and parse the header from the start of `body`.
    ///
    /// Only the 8 identifier bytes are read before the magic is checked.
    pub fn read<R: Read>(body: &mut R) -> Result<Self> {
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        body.read_exact(&mut buf[..8])
            .map_err(|e| CfbError::from_read(e, "header identifier"))?;
        if buf[..8] != Self::MAGIC {
            error!("The compound file identifier is not valid.");
            return Err(CfbError::FormatMismatch);
        }
        body.read_exact(&mut buf[8..])
            .map_err(|e| CfbError::from_read(e, "header"))?;
        Self::from_bytes(&buf)
    }

    /// Parse a 512-byte header buffer into `Header`
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 || buf[..8] != Self::MAGIC {
            return Err(CfbError::FormatMismatch);
        }
        if buf.len() < HEADER_SIZE as usize {
            return Err(CfbError::TruncatedInput {
                context: format!("header ({} of {} bytes)", buf.len(), HEADER_SIZE),
            });
        }
        let mut c = Cursor::new(buf);

        macro_rules! read_array {
            ($len:expr) => {{
                let mut tmp = [0u8; $len];
                c.read_exact(&mut tmp)?;
                tmp
            }};
        }
        macro_rules! read_u16 {
            () => {
                c.read_u16::<LittleEndian>()?
            };
        }
        macro_rules! read_u32 {
            () => {
                c.read_u32::<LittleEndian>()?
            };
        }
        macro_rules! read_ref {
            () => {
                SectorRef::from_raw(c.read_i32::<LittleEndian>()?)?
            };
        }

        let signature = read_array!(8);
        let class_id = read_array!(16);
        let revision = read_u16!();
        let version = read_u16!();
        let byte_order = ByteOrder::from_bytes(read_array!(2));
        let sector_shift = read_u16!();
        let short_sector_shift = read_u16!();
        let _reserved: [u8; 10] = read_array!(10);
        let sat_sector_count = read_u32!();
        let directory_start = read_ref!();
        let _transaction: [u8; 4] = read_array!(4);
        let short_stream_threshold = read_u32!();
        let ssat_start = read_ref!();
        let ssat_sector_count = read_u32!();
        let msat_start = read_ref!();
        let msat_sector_count = read_u32!();
        let first_sat_sector = c.read_i32::<LittleEndian>()?;

        if !(7..=16).contains(&sector_shift) {
            return Err(CfbError::UnsupportedSectorSize {
                kind: "standard",
                shift: sector_shift,
            });
        }
        if short_sector_shift == 0 || short_sector_shift > sector_shift {
            return Err(CfbError::UnsupportedSectorSize {
                kind: "short",
                shift: short_sector_shift,
            });
        }

        let header = Self {
            signature,
            class_id,
            revision,
            version,
            byte_order,
            sector_shift,
            short_sector_shift,
            sector_size: 1usize << sector_shift,
            short_sector_size: 1usize << short_sector_shift,
            sat_sector_count,
            directory_start,
            short_stream_threshold,
            ssat_start,
            ssat_sector_count,
            msat_start,
            msat_sector_count,
            first_sat_sector,
        };
        debug!(
            "Header: sector {} B, short sector {} B, {} SAT sector(s), threshold {} B",
            header.sector_size,
            header.short_sector_size,
            header.sat_sector_count,
            header.short_stream_threshold
        );
        Ok(header)
    }

    /// Check if the signature is valid
    pub fn signature_is_valid(&self) -> bool {
        self.signature == Self::MAGIC
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// Convert the header to a human-readable table string.
    pub fn to_string(&self) -> String {
        let mut t = Table::new();
        t.add_row(row!["Compound File Header"]);
        t.add_row(row![b -> "Revision / Version", format!("{} / {}", self.revision, self.version)]);
        t.add_row(row![b -> "Byte Order", self.byte_order]);
        t.add_row(row![b -> "Sector Size", self.sector_size]);
        t.add_row(row![b -> "Short Sector Size", self.short_sector_size]);
        t.add_row(row![b -> "Short Stream Threshold", self.short_stream_threshold]);
        t.add_row(row![b -> "SAT Sectors", self.sat_sector_count]);
        t.add_row(row![b -> "First SAT Sector", self.first_sat_sector]);
        t.add_row(row![b -> "Directory Start", fmt_ref(self.directory_start)]);
        t.add_row(row![b -> "SSAT Start", fmt_ref(self.ssat_start)]);
        t.add_row(row![b -> "SSAT Sectors", self.ssat_sector_count]);
        t.add_row(row![b -> "MSAT Start", fmt_ref(self.msat_start)]);
        t.add_row(row![b -> "MSAT Sectors", self.msat_sector_count]);
        t.to_string()
    }
}

fn fmt_ref(r: SectorRef) -> String {
    match r {
        SectorRef::Chain(id) => format!("#{}", id),
        other => format!("{:?}", other),
    }
}
