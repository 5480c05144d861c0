// Sources:
// - https://learn.microsoft.com/openspecs/windows_protocols/ms-cfb
//
// Directory records are 128 bytes; the red-black tree links are kept as data only.

use crate::error::{CfbError, Result};
use crate::sector::{SectorRef, SectorSpace};
use crate::table::AllocationTable;
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{TimeZone, Utc};
use log::{debug, info};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::io::{Cursor, Read, Seek};

pub const DIRECTORY_ENTRY_SIZE: usize = 128;
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum EntryKind {
    Empty,
    UserStorage,
    UserStream,
    LockBytes,
    Property,
    RootStorage,
    Unknown(u8),
}

impl From<u8> for EntryKind {
    fn from(value: u8) -> Self {
        use EntryKind::*;
        match value {
            0 => Empty,
            1 => UserStorage,
            2 => UserStream,
            3 => LockBytes,
            4 => Property,
            5 => RootStorage,
            other => Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum NodeColor {
    Red,
    Black,
    Unknown(u8),
}

impl From<u8> for NodeColor {
    fn from(value: u8) -> Self {
        match value {
            0 => NodeColor::Red,
            1 => NodeColor::Black,
            other => NodeColor::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DirectoryEntry {
    /// Position in emission order, not the on-disk slot.
    pub id: u32,
    pub name: String,
    pub name_len: u16,
    pub kind: EntryKind,
    pub color: NodeColor,
    pub left_child: i32,
    pub right_child: i32,
    pub root_child: i32,
    pub unique_id: [u8; 16],
    pub user_flags: u32,
    pub created: u64,  // FILETIME
    pub modified: u64, // FILETIME
    pub start_sector: i32,
    pub size: u32,
}

impl DirectoryEntry {
    /// Decode one 128-byte directory record.
    pub fn from_bytes(raw: &[u8], id: u32) -> Result<Self> {
        if raw.len() < DIRECTORY_ENTRY_SIZE {
            return Err(CfbError::TruncatedInput {
                context: format!("directory record ({} of 128 bytes)", raw.len()),
            });
        }
        let mut cur = Cursor::new(raw);

        let mut name_buf = [0u8; 64];
        cur.read_exact(&mut name_buf)?;
        let name = decode_name(&name_buf);

        let name_len = cur.read_u16::<LittleEndian>()?;
        let kind = EntryKind::from(cur.read_u8()?);
        let color = NodeColor::from(cur.read_u8()?);
        let left_child = cur.read_i32::<LittleEndian>()?;
        let right_child = cur.read_i32::<LittleEndian>()?;
        let root_child = cur.read_i32::<LittleEndian>()?;
        let mut unique_id = [0u8; 16];
        cur.read_exact(&mut unique_id)?;
        let user_flags = cur.read_u32::<LittleEndian>()?;
        let created = cur.read_u64::<LittleEndian>()?;
        let modified = cur.read_u64::<LittleEndian>()?;
        let start_sector = cur.read_i32::<LittleEndian>()?;
        let size = cur.read_u32::<LittleEndian>()?;
        let _reserved = cur.read_u32::<LittleEndian>()?;

        Ok(Self {
            id,
            name,
            name_len,
            kind,
            color,
            left_child,
            right_child,
            root_child,
            unique_id,
            user_flags,
            created,
            modified,
            start_sector,
            size,
        })
    }

    pub fn is_root(&self) -> bool {
        self.name.eq_ignore_ascii_case(ROOT_ENTRY_NAME)
    }

    /// Streams strictly smaller than the threshold live in the short-stream container.
    pub fn is_short_stored(&self, threshold: u32) -> bool {
        !self.is_root() && self.size < threshold
    }

    pub fn created_at(&self) -> Option<String> {
        filetime_to_rfc3339(self.created)
    }

    pub fn modified_at(&self) -> Option<String> {
        filetime_to_rfc3339(self.modified)
    }

    /// Canonical GUID form of the 16-byte identifier.
    pub fn unique_id_string(&self) -> String {
        let u = &self.unique_id;
        format!(
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u32::from_le_bytes([u[0], u[1], u[2], u[3]]),
            u16::from_le_bytes([u[4], u[5]]),
            u16::from_le_bytes([u[6], u[7]]),
            u[8],
            u[9],
            u[10],
            u[11],
            u[12],
            u[13],
            u[14],
            u[15]
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "entry": self,
            "guid": self.unique_id_string(),
            "created": self.created_at(),
            "modified": self.modified_at(),
        })
    }

    /// Convert the entry to a human-readable table string.
    pub fn to_table(&self) -> String {
        let mut t = Table::new();
        t.add_row(row!["Directory Entry", self.id]);
        t.add_row(row![b -> "Name", self.name]);
        t.add_row(row![b -> "Kind", format!("{:?}", self.kind)]);
        t.add_row(row![b -> "Color", format!("{:?}", self.color)]);
        t.add_row(row![b -> "Left / Right / Root", format!("{} / {} / {}", self.left_child, self.right_child, self.root_child)]);
        t.add_row(row![b -> "GUID", self.unique_id_string()]);
        t.add_row(row![b -> "User Flags", format!("0x{:08X}", self.user_flags)]);
        t.add_row(row![b -> "Created", self.created_at().unwrap_or_else(|| "-".into())]);
        t.add_row(row![b -> "Modified", self.modified_at().unwrap_or_else(|| "-".into())]);
        t.add_row(row![b -> "Start Sector", self.start_sector]);
        t.add_row(row![b -> "Size", self.size]);
        t.to_string()
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {:?} - {}", self.id, self.kind, self.name)
    }
}

/// Read the directory chain and decode every record with a non-zero size.
///
/// Zero-size records are dropped, including legitimately empty streams; ids
/// are assigned in emission order.
pub fn read_directory<R: Read + Seek>(
    space: &mut SectorSpace<R>,
    start: SectorRef,
    sat: &AllocationTable,
) -> Result<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    let Some(first) = start.sector() else {
        info!("Directory chain start is {:?}: no entries", start);
        return Ok(entries);
    };

    for id in sat.chain(first) {
        let id = id?;
        let buf = space.read_sector(id)?;
        debug!("Decoding directory sector #{}", id);
        for record in buf.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            let entry = DirectoryEntry::from_bytes(record, entries.len() as u32)?;
            if entry.size > 0 {
                entries.push(entry);
            }
        }
    }
    info!("Directory: {} non-empty entries", entries.len());
    Ok(entries)
}

// NUL bytes are skipped and a single leading 0x01/0x02 marker is dropped.
fn decode_name(raw: &[u8]) -> String {
    let mut bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    if matches!(bytes.first(), Some(1) | Some(2)) {
        bytes.remove(0);
    }
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn filetime_to_rfc3339(ft: u64) -> Option<String> {
    if ft == 0 {
        return None;
    }
    let micros_since_1601 = ft / 10;
    const DELTA_MICROS: i64 = 11_644_473_600_000_000;
    let unix_micros = micros_since_1601 as i64 - DELTA_MICROS;
    let secs = unix_micros.div_euclid(1_000_000);
    let nanos = unix_micros.rem_euclid(1_000_000) * 1_000;
    Utc.timestamp_opt(secs, nanos as u32)
        .single()
        .map(|dt| dt.to_rfc3339())
}
