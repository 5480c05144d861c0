// Master sector allocation table: the table-of-tables listing the SAT sectors.

use crate::error::{CfbError, Result};
use crate::sector::{SectorRef, SectorSpace};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info};
use std::io::{Cursor, Read, Seek};

/// Resolve the ordered list of SAT sector ids.
///
/// The inline slots from the header are consumed first. Once they are
/// exhausted the table continues in dedicated sectors starting at
/// `continuation_start`; the last slot of every continuation sector names the
/// next one. Slots past `sat_sector_count` are never returned, and a pointer
/// slot is only followed while entries are still missing.
pub fn resolve<R: Read + Seek>(
    space: &mut SectorSpace<R>,
    inline: &[u8],
    sat_sector_count: u32,
    continuation_start: SectorRef,
    continuation_count: u32,
) -> Result<Vec<u32>> {
    let wanted = sat_sector_count as usize;
    // Declared counts are untrusted: reserve the inline slots only and grow as
    // continuation sectors are actually read.
    let mut out = Vec::with_capacity(wanted.min(inline.len() / 4));

    take_slots(inline, inline.len() / 4, wanted, &mut out)?;

    let mut next = continuation_start;
    let mut visited = 0u32;
    while out.len() < wanted {
        let id = next.sector().ok_or_else(|| {
            CfbError::ChainIntegrity(format!(
                "master table needs {} more entries but continuation link is {:?}",
                wanted - out.len(),
                next
            ))
        })?;
        visited += 1;
        if visited > continuation_count {
            return Err(CfbError::ChainIntegrity(format!(
                "master table continues past its {} declared sector(s)",
                continuation_count
            )));
        }

        info!("Master table continues in sector #{}", id);
        let buf = space.read_sector(id)?;
        let slots = buf.len() / 4;
        take_slots(&buf, slots - 1, wanted, &mut out)?;
        if out.len() >= wanted {
            break;
        }

        let mut tail = Cursor::new(&buf[(slots - 1) * 4..]);
        next = SectorRef::from_raw(tail.read_i32::<LittleEndian>()?)?;
    }

    debug!("Master table resolved to {} SAT sector(s)", out.len());
    Ok(out)
}

fn take_slots(buf: &[u8], slots: usize, wanted: usize, out: &mut Vec<u32>) -> Result<()> {
    let mut cur = Cursor::new(buf);
    for _ in 0..slots {
        if out.len() >= wanted {
            break;
        }
        let raw = cur.read_i32::<LittleEndian>()?;
        if raw < 0 {
            return Err(CfbError::ChainIntegrity(format!(
                "master table entry {} is a sentinel ({})",
                out.len(),
                raw
            )));
        }
        out.push(raw as u32);
    }
    Ok(())
}
