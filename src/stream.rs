// Stream reconstruction: the short-stream container and per-entry content.

use crate::directory::DirectoryEntry;
use crate::error::{CfbError, Result};
use crate::sector::SectorSpace;
use crate::table::AllocationTable;
use log::{debug, info};
use std::io::{Read, Seek};

/// Concatenate `size` bytes from the chain starting at `start`.
///
/// Each step reads `min(remaining, sector_size)` bytes, and the walk stops as
/// soon as nothing remains. Works the same over the main file (SAT) and the
/// short-stream container (SSAT).
pub fn read_chain<R: Read + Seek>(
    space: &mut SectorSpace<R>,
    table: &AllocationTable,
    start: u32,
    size: u64,
) -> Result<Vec<u8>> {
    // Never reserve more than the table can address.
    let addressable = table.len() as u64 * space.sector_size() as u64;
    let mut out = Vec::with_capacity(size.min(addressable) as usize);
    let mut remaining = size;
    if remaining == 0 {
        return Ok(out);
    }
    for id in table.chain(start) {
        let id = id?;
        let amount = remaining.min(space.sector_size() as u64) as usize;
        out.extend_from_slice(&space.read_partial(id, amount)?);
        remaining -= amount as u64;
        if remaining == 0 {
            return Ok(out);
        }
    }
    Err(CfbError::ChainIntegrity(format!(
        "chain from sector #{} ended with {} of {} bytes outstanding",
        start, remaining, size
    )))
}

fn start_of(entry: &DirectoryEntry) -> Result<u32> {
    u32::try_from(entry.start_sector).map_err(|_| {
        CfbError::ChainIntegrity(format!(
            "entry '{}' of {} bytes starts at sentinel {}",
            entry.name, entry.size, entry.start_sector
        ))
    })
}

/// Materialize the root entry's stream, the address space of every short stream.
pub fn resolve_container<R: Read + Seek>(
    space: &mut SectorSpace<R>,
    sat: &AllocationTable,
    root: &DirectoryEntry,
) -> Result<Vec<u8>> {
    let container = read_chain(space, sat, start_of(root)?, root.size as u64)?;
    info!("Short-stream container resolved: {} bytes", container.len());
    Ok(container)
}

/// Reconstruct the content of a user-stream entry.
///
/// `raw` and `sat` address the main file; `container` and `ssat` address the
/// short-stream container. Which pair is used depends on the entry size.
pub fn materialize<R: Read + Seek, C: Read + Seek>(
    entry: &DirectoryEntry,
    threshold: u32,
    raw: &mut SectorSpace<R>,
    sat: &AllocationTable,
    container: &mut SectorSpace<C>,
    ssat: &AllocationTable,
) -> Result<Vec<u8>> {
    let start = start_of(entry)?;
    let data = if entry.is_short_stored(threshold) {
        debug!(
            "Entry #{} '{}' ({} bytes) from short sector #{}",
            entry.id, entry.name, entry.size, start
        );
        read_chain(container, ssat, start, entry.size as u64)?
    } else {
        debug!(
            "Entry #{} '{}' ({} bytes) from sector #{}",
            entry.id, entry.name, entry.size, start
        );
        read_chain(raw, sat, start, entry.size as u64)?
    };
    Ok(data)
}
