// Sources:
// - https://learn.microsoft.com/openspecs/windows_protocols/ms-cfb
// - https://en.wikipedia.org/wiki/Compound_File_Binary_Format

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

pub mod directory;
pub mod error;
pub mod header;
pub mod msat;
pub mod sector;
pub mod stream;
pub mod table;

pub use directory::{DirectoryEntry, EntryKind, NodeColor};
pub use error::{CfbError, Result};
use header::{MASTER_TABLE_INLINE_LEN, MASTER_TABLE_OFFSET};
pub use header::{ByteOrder, Header};
use sector::{HEADER_SIZE, SectorSpace};
pub use sector::SectorRef;
use table::AllocationTable;

/// One decoded directory entry and, for user streams, its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    pub entry: DirectoryEntry,
    pub content: Option<Vec<u8>>,
}

impl StreamResult {
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.entry.is_root()
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
}

pub struct CompoundFile<T: Read + Seek> {
    pub header: Header,
    pub body: T,
}

impl<T: Read + Seek> CompoundFile<T> {
    /// Create a new CompoundFile object; fails fast when the identifier is wrong.
    pub fn new(mut body: T) -> Result<Self> {
        body.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut body)?;
        info!(
            "Compound file v{}.{} ({} B sectors)",
            header.version, header.revision, header.sector_size
        );
        Ok(Self { header, body })
    }

    /// Run one full decode pass and return a result per emitted directory entry.
    ///
    /// Tables and the short-stream container only live for the duration of the
    /// call; any error aborts the pass with no partial results.
    pub fn read_all(&mut self) -> Result<Vec<StreamResult>> {
        let header = &self.header;

        self.body
            .seek(SeekFrom::Start(MASTER_TABLE_OFFSET as u64))?;
        let mut inline = vec![0u8; MASTER_TABLE_INLINE_LEN];
        self.body
            .read_exact(&mut inline)
            .map_err(|e| CfbError::from_read(e, "inline master table"))?;

        let mut raw = SectorSpace::new(&mut self.body, HEADER_SIZE, header.sector_size, "file");

        let master = msat::resolve(
            &mut raw,
            &inline,
            header.sat_sector_count,
            header.msat_start,
            header.msat_sector_count,
        )?;
        let sat = AllocationTable::build_sat(&mut raw, header.first_sat_sector, &master)?;
        let entries = directory::read_directory(&mut raw, header.directory_start, &sat)?;
        let ssat = AllocationTable::build_ssat(&mut raw, header.ssat_start, &sat)?;

        // The container must exist before any short stream is read, wherever
        // the root entry sits in directory order.
        let container = match entries.iter().find(|e| e.is_root()) {
            Some(root) => stream::resolve_container(&mut raw, &sat, root)?,
            None => {
                warn!("No root entry found; short-stream container is empty.");
                Vec::new()
            }
        };
        let mut short = SectorSpace::new(
            Cursor::new(container.as_slice()),
            0,
            header.short_sector_size,
            "short",
        );

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let content = if entry.is_root() || entry.kind != EntryKind::UserStream {
                None
            } else {
                Some(stream::materialize(
                    &entry,
                    header.short_stream_threshold,
                    &mut raw,
                    &sat,
                    &mut short,
                    &ssat,
                )?)
            };
            debug!("Emitting {}", entry);
            results.push(StreamResult { entry, content });
        }
        info!("Decoded {} entries", results.len());
        Ok(results)
    }

    /// First emitted result whose name matches exactly.
    pub fn find_by_name(&mut self, name: &str) -> Result<Option<StreamResult>> {
        Ok(self.read_all()?.into_iter().find(|r| r.entry.name == name))
    }
}

/// Write the content of every stream result into `dir` as `<id>_<name>.bin`.
pub fn extract_to(results: &[StreamResult], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for r in results {
        let Some(data) = r.content() else {
            continue;
        };
        let path = dir.join(format!("{}_{}.bin", r.entry.id, sanitize(&r.entry.name)));
        std::fs::write(&path, data)?;
        debug!("Extracted {} bytes to {}", data.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests;
