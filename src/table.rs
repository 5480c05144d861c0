// Allocation tables (SAT and SSAT) and bounded chain walking.

use crate::error::{CfbError, Result};
use crate::sector::{SectorRef, SectorSpace, decode_links};
use log::{info, trace, warn};
use std::io::{Read, Seek};

/// A flat mapping from sector index to the next link of its chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationTable {
    links: Vec<SectorRef>,
}

impl AllocationTable {
    pub fn from_links(links: Vec<SectorRef>) -> Self {
        Self { links }
    }

    /// Build the SAT from the resolved master-table ids.
    ///
    /// Iteration index 0 reads the first SAT sector declared in the header;
    /// every later index reads the resolved master-table entry.
    pub fn build_sat<R: Read + Seek>(
        space: &mut SectorSpace<R>,
        first_sat_sector: i32,
        master: &[u32],
    ) -> Result<Self> {
        let mut links = Vec::with_capacity(master.len() * space.sector_size() / 4);
        for i in 0..master.len() {
            let id = if i == 0 {
                if first_sat_sector < 0 {
                    return Err(CfbError::ChainIntegrity(format!(
                        "first SAT sector is a sentinel ({})",
                        first_sat_sector
                    )));
                }
                if master[0] != first_sat_sector as u32 {
                    warn!(
                        "Header first SAT sector #{} differs from master table entry #{}",
                        first_sat_sector, master[0]
                    );
                }
                first_sat_sector as u32
            } else {
                master[i]
            };
            links.extend(decode_links(&space.read_sector(id)?)?);
        }
        info!(
            "SAT built from {} sector(s): {} entries",
            master.len(),
            links.len()
        );
        Ok(Self { links })
    }

    /// Build the SSAT by walking its own sector chain through the SAT.
    pub fn build_ssat<R: Read + Seek>(
        space: &mut SectorSpace<R>,
        start: SectorRef,
        sat: &AllocationTable,
    ) -> Result<Self> {
        let mut links = Vec::new();
        if let Some(first) = start.sector() {
            for id in sat.chain(first) {
                links.extend(decode_links(&space.read_sector(id?)?)?);
            }
        }
        info!("SSAT built: {} entries", links.len());
        Ok(Self { links })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[SectorRef] {
        &self.links
    }

    /// Look up the link stored for `id`.
    pub fn next(&self, id: u32) -> Result<SectorRef> {
        self.links.get(id as usize).copied().ok_or_else(|| {
            CfbError::ChainIntegrity(format!(
                "sector #{} is outside a table of {} entries",
                id,
                self.links.len()
            ))
        })
    }

    /// Walk the chain that begins at sector `start`.
    pub fn chain(&self, start: u32) -> Chain<'_> {
        Chain {
            table: self,
            start: Some(start),
            current: None,
            steps: 0,
            done: false,
        }
    }
}

/// Iterator over the sector ids of one chain.
///
/// Yields at most `table.len()` ids, each inside the table. A chain that has
/// not reached `EndOfChain` by then is reported as a `ChainIntegrity` error.
/// The link of the last yielded sector is only looked up when the next id is
/// requested.
pub struct Chain<'a> {
    table: &'a AllocationTable,
    start: Option<u32>,
    current: Option<u32>,
    steps: usize,
    done: bool,
}

impl Chain<'_> {
    fn fail(&mut self, err: CfbError) -> Option<Result<u32>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for Chain<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let id = if let Some(start) = self.start.take() {
            if start as usize >= self.table.len() {
                return self.fail(CfbError::ChainIntegrity(format!(
                    "chain start #{} is outside a table of {} entries",
                    start,
                    self.table.len()
                )));
            }
            start
        } else {
            let prev = self.current?;
            match self.table.next(prev) {
                Ok(SectorRef::Chain(id)) if (id as usize) < self.table.len() => id,
                Ok(SectorRef::Chain(id)) => {
                    return self.fail(CfbError::ChainIntegrity(format!(
                        "sector #{} links to #{} outside a table of {} entries",
                        prev,
                        id,
                        self.table.len()
                    )));
                }
                Ok(SectorRef::EndOfChain) => {
                    self.done = true;
                    return None;
                }
                Ok(other) => {
                    return self.fail(CfbError::ChainIntegrity(format!(
                        "sector #{} links to {:?}",
                        prev, other
                    )));
                }
                Err(e) => return self.fail(e),
            }
        };

        if self.steps >= self.table.len() {
            return self.fail(CfbError::ChainIntegrity(format!(
                "chain does not terminate within {} sectors",
                self.table.len()
            )));
        }
        self.steps += 1;
        self.current = Some(id);
        trace!("chain step {} -> sector #{}", self.steps, id);
        Some(Ok(id))
    }
}
