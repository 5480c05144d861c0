// In-memory builder for small, well-formed compound files.
//
// Layout: sector 0 holds the single SAT sector, followed by the directory,
// the SSAT, the short-stream container and finally every standard stream.

use crate::sector::{END_OF_CHAIN, FREE_SECT, SAT_SECT};

pub const SECTOR: usize = 512;
pub const SHORT_SECTOR: usize = 64;
pub const STAMP: u64 = 116_444_736_000_000_000; // 1970-01-01T00:00:00Z

struct Node {
    name: String,
    kind: u8,
    data: Vec<u8>,
    declared: Option<u32>,
}

pub struct ContainerBuilder {
    threshold: u32,
    root_last: bool,
    nodes: Vec<Node>,
}

/// Byte layout of the built file, for tests that poke at it.
#[derive(Debug, Default)]
pub struct Layout {
    pub directory: Vec<u32>,
    pub ssat: Vec<u32>,
    pub container: Vec<u32>,
    pub streams: Vec<(String, Vec<u32>)>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            threshold: 4096,
            root_last: false,
            nodes: Vec::new(),
        }
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Put the root entry after every other entry in directory order.
    pub fn root_last(mut self) -> Self {
        self.root_last = true;
        self
    }

    pub fn stream(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.nodes.push(Node {
            name: name.to_string(),
            kind: 2,
            data: data.into(),
            declared: None,
        });
        self
    }

    /// A storage entry carrying a declared size (storages normally declare 0).
    pub fn storage(mut self, name: &str, declared: u32) -> Self {
        self.nodes.push(Node {
            name: name.to_string(),
            kind: 1,
            data: Vec::new(),
            declared: Some(declared),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let mut layout = Layout::default();

        // Short-sector allocation inside the container.
        let mut ssat: Vec<i32> = Vec::new();
        let mut container: Vec<u8> = Vec::new();
        let mut starts: Vec<i32> = vec![END_OF_CHAIN; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            let len = node.data.len();
            if node.kind != 2 || len == 0 || len as u32 >= self.threshold {
                continue;
            }
            let first = ssat.len();
            let count = len.div_ceil(SHORT_SECTOR);
            for k in 0..count {
                ssat.push(if k + 1 < count {
                    (first + k + 1) as i32
                } else {
                    END_OF_CHAIN
                });
            }
            starts[i] = first as i32;
            container.extend_from_slice(&node.data);
            container.resize((first + count) * SHORT_SECTOR, 0);
        }

        let entry_count = self.nodes.len() + 1;
        let dir_sectors = entry_count.div_ceil(SECTOR / 128);
        let ssat_sectors = (ssat.len() * 4).div_ceil(SECTOR);
        let container_sectors = container.len().div_ceil(SECTOR);

        let mut sat: Vec<i32> = vec![FREE_SECT; SECTOR / 4];
        sat[0] = SAT_SECT;
        let mut next = 1usize;
        let mut alloc = |count: usize, sat: &mut Vec<i32>| -> Vec<u32> {
            let ids: Vec<u32> = (next..next + count).map(|v| v as u32).collect();
            for (k, id) in ids.iter().enumerate() {
                sat[*id as usize] = if k + 1 < count {
                    (*id + 1) as i32
                } else {
                    END_OF_CHAIN
                };
            }
            next += count;
            ids
        };

        layout.directory = alloc(dir_sectors, &mut sat);
        layout.ssat = alloc(ssat_sectors, &mut sat);
        layout.container = alloc(container_sectors, &mut sat);
        for (i, node) in self.nodes.iter().enumerate() {
            let len = node.data.len();
            if node.kind == 2 && len as u32 >= self.threshold {
                let ids = alloc(len.div_ceil(SECTOR), &mut sat);
                starts[i] = ids[0] as i32;
                layout.streams.push((node.name.clone(), ids));
            }
        }
        let total_sectors = next;
        assert!(total_sectors <= SECTOR / 4, "too many sectors for one SAT sector");

        // Directory records.
        let root = dir_record(
            "Root Entry",
            5,
            layout.container.first().map_or(END_OF_CHAIN, |v| *v as i32),
            container.len() as u32,
            0,
        );
        let mut records: Vec<[u8; 128]> = self
            .nodes
            .iter()
            .zip(&starts)
            .map(|(node, start)| {
                let size = node.declared.unwrap_or(node.data.len() as u32);
                dir_record(&node.name, node.kind, *start, size, STAMP)
            })
            .collect();
        if self.root_last {
            records.push(root);
        } else {
            records.insert(0, root);
        }

        // Assemble the image.
        let mut sectors = vec![0u8; total_sectors * SECTOR];
        let mut put = |id: u32, offset: usize, bytes: &[u8]| {
            let at = id as usize * SECTOR + offset;
            sectors[at..at + bytes.len()].copy_from_slice(bytes);
        };
        put(0, 0, &links(&sat));
        for (i, rec) in records.iter().enumerate() {
            put(layout.directory[i / 4], (i % 4) * 128, rec);
        }
        let ssat_bytes = links(&ssat);
        for (i, chunk) in ssat_bytes.chunks(SECTOR).enumerate() {
            put(layout.ssat[i], 0, chunk);
        }
        for (i, chunk) in container.chunks(SECTOR).enumerate() {
            put(layout.container[i], 0, chunk);
        }
        let mut long = layout.streams.iter();
        for node in &self.nodes {
            if node.kind == 2 && node.data.len() as u32 >= self.threshold {
                let (_, ids) = long.next().unwrap();
                for (i, chunk) in node.data.chunks(SECTOR).enumerate() {
                    put(ids[i], 0, chunk);
                }
            }
        }

        let mut image = header_bytes(
            self.threshold,
            layout.directory[0] as i32,
            layout.ssat.first().map_or(END_OF_CHAIN, |v| *v as i32),
            layout.ssat.len() as u32,
        );
        image.extend_from_slice(&sectors);
        (image, layout)
    }
}

/// A 512-byte header for a file with one SAT sector at sector 0.
pub fn header_bytes(threshold: u32, dir_start: i32, ssat_start: i32, ssat_count: u32) -> Vec<u8> {
    let mut h = vec![0u8; SECTOR];
    h[0..8].copy_from_slice(&crate::Header::MAGIC);
    h[24..26].copy_from_slice(&0x3Eu16.to_le_bytes());
    h[26..28].copy_from_slice(&3u16.to_le_bytes());
    h[28..30].copy_from_slice(&[0xFE, 0xFF]);
    h[30..32].copy_from_slice(&9u16.to_le_bytes());
    h[32..34].copy_from_slice(&6u16.to_le_bytes());
    h[44..48].copy_from_slice(&1u32.to_le_bytes());
    h[48..52].copy_from_slice(&dir_start.to_le_bytes());
    h[56..60].copy_from_slice(&threshold.to_le_bytes());
    h[60..64].copy_from_slice(&ssat_start.to_le_bytes());
    h[64..68].copy_from_slice(&ssat_count.to_le_bytes());
    h[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    h[72..76].copy_from_slice(&0u32.to_le_bytes());
    h[76..80].copy_from_slice(&0i32.to_le_bytes());
    for slot in 1..109 {
        let at = 76 + slot * 4;
        h[at..at + 4].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    }
    h
}

/// Encode one 128-byte directory record with UTF-16LE name.
pub fn dir_record(name: &str, kind: u8, start: i32, size: u32, stamp: u64) -> [u8; 128] {
    let mut r = [0u8; 128];
    let units: Vec<u16> = name.encode_utf16().take(31).collect();
    for (i, u) in units.iter().enumerate() {
        r[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
    }
    r[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
    r[66] = kind;
    r[67] = 1;
    r[68..72].copy_from_slice(&(-1i32).to_le_bytes());
    r[72..76].copy_from_slice(&(-1i32).to_le_bytes());
    r[76..80].copy_from_slice(&(-1i32).to_le_bytes());
    r[100..108].copy_from_slice(&stamp.to_le_bytes());
    r[108..116].copy_from_slice(&stamp.to_le_bytes());
    r[116..120].copy_from_slice(&start.to_le_bytes());
    r[120..124].copy_from_slice(&size.to_le_bytes());
    r
}

pub fn links(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32) as u8)
        .collect()
}
