//! Region files
//!
//! A region file stores a 32×32 grid of chunk slots in 4 KiB sectors.
//!
//! # Architecture
//!
//! ```text
//! RegionFile (r.{x}.{z}.mca)
//!   ├─→ Header
//!   │     ├─→ locations[1024]  → (sector offset, sector count)
//!   │     └─→ timestamps[1024] → last write, Unix seconds
//!   ├─→ SectorMap               → free sectors, rebuilt on open
//!   └─→ Sectors 2..             → [len: u32][method: u8][compressed tree][padding]
//! ```
//!
//! Slot `(x, z)` lives at index `x + 32 * z` of both tables.

pub mod compression;
pub mod file;
pub mod header;
pub mod sectors;

pub use compression::{compress, decompress, CompressionMethod, MAX_INFLATED_LEN};
pub use file::{RegionFile, RegionOptions, RegionStats};
pub use header::{Header, Location};
pub use sectors::SectorMap;

use crate::error::{Error, Result};
use std::fmt;

/// Size of one sector in bytes (4 KB)
pub const SECTOR_SIZE: usize = 4096;

/// Sectors reserved for the location and timestamp tables
pub const HEADER_SECTORS: usize = 2;

/// Chunk slots per region side
pub const REGION_SIZE: i32 = 32;

/// Chunk slots per region file
pub const SLOT_COUNT: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// Most sectors a single slot can occupy
pub const MAX_SLOT_SECTORS: usize = 255;

/// Table index of local slot `(x, z)`, both in `0..32`
pub fn slot_index(x: i32, z: i32) -> Result<usize> {
    if !(0..REGION_SIZE).contains(&x) || !(0..REGION_SIZE).contains(&z) {
        return Err(Error::Range(format!(
            "Local slot ({}, {}) outside 0..{}",
            x, z, REGION_SIZE
        )));
    }
    Ok((x + z * REGION_SIZE) as usize)
}

/// Local slot coordinates of a table index
pub fn index_to_local(index: usize) -> (i32, i32) {
    let x = (index % REGION_SIZE as usize) as i32;
    let z = (index / REGION_SIZE as usize) as i32;
    (x, z)
}

/// Region coordinates, one region per 32×32 chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region holding chunk `(cx, cz)` and the chunk's local slot in it.
    ///
    /// Uses floor division, so chunk (-1, -1) is slot (31, 31) of region (-1, -1).
    pub fn of_chunk(cx: i32, cz: i32) -> (Self, (i32, i32)) {
        let region = Self {
            x: cx.div_euclid(REGION_SIZE),
            z: cz.div_euclid(REGION_SIZE),
        };
        let local = (cx.rem_euclid(REGION_SIZE), cz.rem_euclid(REGION_SIZE));
        (region, local)
    }

    /// Chunk coordinates of a local slot in this region
    pub fn chunk_at(&self, local_x: i32, local_z: i32) -> (i32, i32) {
        (
            self.x * REGION_SIZE + local_x,
            self.z * REGION_SIZE + local_z,
        )
    }

    /// File name of this region, e.g. `r.0.-1.mca`
    pub fn file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parse a region file name like `r.0.-1.mca`
    pub fn from_file_name(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({}, {})", self.x, self.z)
    }
}
