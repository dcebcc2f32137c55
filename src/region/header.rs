//! Location and timestamp tables
//!
//! The first two sectors of a region file hold one 4-byte big-endian entry
//! per slot in each table:
//!
//! ```text
//! [0, 4096)     location:  (sector_offset << 8) | sector_count
//! [4096, 8192)  timestamp: Unix seconds of the last write
//! ```

use super::{SECTOR_SIZE, SLOT_COUNT};
use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// Largest sector offset a location entry can address (24 bits)
pub const MAX_SECTOR_OFFSET: u32 = 0x00FF_FFFF;

/// Where a slot's data lives, in whole sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub offset: u32,
    pub sectors: u8,
}

impl Location {
    pub fn new(offset: u32, sectors: u8) -> Result<Self> {
        if offset > MAX_SECTOR_OFFSET {
            return Err(Error::Capacity {
                sectors: offset as usize,
                max: MAX_SECTOR_OFFSET as usize,
            });
        }
        Ok(Self { offset, sectors })
    }

    pub fn unpack(raw: u32) -> Self {
        Self {
            offset: raw >> 8,
            sectors: (raw & 0xFF) as u8,
        }
    }

    pub fn pack(self) -> u32 {
        (self.offset << 8) | self.sectors as u32
    }

    /// A slot that was never generated
    pub fn is_empty(self) -> bool {
        self.sectors == 0
    }

    /// One past the last sector used
    pub fn end(self) -> u32 {
        self.offset + self.sectors as u32
    }

    /// Byte position of the first sector
    pub fn byte_offset(self) -> u64 {
        self.offset as u64 * SECTOR_SIZE as u64
    }
}

/// In-memory copy of both header tables.
#[derive(Debug, Clone)]
pub struct Header {
    locations: Vec<Location>,
    timestamps: Vec<u32>,
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Header {
    /// An all-zero header
    pub fn new() -> Self {
        Self {
            locations: vec![Location::default(); SLOT_COUNT],
            timestamps: vec![0; SLOT_COUNT],
        }
    }

    /// Parse both tables from the start of a stream
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = Self::new();
        for location in header.locations.iter_mut() {
            *location = Location::unpack(reader.read_u32::<BigEndian>()?);
        }
        for timestamp in header.timestamps.iter_mut() {
            *timestamp = reader.read_u32::<BigEndian>()?;
        }
        Ok(header)
    }

    /// Serialize both tables
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for location in &self.locations {
            writer.write_u32::<BigEndian>(location.pack())?;
        }
        for timestamp in &self.timestamps {
            writer.write_u32::<BigEndian>(*timestamp)?;
        }
        Ok(())
    }

    pub fn location(&self, index: usize) -> Location {
        self.locations[index]
    }

    pub fn timestamp(&self, index: usize) -> u32 {
        self.timestamps[index]
    }

    pub fn set_location(&mut self, index: usize, location: Location) {
        self.locations[index] = location;
    }

    pub fn set_timestamp(&mut self, index: usize, timestamp: u32) {
        self.timestamps[index] = timestamp;
    }

    /// Write one location entry in place
    pub fn persist_location<F: Write + Seek>(&self, file: &mut F, index: usize) -> Result<()> {
        file.seek(SeekFrom::Start(index as u64 * 4))?;
        file.write_u32::<BigEndian>(self.locations[index].pack())?;
        Ok(())
    }

    /// Write one timestamp entry in place
    pub fn persist_timestamp<F: Write + Seek>(&self, file: &mut F, index: usize) -> Result<()> {
        file.seek(SeekFrom::Start((SECTOR_SIZE + index * 4) as u64))?;
        file.write_u32::<BigEndian>(self.timestamps[index])?;
        Ok(())
    }

    /// Iterate `(index, location)` over occupied slots
    pub fn occupied(&self) -> impl Iterator<Item = (usize, Location)> + '_ {
        self.locations
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, loc)| !loc.is_empty())
    }
}
