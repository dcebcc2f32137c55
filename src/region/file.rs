//! Region file implementation

use super::compression::{compress, decompress, CompressionMethod, DEFAULT_LEVEL};
use super::header::{Header, Location};
use super::sectors::SectorMap;
use super::{index_to_local, slot_index, HEADER_SECTORS, MAX_SLOT_SECTORS, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::tag::Tree;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bytes before the compressed payload: length (4) + method (1)
const SLOT_PREFIX: usize = 5;

/// Settings applied to slot writes
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOptions {
    /// Method used for new writes; reads accept every known method
    pub compression: CompressionMethod,
    /// Deflate level, 0-9
    pub compression_level: u32,
    /// fsync after every put
    pub sync_on_write: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zlib,
            compression_level: DEFAULT_LEVEL,
            sync_on_write: false,
        }
    }
}

/// Statistics for a region file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStats {
    pub chunk_count: usize,
    pub total_sectors: usize,
    pub used_sectors: usize,
    pub free_sectors: usize,
    pub file_size: u64,
}

struct Inner {
    file: File,
    header: Header,
    sectors: SectorMap,
}

/// One region file holding up to 1024 chunk slots.
///
/// All slot operations serialize on a single lock; the header tables and
/// the free-sector map are only touched while it is held.
pub struct RegionFile {
    path: PathBuf,
    options: RegionOptions,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for RegionFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFile")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish()
    }
}

fn read_err(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format("Slot data runs past end of file".to_string())
    } else {
        Error::Io(e)
    }
}

fn now_secs() -> u32 {
    Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

impl RegionFile {
    /// Create a new, empty region file, replacing any file at `path`
    pub fn create<P: AsRef<Path>>(path: P, options: RegionOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = Header::new();
        let mut bytes = Vec::with_capacity(HEADER_SECTORS * SECTOR_SIZE);
        header.write_to(&mut bytes)?;
        file.write_all(&bytes)?;

        info!(path = ?path, "Created region file");

        Ok(Self {
            path,
            options,
            inner: Mutex::new(Inner {
                file,
                header,
                sectors: SectorMap::new(HEADER_SECTORS),
            }),
        })
    }

    /// Open an existing region file and rebuild its free-sector map
    pub fn open<P: AsRef<Path>>(path: P, options: RegionOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let header_len = (HEADER_SECTORS * SECTOR_SIZE) as u64;
        let mut len = file.metadata()?.len();
        if len < header_len {
            warn!(path = ?path, len, "Region file shorter than its header, extending");
            file.set_len(header_len)?;
            len = header_len;
        }
        if len % SECTOR_SIZE as u64 != 0 {
            let padded = (len / SECTOR_SIZE as u64 + 1) * SECTOR_SIZE as u64;
            debug!(path = ?path, len, padded, "Padding region file to a sector boundary");
            file.set_len(padded)?;
            len = padded;
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = Header::read_from(&mut BufReader::new(&mut file))?;

        let total = (len / SECTOR_SIZE as u64) as usize;
        let mut sectors = SectorMap::new(total);
        let mut dropped = Vec::new();
        for (index, loc) in header.occupied() {
            let (start, count) = (loc.offset as usize, loc.sectors as usize);
            if start < HEADER_SECTORS || loc.end() as usize > total {
                dropped.push((index, loc, "Ignoring location entry outside the file"));
            } else if !sectors.is_run_free(start, count) {
                // the lowest slot index claiming a sector keeps it
                dropped.push((index, loc, "Ignoring location entry overlapping another slot"));
            } else {
                sectors.mark_used(start, count);
            }
        }
        for (index, loc, reason) in dropped {
            let (x, z) = index_to_local(index);
            warn!(
                path = ?path,
                x,
                z,
                offset = loc.offset,
                sectors = loc.sectors,
                total,
                "{}",
                reason
            );
            header.set_location(index, Location::default());
        }

        info!(
            path = ?path,
            chunks = header.occupied().count(),
            sectors = total,
            free = sectors.free_count(),
            "Opened region file"
        );

        Ok(Self {
            path,
            options,
            inner: Mutex::new(Inner {
                file,
                header,
                sectors,
            }),
        })
    }

    /// Open `path` if it exists, otherwise create it
    pub fn open_or_create<P: AsRef<Path>>(path: P, options: RegionOptions) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, options)
        } else {
            Self::create(path, options)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &RegionOptions {
        &self.options
    }

    /// Read the tree stored in slot `(x, z)`.
    ///
    /// Returns `None` for a slot that was never generated. A slot whose
    /// data fails to decode is cleared and reported as
    /// [`Error::CorruptSlot`].
    pub fn get(&self, x: i32, z: i32) -> Result<Option<Tree>> {
        let index = slot_index(x, z)?;
        let mut inner = self.inner.lock();
        match inner.read_slot(index) {
            Ok(tree) => {
                debug!(x, z, found = tree.is_some(), "Read slot");
                Ok(tree)
            }
            Err(e) if e.is_format() => {
                warn!(path = ?self.path, x, z, error = %e, "Clearing corrupt slot");
                inner.clear_slot(index).map_err(|e| e.at_slot(x, z))?;
                Err(Error::CorruptSlot {
                    x,
                    z,
                    source: Box::new(e),
                })
            }
            Err(e) => Err(e.at_slot(x, z)),
        }
    }

    /// Store `tree` in slot `(x, z)`, replacing any previous occupant
    pub fn put(&self, x: i32, z: i32, tree: &Tree) -> Result<()> {
        let index = slot_index(x, z)?;

        let raw = tree.to_bytes().map_err(|e| e.at_slot(x, z))?;
        let compressed = compress(&raw, self.options.compression, self.options.compression_level)
            .map_err(|e| e.at_slot(x, z))?;

        let length = compressed.len() + 1;
        let sector_count = (SLOT_PREFIX + compressed.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
        if sector_count > MAX_SLOT_SECTORS {
            return Err(Error::Capacity {
                sectors: sector_count,
                max: MAX_SLOT_SECTORS,
            }
            .at_slot(x, z));
        }

        let mut buffer = Vec::with_capacity(sector_count * SECTOR_SIZE);
        buffer.write_u32::<BigEndian>(length as u32)?;
        buffer.write_u8(self.options.compression.id())?;
        buffer.extend_from_slice(&compressed);
        buffer.resize(sector_count * SECTOR_SIZE, 0);

        let mut inner = self.inner.lock();
        let loc = inner
            .write_slot(index, &buffer, sector_count)
            .map_err(|e| e.at_slot(x, z))?;
        if self.options.sync_on_write {
            inner.file.sync_data()?;
        }

        debug!(
            x,
            z,
            offset = loc.offset,
            sectors = loc.sectors,
            raw = raw.len(),
            compressed = compressed.len(),
            "Wrote slot"
        );
        Ok(())
    }

    /// True iff slot `(x, z)` holds data with a positive stored length
    pub fn exists(&self, x: i32, z: i32) -> Result<bool> {
        let index = slot_index(x, z)?;
        let mut inner = self.inner.lock();
        let length = inner.stored_length(index).map_err(|e| e.at_slot(x, z))?;
        Ok(matches!(length, Some(len) if len > 0))
    }

    /// Forget slot `(x, z)` and return its sectors to the free set.
    ///
    /// The old bytes stay on disk until the sectors are reused. Returns
    /// whether the slot was occupied.
    pub fn delete(&self, x: i32, z: i32) -> Result<bool> {
        let index = slot_index(x, z)?;
        let mut inner = self.inner.lock();
        let cleared = inner.clear_slot(index).map_err(|e| e.at_slot(x, z))?;
        if cleared {
            debug!(x, z, "Deleted slot");
        }
        Ok(cleared)
    }

    /// Time of the last write to slot `(x, z)`; the Unix epoch if never written
    pub fn last_modified(&self, x: i32, z: i32) -> Result<DateTime<Utc>> {
        let index = slot_index(x, z)?;
        let secs = self.inner.lock().header.timestamp(index);
        Ok(DateTime::from_timestamp(secs as i64, 0).unwrap_or_default())
    }

    /// Number of occupied slots
    pub fn chunk_count(&self) -> usize {
        self.inner.lock().header.occupied().count()
    }

    /// Local coordinates of every occupied slot
    pub fn slots(&self) -> Vec<(i32, i32)> {
        self.inner
            .lock()
            .header
            .occupied()
            .map(|(index, _)| index_to_local(index))
            .collect()
    }

    pub fn stats(&self) -> Result<RegionStats> {
        let inner = self.inner.lock();
        Ok(RegionStats {
            chunk_count: inner.header.occupied().count(),
            total_sectors: inner.sectors.len(),
            used_sectors: inner.sectors.used_count(),
            free_sectors: inner.sectors.free_count(),
            file_size: inner.file.metadata()?.len(),
        })
    }

    /// Flush file contents and metadata to disk
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}

impl Inner {
    fn read_slot(&mut self, index: usize) -> Result<Option<Tree>> {
        let loc = self.header.location(index);
        if loc.is_empty() {
            return Ok(None);
        }

        self.file.seek(SeekFrom::Start(loc.byte_offset()))?;
        let length = self.file.read_i32::<BigEndian>().map_err(read_err)?;
        if length <= 0 {
            return Ok(None);
        }
        let length = length as usize;
        let capacity = loc.sectors as usize * SECTOR_SIZE - 4;
        if length > capacity {
            return Err(Error::Format(format!(
                "Slot declares {} bytes but its {} sectors hold {}",
                length, loc.sectors, capacity
            )));
        }

        let method = CompressionMethod::from_id(self.file.read_u8().map_err(read_err)?)?;
        let mut compressed = vec![0u8; length - 1];
        self.file.read_exact(&mut compressed).map_err(read_err)?;

        let raw = decompress(&compressed, method)?;
        Tree::from_bytes(&raw).map(Some)
    }

    fn stored_length(&mut self, index: usize) -> Result<Option<i32>> {
        let loc = self.header.location(index);
        if loc.is_empty() {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(loc.byte_offset()))?;
        let length = self.file.read_i32::<BigEndian>().map_err(read_err)?;
        Ok(Some(length))
    }

    fn clear_slot(&mut self, index: usize) -> Result<bool> {
        let loc = self.header.location(index);
        if loc.is_empty() {
            return Ok(false);
        }
        self.sectors.release(loc.offset as usize, loc.sectors as usize);
        self.header.set_location(index, Location::default());
        self.header.persist_location(&mut self.file, index)?;
        Ok(true)
    }

    fn write_slot(&mut self, index: usize, buffer: &[u8], sector_count: usize) -> Result<Location> {
        self.clear_slot(index)?;

        let start = self.sectors.allocate(sector_count);
        let result = Location::new(start as u32, sector_count as u8).and_then(|loc| {
            self.file.seek(SeekFrom::Start(loc.byte_offset()))?;
            self.file.write_all(buffer)?;
            Ok(loc)
        });
        let loc = match result {
            Ok(loc) => loc,
            Err(e) => {
                self.sectors.release(start, sector_count);
                return Err(e);
            }
        };

        self.header.set_location(index, loc);
        self.header.persist_location(&mut self.file, index)?;
        self.header.set_timestamp(index, now_secs());
        self.header.persist_timestamp(&mut self.file, index)?;
        Ok(loc)
    }
}
