//! Region file manager
//!
//! Maps chunk coordinates to a region file and a local slot, keeping a
//! bounded set of region files open through the LIRS cache.

use crate::cache::{CacheStats, LirsCache};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::region::{RegionFile, RegionOptions, RegionPos};
use crate::tag::Tree;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Where region files live.
///
/// The manager only needs existence checks, open and create; listing
/// is used by [`RegionManager::regions`].
pub trait RegionDirectory: Send + Sync {
    fn path_for(&self, pos: RegionPos) -> PathBuf;

    fn exists(&self, pos: RegionPos) -> bool {
        self.path_for(pos).exists()
    }

    fn open(&self, pos: RegionPos, options: &RegionOptions) -> Result<RegionFile> {
        RegionFile::open(self.path_for(pos), options.clone())
    }

    fn create(&self, pos: RegionPos, options: &RegionOptions) -> Result<RegionFile>;

    /// Regions present in the directory
    fn list(&self) -> Result<Vec<RegionPos>>;
}

/// Region files stored as `r.{x}.{z}.mca` under one base directory
#[derive(Debug, Clone)]
pub struct FsRegionDirectory {
    base: PathBuf,
}

impl FsRegionDirectory {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl RegionDirectory for FsRegionDirectory {
    fn path_for(&self, pos: RegionPos) -> PathBuf {
        self.base.join(pos.file_name())
    }

    fn create(&self, pos: RegionPos, options: &RegionOptions) -> Result<RegionFile> {
        std::fs::create_dir_all(&self.base)?;
        RegionFile::create(self.path_for(pos), options.clone())
    }

    fn list(&self) -> Result<Vec<RegionPos>> {
        if !self.base.exists() {
            return Ok(Vec::new());
        }
        let mut regions = Vec::new();
        for entry in std::fs::read_dir(&self.base)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(pos) = entry.file_name().to_str().and_then(RegionPos::from_file_name) {
                regions.push(pos);
            }
        }
        regions.sort();
        Ok(regions)
    }
}

/// Chunk-level entry point to a directory of region files.
pub struct RegionManager {
    directory: Arc<dyn RegionDirectory>,
    options: RegionOptions,
    cache: LirsCache<RegionPos, Arc<RegionFile>>,
    /// Every handle still alive, including evicted ones callers hold.
    /// Locked while opening so one file never has two handles.
    live: Mutex<HashMap<RegionPos, Weak<RegionFile>>>,
}

impl std::fmt::Debug for RegionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionManager")
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish()
    }
}

impl RegionManager {
    /// Manager over `config.region_dir` on the local filesystem
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Self::with_directory(config, FsRegionDirectory::new(&config.region_dir))
    }

    pub fn with_directory<D>(config: &StoreConfig, directory: D) -> Result<Self>
    where
        D: RegionDirectory + 'static,
    {
        config.validate()?;

        let cache = LirsCache::with_release(
            config.cache_capacity,
            config.effective_hot_ratio(),
            |pos: RegionPos, region: Arc<RegionFile>| {
                if let Err(e) = region.flush() {
                    warn!(region = %pos, error = %e, "Failed to flush region on release");
                }
                debug!(region = %pos, "Released region file");
            },
        );

        info!(
            capacity = config.cache_capacity,
            compression = ?config.compression,
            "Region manager ready"
        );

        Ok(Self {
            directory: Arc::new(directory),
            options: config.region_options(),
            cache,
            live: Mutex::new(HashMap::new()),
        })
    }

    /// Region file for `pos`, opening or creating it on a cache miss
    pub fn region(&self, pos: RegionPos) -> Result<Arc<RegionFile>> {
        self.cache
            .get_or_load(pos, |&pos| {
                let mut live = self.live.lock();
                if let Some(region) = live.get(&pos).and_then(Weak::upgrade) {
                    debug!(region = %pos, "Reusing live region handle");
                    return Ok(region);
                }
                let region = if self.directory.exists(pos) {
                    self.directory.open(pos, &self.options)?
                } else {
                    self.directory.create(pos, &self.options)?
                };
                let region = Arc::new(region);
                live.retain(|_, weak| weak.strong_count() > 0);
                live.insert(pos, Arc::downgrade(&region));
                Ok::<_, Error>(region)
            })
            .map_err(|e| e.at_region(pos.x, pos.z))
    }

    fn with_slot<T, F>(&self, cx: i32, cz: i32, op: F) -> Result<T>
    where
        F: FnOnce(&RegionFile, i32, i32) -> Result<T>,
    {
        let (pos, (x, z)) = RegionPos::of_chunk(cx, cz);
        let region = self.region(pos)?;
        op(&region, x, z).map_err(|e| e.at_region(pos.x, pos.z))
    }

    /// Tree stored for chunk `(cx, cz)`, `None` if never generated
    pub fn get(&self, cx: i32, cz: i32) -> Result<Option<Tree>> {
        self.with_slot(cx, cz, |region, x, z| region.get(x, z))
    }

    pub fn put(&self, cx: i32, cz: i32, tree: &Tree) -> Result<()> {
        self.with_slot(cx, cz, |region, x, z| region.put(x, z, tree))
    }

    pub fn exists(&self, cx: i32, cz: i32) -> Result<bool> {
        self.with_slot(cx, cz, |region, x, z| region.exists(x, z))
    }

    /// Returns whether the chunk was stored
    pub fn delete(&self, cx: i32, cz: i32) -> Result<bool> {
        self.with_slot(cx, cz, |region, x, z| region.delete(x, z))
    }

    pub fn last_modified(&self, cx: i32, cz: i32) -> Result<DateTime<Utc>> {
        self.with_slot(cx, cz, |region, x, z| region.last_modified(x, z))
    }

    /// fsync every open region file
    pub fn flush_all(&self) -> Result<()> {
        let regions = self.cache.values();
        debug!(count = regions.len(), "Flushing open regions");
        regions.par_iter().try_for_each(|region| region.flush())
    }

    /// Flush and close every open region file
    pub fn close(&self) {
        let stats = self.cache.stats();
        self.cache.clear();
        info!(%stats, "Region manager closed");
    }

    /// Regions present in the directory, open or not
    pub fn regions(&self) -> Result<Vec<RegionPos>> {
        self.directory.list()
    }

    /// Regions currently held open by the cache
    pub fn open_regions(&self) -> Vec<RegionPos> {
        let mut open = self.cache.keys();
        open.sort();
        open
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn options(&self) -> &RegionOptions {
        &self.options
    }
}

impl Drop for RegionManager {
    fn drop(&mut self) {
        self.cache.clear();
    }
}
