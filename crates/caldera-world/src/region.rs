//! Region-grained write-back persistence.
//!
//! A region groups `REGION_SIZE`³ adjacent chunk coordinates and is the
//! atomic persistence unit: chunks are flushed in batches at eviction
//! time, and whole regions are dropped once nothing keeps them active.

use caldera_common::{ChunkCoord, RegionCoord, WorldResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Batched persistence of chunk groups.
pub trait RegionStore: Send + Sync {
    /// Persists a batch of serialized chunk payloads in one call.
    fn save_everything(&self, chunks: &[(ChunkCoord, Vec<u8>)]) -> WorldResult<()>;

    /// Removes a persisted region and everything it owns.
    fn remove(&self, region: RegionCoord) -> WorldResult<()>;

    /// Lists the currently persisted regions (region GC candidates).
    fn persisted_regions(&self) -> Vec<RegionCoord>;
}

/// File-backed region store: one directory per region, one payload file
/// per chunk.
#[derive(Debug)]
pub struct DirRegionStore {
    /// Base directory for region directories
    base_dir: PathBuf,
}

impl DirRegionStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding one region's chunk files.
    fn region_dir(&self, region: RegionCoord) -> PathBuf {
        self.base_dir.join(region.filename())
    }

    /// Payload file for one chunk.
    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.region_dir(coord.to_region())
            .join(format!("c.{}.{}.{}.clc", coord.x, coord.y, coord.z))
    }

    /// Reads a persisted chunk payload back, if present.
    pub fn read_chunk(&self, coord: ChunkCoord) -> WorldResult<Option<Vec<u8>>> {
        let path = self.chunk_path(coord);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    /// Parses a region directory name of the form `r.x.y.z`.
    fn parse_region_name(name: &str) -> Option<RegionCoord> {
        let mut parts = name.split('.');
        if parts.next() != Some("r") {
            return None;
        }
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(RegionCoord::new(x, y, z))
    }
}

impl RegionStore for DirRegionStore {
    fn save_everything(&self, chunks: &[(ChunkCoord, Vec<u8>)]) -> WorldResult<()> {
        for (coord, payload) in chunks {
            let path = self.chunk_path(*coord);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, payload)?;
        }
        debug!(count = chunks.len(), "persisted chunk batch");
        Ok(())
    }

    fn remove(&self, region: RegionCoord) -> WorldResult<()> {
        let dir = self.region_dir(region);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            debug!(region = %region.filename(), "removed persisted region");
        }
        Ok(())
    }

    fn persisted_regions(&self) -> Vec<RegionCoord> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                let name = e.file_name();
                let parsed = Self::parse_region_name(&name.to_string_lossy());
                if parsed.is_none() {
                    warn!(name = ?name, "ignoring unrecognized entry in region store");
                }
                parsed
            })
            .collect()
    }
}
