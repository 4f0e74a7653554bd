//! Background worker shrinking the working set and the persisted set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use caldera_common::{ChunkCoord, RegionCoord};

use crate::chunk::ChunkState;
use crate::events::{StreamEvent, StreamEvents};
use crate::index::SpatialIndex;
use crate::region::RegionStore;
use crate::streaming::{sleep_cancellable, Observer};

/// Counters from one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SweepStats {
    /// Chunks removed from the index
    pub evicted: usize,
    /// Chunks written back before removal
    pub persisted: usize,
    /// Persisted regions dropped
    pub regions_removed: usize,
}

/// Sweeps chunks outside the observer's radius out of the index with
/// write-back, then garbage-collects persisted regions.
pub(crate) struct EvictionWorker {
    pub(crate) index: Arc<SpatialIndex>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) events: StreamEvents,
    pub(crate) store: Arc<dyn RegionStore>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) horizontal_radius: i32,
    pub(crate) vertical_radius: i32,
    pub(crate) sweep_interval: Duration,
}

impl EvictionWorker {
    /// Worker loop: sweep, sleep, repeat until cancelled.
    pub(crate) fn run(&self) {
        info!("eviction worker started");
        while !self.cancel.load(Ordering::Relaxed) {
            self.evict_sweep();
            sleep_cancellable(&self.cancel, self.sweep_interval);
        }
        info!("eviction worker stopped");
    }

    /// One full sweep: chunk GC with write-back, then region GC.
    ///
    /// Chunk removal and its persistence always complete before the
    /// region pass, so a region is never dropped while logically owning
    /// an unflushed chunk.
    pub(crate) fn evict_sweep(&self) -> SweepStats {
        let center = self.observer.current_chunk();
        let mut stats = SweepStats::default();
        let mut batch: Vec<(ChunkCoord, Vec<u8>)> = Vec::new();

        for (coord, chunk) in self.index.snapshot() {
            if self.in_keep_set(coord, center) {
                continue;
            }

            {
                let mut guard = chunk.write();
                guard.begin_dispose();
                // Published under the chunk's write lock: a concurrent
                // promotion either queued its Ready event before we took
                // the lock, or its `mark_ready` now refuses, so the
                // consumer never sees Disposing ahead of Ready for one
                // residency.
                self.events.publish(StreamEvent::ChunkDisposing { coord });
                // Never persist empty `New` placeholders.
                if guard.state() >= ChunkState::Generated {
                    match guard.serialize() {
                        Ok(payload) => batch.push((coord, payload)),
                        Err(e) => warn!(?coord, error = %e, "chunk serialization failed"),
                    }
                }
            }

            self.index.remove(coord);
            stats.evicted += 1;
        }

        if !batch.is_empty() {
            stats.persisted = batch.len();
            // Best effort: a failed flush never aborts the sweep.
            if let Err(e) = self.store.save_everything(&batch) {
                warn!(error = %e, "write-back flush failed");
            }
        }

        stats.regions_removed = self.collect_regions();

        if stats.evicted > 0 {
            debug!(
                evicted = stats.evicted,
                persisted = stats.persisted,
                regions_removed = stats.regions_removed,
                "eviction sweep finished"
            );
        }
        stats
    }

    /// Whether a chunk lies within the keep radius around the center.
    /// Same radius math as the fill worker: Chebyshev on X/Z, separate
    /// Y radius.
    fn in_keep_set(&self, coord: ChunkCoord, center: ChunkCoord) -> bool {
        coord.horizontal_distance(center) <= self.horizontal_radius
            && (coord.y - center.y).abs() <= self.vertical_radius
    }

    /// Drops persisted regions no longer near any resident chunk.
    ///
    /// A region stays active while it owns a resident chunk or lies
    /// within one ring of padding around a region that does.
    fn collect_regions(&self) -> usize {
        let active: HashSet<RegionCoord> = self
            .index
            .snapshot()
            .iter()
            .flat_map(|(coord, _)| coord.to_region().with_padding())
            .collect();

        let mut removed = 0;
        for region in self.store.persisted_regions() {
            if !active.contains(&region) {
                match self.store.remove(region) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(?region, error = %e, "region removal failed"),
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, SharedChunk};
    use crate::streaming::SharedPosition;
    use caldera_common::{WorldError, WorldResult, REGION_SIZE};
    use parking_lot::{Mutex, RwLock};

    /// Operations a store observed, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum StoreOp {
        Save(Vec<ChunkCoord>),
        Remove(RegionCoord),
    }

    /// In-memory store recording the order of operations.
    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<StoreOp>>,
        regions: Mutex<HashSet<RegionCoord>>,
        fail_saves: bool,
    }

    impl RecordingStore {
        fn with_regions(regions: &[RegionCoord]) -> Self {
            Self {
                regions: Mutex::new(regions.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn ops(&self) -> Vec<StoreOp> {
            self.ops.lock().clone()
        }
    }

    impl RegionStore for RecordingStore {
        fn save_everything(&self, chunks: &[(ChunkCoord, Vec<u8>)]) -> WorldResult<()> {
            let coords: Vec<ChunkCoord> = chunks.iter().map(|(c, _)| *c).collect();
            {
                let mut regions = self.regions.lock();
                for coord in &coords {
                    regions.insert(coord.to_region());
                }
            }
            self.ops.lock().push(StoreOp::Save(coords));
            if self.fail_saves {
                return Err(WorldError::SerializationFailed("injected failure".into()));
            }
            Ok(())
        }

        fn remove(&self, region: RegionCoord) -> WorldResult<()> {
            self.regions.lock().remove(&region);
            self.ops.lock().push(StoreOp::Remove(region));
            Ok(())
        }

        fn persisted_regions(&self) -> Vec<RegionCoord> {
            self.regions.lock().iter().copied().collect()
        }
    }

    fn generated_chunk(coord: ChunkCoord) -> SharedChunk {
        let mut chunk = Chunk::new(coord);
        chunk.mark_generated();
        Arc::new(RwLock::new(chunk))
    }

    fn worker_with(
        store: Arc<RecordingStore>,
        horizontal_radius: i32,
        vertical_radius: i32,
    ) -> EvictionWorker {
        EvictionWorker {
            index: Arc::new(SpatialIndex::new()),
            observer: Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0))),
            events: StreamEvents::default(),
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            horizontal_radius,
            vertical_radius,
            sweep_interval: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_eviction_boundary() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 3, 3);

        let inside = ChunkCoord::new(3, 0, 0);
        let outside = ChunkCoord::new(4, 0, 0);
        worker.index.insert(inside, generated_chunk(inside));
        worker.index.insert(outside, generated_chunk(outside));

        let stats = worker.evict_sweep();

        assert_eq!(stats.evicted, 1);
        assert!(worker.index.contains(inside));
        assert!(!worker.index.contains(outside));
    }

    #[test]
    fn test_separate_vertical_radius() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 3, 1);

        let too_high = ChunkCoord::new(0, 2, 0);
        let in_range = ChunkCoord::new(3, 1, 3);
        worker.index.insert(too_high, generated_chunk(too_high));
        worker.index.insert(in_range, generated_chunk(in_range));

        worker.evict_sweep();

        assert!(!worker.index.contains(too_high));
        assert!(worker.index.contains(in_range));
    }

    #[test]
    fn test_new_placeholders_not_persisted() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let coord = ChunkCoord::new(10, 0, 10);
        worker
            .index
            .insert(coord, Arc::new(RwLock::new(Chunk::new(coord))));

        let stats = worker.evict_sweep();

        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.persisted, 0);
        assert!(store.ops().is_empty());
    }

    #[test]
    fn test_disposing_events_published() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let coord = ChunkCoord::new(9, 0, 9);
        worker.index.insert(coord, generated_chunk(coord));

        worker.evict_sweep();

        let events = worker.events.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ChunkDisposing { coord: c } if *c == coord)));
    }

    #[test]
    fn test_flush_precedes_region_removal() {
        // Chunk in region (2,0,0), far from the keep set; an unrelated
        // stale region must only be removed after the batch flush.
        let stale = RegionCoord::new(40, 0, 0);
        let store = Arc::new(RecordingStore::with_regions(&[stale]));
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let coord = ChunkCoord::new(2 * REGION_SIZE, 0, 0);
        worker.index.insert(coord, generated_chunk(coord));

        worker.evict_sweep();

        let ops = store.ops();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], StoreOp::Save(vec![coord]));
        // Both the evicted chunk's region (now inactive) and the stale
        // one go in the region pass, strictly after the save.
        assert!(ops[1..]
            .iter()
            .all(|op| matches!(op, StoreOp::Remove(_))));
    }

    #[test]
    fn test_region_retention_with_padding() {
        // Resident chunk in region (0,0,0); an evicted neighbor from
        // region (1,0,0) stays persisted because that region is within
        // one ring of padding.
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 3, 1);

        let kept = ChunkCoord::new(0, 0, 0);
        let evicted = ChunkCoord::new(REGION_SIZE, 0, 0);
        worker.index.insert(kept, generated_chunk(kept));
        worker.index.insert(evicted, generated_chunk(evicted));

        let stats = worker.evict_sweep();

        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.regions_removed, 0);
        assert!(store
            .persisted_regions()
            .contains(&RegionCoord::new(1, 0, 0)));
    }

    #[test]
    fn test_far_region_collected() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let kept = ChunkCoord::new(0, 0, 0);
        let far = ChunkCoord::new(5 * REGION_SIZE, 0, 0);
        worker.index.insert(kept, generated_chunk(kept));
        worker.index.insert(far, generated_chunk(far));

        // First sweep evicts (and persists) the far chunk; its region is
        // then outside the padding of any resident chunk and is dropped.
        let stats = worker.evict_sweep();

        assert_eq!(stats.persisted, 1);
        assert_eq!(stats.regions_removed, 1);
        assert!(store.persisted_regions().is_empty());
    }

    #[test]
    fn test_persistence_failure_does_not_abort_sweep() {
        let store = Arc::new(RecordingStore {
            fail_saves: true,
            ..Default::default()
        });
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let a = ChunkCoord::new(20, 0, 0);
        let b = ChunkCoord::new(0, 0, 20);
        worker.index.insert(a, generated_chunk(a));
        worker.index.insert(b, generated_chunk(b));

        let stats = worker.evict_sweep();

        // Both chunks removed despite the failed flush.
        assert_eq!(stats.evicted, 2);
        assert!(worker.index.is_empty());
    }

    #[test]
    fn test_evicted_chunks_marked_disposing() {
        let store = Arc::new(RecordingStore::default());
        let worker = worker_with(Arc::clone(&store), 1, 1);

        let coord = ChunkCoord::new(15, 0, 0);
        let chunk = generated_chunk(coord);
        worker.index.insert(coord, Arc::clone(&chunk));

        worker.evict_sweep();

        // A fill thread still holding the Arc observes the flag and
        // abandons in-flight work.
        assert!(chunk.read().is_disposing());
    }
}
