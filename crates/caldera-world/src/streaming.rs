//! Top-level chunk streamer: configuration, observer, worker threads.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use caldera_common::{ChunkCoord, WorldResult};

use crate::chunk::{Chunk, ChunkState};
use crate::evict::EvictionWorker;
use crate::events::{StreamEvent, StreamEvents};
use crate::fill::FillWorker;
use crate::generation::WorldGenerator;
use crate::index::SpatialIndex;
use crate::protocol::{ChunkRequest, ChunkResponse};
use crate::region::{DirRegionStore, RegionStore};
use crate::source::{LocalGenerationSource, RemoteFetchSource, StreamingSource};

/// Position collaborator: the player/camera that determines which
/// chunks must be resident.
pub trait Observer: Send + Sync {
    /// The observer's current chunk coordinate.
    fn current_chunk(&self) -> ChunkCoord;
}

/// Shared observer position the game loop updates each frame.
#[derive(Debug)]
pub struct SharedPosition {
    position: Mutex<ChunkCoord>,
}

impl SharedPosition {
    /// Creates a shared position at the given chunk coordinate.
    #[must_use]
    pub fn new(initial: ChunkCoord) -> Self {
        Self {
            position: Mutex::new(initial),
        }
    }

    /// Updates the observer's chunk coordinate.
    pub fn set(&self, coord: ChunkCoord) {
        *self.position.lock() = coord;
    }
}

impl Observer for SharedPosition {
    fn current_chunk(&self) -> ChunkCoord {
        *self.position.lock()
    }
}

/// Sleeps up to `total`, waking early when the cancel flag is set so
/// worker shutdown latency stays bounded.
pub(crate) fn sleep_cancellable(cancel: &AtomicBool, total: Duration) {
    const SLICE: Duration = Duration::from_millis(20);
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

/// Chunk streamer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// World save directory
    pub save_dir: PathBuf,
    /// World seed for local generation
    pub seed: u32,
    /// Keep radius on the X/Z plane, in chunks
    pub horizontal_radius: u32,
    /// Keep radius on the Y axis, in chunks
    pub vertical_radius: u32,
    /// Fill pause between scans for the local source (ms)
    pub local_poll_ms: u64,
    /// Fill pause between scans for the remote source (ms)
    pub remote_poll_ms: u64,
    /// Pause between eviction sweeps (ms)
    pub evict_interval_ms: u64,
    /// Render event channel capacity
    pub event_capacity: usize,
    /// Outbound chunk request channel capacity
    pub request_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves/world"),
            seed: 12345,
            horizontal_radius: 3,
            vertical_radius: 1,
            local_poll_ms: 10,
            remote_poll_ms: 2000,
            evict_interval_ms: 1000,
            event_capacity: 1024,
            request_capacity: 1024,
        }
    }
}

/// Keeps the in-memory working set of chunks synchronized with the
/// observer: one background thread grows it (fill), another shrinks it
/// with write-back persistence (eviction).
pub struct ChunkStreamer {
    config: StreamingConfig,
    index: Arc<SpatialIndex>,
    source: Arc<dyn StreamingSource>,
    observer: Arc<dyn Observer>,
    events: StreamEvents,
    store: Arc<dyn RegionStore>,
    creation_lock: Arc<Mutex<()>>,
    fill_cancel: Arc<AtomicBool>,
    evict_cancel: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl ChunkStreamer {
    /// Creates a streamer over an explicit source and store.
    #[must_use]
    pub fn with_source(
        config: StreamingConfig,
        observer: Arc<dyn Observer>,
        source: Arc<dyn StreamingSource>,
        store: Arc<dyn RegionStore>,
    ) -> Self {
        let events = StreamEvents::new(config.event_capacity);
        Self {
            config,
            index: Arc::new(SpatialIndex::new()),
            source,
            observer,
            events,
            store,
            creation_lock: Arc::new(Mutex::new(())),
            fill_cancel: Arc::new(AtomicBool::new(false)),
            evict_cancel: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Creates a single-player streamer that generates chunks locally.
    #[must_use]
    pub fn local(config: StreamingConfig, observer: Arc<dyn Observer>) -> Self {
        let source = LocalGenerationSource::new(WorldGenerator::with_seed(config.seed))
            .with_poll_interval(Duration::from_millis(config.local_poll_ms));
        let store = DirRegionStore::new(&config.save_dir);
        Self::with_source(config, observer, Arc::new(source), Arc::new(store))
    }

    /// Creates a client streamer that fetches chunks from a remote
    /// authority. Returns the request receiver the network layer drains.
    #[must_use]
    pub fn remote(
        config: StreamingConfig,
        observer: Arc<dyn Observer>,
    ) -> (Self, Receiver<ChunkRequest>) {
        let (tx, rx) = crossbeam_channel::bounded(config.request_capacity);
        let source = RemoteFetchSource::new(tx)
            .with_poll_interval(Duration::from_millis(config.remote_poll_ms));
        let store = DirRegionStore::new(&config.save_dir);
        let streamer = Self::with_source(config, observer, Arc::new(source), Arc::new(store));
        (streamer, rx)
    }

    /// Spawns the fill and eviction threads. A second call while both
    /// are running is a no-op.
    pub fn start(&self) -> WorldResult<()> {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return Ok(());
        }
        self.fill_cancel.store(false, Ordering::Relaxed);
        self.evict_cancel.store(false, Ordering::Relaxed);

        let fill = FillWorker {
            index: Arc::clone(&self.index),
            source: Arc::clone(&self.source),
            observer: Arc::clone(&self.observer),
            events: self.events.clone(),
            creation_lock: Arc::clone(&self.creation_lock),
            cancel: Arc::clone(&self.fill_cancel),
            horizontal_radius: self.config.horizontal_radius as i32,
            vertical_radius: self.config.vertical_radius as i32,
        };
        handles.push(
            thread::Builder::new()
                .name("caldera-fill".into())
                .spawn(move || fill.run())?,
        );

        let evict = EvictionWorker {
            index: Arc::clone(&self.index),
            observer: Arc::clone(&self.observer),
            events: self.events.clone(),
            store: Arc::clone(&self.store),
            cancel: Arc::clone(&self.evict_cancel),
            horizontal_radius: self.config.horizontal_radius as i32,
            vertical_radius: self.config.vertical_radius as i32,
            sweep_interval: Duration::from_millis(self.config.evict_interval_ms),
        };
        handles.push(
            thread::Builder::new()
                .name("caldera-evict".into())
                .spawn(move || evict.run())?,
        );

        info!(
            horizontal_radius = self.config.horizontal_radius,
            vertical_radius = self.config.vertical_radius,
            "chunk streamer started"
        );
        Ok(())
    }

    /// Signals both workers and blocks until both threads have
    /// terminated. Safe to call repeatedly.
    pub fn stop(&self) {
        self.fill_cancel.store(true, Ordering::Relaxed);
        self.evict_cancel.store(true, Ordering::Relaxed);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!("streaming worker panicked during shutdown");
            }
        }
    }

    /// Stops the workers and drops the whole working set without
    /// persistence. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        self.index.clear();
        info!("chunk streamer disposed");
    }

    /// Applies an inbound chunk response from the remote authority.
    ///
    /// May be called from any thread. The content is trusted; the chunk
    /// enters the index directly in the `Generated` state,
    /// last-writer-wins. Wrong-sized payloads are dropped.
    pub fn apply_response(&self, response: ChunkResponse) {
        if !response.is_well_sized() {
            warn!(
                coord = ?response.coord(),
                blocks = response.blocks.len(),
                "dropping malformed chunk response"
            );
            return;
        }
        let coord = response.coord();
        if let Some(replaced) = self.index.get(coord) {
            let mut guard = replaced.write();
            guard.begin_dispose();
            // The render consumer only ever saw the chunk if it reached
            // `Ready`; tell it to release that instance before the
            // replacement lands.
            if guard.state() == ChunkState::Ready {
                self.events.publish(StreamEvent::ChunkDisposing { coord });
            }
        }
        let chunk = Chunk::from_blocks(coord, response.into_blocks());
        self.index
            .insert(coord, Arc::new(parking_lot::RwLock::new(chunk)));
    }

    /// The shared spatial index (read-only access for the render/main
    /// thread).
    #[must_use]
    pub fn index(&self) -> &Arc<SpatialIndex> {
        &self.index
    }

    /// The render notification channel.
    #[must_use]
    pub fn events(&self) -> &StreamEvents {
        &self.events
    }

    /// The streamer configuration.
    #[must_use]
    pub const fn config(&self) -> &StreamingConfig {
        &self.config
    }
}

impl Drop for ChunkStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkState, CHUNK_VOLUME};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StreamingConfig {
        StreamingConfig {
            save_dir: dir.path().to_path_buf(),
            horizontal_radius: 1,
            vertical_radius: 0,
            local_poll_ms: 5,
            remote_poll_ms: 30,
            evict_interval_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_local_streamer_smoke() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let streamer = ChunkStreamer::local(test_config(&dir), observer);

        streamer.start().expect("start failed");
        thread::sleep(Duration::from_millis(300));
        streamer.stop();

        // 3x3 footprint around the observer, fully populated.
        assert!(streamer.index().len() >= 9);
        let center = streamer
            .index()
            .get(ChunkCoord::new(0, 0, 0))
            .expect("center resident");
        assert_eq!(center.read().state(), ChunkState::Ready);
    }

    #[test]
    fn test_stop_is_prompt_and_repeatable() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let streamer = ChunkStreamer::local(test_config(&dir), observer);

        streamer.start().expect("start failed");
        thread::sleep(Duration::from_millis(30));

        let begun = Instant::now();
        streamer.stop();
        // Workers poll cancellation at every Y-step and in sleep slices.
        assert!(begun.elapsed() < Duration::from_millis(500));

        streamer.stop();
    }

    #[test]
    fn test_dispose_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let streamer = ChunkStreamer::local(test_config(&dir), observer);

        streamer.start().expect("start failed");
        thread::sleep(Duration::from_millis(50));

        streamer.dispose();
        assert!(streamer.index().is_empty());
        streamer.dispose();
        assert!(streamer.index().is_empty());
    }

    #[test]
    fn test_apply_response_inserts_generated() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let (streamer, _requests) = ChunkStreamer::remote(test_config(&dir), observer);

        streamer.apply_response(ChunkResponse {
            x: 2,
            y: 0,
            z: -1,
            blocks: vec![7; CHUNK_VOLUME],
        });

        let chunk = streamer
            .index()
            .get(ChunkCoord::new(2, 0, -1))
            .expect("response applied");
        assert_eq!(chunk.read().state(), ChunkState::Generated);
        assert_eq!(chunk.read().blocks()[0].0, 7);
    }

    #[test]
    fn test_apply_response_overwrite_disposes_ready_chunk() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let (streamer, _requests) = ChunkStreamer::remote(test_config(&dir), observer);

        let coord = ChunkCoord::new(1, 0, 1);
        streamer.apply_response(ChunkResponse {
            x: coord.x,
            y: coord.y,
            z: coord.z,
            blocks: vec![1; CHUNK_VOLUME],
        });
        let first = streamer.index().get(coord).expect("chunk resident");
        first.write().mark_ready();
        assert!(streamer.events().drain().is_empty());

        // A duplicate response replaces the rendered instance; the
        // consumer must be told to release it.
        streamer.apply_response(ChunkResponse {
            x: coord.x,
            y: coord.y,
            z: coord.z,
            blocks: vec![2; CHUNK_VOLUME],
        });

        assert!(first.read().is_disposing());
        let events = streamer.events().drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ChunkDisposing { coord: c } if *c == coord)));

        let replaced = streamer.index().get(coord).expect("chunk resident");
        assert!(!Arc::ptr_eq(&replaced, &first));
        assert_eq!(replaced.read().state(), ChunkState::Generated);
    }

    #[test]
    fn test_apply_response_rejects_malformed() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let (streamer, _requests) = ChunkStreamer::remote(test_config(&dir), observer);

        streamer.apply_response(ChunkResponse {
            x: 0,
            y: 0,
            z: 0,
            blocks: vec![7; 3],
        });
        assert!(streamer.index().is_empty());
    }

    #[test]
    fn test_remote_rerequests_until_answered() {
        let dir = TempDir::new().expect("temp dir");
        let observer = Arc::new(SharedPosition::new(ChunkCoord::new(0, 0, 0)));
        let (streamer, requests) = ChunkStreamer::remote(test_config(&dir), observer);

        streamer.start().expect("start failed");

        // First scan: all 9 coordinates requested, none answered.
        thread::sleep(Duration::from_millis(20));
        let first: Vec<ChunkRequest> = requests.try_iter().collect();
        assert_eq!(first.len(), 9);

        // Lost responses are repaired by a later scan re-requesting.
        thread::sleep(Duration::from_millis(60));
        let second: Vec<ChunkRequest> = requests.try_iter().collect();
        assert!(!second.is_empty());
        assert!(second.iter().all(|r| first.contains(r)));

        // Answer one coordinate; it becomes resident.
        streamer.apply_response(ChunkResponse {
            x: 0,
            y: 0,
            z: 0,
            blocks: vec![1; CHUNK_VOLUME],
        });
        let chunk = streamer
            .index()
            .get(ChunkCoord::new(0, 0, 0))
            .expect("answered chunk resident");
        assert_eq!(chunk.read().state(), ChunkState::Generated);

        streamer.stop();
    }
}
