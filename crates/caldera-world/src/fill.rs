//! Background worker growing the working set around the observer.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, trace};

use caldera_common::ChunkCoord;

use crate::chunk::{Chunk, ChunkState, SharedChunk};
use crate::events::{StreamEvent, StreamEvents};
use crate::index::SpatialIndex;
use crate::scan::SpiralScanner;
use crate::source::StreamingSource;
use crate::streaming::{sleep_cancellable, Observer};

/// Drives the spiral scan: creates missing chunks, populates them
/// through the streaming source, and promotes neighbor-complete chunks
/// to `Ready`.
pub(crate) struct FillWorker {
    pub(crate) index: Arc<SpatialIndex>,
    pub(crate) source: Arc<dyn StreamingSource>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) events: StreamEvents,
    /// Guards the check-then-create sequence only; never held across
    /// population.
    pub(crate) creation_lock: Arc<Mutex<()>>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) horizontal_radius: i32,
    pub(crate) vertical_radius: i32,
}

impl FillWorker {
    /// Worker loop: scan, sleep, repeat until cancelled.
    pub(crate) fn run(&self) {
        info!("fill worker started");
        while !self.cancel.load(Ordering::Relaxed) {
            self.fill_pass();
            sleep_cancellable(&self.cancel, self.source.poll_interval());
        }
        info!("fill worker stopped");
    }

    /// One full spiral scan around the observer's current chunk.
    ///
    /// Returns `false` if the pass was cut short by cancellation or by
    /// the observer leaving its center chunk; aborted work is retried on
    /// the next pass.
    pub(crate) fn fill_pass(&self) -> bool {
        let center = self.observer.current_chunk();
        let side = (2 * self.horizontal_radius + 1) as u32;

        for (dx, dz) in SpiralScanner::new(side) {
            for dy in -self.vertical_radius..=self.vertical_radius {
                if self.cancel.load(Ordering::Relaxed) {
                    return false;
                }
                // Never do work for a stale center.
                if self.observer.current_chunk() != center {
                    trace!("observer moved, restarting scan");
                    return false;
                }
                self.visit(center.offset(dx, dy, dz));
            }
        }
        true
    }

    /// Visits one coordinate of the scan footprint.
    fn visit(&self, coord: ChunkCoord) {
        match self.index.get(coord) {
            None => {
                self.create_and_populate(coord);
            }
            Some(chunk) => {
                let state = {
                    let guard = chunk.read();
                    if guard.is_disposing() {
                        return;
                    }
                    guard.state()
                };
                match state {
                    // Still waiting on a remote response; re-request so a
                    // lost response is repaired by this scan.
                    ChunkState::New => {
                        let mut guard = chunk.write();
                        if !guard.is_disposing() && guard.state() == ChunkState::New {
                            let _ = self.source.try_populate(&mut guard);
                        }
                    }
                    ChunkState::Generated => self.try_promote(coord, &chunk),
                    ChunkState::Ready => {}
                }
            }
        }
    }

    /// Allocates a `New` chunk (if still absent) and asks the source to
    /// populate it.
    ///
    /// The check-then-create sequence runs under the shared creation
    /// lock so two threads cannot race a duplicate chunk; population
    /// runs after the lock is released so slow generation never
    /// serializes unrelated coordinates.
    fn create_and_populate(&self, coord: ChunkCoord) -> Option<SharedChunk> {
        let chunk = {
            let _guard = self.creation_lock.lock();
            if let Some(existing) = self.index.get(coord) {
                existing
            } else {
                let chunk: SharedChunk = Arc::new(RwLock::new(Chunk::new(coord)));
                self.index.insert(coord, Arc::clone(&chunk));
                chunk
            }
        };

        {
            let mut guard = chunk.write();
            if guard.is_disposing() {
                // Claimed by eviction mid-flight; abandon quietly.
                return None;
            }
            if guard.state() == ChunkState::New {
                let _ = self.source.try_populate(&mut guard);
            }
        }

        Some(chunk)
    }

    /// Attempts `Generated -> Ready` promotion of a chunk.
    ///
    /// All four straight neighbors must exist and be at least
    /// `Generated`; missing ones are created (and populated) on the
    /// spot, in N, E, S, W order, yielding between each to bound
    /// starvation of the other threads.
    fn try_promote(&self, coord: ChunkCoord, chunk: &SharedChunk) {
        for neighbor in coord.neighbors4() {
            let filled = match self.index.get(neighbor) {
                Some(nb) => nb.read().state() >= ChunkState::Generated,
                None => self
                    .create_and_populate(neighbor)
                    .is_some_and(|nb| nb.read().state() >= ChunkState::Generated),
            };
            if !filled {
                // Neighbor pending or vanished; retry on a later scan.
                return;
            }
            thread::yield_now();
        }

        let mut guard = chunk.write();
        if guard.mark_ready() {
            trace!(?coord, "chunk ready");
            // Published while still holding the write lock, so eviction
            // cannot interleave a Disposing event for this residency
            // ahead of the Ready event.
            self.events.publish(StreamEvent::ChunkReady {
                coord,
                chunk: Arc::clone(chunk),
            });
        }
    }
}
