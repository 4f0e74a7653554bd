//! Streaming notifications for the render consumer.

use caldera_common::ChunkCoord;
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::chunk::SharedChunk;

/// Notifications emitted by the streaming workers.
///
/// For a single chunk these arrive in lifecycle order: `ChunkReady`
/// before `ChunkDisposing`, never interleaved for the same residency.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A chunk became neighbor-complete and is renderable.
    ChunkReady {
        /// Chunk coordinate
        coord: ChunkCoord,
        /// The renderable chunk
        chunk: SharedChunk,
    },
    /// A chunk is about to be removed; release GPU resources now.
    ChunkDisposing {
        /// Chunk coordinate
        coord: ChunkCoord,
    },
}

impl StreamEvent {
    /// The coordinate this event refers to.
    #[must_use]
    pub fn coord(&self) -> ChunkCoord {
        match self {
            Self::ChunkReady { coord, .. } | Self::ChunkDisposing { coord } => *coord,
        }
    }
}

/// Bounded event channel between the workers and the render thread.
#[derive(Debug, Clone)]
pub struct StreamEvents {
    /// Sender for the worker side
    sender: Sender<StreamEvent>,
    /// Receiver for the consumer side
    receiver: Receiver<StreamEvent>,
}

impl Default for StreamEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl StreamEvents {
    /// Creates a new event channel with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Publishes an event. Non-blocking; if the consumer is behind and
    /// the channel is full, the event is dropped.
    pub fn publish(&self, event: StreamEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    #[must_use]
    pub fn drain(&self) -> Vec<StreamEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns a receiver handle for the consumer side.
    #[must_use]
    pub fn receiver(&self) -> Receiver<StreamEvent> {
        self.receiver.clone()
    }
}
