//! Chunk content sources: local generation and remote fetch.

use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::trace;

use crate::chunk::Chunk;
use crate::generation::WorldGenerator;
use crate::protocol::ChunkRequest;

/// Outcome of a population attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    /// Content was written and the chunk advanced to `Generated`.
    Populated,
    /// Content will arrive later (remote fetch in flight).
    Pending,
}

/// Capability that fills a chunk with content.
///
/// The fill worker is generic over this seam; the local and remote
/// variants share one loop shape and differ only here.
pub trait StreamingSource: Send + Sync {
    /// Attempts to populate the chunk.
    ///
    /// Local generation populates synchronously and returns `Populated`.
    /// Remote fetch issues a request and returns `Pending`; the content
    /// arrives later through the response path.
    fn try_populate(&self, chunk: &mut Chunk) -> PopulateOutcome;

    /// How long the fill worker sleeps between scan passes.
    fn poll_interval(&self) -> Duration;
}

/// Populates chunks by deterministic procedural generation.
pub struct LocalGenerationSource {
    generator: WorldGenerator,
    poll_interval: Duration,
}

impl LocalGenerationSource {
    /// Default pause between scan passes; generation is fast, so the
    /// worker re-scans almost continuously.
    pub const DEFAULT_POLL: Duration = Duration::from_millis(10);

    /// Creates a local source around a generator.
    #[must_use]
    pub fn new(generator: WorldGenerator) -> Self {
        Self {
            generator,
            poll_interval: Self::DEFAULT_POLL,
        }
    }

    /// Overrides the scan pause.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl StreamingSource for LocalGenerationSource {
    fn try_populate(&self, chunk: &mut Chunk) -> PopulateOutcome {
        let blocks = self.generator.generate_blocks(chunk.coord());
        chunk.set_blocks(blocks);
        chunk.mark_generated();
        PopulateOutcome::Populated
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Populates chunks by requesting them from a remote authority.
///
/// Requests are fire-and-forget; no in-flight tracking or
/// de-duplication. The server is assumed idempotent, and the next scan
/// re-requests any coordinate whose response was lost.
pub struct RemoteFetchSource {
    requests: Sender<ChunkRequest>,
    poll_interval: Duration,
}

impl RemoteFetchSource {
    /// Default pause between scan passes; network round trips dominate,
    /// so cheap polling suffices.
    pub const DEFAULT_POLL: Duration = Duration::from_millis(2000);

    /// Creates a remote source sending requests into the given channel.
    /// The receiving end belongs to the network layer.
    #[must_use]
    pub fn new(requests: Sender<ChunkRequest>) -> Self {
        Self {
            requests,
            poll_interval: Self::DEFAULT_POLL,
        }
    }

    /// Overrides the scan pause.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl StreamingSource for RemoteFetchSource {
    fn try_populate(&self, chunk: &mut Chunk) -> PopulateOutcome {
        let request = ChunkRequest::new(chunk.coord());
        if self.requests.try_send(request).is_err() {
            // Channel full or network layer gone; the next scan retries.
            trace!(coord = ?chunk.coord(), "chunk request dropped");
        }
        PopulateOutcome::Pending
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
