//! Lock-guarded hand-off point between the driver and both consumers
//!
//! The audio queue and the texture slot sit behind one mutex. A tick's
//! texture publication and chunk enqueue form a single critical section,
//! mutually exclusive with audio dequeue and texture reads.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::PublishError;
use crate::queue::{AudioChunk, AudioChunkQueue};
use crate::texture::TextureSlot;

#[derive(Debug)]
struct Exchange {
    queue: AudioChunkQueue,
    texture: TextureSlot,
}

/// Cloneable handle to the shared queue and texture slot.
#[derive(Debug, Clone)]
pub struct SharedExchange {
    inner: Arc<Mutex<Exchange>>,
}

impl SharedExchange {
    pub fn new(queue: AudioChunkQueue, texture: TextureSlot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Exchange { queue, texture })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Exchange> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("Exchange mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Whether the queue can accept one more chunk right now.
    pub fn has_audio_room(&self) -> bool {
        self.lock().queue.has_room()
    }

    /// Publish one tick: overwrite the texture and enqueue the chunk.
    ///
    /// All-or-nothing. On error neither the slot nor the queue changed, and
    /// a rejected chunk is handed back inside [`PublishError::QueueFull`].
    pub fn publish(&self, pixels: &[u8], chunk: AudioChunk) -> Result<(), PublishError> {
        let mut exchange = self.lock();
        let Exchange { queue, texture } = &mut *exchange;

        if pixels.len() != texture.byte_len() {
            return Err(PublishError::TextureLength {
                expected: texture.byte_len(),
                actual: pixels.len(),
            });
        }
        if chunk.len() != queue.samples_per_chunk() {
            return Err(PublishError::ChunkLength {
                expected: queue.samples_per_chunk(),
                actual: chunk.len(),
            });
        }

        let buffered_seconds = queue.buffered_seconds();
        queue
            .try_enqueue(chunk)
            .map_err(|chunk| PublishError::QueueFull {
                chunk,
                buffered_seconds,
            })?;
        texture.publish(pixels);
        Ok(())
    }

    /// Take the oldest queued chunk.
    pub fn dequeue_audio(&self) -> Option<AudioChunk> {
        self.lock().queue.dequeue()
    }

    /// Copy the latest frame into `out` if its generation differs from `since`.
    pub fn read_texture(&self, out: &mut Vec<u8>, since: u64) -> Option<u64> {
        self.lock().texture.read_into(out, since)
    }

    pub fn texture_dimensions(&self) -> (usize, usize) {
        self.lock().texture.dimensions()
    }

    /// Chunks queued and their playback duration.
    pub fn queue_depth(&self) -> (usize, f64) {
        let exchange = self.lock();
        (exchange.queue.len(), exchange.queue.buffered_seconds())
    }
}
