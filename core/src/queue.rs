//! Bounded FIFO of synthesized audio chunks
//!
//! The bound is a playback duration rather than a chunk count: the queue
//! never holds more than [`MAX_BUFFERED_SECONDS`] of audio. A full queue
//! hands the chunk back instead of dropping anything.

use std::collections::VecDeque;

/// Ceiling on buffered playback time, in seconds.
pub const MAX_BUFFERED_SECONDS: f64 = 0.5;

/// One tick worth of mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Tick number that produced this chunk, starting at 0.
    pub sequence: u64,
    /// Synthesis time of the first sample, in seconds.
    pub start_time: f64,
    pub samples: Vec<f32>,
}

impl AudioChunk {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// FIFO of equally sized chunks, bounded by buffered duration.
#[derive(Debug)]
pub struct AudioChunkQueue {
    chunks: VecDeque<AudioChunk>,
    samples_per_chunk: usize,
    sample_rate: u32,
}

impl AudioChunkQueue {
    pub fn new(samples_per_chunk: usize, sample_rate: u32) -> Self {
        Self {
            chunks: VecDeque::new(),
            samples_per_chunk,
            sample_rate,
        }
    }

    fn seconds_per(samples_per_chunk: usize, sample_rate: u32) -> f64 {
        samples_per_chunk as f64 / sample_rate as f64
    }

    /// Playback duration of a single chunk.
    pub fn chunk_seconds(&self) -> f64 {
        Self::seconds_per(self.samples_per_chunk, self.sample_rate)
    }

    pub fn samples_per_chunk(&self) -> usize {
        self.samples_per_chunk
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Playback time currently queued.
    pub fn buffered_seconds(&self) -> f64 {
        self.chunks.len() as f64 * self.chunk_seconds()
    }

    /// True if one more chunk fits without exceeding the ceiling.
    pub fn has_room(&self) -> bool {
        let after = (self.chunks.len() + 1) as f64 * self.chunk_seconds();
        after <= MAX_BUFFERED_SECONDS
    }

    /// Append `chunk` at the back, or hand it back if the queue is full.
    pub fn try_enqueue(&mut self, chunk: AudioChunk) -> Result<(), AudioChunk> {
        if !self.has_room() {
            return Err(chunk);
        }
        self.chunks.push_back(chunk);
        Ok(())
    }

    /// Remove the oldest chunk.
    pub fn dequeue(&mut self) -> Option<AudioChunk> {
        self.chunks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(sequence: u64, len: usize) -> AudioChunk {
        AudioChunk {
            sequence,
            start_time: sequence as f64,
            samples: vec![sequence as f32; len],
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = AudioChunkQueue::new(64, 48_000);
        for seq in 0..5 {
            queue.try_enqueue(chunk(seq, 64)).unwrap();
        }
        let order: Vec<u64> = std::iter::from_fn(|| queue.dequeue())
            .map(|c| c.sequence)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_rejects_past_ceiling_and_returns_chunk() {
        // 4096 samples at 32768 Hz = 0.125 s; four chunks fill 0.5 s exactly
        let mut queue = AudioChunkQueue::new(4096, 32_768);
        for seq in 0..4 {
            assert!(queue.has_room());
            queue.try_enqueue(chunk(seq, 4096)).unwrap();
        }
        assert_eq!(queue.buffered_seconds(), 0.5);
        assert!(!queue.has_room());

        let rejected = queue.try_enqueue(chunk(4, 4096)).unwrap_err();
        assert_eq!(rejected.sequence, 4);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_ceiling_holds_for_non_dividing_rates() {
        let mut queue = AudioChunkQueue::new(1024, 44_100);
        let mut seq = 0;
        while queue.try_enqueue(chunk(seq, 1024)).is_ok() {
            assert!(queue.buffered_seconds() <= MAX_BUFFERED_SECONDS);
            seq += 1;
        }
        assert_eq!(queue.len(), 21);
    }

    #[test]
    fn test_tiny_chunks_do_not_preallocate() {
        // Two billion one-sample chunks would fit under the ceiling
        let mut queue = AudioChunkQueue::new(1, 4_000_000_000);
        assert!(queue.is_empty());
        queue.try_enqueue(chunk(0, 1)).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.has_room());
    }

    #[test]
    fn test_dequeue_frees_room() {
        let mut queue = AudioChunkQueue::new(8192, 16_384);
        queue.try_enqueue(chunk(0, 8192)).unwrap();
        assert!(!queue.has_room());
        queue.dequeue();
        assert!(queue.has_room());
        assert!(queue.is_empty());
    }
}
