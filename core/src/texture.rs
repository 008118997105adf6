//! Single-slot holder for the latest visualization frame

/// Latest RGBA8 frame plus a generation counter.
///
/// Lives inside the shared exchange, so every access is already serialized;
/// the slot itself only guards against length changes.
#[derive(Debug)]
pub struct TextureSlot {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    generation: u64,
}

impl TextureSlot {
    /// Blank (all zero) slot for a `width x height` frame.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
            generation: 0,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Number of frames published so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Overwrite the slot. `pixels` must already have the slot's length.
    pub(crate) fn publish(&mut self, pixels: &[u8]) {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        self.pixels.copy_from_slice(pixels);
        self.generation += 1;
    }

    /// Copy the frame into `out` if it is newer than `since`.
    ///
    /// Returns the slot's generation when a copy happened.
    pub fn read_into(&self, out: &mut Vec<u8>, since: u64) -> Option<u64> {
        if self.generation == since {
            return None;
        }
        out.clear();
        out.extend_from_slice(&self.pixels);
        Some(self.generation)
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.pixels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_blank() {
        let slot = TextureSlot::new(4, 2);
        assert_eq!(slot.byte_len(), 32);
        assert_eq!(slot.generation(), 0);
        assert!(slot.snapshot().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_skips_unchanged_frame() {
        let mut slot = TextureSlot::new(2, 2);
        let mut out = Vec::new();
        assert_eq!(slot.read_into(&mut out, 0), None);

        slot.publish(&[7; 16]);
        assert_eq!(slot.read_into(&mut out, 0), Some(1));
        assert_eq!(out, vec![7; 16]);
        assert_eq!(slot.read_into(&mut out, 1), None);
    }
}
