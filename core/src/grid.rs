//! Automaton grid geometry and ping-pong buffer roles
//!
//! The two grid buffers never move. Which one is "current" is a role index
//! that toggles once per completed tick, so backends can keep a fixed
//! `[buffer; 2]` arena and pre-built bindings for both directions.

/// Identity of one buffer in a ping-pong pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    A,
    B,
}

impl BufferSlot {
    /// Position of this slot in a `[T; 2]` arena.
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// The other half of the pair.
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Role index over a fixed pair of buffers.
///
/// Exactly one slot is current (readable); the other is the write target of
/// the in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    current: BufferSlot,
}

impl Default for PingPong {
    fn default() -> Self {
        Self::new()
    }
}

impl PingPong {
    /// Start with `A` as the current buffer.
    pub const fn new() -> Self {
        Self {
            current: BufferSlot::A,
        }
    }

    pub fn current(&self) -> BufferSlot {
        self.current
    }

    pub fn next(&self) -> BufferSlot {
        self.current.other()
    }

    /// Swap roles: the buffer just written becomes current.
    pub fn toggle(&mut self) {
        self.current = self.current.other();
    }
}

/// Borrow one buffer of a pair for reading and the other for writing.
///
/// Panics if `read == write`; callers always derive the two slots from a
/// [`PingPong`] or from a reduction step, which never alias.
pub fn split_pair<T>(pair: &mut [T; 2], read: BufferSlot, write: BufferSlot) -> (&T, &mut T) {
    assert_ne!(read, write, "ping-pong read and write slots alias");
    let [a, b] = pair;
    match read {
        BufferSlot::A => (&*a, b),
        BufferSlot::B => (&*b, a),
    }
}

/// Dimensions of the automaton grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
    pub layers: usize,
}

impl GridShape {
    /// Square grid of `n x n` cells with `m` layers.
    pub const fn square(n: usize, m: usize) -> Self {
        Self {
            width: n,
            height: n,
            layers: m,
        }
    }

    /// Cells per layer.
    pub const fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Scalar values in one grid buffer.
    pub const fn len(&self) -> usize {
        self.cells() * self.layers
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear index of `(x, y, layer)`; layers are stored as contiguous planes.
    pub const fn index(&self, x: usize, y: usize, layer: usize) -> usize {
        (layer * self.height + y) * self.width + x
    }

    /// Byte length of the RGBA8 visualization texture.
    pub const fn texture_len(&self) -> usize {
        self.cells() * 4
    }
}

/// Host-side view of the grid pair: its shape and which buffer is current.
#[derive(Debug, Clone)]
pub struct GridState {
    shape: GridShape,
    roles: PingPong,
    completed_ticks: u64,
}

impl GridState {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            roles: PingPong::new(),
            completed_ticks: 0,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Buffer holding the latest completed state.
    pub fn current(&self) -> BufferSlot {
        self.roles.current()
    }

    /// Write target for the in-flight tick.
    pub fn next(&self) -> BufferSlot {
        self.roles.next()
    }

    /// Mark the in-flight tick as fully published and swap roles.
    pub fn complete_tick(&mut self) {
        self.roles.toggle();
        self.completed_ticks += 1;
    }

    pub fn completed_ticks(&self) -> u64 {
        self.completed_ticks
    }
}
