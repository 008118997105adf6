//! Rule tensor, color table and frequency table
//!
//! All three are built once at startup and handed to the compute backend,
//! which treats them as read-only kernel inputs.

use crate::grid::GridShape;

/// Transition weights for the `advance` kernel.
///
/// Layout: `9 * m * m` neighbour weights followed by `m` per-layer biases.
/// The weight of source layer `s` at offset `(dx, dy)` towards target layer
/// `t` lives at `m * m * ((dx + 1) + 3 * (dy + 1)) + m * t + s`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTensor {
    layers: usize,
    weights: Vec<f32>,
}

impl RuleTensor {
    /// All-zero tensor for `layers` layers.
    pub fn zeros(layers: usize) -> Self {
        Self {
            layers,
            weights: vec![0.0; Self::len_for(layers)],
        }
    }

    /// Number of scalars for a tensor over `layers` layers.
    pub const fn len_for(layers: usize) -> usize {
        9 * layers * layers + layers
    }

    /// Index of the neighbour weight for `(dx, dy)` from `source` to `target`.
    pub const fn neighbor_index(
        layers: usize,
        dx: i32,
        dy: i32,
        target: usize,
        source: usize,
    ) -> usize {
        let offset = ((dx + 1) + 3 * (dy + 1)) as usize;
        layers * layers * offset + layers * target + source
    }

    /// Index of the bias term for `layer`.
    pub const fn bias_index(layers: usize, layer: usize) -> usize {
        layers * layers * 9 + layer
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn neighbor(&self, dx: i32, dy: i32, target: usize, source: usize) -> f32 {
        self.weights[Self::neighbor_index(self.layers, dx, dy, target, source)]
    }

    pub fn set_neighbor(&mut self, dx: i32, dy: i32, target: usize, source: usize, weight: f32) {
        self.weights[Self::neighbor_index(self.layers, dx, dy, target, source)] = weight;
    }

    pub fn bias(&self, layer: usize) -> f32 {
        self.weights[Self::bias_index(self.layers, layer)]
    }

    pub fn set_bias(&mut self, layer: usize, bias: f32) {
        self.weights[Self::bias_index(self.layers, layer)] = bias;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

/// Per-layer RGBA colors in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    rgba: Vec<[f32; 4]>,
}

impl ColorTable {
    pub fn new(rgba: Vec<[f32; 4]>) -> Self {
        Self { rgba }
    }

    pub fn layers(&self) -> usize {
        self.rgba.len()
    }

    pub fn color(&self, layer: usize) -> [f32; 4] {
        self.rgba[layer]
    }

    /// Flattened `r, g, b, a` per layer, the layout the kernels bind.
    pub fn as_flat(&self) -> Vec<f32> {
        self.rgba.iter().flatten().copied().collect()
    }
}

/// Per-layer oscillator frequency in Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    hz: Vec<f32>,
}

impl FrequencyTable {
    pub fn new(hz: Vec<f32>) -> Self {
        Self { hz }
    }

    pub fn layers(&self) -> usize {
        self.hz.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.hz
    }

    /// Oscillator phase of every layer at time `t`, in cycles, reduced to `[0, 1)`.
    ///
    /// Computed in `f64` on the host so the kernels only ever add a small
    /// in-tick offset in `f32`, however long the process has been running.
    pub fn phases_at(&self, t: f64) -> Vec<f32> {
        self.hz
            .iter()
            .map(|&hz| (hz as f64 * t).fract() as f32)
            .collect()
    }
}

/// Everything the kernels read but never write.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomatonTables {
    pub rules: RuleTensor,
    pub colors: ColorTable,
    pub frequencies: FrequencyTable,
}

/// Colors cycled across layers by the built-in preset.
const PRESET_COLORS: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
    [0.5, 0.5, 0.5, 1.0],
];

/// Frequency of layer 0 in the built-in preset.
const PRESET_BASE_HZ: f32 = 400.0;

impl AutomatonTables {
    /// The built-in preset.
    ///
    /// Layer 0 drifts towards the lower right. Wherever layer 1 appears in a
    /// neighbourhood it wipes layer 0, and layer 1 dots form where enough
    /// layer 0 accumulates (neighbourhood sum above 0.8), then persist.
    /// Only layer 0 is audible. Rules involving layer 1 are skipped for
    /// single-layer grids.
    pub fn preset(layers: usize) -> Self {
        let mut rules = RuleTensor::zeros(layers);

        if layers >= 1 {
            rules.set_neighbor(0, -1, 0, 0, 0.000_01);
            rules.set_neighbor(-1, 0, 0, 0, 0.000_04);
            rules.set_neighbor(0, 0, 0, 0, 1.0);
        }

        if layers >= 2 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    rules.set_neighbor(dx, dy, 0, 1, -10.0);
                    rules.set_neighbor(dx, dy, 1, 0, 0.1);
                }
            }
            rules.set_neighbor(0, 0, 1, 1, 100.0);
            rules.set_bias(1, -0.8);
        }

        let colors = ColorTable::new(
            (0..layers)
                .map(|layer| PRESET_COLORS[layer % PRESET_COLORS.len()])
                .collect(),
        );

        let mut hz = vec![0.0; layers];
        if let Some(first) = hz.first_mut() {
            *first = PRESET_BASE_HZ;
        }

        Self {
            rules,
            colors,
            frequencies: FrequencyTable::new(hz),
        }
    }

    pub fn layers(&self) -> usize {
        self.rules.layers()
    }
}

/// Initial grid contents: a single active cell at `(0, 0)` on layer 0.
pub fn seed_state(shape: GridShape) -> Vec<f32> {
    let mut state = vec![0.0; shape.len()];
    if let Some(first) = state.first_mut() {
        *first = 1.0;
    }
    state
}
