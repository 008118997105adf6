//! Pairwise reduction of per-group partial audio
//!
//! `render_audio` leaves `cells / reduction_factor` partial chunks in the
//! first scratch buffer. The tree halves that count each step, alternating
//! between the two scratch buffers, until one chunk remains. The plan is
//! fixed by the configuration and built once.

use tracing::trace;

use crate::error::KernelError;
use crate::grid::{BufferSlot, PingPong};
use crate::kernels::ComputeKernelSet;

/// Elements combined per reduction step.
pub const REDUCTION_FANOUT: usize = 2;

/// One `reduce` dispatch of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionStep {
    pub input: BufferSlot,
    pub output: BufferSlot,
    /// Elements (chunks of partial audio) read by this step.
    pub element_count: usize,
    pub factor: usize,
}

/// Precomputed reduction plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionTree {
    input: BufferSlot,
    result: BufferSlot,
    steps: Vec<ReductionStep>,
}

impl ReductionTree {
    /// Plan the reduction of `groups` elements, starting in scratch slot A.
    ///
    /// `groups` must be a power of two; a single group needs no steps.
    pub fn new(groups: usize) -> Self {
        debug_assert!(groups.is_power_of_two());
        let mut roles = PingPong::new();
        let input = roles.current();
        let mut steps = Vec::with_capacity(groups.trailing_zeros() as usize);
        let mut count = groups;

        while count > 1 {
            steps.push(ReductionStep {
                input: roles.current(),
                output: roles.next(),
                element_count: count,
                factor: REDUCTION_FANOUT,
            });
            roles.toggle();
            count /= REDUCTION_FANOUT;
        }

        Self {
            input,
            result: roles.current(),
            steps,
        }
    }

    /// Scratch slot `render_audio` must write.
    pub fn input_slot(&self) -> BufferSlot {
        self.input
    }

    /// Scratch slot holding the final chunk after [`run`](Self::run).
    pub fn result_slot(&self) -> BufferSlot {
        self.result
    }

    pub fn steps(&self) -> &[ReductionStep] {
        &self.steps
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Element count left after the last step.
    pub fn final_count(&self) -> usize {
        self.steps
            .last()
            .map_or(1, |step| step.element_count / step.factor)
    }

    /// Dispatch every step in order.
    pub fn run(&self, kernels: &mut dyn ComputeKernelSet) -> Result<(), KernelError> {
        for step in &self.steps {
            trace!(
                "reduce {:?}->{:?}: {} elements",
                step.input, step.output, step.element_count
            );
            kernels.reduce(step.input, step.output, step.element_count, step.factor)?;
        }
        Ok(())
    }
}
