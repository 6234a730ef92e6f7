//! Iteration history of a solver run
//!
//! A [`Traceback`] is filled only when `Options::traceback` is set. It records
//! one [`Snapshot`] per block for the initial state and after every
//! iteration. Nothing in the solvers reads it back.
//!
//! Because every snapshot copies all iterates, recording a long run of a large
//! problem can exhaust memory; keep `max_iter` small when tracing.

use ndarray::Array1;

/// State of one block at one iteration.
#[derive(Clone, Debug)]
pub struct Snapshot<S> {
    /// Iteration index, 0 for the initial state.
    pub it: usize,
    pub x: Array1<S>,
    /// Extrapolation point (PGM/APGM) or one consensus variable per constraint.
    pub z: Vec<Array1<S>>,
    /// Scaled dual variables, one per constraint.
    pub u: Vec<Array1<S>>,
    /// Primal residuals, one per constraint.
    pub r: Vec<Array1<S>>,
    /// Dual residuals, one per constraint.
    pub s: Vec<Array1<S>>,
    /// Primal step size; `None` before the first block sweep.
    pub step_f: Option<S>,
    pub steps_g: Vec<S>,
    /// Nesterov sequence `t` (APGM only).
    pub t: Option<S>,
    /// Momentum factor `gamma` (APGM only).
    pub gamma: Option<S>,
}

impl<S> Snapshot<S> {
    /// Snapshot of a fixed-point iteration: `x`, its extrapolation point and step.
    pub fn fixed_point(it: usize, x: Array1<S>, z: Array1<S>, step_f: S) -> Self {
        Snapshot {
            it,
            x,
            z: vec![z],
            u: Vec::new(),
            r: Vec::new(),
            s: Vec::new(),
            step_f: Some(step_f),
            steps_g: Vec::new(),
            t: None,
            gamma: None,
        }
    }

    pub fn with_momentum(mut self, t: S, gamma: S) -> Self {
        self.t = Some(t);
        self.gamma = Some(gamma);
        self
    }
}

/// Append-only record of solver snapshots, one history per block.
#[derive(Clone, Debug)]
pub struct Traceback<S> {
    blocks: Vec<Vec<Snapshot<S>>>,
}

impl<S> Traceback<S> {
    /// An empty record for `n_blocks` variable blocks.
    pub fn new(n_blocks: usize) -> Self {
        Traceback {
            blocks: (0..n_blocks).map(|_| Vec::new()).collect(),
        }
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Appends `snapshot` to the history of block `j`.
    ///
    /// # Panics
    /// If `j` is not a block of this record.
    pub fn record(&mut self, j: usize, snapshot: Snapshot<S>) {
        self.blocks[j].push(snapshot);
    }

    /// Discards everything recorded so far.
    pub fn reset(&mut self) {
        for history in self.blocks.iter_mut() {
            history.clear();
        }
    }

    /// Number of recorded iterations, the initial state included.
    ///
    /// Blocks skipped by the update order have no history, so this is the
    /// longest history among all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// History of block `j`.
    pub fn block(&self, j: usize) -> &[Snapshot<S>] {
        &self.blocks[j]
    }

    /// History of the first block, i.e. of the only one for single-variable solvers.
    pub fn history(&self) -> &[Snapshot<S>] {
        self.block(0)
    }

    /// Most recent snapshot of block `j`.
    pub fn last(&self, j: usize) -> Option<&Snapshot<S>> {
        self.blocks.get(j).and_then(|history| history.last())
    }
}
