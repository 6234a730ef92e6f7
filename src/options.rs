//! Solver configuration and results.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, NdFloat};

use crate::error::ProxError;
use crate::mm::OneOrMany;
use crate::traceback::Traceback;

/// Default over-relaxation of [`pgm`](crate::prox::pgm).
pub const DEFAULT_RELAX: f64 = 1.49;

/// Stopping criteria shared by all solvers.
#[derive(Clone, Debug)]
pub struct Options<S> {
    /// Relative error threshold.
    pub e_rel: S,
    /// Absolute error threshold, used by the multiplier methods only.
    pub e_abs: S,
    /// Maximum number of iterations, irrespective of residual error.
    pub max_iter: usize,
    /// Whether to keep a [`Traceback`] of all optimization variables.
    pub traceback: bool,
}

impl<S: NdFloat> Default for Options<S> {
    fn default() -> Self {
        Options {
            e_rel: S::from(1e-6).unwrap(),
            e_abs: S::zero(),
            max_iter: 1000,
            traceback: false,
        }
    }
}

/// Stopping criteria of [`bsdmm`](crate::mm::bsdmm), with tolerances given
/// for all blocks at once or one per block.
#[derive(Clone, Debug)]
pub struct BlockOptions<S> {
    pub e_rel: OneOrMany<S>,
    pub e_abs: OneOrMany<S>,
    pub max_iter: usize,
    pub traceback: bool,
}

impl<S: NdFloat> Default for BlockOptions<S> {
    fn default() -> Self {
        BlockOptions::from(&Options::default())
    }
}

impl<S: Copy> From<&Options<S>> for BlockOptions<S> {
    fn from(opts: &Options<S>) -> Self {
        BlockOptions {
            e_rel: OneOrMany::Single(opts.e_rel),
            e_abs: OneOrMany::Single(opts.e_abs),
            max_iter: opts.max_iter,
            traceback: opts.traceback,
        }
    }
}

/// Order in which BSDMM visits its blocks within one sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sweep {
    /// Gauss–Seidel: block `j` sees the values already updated in this sweep.
    Cascade,
    /// Jacobi: every block is updated against the state at the start of the
    /// sweep, and all updates are committed together.
    Block,
}

impl FromStr for Sweep {
    type Err = ProxError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "cascade" => Ok(Sweep::Cascade),
            "block" => Ok(Sweep::Block),
            _ => Err(ProxError::UnknownStrategy {
                kind: "sweep",
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sweep::Cascade => write!(f, "cascade"),
            Sweep::Block => write!(f, "block"),
        }
    }
}

/// How BSDMM constraint step sizes follow their block's primal step size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepCoupling {
    /// Re-derive every constraint step from the primal step each iteration.
    StepsF,
    /// Keep the supplied constraint steps unchanged.
    Fixed,
    /// Rescale the supplied constraint steps by the change of the primal step.
    Relative,
}

impl FromStr for StepCoupling {
    type Err = ProxError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "steps_f" => Ok(StepCoupling::StepsF),
            "fixed" => Ok(StepCoupling::Fixed),
            "relative" => Ok(StepCoupling::Relative),
            _ => Err(ProxError::UnknownStrategy {
                kind: "step coupling",
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for StepCoupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepCoupling::StepsF => write!(f, "steps_f"),
            StepCoupling::Fixed => write!(f, "fixed"),
            StepCoupling::Relative => write!(f, "relative"),
        }
    }
}

/// Block orchestration for [`bsdmm`](crate::mm::bsdmm).
#[derive(Clone, Debug)]
pub struct BlockStrategy {
    pub sweep: Sweep,
    /// Blocks to update, in order. `None` updates all blocks in index order.
    /// Blocks left out are never updated and do not count towards convergence.
    pub order: Option<Vec<usize>>,
    pub coupling: StepCoupling,
}

impl Default for BlockStrategy {
    fn default() -> Self {
        BlockStrategy {
            sweep: Sweep::Cascade,
            order: None,
            coupling: StepCoupling::StepsF,
        }
    }
}

/// Outcome of a single-variable solver.
#[derive(Clone, Debug)]
pub struct Solution<S> {
    /// Last iterate.
    pub x: Array1<S>,
    /// Iterations since the last restart.
    pub iterations: usize,
    /// `false` if the iteration budget ran out first.
    pub converged: bool,
    /// Number of stagnation restarts.
    pub restarts: usize,
    /// Primal step size in effect at the end of the run.
    pub step_f: S,
    /// Constraint step sizes in effect at the end of the run.
    pub steps_g: Vec<S>,
    pub traceback: Option<Traceback<S>>,
}

/// Outcome of [`bsdmm`](crate::mm::bsdmm).
#[derive(Clone, Debug)]
pub struct BlockSolution<S> {
    pub xs: Vec<Array1<S>>,
    pub iterations: usize,
    pub converged: bool,
    /// Last primal step size of every block, `None` for blocks never updated.
    pub steps_f: Vec<Option<S>>,
    pub steps_g: Vec<Vec<S>>,
    pub traceback: Option<Traceback<S>>,
}
