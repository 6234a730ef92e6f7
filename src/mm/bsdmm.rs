//! Block-Simultaneous Direction Method of Multipliers

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;
use tracing::{debug, debug_span, info, warn};

use super::constraint::{step_g, Constraint, Constraints};
use super::update::{check_convergence, update_variables, Multipliers, Residuals};
use crate::error::{ProxError, Result};
use crate::options::{BlockOptions, BlockSolution, BlockStrategy, StepCoupling, Sweep};
use crate::traceback::{Snapshot, Traceback};

/// Multiplier state and step sizes of one variable block.
struct Block<'a, S> {
    mult: Multipliers<S>,
    constraints: Vec<Constraint<'a, S>>,
    coupling: StepCoupling,
    /// Last primal step size; `None` until the block is first updated.
    step_f: Option<S>,
}

impl<'a, S> Block<'a, S>
where
    S: NdFloat + Scalar,
{
    /// Resolves the constraints of block `j` and settles its coupling policy.
    fn init(
        j: usize,
        x0: &Array1<S>,
        constraints: Option<Constraints<'a, S>>,
        coupling: StepCoupling,
    ) -> Result<Self> {
        let mut coupling = coupling;
        let constraints = match constraints {
            None => Vec::new(),
            Some(constraints) => {
                let supplied = constraints.has_steps();
                match coupling {
                    StepCoupling::StepsF if supplied => {
                        warn!(block = j, "steps_g are recomputed from steps_f, ignoring the supplied ones");
                    }
                    StepCoupling::Fixed | StepCoupling::Relative if !supplied => {
                        warn!(block = j, %coupling, "no steps_g supplied, falling back to steps_f coupling");
                        coupling = StepCoupling::StepsF;
                    }
                    _ => {}
                }
                constraints
                    .resolve(x0.len())?
                    .into_iter()
                    .map(|(prox, op, step)| Constraint {
                        prox,
                        op,
                        // steps_f coupling sets it on the first visit
                        step: step.unwrap_or_else(S::zero),
                    })
                    .collect()
            }
        };
        let mult = Multipliers::init(x0, &constraints);
        Ok(Block {
            mult,
            constraints,
            coupling,
            step_f: None,
        })
    }

    /// Adapts the constraint steps to a new primal step size.
    fn couple(&mut self, step_f: S, n_blocks: usize) {
        let m = self.constraints.len();
        match self.coupling {
            StepCoupling::StepsF => {
                for c in self.constraints.iter_mut() {
                    c.step = step_g(step_f, c.op.spectral_norm(), n_blocks, m);
                }
            }
            StepCoupling::Relative => {
                if let Some(previous) = self.step_f {
                    let ratio = step_f / previous;
                    for c in self.constraints.iter_mut() {
                        c.step = c.step * ratio;
                    }
                }
            }
            StepCoupling::Fixed => {}
        }
        self.step_f = Some(step_f);
    }

    /// Constraint steps in effect, empty while steps_f coupling has not set them.
    fn steps_g(&self) -> Vec<S> {
        match (self.coupling, self.step_f) {
            (StepCoupling::StepsF, None) => Vec::new(),
            _ => self.constraints.iter().map(|c| c.step).collect(),
        }
    }

    fn snapshot(&self, it: usize, x: &Array1<S>, residuals: Option<&Residuals<S>>) -> Snapshot<S> {
        let (r, s) = match residuals {
            Some(res) => (res.r.clone(), res.s.clone()),
            None => (
                self.mult.z.iter().map(|zi| Array1::zeros(zi.raw_dim())).collect(),
                self.constraints.iter().map(|_| Array1::zeros(x.raw_dim())).collect(),
            ),
        };
        Snapshot {
            it,
            x: x.clone(),
            z: self.mult.z.clone(),
            u: self.mult.u.clone(),
            r,
            s,
            step_f: self.step_f,
            steps_g: self.steps_g(),
            t: None,
            gamma: None,
        }
    }
}

/// Block-Simultaneous Direction Method of Multipliers
///
/// Minimizes $`f(x_1, \ldots, x_N) + \sum_j \sum_i g_{ji}(L_{ji} x_j)`$ by
/// sweeping over the blocks and performing one SDMM update of every visited
/// block per iteration (Moolekamp & Melchior 2018, Algorithm 3).
///
/// Parameters
/// ----------
/// - __x0s:__         initial guess of every block
/// - __prox_f:__      `prox_f(point, step, j, xs)`, proximal operator of $`f`$
///                    with respect to block `j`, given the current blocks `xs`
/// - __steps_f:__     `steps_f(j, xs)`, primal step size of block `j`,
///                    queried whenever the block is about to be updated
/// - __constraints:__ constraints of every block, `None` for an
///                    unconstrained block; an empty list leaves all blocks unconstrained
/// - __strategy:__    sweep, update order and step coupling, see [`BlockStrategy`]
/// - __opts:__        stopping criteria; `e_rel` and `e_abs` may be given per
///                    block, see [`BlockOptions`]
///
/// Both callbacks see the same blocks: under [`Sweep::Cascade`] the values
/// already updated in the current sweep, under [`Sweep::Block`] the state at
/// the start of the sweep.
///
/// Step coupling
/// -------------
/// - `StepsF` recomputes every constraint step from the new primal step,
///   [`step_g`](super::step_g)`(step_f, ||L||, N, M_j)`. Supplied steps are ignored.
/// - `Fixed` keeps the supplied constraint steps.
/// - `Relative` scales the supplied constraint steps by the ratio of the new
///   to the previous primal step size of the block.
///
/// A block without supplied steps always uses `StepsF`.
///
/// The run has converged when every block updated in a sweep passes
/// [`check_convergence`](super::check_convergence). Unlike [`admm`](super::admm)
/// and [`sdmm`](super::sdmm) there are no stagnation restarts.
pub fn bsdmm<'a, S, F, G>(
    x0s: &[Array1<S>],
    prox_f: F,
    steps_f: G,
    constraints: Vec<Option<Constraints<'a, S>>>,
    strategy: &BlockStrategy,
    opts: &BlockOptions<S>,
) -> Result<BlockSolution<S>>
where
    S: NdFloat + Scalar,
    F: Fn(ArrayView1<S>, S, usize, &[Array1<S>]) -> Array1<S>,
    G: Fn(usize, &[Array1<S>]) -> S,
{
    let n_blocks = x0s.len();
    if n_blocks == 0 {
        return Err(ProxError::Empty("blocks"));
    }
    let order: Vec<usize> = match &strategy.order {
        None => (0..n_blocks).collect(),
        Some(order) => order.clone(),
    };
    if order.is_empty() {
        return Err(ProxError::Empty("update order"));
    }
    if let Some(&index) = order.iter().find(|&&j| j >= n_blocks) {
        return Err(ProxError::BlockOutOfRange {
            index,
            blocks: n_blocks,
        });
    }
    let constraints = if constraints.is_empty() {
        (0..n_blocks).map(|_| None).collect()
    } else if constraints.len() == n_blocks {
        constraints
    } else {
        return Err(ProxError::LengthMismatch {
            what: "constraints",
            expected: n_blocks,
            found: constraints.len(),
        });
    };
    let e_rel = opts.e_rel.clone().broadcast(n_blocks, "e_rel")?;
    let e_abs = opts.e_abs.clone().broadcast(n_blocks, "e_abs")?;

    let span = debug_span!(
        "bsdmm",
        blocks = n_blocks,
        sweep = %strategy.sweep,
        coupling = %strategy.coupling
    );
    let _enter = span.enter();

    let mut blocks = x0s
        .iter()
        .zip(constraints)
        .enumerate()
        .map(|(j, (x0, c))| Block::init(j, x0, c, strategy.coupling))
        .collect::<Result<Vec<_>>>()?;
    let mut xs = x0s.to_vec();

    let mut traceback = if opts.traceback {
        let mut tr = Traceback::new(n_blocks);
        for (j, block) in blocks.iter().enumerate() {
            tr.record(j, block.snapshot(0, &xs[j], None));
        }
        Some(tr)
    } else {
        None
    };

    let mut it = 0;
    let mut converged = false;
    while it < opts.max_iter {
        let frozen = match strategy.sweep {
            Sweep::Block => Some(xs.clone()),
            Sweep::Cascade => None,
        };
        let mut pending = Vec::new();
        let mut snapshots: Vec<Option<Snapshot<S>>> = (0..n_blocks).map(|_| None).collect();
        let mut all_converged = true;

        for &j in order.iter() {
            let view: &[Array1<S>] = frozen.as_deref().unwrap_or(&xs);
            let step = steps_f(j, view);
            let block = &mut blocks[j];
            block.couple(step, n_blocks);

            let mut x = view[j].clone();
            let residuals = update_variables(
                &mut x,
                &mut block.mult,
                |v, s| prox_f(v, s, j, view),
                step,
                &block.constraints,
            );
            let (done, errors) = check_convergence(
                &x,
                &block.mult,
                &residuals,
                &block.constraints,
                e_rel[j],
                e_abs[j],
            );
            debug!(it, block = j, step_f = %step, ?errors, "residuals");
            all_converged &= done;

            if traceback.is_some() {
                snapshots[j] = Some(block.snapshot(it + 1, &x, Some(&residuals)));
            }
            match strategy.sweep {
                Sweep::Cascade => xs[j] = x,
                Sweep::Block => pending.push((j, x)),
            }
        }
        for (j, x) in pending {
            xs[j] = x;
        }
        if let Some(tr) = traceback.as_mut() {
            for (j, snapshot) in snapshots.into_iter().enumerate() {
                if let Some(snapshot) = snapshot {
                    tr.record(j, snapshot);
                }
            }
        }

        if all_converged {
            converged = true;
            break;
        }
        it += 1;
    }

    let iterations = if converged { it + 1 } else { it };
    if !converged {
        warn!(iterations, "solution did not converge");
    }
    info!(iterations, "completed");

    Ok(BlockSolution {
        xs,
        iterations,
        converged,
        steps_f: blocks.iter().map(|b| b.step_f).collect(),
        steps_g: blocks.iter().map(Block::steps_g).collect(),
        traceback,
    })
}
