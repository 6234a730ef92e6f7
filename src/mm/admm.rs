//! Linearized Alternating Direction Method of Multipliers

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;
use tracing::{debug, debug_span, info, warn};

use super::constraint::{resolve_with_defaults, Constraint, Constraints, OneOrMany, ProxFn};
use super::update::{check_convergence, update_variables, Multipliers, Residuals};
use crate::error::{check_step, Result};
use crate::linop::Operator;
use crate::options::{Options, Solution};
use crate::traceback::{Snapshot, Traceback};

/// Alternating Direction Method of Multipliers
///
/// Minimizes $`f(x) + g(Lx)`$ with the linearized ADMM of Parikh & Boyd
/// (2014); see Moolekamp & Melchior (2018), Algorithm 1.
///
/// Parameters
/// ----------
/// - __x0:__      initial guess
/// - __prox_f:__  proxed function f
/// - __step_f:__  step size for `prox_f`
/// - __prox_g:__  proxed function g; without it the method is a plain fixed-point iteration of `prox_f`
/// - __step_g:__  step size for `prox_g` (experts only!), by default
///                [`step_g`](super::step_g)`(step_f, ||L||, 1, 1)`
/// - __op:__      linear operator L, identity if `None`
/// - __opts:__    stopping criteria, see [`check_convergence`](super::check_convergence)
///
/// Restarts
/// --------
/// If, from the second iteration on, both `x` and the primal residual are
/// exactly those of the previous iteration, the step sizes are too large for
/// the method to make progress. `step_f` and `step_g` are then halved and the
/// run starts over from `x0`, with a fresh iteration count and traceback.
pub fn admm<'a, S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    step_f: S,
    prox_g: Option<ProxFn<'a, S>>,
    step_g: Option<S>,
    op: Option<Operator<S>>,
    opts: &Options<S>,
) -> Result<Solution<S>>
where
    S: NdFloat + Scalar,
{
    check_step("step_f", step_f)?;
    let constraints = match prox_g {
        None => Vec::new(),
        Some(prox) => {
            let constraints = Constraints {
                proxs: OneOrMany::Single(prox),
                steps: step_g.map(OneOrMany::Single),
                ops: op.map(OneOrMany::Single),
            };
            resolve_with_defaults(constraints, x0.len(), step_f, 1)?
        }
    };

    let span = debug_span!("admm", n = x0.len(), step_f = %step_f);
    let _enter = span.enter();
    Ok(run(x0, prox_f, step_f, constraints, opts))
}

/// Previous iterate and primal residuals, for stagnation detection.
struct Previous<S> {
    x: Array1<S>,
    r: Vec<Array1<S>>,
}

/// Everything a restart throws away.
struct IterState<S> {
    x: Array1<S>,
    mult: Multipliers<S>,
    it: usize,
    previous: Option<Previous<S>>,
}

impl<S> IterState<S>
where
    S: NdFloat + Scalar,
{
    fn init(x0: ArrayView1<S>, constraints: &[Constraint<S>]) -> Self {
        let x = x0.to_owned();
        let mult = Multipliers::init(&x, constraints);
        IterState {
            x,
            mult,
            it: 0,
            previous: None,
        }
    }

    /// Whether `x` and every primal residual repeat the previous iteration exactly.
    fn stalled(&self, r: &[Array1<S>]) -> bool {
        match &self.previous {
            Some(prev) => prev.x == self.x && prev.r.iter().zip(r).all(|(a, b)| a == b),
            None => false,
        }
    }

    fn snapshot(&self, residuals: Option<&Residuals<S>>, step_f: S, constraints: &[Constraint<S>]) -> Snapshot<S> {
        let (r, s) = match residuals {
            Some(res) => (res.r.clone(), res.s.clone()),
            None => (
                self.mult.z.iter().map(|zi| Array1::zeros(zi.raw_dim())).collect(),
                constraints.iter().map(|_| Array1::zeros(self.x.raw_dim())).collect(),
            ),
        };
        Snapshot {
            it: self.it,
            x: self.x.clone(),
            z: self.mult.z.clone(),
            u: self.mult.u.clone(),
            r,
            s,
            step_f: Some(step_f),
            steps_g: constraints.iter().map(|c| c.step).collect(),
            t: None,
            gamma: None,
        }
    }
}

/// Shared iteration of ADMM and SDMM over resolved constraints.
pub(crate) fn run<S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    mut step_f: S,
    mut constraints: Vec<Constraint<S>>,
    opts: &Options<S>,
) -> Solution<S>
where
    S: NdFloat + Scalar,
{
    let mut state = IterState::init(x0, &constraints);
    let mut traceback = if opts.traceback {
        let mut tr = Traceback::new(1);
        tr.record(0, state.snapshot(None, step_f, &constraints));
        Some(tr)
    } else {
        None
    };

    let mut restarts = 0;
    let mut converged = false;
    while state.it < opts.max_iter {
        let residuals = update_variables(&mut state.x, &mut state.mult, &prox_f, step_f, &constraints);

        if let Some(tr) = traceback.as_mut() {
            let mut snapshot = state.snapshot(Some(&residuals), step_f, &constraints);
            snapshot.it += 1;
            tr.record(0, snapshot);
        }

        let (done, errors) = check_convergence(
            &state.x,
            &state.mult,
            &residuals,
            &constraints,
            opts.e_rel,
            opts.e_abs,
        );
        debug!(it = state.it, ?errors, "residuals");
        if done {
            converged = true;
            break;
        }

        state.it += 1;

        if constraints.is_empty() {
            continue;
        }
        if state.it > 1 && state.stalled(&residuals.r) {
            step_f = step_f / (S::one() + S::one());
            for c in constraints.iter_mut() {
                c.step = c.step / (S::one() + S::one());
            }
            restarts += 1;
            warn!(step_f = %step_f, restarts, "restarting with halved step sizes");

            state = IterState::init(x0, &constraints);
            if let Some(tr) = traceback.as_mut() {
                tr.reset();
                tr.record(0, state.snapshot(None, step_f, &constraints));
            }
            continue;
        }
        state.previous = Some(Previous {
            x: state.x.clone(),
            r: residuals.r,
        });
    }

    let iterations = if converged { state.it + 1 } else { state.it };
    if !converged {
        warn!(iterations, "solution did not converge");
    }
    info!(iterations, restarts, "completed");

    Solution {
        x: state.x,
        iterations,
        converged,
        restarts,
        step_f,
        steps_g: constraints.iter().map(|c| c.step).collect(),
        traceback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::constraint::prox_fn;
    use approx::assert_abs_diff_eq;

    /// prox of (x - 2)^2
    fn quadratic(v: ArrayView1<f64>, s: f64) -> Array1<f64> {
        (&v + 2. * s * 2.) / (1. + 2. * s)
    }

    /// projection onto x <= 1
    fn clamp_one(v: ArrayView1<f64>, _s: f64) -> Array1<f64> {
        v.mapv(|x| x.min(1.))
    }

    /// Returns 2 regardless of its input while `step > threshold`.
    fn stalls_above(threshold: f64) -> impl Fn(ArrayView1<f64>, f64) -> Array1<f64> {
        move |v, s| {
            if s > threshold {
                array![2.]
            } else {
                quadratic(v, s)
            }
        }
    }

    #[test]
    fn constrained_quadratic() {
        let x0 = array![0.];
        let sol = admm(
            x0.view(),
            quadratic,
            0.4,
            Some(prox_fn(clamp_one)),
            None,
            None,
            &Options::default(),
        )
        .unwrap();
        assert!(sol.converged);
        assert_eq!(sol.restarts, 0);
        assert_eq!(sol.steps_g, vec![0.4]);
        assert_abs_diff_eq!(sol.x[0], 1., epsilon = 1e-5);
    }

    #[test]
    fn operator_sets_default_step() {
        let x0 = array![0.];
        let sol = admm(
            x0.view(),
            quadratic,
            0.4,
            Some(prox_fn(|v: ArrayView1<f64>, _s: f64| v.mapv(|x| x.min(3.)))),
            None,
            Some(Operator::diagonal(array![3.])),
            &Options::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(sol.steps_g[0], 0.4 * 9., epsilon = 1e-12);
        assert!(sol.converged);
        // 3x <= 3
        assert_abs_diff_eq!(sol.x[0], 1., epsilon = 1e-4);
    }

    #[test]
    fn stagnation_halves_steps_and_restarts() {
        let x0 = array![0.];
        let opts = Options {
            traceback: true,
            ..Options::default()
        };
        let sol = admm(
            x0.view(),
            stalls_above(0.3),
            0.4,
            Some(prox_fn(clamp_one)),
            None,
            None,
            &opts,
        )
        .unwrap();
        assert_eq!(sol.restarts, 1);
        assert_eq!(sol.step_f, 0.2);
        assert_eq!(sol.steps_g, vec![0.2]);
        assert!(sol.converged);
        assert_abs_diff_eq!(sol.x[0], 1., epsilon = 1e-5);

        // the traceback only covers the run after the restart
        let tr = sol.traceback.unwrap();
        assert_eq!(tr.len(), sol.iterations + 1);
        assert_eq!(tr.history()[0].it, 0);
        assert_eq!(tr.history()[0].x, x0);
        assert_eq!(tr.history()[0].step_f, Some(0.2));
        assert_eq!(tr.history()[0].steps_g, vec![0.2]);
    }

    #[test]
    fn repeated_stagnation_keeps_halving() {
        let x0 = array![0.];
        let sol = admm(
            x0.view(),
            stalls_above(0.1),
            0.4,
            Some(prox_fn(clamp_one)),
            None,
            None,
            &Options::default(),
        )
        .unwrap();
        assert_eq!(sol.restarts, 2);
        assert_eq!(sol.step_f, 0.1);
        assert!(sol.converged);
    }

    #[test]
    fn unconstrained_admm_never_restarts() {
        let x0 = array![0.];
        let sol = admm(
            x0.view(),
            stalls_above(0.3),
            0.4,
            None,
            None,
            None,
            &Options::default(),
        )
        .unwrap();
        assert!(sol.converged);
        assert_eq!(sol.restarts, 0);
        assert_eq!(sol.x, array![2.]);
        assert!(sol.steps_g.is_empty());
    }

    #[test]
    fn budget_exhaustion_is_not_an_error() {
        let x0 = array![0.];
        let opts = Options {
            max_iter: 3,
            traceback: true,
            ..Options::default()
        };
        let sol = admm(
            x0.view(),
            quadratic,
            0.4,
            Some(prox_fn(clamp_one)),
            None,
            None,
            &opts,
        )
        .unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 3);
        assert_eq!(sol.traceback.unwrap().len(), 4);
    }

    #[test]
    fn rejects_bad_arguments() {
        let x0 = array![0., 0.];
        let bad_op = admm(
            x0.view(),
            quadratic,
            0.4,
            Some(prox_fn(clamp_one)),
            None,
            Some(Operator::dense(array![[1., 1., 1.]])),
            &Options::default(),
        );
        assert!(bad_op.is_err());
        let bad_step = admm(x0.view(), quadratic, 0., None, None, None, &Options::default());
        assert!(bad_step.is_err());
    }
}
