//! Simultaneous Direction Method of Multipliers

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;
use tracing::debug_span;

use super::admm::{admm, run};
use super::constraint::{resolve_with_defaults, Constraints, OneOrMany};
use crate::error::{check_step, Result};
use crate::options::{Options, Solution};

/// Simultaneous Direction Method of Multipliers
///
/// Minimizes $`f(x) + \sum_i g_i(L_i x)`$ by running one linearized ADMM
/// update per constraint against the same primal variable
/// (Moolekamp & Melchior 2018, Algorithm 2).
///
/// A single (non-list) proximal operator makes this exactly [`admm`], and so
/// does `None`, which leaves only `prox_f`. Missing constraint steps default
/// to [`step_g`](super::step_g)`(step_f, ||L_i||, 1, M)` with `M` constraints.
///
/// Stagnation restarts behave as in [`admm`], halving `step_f` and every
/// constraint step together.
pub fn sdmm<'a, S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    step_f: S,
    constraints: Option<Constraints<'a, S>>,
    opts: &Options<S>,
) -> Result<Solution<S>>
where
    S: NdFloat + Scalar,
{
    let constraints = match constraints {
        None => return admm(x0, prox_f, step_f, None, None, None, opts),
        Some(c) => c,
    };
    if let OneOrMany::Single(prox) = constraints.proxs {
        let step_g = constraints
            .steps
            .map(|steps| steps.into_single("steps_g"))
            .transpose()?;
        let op = constraints
            .ops
            .map(|ops| ops.into_single("operators"))
            .transpose()?;
        return admm(x0, prox_f, step_f, Some(prox), step_g, op, opts);
    }

    check_step("step_f", step_f)?;
    let constraints = resolve_with_defaults(constraints, x0.len(), step_f, 1)?;
    let span = debug_span!("sdmm", n = x0.len(), m = constraints.len(), step_f = %step_f);
    let _enter = span.enter();
    Ok(run(x0, prox_f, step_f, constraints, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxError;
    use crate::linop::Operator;
    use crate::mm::constraint::prox_fn;
    use approx::assert_abs_diff_eq;

    /// prox of 0.5 ||x - a||^2 with a = (2, -1)
    fn shifted(v: ArrayView1<f64>, s: f64) -> Array1<f64> {
        (&v + &(array![2., -1.] * s)) / (1. + s)
    }

    fn nonneg(v: ArrayView1<f64>, _s: f64) -> Array1<f64> {
        v.mapv(|x| x.max(0.))
    }

    fn at_most_one(v: ArrayView1<f64>, _s: f64) -> Array1<f64> {
        v.mapv(|x| x.min(1.))
    }

    /// Stuck at (0.5, 0.5) while `step > threshold`.
    fn stuck_above(threshold: f64) -> impl Fn(ArrayView1<f64>, f64) -> Array1<f64> {
        move |v, s| {
            if s > threshold {
                array![0.5, 0.5]
            } else {
                shifted(v, s)
            }
        }
    }

    fn two_constraints() -> Constraints<'static, f64> {
        Constraints::many(vec![prox_fn(nonneg), prox_fn(at_most_one)]).with_ops(OneOrMany::Many(vec![
            Operator::identity(),
            Operator::dense(array![[1., 1.]]),
        ]))
    }

    #[test]
    fn nonneg_and_bounded_sum() {
        let x0 = array![0., 0.];
        let sol = sdmm(x0.view(), shifted, 0.9, Some(two_constraints()), &Options::default()).unwrap();
        assert!(sol.converged);
        assert_eq!(sol.restarts, 0);
        assert_abs_diff_eq!(sol.x, array![1., 0.], epsilon = 1e-4);
        // tau_f ||L_i||^2 M
        assert_abs_diff_eq!(sol.steps_g[0], 1.8, epsilon = 1e-12);
        assert_abs_diff_eq!(sol.steps_g[1], 3.6, epsilon = 1e-9);
    }

    #[test]
    fn traceback_tracks_every_constraint() {
        let x0 = array![0., 0.];
        let opts = Options {
            traceback: true,
            ..Options::default()
        };
        let sol = sdmm(x0.view(), shifted, 0.9, Some(two_constraints()), &opts).unwrap();
        let tr = sol.traceback.unwrap();
        assert_eq!(tr.n_blocks(), 1);
        assert_eq!(tr.len(), sol.iterations + 1);
        let last = tr.last(0).unwrap();
        assert_eq!(last.it, sol.iterations);
        assert_eq!(last.z.len(), 2);
        assert_eq!(last.z[1].len(), 1);
        assert_eq!(last.s[1].len(), 2);
        assert_eq!(last.x, sol.x);
    }

    #[test]
    fn without_constraints_iterates_prox_f() {
        let x0 = array![0., 0.];
        let sol = sdmm(x0.view(), shifted, 0.9, None, &Options::default()).unwrap();
        assert!(sol.converged);
        assert_abs_diff_eq!(sol.x, array![2., -1.], epsilon = 1e-5);
        assert!(sol.steps_g.is_empty());
    }

    #[test]
    fn single_constraint_is_admm() {
        let x0 = array![0., 0.];
        let op = Operator::dense(array![[1., 1.]]);
        let a = sdmm(
            x0.view(),
            shifted,
            0.9,
            Some(Constraints::single(at_most_one).with_ops(OneOrMany::Single(op.clone()))),
            &Options::default(),
        )
        .unwrap();
        let b = admm(
            x0.view(),
            shifted,
            0.9,
            Some(prox_fn(at_most_one)),
            None,
            Some(op),
            &Options::default(),
        )
        .unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.steps_g, b.steps_g);
    }

    #[test]
    fn stagnation_halves_every_step_and_restarts() {
        let x0 = array![0., 0.];
        let opts = Options {
            traceback: true,
            ..Options::default()
        };
        let constraints = Constraints::many(vec![
            prox_fn(nonneg),
            prox_fn(|v: ArrayView1<f64>, _s: f64| v.mapv(|x| x.min(0.2))),
        ]);
        let sol = sdmm(x0.view(), stuck_above(0.5), 0.9, Some(constraints), &opts).unwrap();
        assert_eq!(sol.restarts, 1);
        assert_eq!(sol.step_f, 0.45);
        assert_eq!(sol.steps_g, vec![0.9, 0.9]);
        assert!(sol.converged);
        assert_abs_diff_eq!(sol.x, array![0.2, 0.], epsilon = 1e-6);

        let tr = sol.traceback.unwrap();
        assert_eq!(tr.len(), sol.iterations + 1);
        assert_eq!(tr.history()[0].x, x0);
        assert_eq!(tr.history()[0].steps_g, vec![0.9, 0.9]);
    }

    #[test]
    fn one_moving_residual_prevents_restart() {
        let x0 = array![0., 0.];
        let opts = Options {
            e_rel: 0.,
            max_iter: 10,
            ..Options::default()
        };
        // x is constant; the nonneg residual stays zero while the
        // shrinkage residual halves every iteration
        let constraints = Constraints::many(vec![
            prox_fn(nonneg),
            prox_fn(|v: ArrayView1<f64>, _s: f64| &v * 0.5),
        ]);
        let sol = sdmm(
            x0.view(),
            |_, _| array![0.5, 0.5],
            0.9,
            Some(constraints),
            &opts,
        )
        .unwrap();
        assert_eq!(sol.restarts, 0);
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 10);
        assert_eq!(sol.step_f, 0.9);
        assert_eq!(sol.steps_g, vec![1.8, 1.8]);
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let x0 = array![0., 0.];
        let constraints = Constraints::many(vec![prox_fn(nonneg), prox_fn(at_most_one)])
            .with_steps(OneOrMany::Many(vec![1.]));
        match sdmm(x0.view(), shifted, 0.9, Some(constraints), &Options::default()) {
            Err(ProxError::LengthMismatch { expected, found, .. }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("length mismatch not detected"),
        }

        let constraints = Constraints::<f64>::many(Vec::new());
        match sdmm(x0.view(), shifted, 0.9, Some(constraints), &Options::default()) {
            Err(ProxError::Empty(_)) => {}
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("empty constraint list accepted"),
        }
    }
}
