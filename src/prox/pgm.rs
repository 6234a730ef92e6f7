//! Proximal Gradient Method, plain and accelerated

use ndarray::prelude::*;
use ndarray::NdFloat;
use num_traits::Float;
use tracing::{debug_span, info, warn};

use crate::error::{check_step, ProxError, Result};
use crate::linop::l2sq;
use crate::options::{Options, Solution};
use crate::traceback::{Snapshot, Traceback};

/// Proximal Gradient Method
///
/// Forward-backward splitting with a fixed over-relaxation, adapted from
/// Combettes & Wajs (2009), Algorithm 3.4.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// \tilde x_{k+1} &= \mathrm{prox}_{f, \tau}(z_k) \\
/// z_{k+1} &= x_k + \lambda (\tilde x_{k+1} - x_k) \\
/// x_{k+1} &= \tilde x_{k+1}
/// \end{aligned}
/// ```
/// starting from $`x_0 = z_0`$. The iteration stops at the first $`k`$ with
/// $`\| x_k - \tilde x_{k+1} \|_2 \leq e_{rel} \| x_k \|_2`$.
///
/// Parameters
/// ----------
/// - __x0:__      initial guess
/// - __prox_f:__  proxed function f (the forward-backward step), called as `prox_f(z, step)`
/// - __step_f:__  step size, < 1/L with L the Lipschitz constant of the gradient of the smooth part
/// - __relax:__   over-relaxation $`\lambda \in (0, 1.5)`$, typically [`DEFAULT_RELAX`](crate::options::DEFAULT_RELAX)
/// - __opts:__    `e_rel`, `max_iter` and `traceback` are used
///
/// Running out of iterations is not an error: the last candidate is returned
/// with `converged == false`.
pub fn pgm<S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    step_f: S,
    relax: S,
    opts: &Options<S>,
) -> Result<Solution<S>>
where
    S: NdFloat,
{
    check_step("step_f", step_f)?;
    if !(relax > S::zero() && relax < S::from(1.5).unwrap()) {
        return Err(ProxError::ParameterOutOfRange {
            name: "relax",
            value: format!("{}", relax),
            expected: "0 < relax < 1.5",
        });
    }

    let span = debug_span!("pgm", n = x0.len(), step_f = %step_f, relax = %relax);
    let _enter = span.enter();
    Ok(fixed_point(
        x0,
        prox_f,
        step_f,
        Momentum::Relaxed(relax),
        opts,
    ))
}

/// Accelerated Proximal Gradient Method
///
/// Same iteration as [`pgm`], with the over-relaxation replaced by Nesterov
/// momentum (Combettes & Wajs 2009, Algorithm 3.6):
/// ```math
/// t_{k+1} = \frac{1 + \sqrt{4 t_k^2 + 1}}{2}, \quad
/// \gamma_k = 1 + \frac{t_k - 1}{t_{k+1}}, \quad t_0 = 1
/// ```
/// If `opts.traceback` is set, every snapshot also carries $`t`$ and $`\gamma`$,
/// and its `z` is the point `prox_f` was evaluated at, not the next
/// extrapolation.
pub fn apgm<S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    step_f: S,
    opts: &Options<S>,
) -> Result<Solution<S>>
where
    S: NdFloat,
{
    check_step("step_f", step_f)?;

    let span = debug_span!("apgm", n = x0.len(), step_f = %step_f);
    let _enter = span.enter();
    Ok(fixed_point(
        x0,
        prox_f,
        step_f,
        Momentum::Nesterov { t: S::one() },
        opts,
    ))
}

enum Momentum<S> {
    Relaxed(S),
    Nesterov { t: S },
}

impl<S: NdFloat> Momentum<S> {
    /// Extrapolation factor for the next step.
    fn advance(&mut self) -> S {
        match self {
            Momentum::Relaxed(relax) => *relax,
            Momentum::Nesterov { t } => {
                let half = S::from(0.5).unwrap();
                let four = S::from(4.).unwrap();
                let t_next = half * (S::one() + Float::sqrt(four * *t * *t + S::one()));
                let gamma = S::one() + (*t - S::one()) / t_next;
                *t = t_next;
                gamma
            }
        }
    }

    /// PGM traces the next extrapolation point, APGM the one `prox_f` was
    /// just evaluated at.
    fn traced_point<'z>(&self, evaluated: &'z Array1<S>, next: &'z Array1<S>) -> &'z Array1<S> {
        match self {
            Momentum::Relaxed(_) => next,
            Momentum::Nesterov { .. } => evaluated,
        }
    }

    fn annotate(&self, snapshot: Snapshot<S>, gamma: S) -> Snapshot<S> {
        match self {
            Momentum::Relaxed(_) => snapshot,
            Momentum::Nesterov { t } => snapshot.with_momentum(*t, gamma),
        }
    }
}

fn fixed_point<S>(
    x0: ArrayView1<S>,
    prox_f: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    step_f: S,
    mut momentum: Momentum<S>,
    opts: &Options<S>,
) -> Solution<S>
where
    S: NdFloat,
{
    let mut x = x0.to_owned();
    let mut z = x0.to_owned();

    let mut traceback = if opts.traceback {
        let mut tr = Traceback::new(1);
        let initial = Snapshot::fixed_point(0, x.clone(), z.clone(), step_f);
        tr.record(0, momentum.annotate(initial, S::one()));
        Some(tr)
    } else {
        None
    };

    let e_rel2 = opts.e_rel * opts.e_rel;
    let mut iterations = 0;
    let mut converged = false;
    for it in 0..opts.max_iter {
        let candidate = prox_f(z.view(), step_f);
        let gamma = momentum.advance();
        let z_next = &x + &((&candidate - &x) * gamma);

        if let Some(tr) = traceback.as_mut() {
            let traced = momentum.traced_point(&z, &z_next).clone();
            let snapshot = Snapshot::fixed_point(it + 1, candidate.clone(), traced, step_f);
            tr.record(0, momentum.annotate(snapshot, gamma));
        }
        z = z_next;

        // relative fixed-point test; with e_rel = 0 only an exact repeat passes
        converged = l2sq(&(&x - &candidate)) <= e_rel2 * l2sq(&x);
        x = candidate;
        iterations = it + 1;
        if converged {
            break;
        }
    }

    if !converged {
        warn!(iterations, "solution did not converge");
    }
    info!(iterations, "completed");

    Solution {
        x,
        iterations,
        converged,
        restarts: 0,
        step_f,
        steps_g: Vec::new(),
        traceback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DEFAULT_RELAX;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use std::cell::Cell;

    /// prox of (x - 3)^2, fixed point 3
    fn quadratic(v: ArrayView1<f64>, s: f64) -> Array1<f64> {
        (&v + 2. * s * 3.) / (1. + 2. * s)
    }

    /// prox of 0.5 ||x - a||^2 restricted to x >= 0
    fn nonneg_shift(v: ArrayView1<f64>, s: f64) -> Array1<f64> {
        let a = array![2., -1., 0.5];
        ((&v + &(&a * s)) / (1. + s)).mapv(|x| x.max(0.))
    }

    fn opts(e_rel: f64, max_iter: usize) -> Options<f64> {
        Options {
            e_rel,
            max_iter,
            ..Options::default()
        }
    }

    #[test]
    fn pgm_quadratic_fixed_point() {
        let x0 = array![0.];
        let sol = pgm(x0.view(), quadratic, 0.4, DEFAULT_RELAX, &opts(1e-8, 100)).unwrap();
        assert!(sol.converged);
        assert!(sol.iterations < 50);
        // the test bounds the last step, not the distance to the fixed point
        assert_abs_diff_eq!(sol.x[0], 3., epsilon = 1e-6);

        let sol = pgm(x0.view(), quadratic, 0.4, DEFAULT_RELAX, &opts(1e-10, 100)).unwrap();
        assert!(sol.converged);
        assert_abs_diff_eq!(sol.x[0], 3., epsilon = 1e-8);
    }

    #[test]
    fn apgm_quadratic_fixed_point() {
        let x0 = array![0.];
        let sol = apgm(x0.view(), quadratic, 0.4, &opts(1e-8, 100)).unwrap();
        assert!(sol.converged);
        assert!(sol.iterations < 100);
        assert_abs_diff_eq!(sol.x[0], 3., epsilon = 1e-6);

        let sol = apgm(x0.view(), quadratic, 0.4, &opts(1e-10, 100)).unwrap();
        assert!(sol.converged);
        assert_abs_diff_eq!(sol.x[0], 3., epsilon = 1e-8);
    }

    #[test]
    fn independent_of_initial_guess() {
        let xstar = array![2., 0., 0.5];
        for _ in 0..5 {
            let x0 = Array1::random(3, Uniform::new(-10., 10.));
            let sol = pgm(x0.view(), nonneg_shift, 0.9, DEFAULT_RELAX, &opts(1e-10, 1000)).unwrap();
            assert!(sol.converged);
            assert_abs_diff_eq!(sol.x, xstar, epsilon = 1e-6);

            let sol = apgm(x0.view(), nonneg_shift, 0.9, &opts(1e-10, 1000)).unwrap();
            assert!(sol.converged);
            assert_abs_diff_eq!(sol.x, xstar, epsilon = 1e-6);
        }
    }

    #[test]
    fn traceback_has_initial_state() {
        let x0 = array![0.];
        let options = Options {
            traceback: true,
            ..opts(1e-8, 100)
        };
        let sol = pgm(x0.view(), quadratic, 0.4, DEFAULT_RELAX, &options).unwrap();
        let tr = sol.traceback.unwrap();
        assert_eq!(tr.len(), sol.iterations + 1);
        assert_eq!(tr.history()[0].x, x0);
        assert_eq!(tr.history()[0].step_f, Some(0.4));
        assert_eq!(tr.history().last().unwrap().x, sol.x);
        assert!(tr.history()[0].t.is_none());

        let sol = apgm(x0.view(), quadratic, 0.4, &options).unwrap();
        let tr = sol.traceback.unwrap();
        assert_eq!(tr.len(), sol.iterations + 1);
        let history = tr.history();
        assert_eq!(history[0].t, Some(1.));
        assert_eq!(history[0].gamma, Some(1.));
        let t1 = 0.5 * (1. + 5f64.sqrt());
        assert_abs_diff_eq!(history[1].t.unwrap(), t1, epsilon = 1e-15);
        assert_abs_diff_eq!(history[1].gamma.unwrap(), 1., epsilon = 1e-15);
        let t2 = 0.5 * (1. + (4. * t1 * t1 + 1.).sqrt());
        assert_abs_diff_eq!(history[2].t.unwrap(), t2, epsilon = 1e-12);
        assert_abs_diff_eq!(history[2].gamma.unwrap(), 1. + (t1 - 1.) / t2, epsilon = 1e-12);
    }

    #[test]
    fn traced_extrapolation_points() {
        let x0 = array![0.];
        let options = Options {
            traceback: true,
            ..opts(1e-8, 100)
        };

        // pgm: z after the relaxation step
        let sol = pgm(x0.view(), quadratic, 0.4, DEFAULT_RELAX, &options).unwrap();
        let tr = sol.traceback.unwrap();
        let history = tr.history();
        let x1 = quadratic(x0.view(), 0.4);
        assert_eq!(history[1].x, x1);
        assert_abs_diff_eq!(history[1].z[0][0], DEFAULT_RELAX * x1[0], epsilon = 1e-15);

        // apgm: z where prox_f was evaluated
        let sol = apgm(x0.view(), quadratic, 0.4, &options).unwrap();
        let tr = sol.traceback.unwrap();
        let history = tr.history();
        assert_eq!(history[0].z[0], x0);
        assert_eq!(history[1].z[0], x0);
        // gamma_0 = 1, so the second evaluation point is the first candidate
        assert_eq!(history[1].x, x1);
        assert_abs_diff_eq!(history[2].z[0][0], x1[0], epsilon = 1e-15);
        assert_eq!(history[2].x, quadratic(history[2].z[0].view(), 0.4));
    }

    #[test]
    fn exact_equality_when_e_rel_is_zero() {
        let x0 = array![0.];
        let options = Options {
            traceback: true,
            ..opts(0., 500)
        };
        let sol = pgm(x0.view(), quadratic, 0.4, DEFAULT_RELAX, &options).unwrap();
        assert!(sol.converged);
        let history = sol.traceback.unwrap();
        let history = history.history();
        let n = history.len();
        assert_eq!(history[n - 1].x, history[n - 2].x);
    }

    /// Alternates around 3 by 1e-13, ignoring its input.
    fn noisy(calls: &Cell<usize>) -> impl Fn(ArrayView1<f64>, f64) -> Array1<f64> + '_ {
        move |_, _| {
            calls.set(calls.get() + 1);
            let sign = if calls.get() % 2 == 0 { 1. } else { -1. };
            array![3. + sign * 1e-13]
        }
    }

    #[test]
    fn noise_never_passes_zero_tolerance() {
        let calls = Cell::new(0);
        let noisy = noisy(&calls);
        let x0 = array![0.];
        let sol = pgm(x0.view(), &noisy, 0.4, DEFAULT_RELAX, &opts(0., 50)).unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 50);

        let sol = pgm(x0.view(), &noisy, 0.4, DEFAULT_RELAX, &opts(1e-6, 50)).unwrap();
        assert!(sol.converged);
        assert_eq!(sol.iterations, 2);
    }

    #[test]
    fn budget_exhaustion_returns_last_candidate() {
        let x0 = array![0.];
        let options = Options {
            traceback: true,
            ..opts(1e-12, 3)
        };
        let sol = apgm(x0.view(), quadratic, 0.4, &options).unwrap();
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 3);
        let tr = sol.traceback.unwrap();
        assert_eq!(tr.len(), 4);
        assert_eq!(tr.history()[3].x, sol.x);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let x0 = array![0.];
        assert!(pgm(x0.view(), quadratic, 0.4, 1.5, &opts(1e-6, 10)).is_err());
        assert!(pgm(x0.view(), quadratic, 0.4, 0., &opts(1e-6, 10)).is_err());
        assert!(pgm(x0.view(), quadratic, 0., DEFAULT_RELAX, &opts(1e-6, 10)).is_err());
        assert!(apgm(x0.view(), quadratic, -0.1, &opts(1e-6, 10)).is_err());
    }
}

#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use crate::options::DEFAULT_RELAX;
    use test::Bencher;

    fn nonneg_shift(v: ArrayView1<f64>, s: f64) -> Array1<f64> {
        let a = Array1::linspace(-1., 1., 256);
        ((&v + &(&a * s)) / (1. + s)).mapv(|x| x.max(0.))
    }

    #[bench]
    fn pgm_nonneg(b: &mut Bencher) {
        let x0 = Array1::zeros(256);
        let opts = Options::default();
        b.iter(|| pgm(x0.view(), nonneg_shift, 0.9, DEFAULT_RELAX, &opts));
    }

    #[bench]
    fn apgm_nonneg(b: &mut Bencher) {
        let x0 = Array1::zeros(256);
        let opts = Options::default();
        b.iter(|| apgm(x0.view(), nonneg_shift, 0.9, &opts));
    }
}
