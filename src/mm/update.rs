//! One augmented-Lagrangian step and the residual stopping rule

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;
use num_traits::Float;

use super::constraint::Constraint;
use crate::linop::{l2, Adjoint, LinearOperator};

/// Consensus and scaled dual variables of one primal variable.
///
/// `z[i]` and `u[i]` belong to constraint `i`; both are empty when the
/// variable is unconstrained.
#[derive(Clone, Debug)]
pub struct Multipliers<S> {
    pub z: Vec<Array1<S>>,
    pub u: Vec<Array1<S>>,
}

impl<S> Multipliers<S>
where
    S: NdFloat + Scalar,
{
    /// `Z_i = L_i x`, `U_i = 0`.
    pub fn init(x: &Array1<S>, constraints: &[Constraint<S>]) -> Self {
        let z: Vec<Array1<S>> = constraints.iter().map(|c| c.op.apply(x)).collect();
        let u = z.iter().map(|zi| Array1::zeros(zi.raw_dim())).collect();
        Multipliers { z, u }
    }
}

/// What one update produced, besides the new iterates.
#[derive(Clone, Debug)]
pub struct Residuals<S> {
    /// `L_i x` at the new `x`.
    pub lx: Vec<Array1<S>>,
    /// Primal residuals `L_i x - Z_i`.
    pub r: Vec<Array1<S>>,
    /// Dual residuals `-L_iᵀ(Z_i' - Z_i) / step_g_i`.
    pub s: Vec<Array1<S>>,
    /// Change of the primal variable.
    pub dx: Array1<S>,
}

/// Linearized ADMM / SDMM update of `x` and its multipliers, in place.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// x &\leftarrow \mathrm{prox}_{f,\tau_f}\Big(x - \sum_i \frac{\tau_f}{\tau_i} L_i^\top (L_i x - z_i + u_i)\Big) \\
/// z_i' &= \mathrm{prox}_{g_i,\tau_i}(L_i x + u_i) \\
/// r_i &= L_i x - z_i', \quad s_i = -\frac{1}{\tau_i} L_i^\top (z_i' - z_i) \\
/// z_i &\leftarrow z_i', \quad u_i \leftarrow u_i + r_i
/// \end{aligned}
/// ```
/// Without constraints this is the plain step $`x \leftarrow \mathrm{prox}_{f,\tau_f}(x)`$.
///
/// See Moolekamp & Melchior (2018), Algorithms 1 and 2, arXiv:1708.09066.
pub fn update_variables<S, F>(
    x: &mut Array1<S>,
    mult: &mut Multipliers<S>,
    prox_f: F,
    step_f: S,
    constraints: &[Constraint<S>],
) -> Residuals<S>
where
    S: NdFloat + Scalar,
    F: Fn(ArrayView1<S>, S) -> Array1<S>,
{
    let x_old = x.clone();
    if constraints.is_empty() {
        *x = prox_f(x_old.view(), step_f);
        let dx = &*x - &x_old;
        return Residuals {
            lx: Vec::new(),
            r: Vec::new(),
            s: Vec::new(),
            dx,
        };
    }

    let mut grad = Array1::zeros(x.raw_dim());
    for ((c, zi), ui) in constraints.iter().zip(&mult.z).zip(&mult.u) {
        let violation = c.op.apply(&x_old) - zi + ui;
        grad.scaled_add(step_f / c.step, &c.op.adj().apply(&violation));
    }
    *x = prox_f((&x_old - &grad).view(), step_f);

    let m = constraints.len();
    let mut lx = Vec::with_capacity(m);
    let mut r = Vec::with_capacity(m);
    let mut s = Vec::with_capacity(m);
    for ((c, zi), ui) in constraints.iter().zip(mult.z.iter_mut()).zip(mult.u.iter_mut()) {
        let lxi = c.op.apply(&*x);
        let zi_new = (c.prox)((&lxi + &*ui).view(), c.step);
        let ri = &lxi - &zi_new;
        let si = c.op.adj().apply(&(&zi_new - &*zi)) * (-S::one() / c.step);
        *zi = zi_new;
        *ui += &ri;
        lx.push(lxi);
        r.push(ri);
        s.push(si);
    }
    let dx = &*x - &x_old;
    Residuals { lx, r, s, dx }
}

/// Thresholds and residual norms of one constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResidualErrors<S> {
    /// Primal threshold.
    pub e_pri: S,
    /// Dual threshold.
    pub e_dual: S,
    /// `||R||`
    pub r_norm: S,
    /// `||S||`
    pub s_norm: S,
}

impl<S: NdFloat> ResidualErrors<S> {
    pub fn converged(&self) -> bool {
        self.r_norm <= self.e_pri && self.s_norm <= self.e_dual
    }
}

/// Stopping rule of Boyd et al. (2011), Sec. 3.3.1, for every constraint.
///
/// With $`p = \dim z_i`$, $`n = \dim x`$ and the scaled dual $`u_i`$
/// (penalty $`\rho_i = 1/\tau_i`$):
/// ```math
/// \begin{aligned}
/// \epsilon_{pri} &= \sqrt{p}\, e_{abs} + e_{rel} \max(\|L_i x\|_2, \|z_i\|_2) \\
/// \epsilon_{dual} &= \sqrt{n}\, e_{abs} + e_{rel} \|L_i^\top u_i\|_2 / \tau_i
/// \end{aligned}
/// ```
/// Converged iff $`\|r_i\| \leq \epsilon_{pri}`$ and $`\|s_i\| \leq \epsilon_{dual}`$
/// for all $`i`$. An unconstrained variable uses the relative fixed-point
/// test $`\|\Delta x\| \leq \sqrt{n}\, e_{abs} + e_{rel} \|x\|`$ as its dual
/// condition.
pub fn check_convergence<S>(
    x: &Array1<S>,
    mult: &Multipliers<S>,
    residuals: &Residuals<S>,
    constraints: &[Constraint<S>],
    e_rel: S,
    e_abs: S,
) -> (bool, Vec<ResidualErrors<S>>)
where
    S: NdFloat + Scalar,
{
    let sqrt_n = Float::sqrt(S::from(x.len()).unwrap());
    if constraints.is_empty() {
        let errors = ResidualErrors {
            e_pri: S::zero(),
            e_dual: sqrt_n * e_abs + e_rel * l2(x),
            r_norm: S::zero(),
            s_norm: l2(&residuals.dx),
        };
        return (errors.converged(), vec![errors]);
    }

    let errors: Vec<ResidualErrors<S>> = constraints
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let zi = &mult.z[i];
            let sqrt_p = Float::sqrt(S::from(zi.len()).unwrap());
            let e_pri = sqrt_p * e_abs + e_rel * Float::max(l2(&residuals.lx[i]), l2(zi));
            let e_dual = sqrt_n * e_abs + e_rel * l2(&c.op.adj().apply(&mult.u[i])) / c.step;
            ResidualErrors {
                e_pri,
                e_dual,
                r_norm: l2(&residuals.r[i]),
                s_norm: l2(&residuals.s[i]),
            }
        })
        .collect();
    (errors.iter().all(ResidualErrors::converged), errors)
}
