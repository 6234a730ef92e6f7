//! Constraints of the multiplier methods
//!
//! A constraint $`g_i(L_i x)`$ is given by the proximal operator of $`g_i`$,
//! an optional [`Operator`] $`L_i`$ (identity by default) and an optional
//! step size (derived from `step_f` by default). The "one or many" choice is
//! made explicit with [`OneOrMany`] and resolved once, before iterating.

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;

use crate::error::{check_step, ProxError, Result};
use crate::linop::Operator;

/// Boxed proximal operator, called as `prox(point, step)`.
pub type ProxFn<'a, S> = Box<dyn Fn(ArrayView1<S>, S) -> Array1<S> + 'a>;

/// Boxes a closure as a [`ProxFn`].
pub fn prox_fn<'a, S, F>(f: F) -> ProxFn<'a, S>
where
    F: Fn(ArrayView1<S>, S) -> Array1<S> + 'a,
{
    Box::new(f)
}

/// A single item, or one item per constraint.
#[derive(Clone, Debug)]
pub enum OneOrMany<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Number of items, if this is a list.
    pub fn len(&self) -> Option<usize> {
        match self {
            OneOrMany::Single(_) => None,
            OneOrMany::Many(items) => Some(items.len()),
        }
    }

    /// Exactly `n` items: a single one is repeated, a list must have length `n`.
    pub fn broadcast(self, n: usize, what: &'static str) -> Result<Vec<T>>
    where
        T: Clone,
    {
        match self {
            OneOrMany::Single(item) => Ok(vec![item; n]),
            OneOrMany::Many(items) => {
                if items.len() == n {
                    Ok(items)
                } else {
                    Err(ProxError::LengthMismatch {
                        what,
                        expected: n,
                        found: items.len(),
                    })
                }
            }
        }
    }

    /// The single item; a list is accepted if it holds exactly one.
    pub fn into_single(self, what: &'static str) -> Result<T> {
        match self {
            OneOrMany::Single(item) => Ok(item),
            OneOrMany::Many(mut items) => {
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Err(ProxError::LengthMismatch {
                        what,
                        expected: 1,
                        found: items.len(),
                    })
                }
            }
        }
    }
}

/// Constraints attached to one primal variable.
pub struct Constraints<'a, S> {
    pub proxs: OneOrMany<ProxFn<'a, S>>,
    /// Constraint step sizes; derived from `step_f` when `None`.
    pub steps: Option<OneOrMany<S>>,
    /// Linear operators; identity when `None`.
    pub ops: Option<OneOrMany<Operator<S>>>,
}

impl<'a, S> Constraints<'a, S> {
    /// One constraint `g(x)`.
    pub fn single(prox: impl Fn(ArrayView1<S>, S) -> Array1<S> + 'a) -> Self {
        Constraints {
            proxs: OneOrMany::Single(Box::new(prox)),
            steps: None,
            ops: None,
        }
    }

    /// A list of constraints; a list of one still counts as a list.
    pub fn many(proxs: Vec<ProxFn<'a, S>>) -> Self {
        Constraints {
            proxs: OneOrMany::Many(proxs),
            steps: None,
            ops: None,
        }
    }

    pub fn with_steps(mut self, steps: OneOrMany<S>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_ops(mut self, ops: OneOrMany<Operator<S>>) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Whether step sizes were supplied.
    pub fn has_steps(&self) -> bool {
        self.steps.is_some()
    }
}

/// One resolved constraint: proximal operator, operator and current step size.
pub struct Constraint<'a, S> {
    pub prox: ProxFn<'a, S>,
    pub op: Operator<S>,
    pub step: S,
}

/// Constraint step size compatible with `step_f` for the linearized ADMM.
///
/// Nominally the smallest admissible value is $`\tau_f \|L\|_2^2`$
/// (Parikh & Boyd 2014, Sec. 4.4.2). The primal update weighs each
/// constraint by $`\tau_f / \tau_g`$, so with `n_constraints` constraints
/// (and `n_blocks` coupled blocks) the step grows by $`M N`$, in case the
/// constraints are fully correlated and would otherwise overwhelm the
/// primal update.
pub fn step_g<S: NdFloat>(step_f: S, spectral_norm: S, n_blocks: usize, n_constraints: usize) -> S {
    let scale = S::from(n_blocks * n_constraints).unwrap();
    step_f * spectral_norm * spectral_norm * scale
}

impl<'a, S> Constraints<'a, S>
where
    S: NdFloat + Scalar,
{
    /// Pairs every proximal operator with its operator and step size.
    ///
    /// Missing steps are left `None`; `n` is the length of the primal variable.
    pub(crate) fn resolve(self, n: usize) -> Result<Vec<(ProxFn<'a, S>, Operator<S>, Option<S>)>> {
        let proxs = match self.proxs {
            OneOrMany::Single(prox) => vec![prox],
            OneOrMany::Many(proxs) => proxs,
        };
        let m = proxs.len();
        if m == 0 {
            return Err(ProxError::Empty("constraint list"));
        }
        let steps: Vec<Option<S>> = match self.steps {
            None => vec![None; m],
            Some(steps) => steps
                .broadcast(m, "steps_g")?
                .into_iter()
                .map(Some)
                .collect(),
        };
        for step in steps.iter().flatten() {
            check_step("step_g", *step)?;
        }
        let ops = match self.ops {
            None => vec![Operator::identity(); m],
            Some(ops) => ops.broadcast(m, "operators")?,
        };
        for op in ops.iter() {
            op.check_input(n)?;
        }
        Ok(proxs
            .into_iter()
            .zip(ops)
            .zip(steps)
            .map(|((prox, op), step)| (prox, op, step))
            .collect())
    }
}

/// Resolves `constraints` of a single primal variable, deriving missing steps.
pub(crate) fn resolve_with_defaults<'a, S>(
    constraints: Constraints<'a, S>,
    n: usize,
    step_f: S,
    n_blocks: usize,
) -> Result<Vec<Constraint<'a, S>>>
where
    S: NdFloat + Scalar,
{
    let resolved = constraints.resolve(n)?;
    let m = resolved.len();
    Ok(resolved
        .into_iter()
        .map(|(prox, op, step)| {
            let step = step.unwrap_or_else(|| step_g(step_f, op.spectral_norm(), n_blocks, m));
            Constraint { prox, op, step }
        })
        .collect())
}
