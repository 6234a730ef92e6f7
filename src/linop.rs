//! Abstract Linear Operators and Adjoints
//! building upon ndarray_linalg::operator
//!
//! The multiplier methods couple every constraint to the primal variable
//! through an [`Operator`], which wraps the identity, a dense matrix or a
//! diagonal and remembers its spectral norm, so that constraint step sizes
//! can be derived without recomputing it every iteration.

use std::marker::PhantomData;

use ndarray::prelude::*;
use ndarray::{Data, DataMut, DataOwned, NdFloat};
pub use ndarray_linalg::diagonal::AsDiagonal;
pub use ndarray_linalg::operator::LinearOperator;
use ndarray_linalg::Scalar;
use num_traits::Float;

use crate::error::{ProxError, Result};

/// Upper bound on power iterations used for the spectral norm.
const POWER_ITERATIONS: usize = 500;

pub trait Adjoint<'a> {
    type Output;
    fn adj(&'a self) -> Self::Output;
}

impl<'a, A, S> Adjoint<'a> for ArrayBase<S, Ix2>
where
    A: 'a + Float,
    S: Data<Elem = A>,
{
    type Output = ArrayView<'a, A, Ix2>;

    fn adj(&'a self) -> Self::Output {
        self.t()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Identity<A> {
    phantom: PhantomData<A>,
}

impl<A> Identity<A> {
    #[must_use]
    pub fn new() -> Identity<A> {
        Identity {
            phantom: PhantomData,
        }
    }
}

impl<A> LinearOperator for Identity<A>
where
    A: NdFloat + Scalar,
{
    type Elem = A;

    #[inline]
    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        a.to_owned()
    }

    #[inline]
    fn apply_mut<S>(&self, _a: &mut ArrayBase<S, Ix1>)
    where
        S: DataMut<Elem = Self::Elem>,
    {
    }

    #[inline]
    fn apply_into<S>(&self, a: ArrayBase<S, Ix1>) -> ArrayBase<S, Ix1>
    where
        S: DataOwned<Elem = Self::Elem> + DataMut,
    {
        a
    }
}

impl<'a, A: 'a> Adjoint<'a> for Identity<A> {
    type Output = &'a Identity<A>;

    fn adj(&'a self) -> Self::Output {
        self
    }
}

#[derive(Clone, Debug)]
enum Kind<S> {
    Identity(Identity<S>),
    Dense(Array2<S>),
    Diagonal(Array1<S>),
}

/// Linear operator `L` of a constraint `g(Lx)`, with cached spectral norm.
///
/// The norm is the largest singular value of `L`. It is computed once, when
/// the operator is constructed.
#[derive(Clone, Debug)]
pub struct Operator<S> {
    kind: Kind<S>,
    spectral_norm: S,
}

impl<S> Operator<S>
where
    S: NdFloat + Scalar,
{
    /// The identity, for constraints acting directly on `x`.
    pub fn identity() -> Self {
        Operator {
            kind: Kind::Identity(Identity::new()),
            spectral_norm: S::one(),
        }
    }

    /// A dense matrix; its norm is estimated by power iteration on `LᵀL`.
    pub fn dense(matrix: Array2<S>) -> Self {
        let spectral_norm = spectral_norm(&matrix, matrix.ncols());
        Operator {
            kind: Kind::Dense(matrix),
            spectral_norm,
        }
    }

    /// A diagonal matrix given by its diagonal entries.
    pub fn diagonal(diag: Array1<S>) -> Self {
        let spectral_norm = diag
            .iter()
            .fold(S::zero(), |acc, &d| Float::max(acc, Float::abs(d)));
        Operator {
            kind: Kind::Diagonal(diag),
            spectral_norm,
        }
    }

    /// Largest singular value of the operator.
    pub fn spectral_norm(&self) -> S {
        self.spectral_norm
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, Kind::Identity(_))
    }

    /// Fails if the operator cannot act on vectors of length `n`.
    pub(crate) fn check_input(&self, n: usize) -> Result<()> {
        let expected = match &self.kind {
            Kind::Identity(_) => return Ok(()),
            Kind::Dense(matrix) => matrix.ncols(),
            Kind::Diagonal(diag) => diag.len(),
        };
        if expected == n {
            Ok(())
        } else {
            Err(ProxError::DimensionMismatch(format!(
                "operator expects input of length {}, iterate has length {}",
                expected, n
            )))
        }
    }
}

impl<S> LinearOperator for Operator<S>
where
    S: NdFloat + Scalar,
{
    type Elem = S;

    fn apply<D>(&self, a: &ArrayBase<D, Ix1>) -> Array1<D::Elem>
    where
        D: Data<Elem = Self::Elem>,
    {
        match &self.kind {
            Kind::Identity(id) => id.apply(a),
            Kind::Dense(matrix) => matrix.apply(a),
            Kind::Diagonal(diag) => diag.as_diagonal().apply(a),
        }
    }
}

/// Adjoint view of an [`Operator`].
pub struct OperatorAdjoint<'a, S>(&'a Operator<S>);

impl<'a, S> LinearOperator for OperatorAdjoint<'a, S>
where
    S: NdFloat + Scalar,
{
    type Elem = S;

    fn apply<D>(&self, a: &ArrayBase<D, Ix1>) -> Array1<D::Elem>
    where
        D: Data<Elem = Self::Elem>,
    {
        match &self.0.kind {
            Kind::Identity(id) => id.adj().apply(a),
            Kind::Dense(matrix) => matrix.adj().apply(a),
            // real diagonals are self-adjoint
            Kind::Diagonal(diag) => diag.as_diagonal().apply(a),
        }
    }
}

impl<'a, S: 'a> Adjoint<'a> for Operator<S> {
    type Output = OperatorAdjoint<'a, S>;

    fn adj(&'a self) -> Self::Output {
        OperatorAdjoint(self)
    }
}

/// Largest singular value of `op` by power iteration on `opᵀ op`.
///
/// `dim` is the length of the operator's input. The start vector is the
/// deterministic ramp `1 + i/dim`; an operator that maps it to zero reports
/// a norm of zero.
pub fn spectral_norm<'a, S, T, Q>(op: &'a T, dim: usize) -> S
where
    S: NdFloat + Scalar,
    T: LinearOperator<Elem = S> + Adjoint<'a, Output = Q>,
    Q: LinearOperator<Elem = S>,
{
    if dim == 0 {
        return S::zero();
    }
    let n = S::from(dim).unwrap();
    let mut v = Array1::from_shape_fn(dim, |i| S::one() + S::from(i).unwrap() / n);
    let v_norm = l2(&v);
    v /= v_norm;

    let adj = op.adj();
    let tol = S::from(1e-12).unwrap();
    let mut lambda = S::zero();
    for _ in 0..POWER_ITERATIONS {
        let w = adj.apply(&op.apply(&v));
        let norm = l2(&w);
        if norm == S::zero() {
            return S::zero();
        }
        v = w / norm;
        let settled = Float::abs(norm - lambda) <= tol * norm;
        lambda = norm;
        if settled {
            break;
        }
    }
    Float::sqrt(lambda)
}

/// Squared euclidean norm.
pub(crate) fn l2sq<S, D>(a: &ArrayBase<D, Ix1>) -> S
where
    S: NdFloat,
    D: Data<Elem = S>,
{
    a.dot(a)
}

/// Euclidean norm.
pub(crate) fn l2<S, D>(a: &ArrayBase<D, Ix1>) -> S
where
    S: NdFloat,
    D: Data<Elem = S>,
{
    Float::sqrt(l2sq(a))
}
