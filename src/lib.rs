//! The `ndarray-proxmin` crate provides proximal splitting algorithms for
//! minimizing an objective whose terms are only accessible through their
//! proximal operators, with iterates stored as `ndarray` arrays.
//!
//! It includes:
//! - Proximal Gradient Method, plain and accelerated (PGM, APGM)
//! - linearized Alternating Direction Method of Multipliers (ADMM)
//! - Simultaneous Direction Method of Multipliers (SDMM), for several constraints
//! - Block-Simultaneous Direction Method of Multipliers (BSDMM), for several
//!   coupled variables
//!
//! Proximal operators are plain closures `prox(point, step) -> Array1`.
//! Constraints may act through a linear [`Operator`](linop::Operator), whose
//! spectral norm sets the default constraint step sizes.
//!
//! Solvers validate their arguments up front and fail with a
//! [`ProxError`](error::ProxError). Running out of iterations is reported in
//! the returned solution, not as an error. Progress is logged through
//! `tracing`; install a subscriber to see it.
//!
//! This crate is in the early development stage and is actively changing.
//! The provided methods have been tested, but have not been tuned for
//! maximum performance or minimum memory usage.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod error;
pub mod linop;
pub mod mm;
pub mod options;
pub mod prox;
pub mod traceback;

pub use error::{ProxError, Result};
pub use options::{BlockOptions, BlockSolution, BlockStrategy, Options, Solution, StepCoupling, Sweep};
