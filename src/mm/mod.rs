//! Methods of multipliers for constrained problems
//!
//! All solvers here minimize an objective $`f`$ subject to constraints of the
//! form $`g_i(L_i x)`$, where both $`f`$ and every $`g_i`$ are only accessed
//! through their proximal operators:
//!
//! - [`admm`]: one constraint, linearized ADMM
//! - [`sdmm`]: any number of constraints on one variable
//! - [`bsdmm`]: several coupled variable blocks, each with its own constraints
//!
//! References
//! ----------
//! - Boyd, Parikh, Chu, Peleato & Eckstein (2011). Distributed Optimization
//!   and Statistical Learning via the Alternating Direction Method of Multipliers.
//! - Parikh & Boyd (2014). Proximal Algorithms.
//! - Moolekamp & Melchior (2018). Block-Simultaneous Direction Method of
//!   Multipliers, arXiv:1708.09066.

mod admm;
mod bsdmm;
mod constraint;
mod sdmm;
mod update;

pub use admm::*;
pub use bsdmm::*;
pub use constraint::*;
pub use sdmm::*;
pub use update::*;
