//! Fixed-point iteration of a proximal operator
//!
//! For a composite objective $`f = h + g`$ with an $`L`$-smooth $`h`$ and a
//! prox-friendly $`g`$, the forward-backward step
//! $`\mathrm{prox}_{g,\tau}(x - \tau \nabla h(x))`$ is itself a proximal-type
//! map whose fixed points are the minimizers of $`f`$. The solvers here only
//! ever see that map, as `prox_f(point, step)`, and iterate it until the
//! iterate stops moving relative to its own magnitude.
//!
//! This includes projections, since a projection is the proximal operator of
//! the indicator of a constraint set.

mod pgm;
pub use pgm::*;
