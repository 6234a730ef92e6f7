//! Caller errors raised by argument validation.
//!
//! Every check runs before the first iteration. Running out of iterations is
//! not an error: the solvers return their last iterate with
//! `converged == false` and log a warning instead.

/// Malformed solver arguments.
#[derive(Debug, thiserror::Error)]
pub enum ProxError {
    /// A per-constraint or per-block list does not match the list it pairs with.
    #[error("length mismatch: {what} has {found} entries, expected {expected}")]
    LengthMismatch {
        /// Name of the offending argument.
        what: &'static str,
        /// Length required by the constraint or block count.
        expected: usize,
        /// Length actually supplied.
        found: usize,
    },

    /// An operator cannot be applied to the iterate it is paired with.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A sweep or step-coupling strategy name was not recognised.
    #[error("unknown {kind} strategy '{name}'")]
    UnknownStrategy {
        /// Which kind of strategy was being parsed.
        kind: &'static str,
        /// The rejected name.
        name: String,
    },

    /// A scalar parameter is outside its valid range.
    #[error("parameter out of range: {name} = {value} (expected {expected})")]
    ParameterOutOfRange {
        /// Name of the parameter.
        name: &'static str,
        /// The rejected value, formatted.
        value: String,
        /// Human-readable description of the valid range.
        expected: &'static str,
    },

    /// The block update order names a block that does not exist.
    #[error("block index {index} out of range for {blocks} blocks")]
    BlockOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of blocks.
        blocks: usize,
    },

    /// A list that must hold at least one entry was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProxError>;

/// Checks that a primal step size is usable.
pub(crate) fn check_step<S: ndarray::NdFloat>(name: &'static str, step: S) -> Result<()> {
    if step.is_finite() && step > S::zero() {
        Ok(())
    } else {
        Err(ProxError::ParameterOutOfRange {
            name,
            value: format!("{}", step),
            expected: "a finite value > 0",
        })
    }
}
