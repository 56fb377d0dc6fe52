//! Engine error kinds.
//!
//! Only malformed-module conditions abort a whole run. Traps, infeasible
//! branches, and budget exhaustion are *path* outcomes, not errors: they are
//! represented as terminal labels on individual states (see
//! `state::Terminal`), never as an `EngineError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The module uses a construct the engine cannot represent.
    /// Fatal for the whole run, naming the offending construct.
    #[error("malformed module: {0}")]
    Malformed(String),

    /// A global initializer the engine cannot evaluate.
    #[error("unsupported global initializer: {0}")]
    UnsupportedGlobal(String),

    /// The configured entry function does not exist in the module.
    #[error("entry function `{0}` not found among exports or named functions")]
    EntryNotFound(String),

    /// Value-stack underflow. A well-typed module never triggers this, so
    /// hitting it means the decoder or a handler is wrong.
    #[error("value stack underflow in `{0}`")]
    StackUnderflow(String),

    /// A handler observed a value of the wrong kind (e.g. a float where a
    /// bitvector was required).
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Two operands of different bit widths reached a binary operation.
    #[error("width mismatch: {0} vs {1} bits")]
    WidthMismatch(u32, u32),

    /// The solver backend failed outside of a feasibility query.
    #[error("solver failure: {0}")]
    Solver(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
