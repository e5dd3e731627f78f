//! Error types for circuit construction and analysis.
//!
//! Construction errors are reported by the mutating call that caused them and
//! leave the circuit untouched. Numeric errors come out of the solver when the
//! assembled system has no consistent solution.

use thiserror::Error;

/// Result type alias using [`CircuitError`].
pub type Result<T> = std::result::Result<T, CircuitError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CircuitError {
    // ============ Construction Errors ============
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    #[error("node '{0}' not found")]
    NodeNotFound(String),

    #[error("element '{0}' not found")]
    ElementNotFound(String),

    #[error("invalid value {value} for element '{name}': {reason}")]
    InvalidValue {
        name: String,
        value: f64,
        reason: &'static str,
    },

    #[error("type mismatch on element '{name}': declared as {existing}, re-added as {requested}")]
    TypeMismatch {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("element '{element}' is already attached to node '{node}'")]
    DuplicateTerminal { element: String, node: String },

    #[error("element '{0}' already has both terminals attached")]
    TerminalsFull(String),

    #[error("source '{name}' must be entered as {expected} at its second terminal, got {actual}")]
    SourceValueMismatch {
        name: String,
        expected: f64,
        actual: f64,
    },

    // ============ Topology Errors ============
    #[error("node '{node}' is connected to {count} element(s), at least two are required")]
    UnderConnectedNode { node: String, count: usize },

    #[error("element '{0}' is connected to less than two nodes")]
    UnconnectedElement(String),

    // ============ Analysis Errors ============
    #[error("'{0}' is not a source")]
    NotASource(String),

    #[error("'{0}' is not a resistor")]
    NotAResistor(String),

    #[error("invalid circuit (relative residual {residual:.3e}): parallel voltage sources of different value, series current sources of different value, or a shorted source")]
    InvalidCircuit { residual: f64 },

    #[error("matrix decomposition failed - the system is singular")]
    DecompositionFailed,

    #[error("no current flows through the test source at '{0}', maximum power tends to infinity")]
    InfiniteResistance(String),
}

impl CircuitError {
    /// True for errors raised by the numeric stage rather than by construction.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CircuitError::InvalidCircuit { .. } | CircuitError::DecompositionFailed
        )
    }
}
