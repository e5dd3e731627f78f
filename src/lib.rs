pub mod analysis;
pub mod circuit;
pub mod cli;
pub mod error;
pub mod mna;
pub mod parser;
pub mod report;
pub mod shell;
pub mod solver;

// Re-export commonly used types
pub use analysis::{MaxPower, PowerBalance};
pub use circuit::{Circuit, Element, ElementId, ElementKind, Node, NodeId, NOT_FOUND};
pub use error::{CircuitError, Result};
pub use mna::{Excitation, MnaSystem};
pub use parser::Deck;
pub use solver::{LinearSolver, SolverConfig, SolverMethod};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
