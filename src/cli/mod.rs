//! Command-line interface for the edge process

pub mod probe;
pub mod run;

pub use probe::*;
pub use run::*;
