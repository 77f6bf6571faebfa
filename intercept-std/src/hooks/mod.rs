//! Ready-made hook closures.

pub mod logging;
