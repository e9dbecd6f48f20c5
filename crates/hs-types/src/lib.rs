//! # hs-types
//!
//! Core types for HyperSweep: parameter values and configurations, fixed
//! parameters, objectives, the search space model and the error hierarchy.

pub mod errors;
pub mod objective;
pub mod space;
pub mod values;

pub use errors::*;
pub use objective::*;
pub use space::*;
pub use values::*;
