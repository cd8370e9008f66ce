//! Type aliases shared across crates.
//!
//! - [`aliases`]: shared-state and callback aliases

pub mod aliases;

pub use aliases::*;
