//! Request handlers.

pub mod filters;
pub mod health;

pub use filters::*;
pub use health::*;
