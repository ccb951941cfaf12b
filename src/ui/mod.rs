//! Terminal screens.

pub mod error;
pub mod listen;
