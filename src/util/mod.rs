//! Shared utilities

pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod interning;

pub use diagnostic::Diagnostic;
pub use interning::Symbol;
