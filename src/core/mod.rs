//! Core data structures for the build graph.
//!
//! This module contains the foundational types used throughout the
//! engine:
//! - Interned identifiers (Symbol-backed ModuleId)
//! - Variant axes and keys
//! - Module declarations and build settings
//! - Dependency tags

pub mod decl;
pub mod module;
pub mod module_id;
pub mod tags;
pub mod variant;

pub use decl::{BuildSettings, DeclFile, ModuleDecl, ModuleKind};
pub use module::{Stage, Variant};
pub use module_id::ModuleId;
pub use tags::DepTag;
pub use variant::{Arch, Axis, LinkMode, OsClass, VariantKey};
