//! Drydock - a variant-aware build graph engine
//!
//! This crate turns a declarative module description into a concrete
//! build statement graph: modules are split into per-(os, arch, link)
//! variants, dependency edges are resolved between variants, and each
//! variant assembles validated-path build statements that are finally
//! registered into one deterministic action set and emitted.

pub mod actions;
pub mod core;
pub mod graph;
pub mod mutator;
pub mod ops;
pub mod paths;
pub mod util;

/// Shared fixtures for drydock unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It builds throwaway declaration sets and source
/// trees without touching anything outside a temp dir.
#[cfg(test)]
pub mod test_support;

pub use core::{
    decl::ModuleDecl, decl::ModuleKind, module::Variant, module_id::ModuleId, tags::DepTag,
    variant::VariantKey,
};

pub use graph::{ErrorSink, GraphError, ModuleGraph};
pub use paths::Layout;
