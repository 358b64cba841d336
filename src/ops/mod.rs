//! High-level operations.
//!
//! This module contains the implementation of drydock commands. Each
//! operation takes a plain options struct and returns a report the
//! caller can format or serialize.

pub mod eval;
pub mod graph;

pub use eval::{eval, EvalOptions, EvalReport};
pub use graph::{format_graph, graph, DepEntry, GraphOptions, GraphReport, VariantEntry};
