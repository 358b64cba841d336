//! The variant mutation pipeline.
//!
//! Declarations enter as single unsplit variants and leave as a
//! settled population plus a resolved dependency graph. The pipeline
//! is strictly forward: split phases run first in a fixed order, each
//! over the fully-settled snapshot the previous phase produced, then
//! dependency phases emit edge requests against the final population.
//! No phase revisits an already-mutated module, and no module reads
//! another module's in-progress state, so per-module work inside a
//! phase is order-independent.
//!
//! Resolution failures are charged to the consuming module and leave
//! the rest of the graph intact; the failed variant survives as a node
//! (its resolved edges included) but is marked so assembly skips it.

pub mod deps;
pub mod split;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::core::{BuildSettings, ModuleDecl, ModuleId, Variant};
use crate::graph::{ErrorSink, GraphError, ModuleGraph};
use crate::util::Symbol;

pub use deps::{DepPhase, EdgeRequest};
pub use split::SplitPhase;

/// The settled result of running every phase.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Final population, keyed by identity.
    pub variants: BTreeMap<ModuleId, Variant>,
    /// Resolved dependency graph over the population.
    pub graph: ModuleGraph,
    /// Variants whose dependency resolution failed. They produce no
    /// build actions but do not block sibling modules.
    pub failed: BTreeSet<ModuleId>,
}

impl PipelineOutput {
    pub fn variant(&self, id: ModuleId) -> Option<&Variant> {
        self.variants.get(&id)
    }
}

/// Run the whole pipeline over a set of declarations.
pub fn run(
    decls: &[Arc<ModuleDecl>],
    settings: &BuildSettings,
    errors: &mut ErrorSink,
) -> PipelineOutput {
    let mut seen: BTreeSet<Symbol> = BTreeSet::new();
    let mut seed: Vec<Variant> = Vec::new();

    for decl in decls {
        let name = Symbol::intern(&decl.name);
        if !seen.insert(name) {
            errors.report(
                name,
                GraphError::PropertyValidation {
                    problem: format!(
                        "module `{}` is declared more than once; the first declaration wins",
                        decl.name
                    ),
                },
            );
            continue;
        }
        let problems = decl.validate();
        if !problems.is_empty() {
            for problem in problems {
                errors.report(name, GraphError::PropertyValidation { problem });
            }
            continue;
        }
        seed.push(Variant::declared(Arc::clone(decl)));
    }

    let population = split::run_splits(seed, settings);
    tracing::info!(
        modules = seen.len(),
        variants = population.len(),
        "population settled"
    );

    let mut by_name: BTreeMap<Symbol, Vec<ModuleId>> = BTreeMap::new();
    for variant in &population {
        by_name.entry(variant.name()).or_default().push(variant.id);
    }

    let mut graph = ModuleGraph::new();
    for variant in &population {
        graph.add_variant(variant.id);
    }

    let mut failed: BTreeSet<ModuleId> = BTreeSet::new();
    for request in deps::run_dep_phases(&population, settings) {
        match deps::resolve_request(&request, &by_name) {
            Ok(to) => graph.add_edge(request.from, to, request.tag),
            Err(err) => {
                failed.insert(request.from);
                errors.report(request.from.name(), err);
            }
        }
    }

    let variants: BTreeMap<ModuleId, Variant> =
        population.into_iter().map(|v| (v.id, v)).collect();

    PipelineOutput {
        variants,
        graph,
        failed,
    }
}
