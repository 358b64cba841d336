//! Variant-level dependency graph.
//!
//! Once the mutator pipeline has produced the final variant population
//! and resolved every declared edge, the result is frozen into a
//! [`ModuleGraph`]: nodes are [`ModuleId`]s, edges carry the
//! [`DepTag`] they were declared under. The graph answers the two
//! questions assembly needs: what does a variant consume, and in what
//! order can variants be assembled.

pub mod errors;

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::core::{DepTag, ModuleId};
use crate::util::Symbol;

pub use errors::{ErrorRecord, ErrorSink, GraphError};

/// Immutable dependency graph over finalized variants.
///
/// Edges point from consumer to producer: `a -> b` means `a` depends
/// on `b`, so `b` assembles first.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    graph: DiGraph<ModuleId, DepTag>,
    id_to_node: HashMap<ModuleId, NodeIndex>,
    by_name: BTreeMap<Symbol, Vec<ModuleId>>,
}

impl ModuleGraph {
    pub fn new() -> ModuleGraph {
        ModuleGraph::default()
    }

    /// Add a variant node. Returns false if it was already present.
    pub fn add_variant(&mut self, id: ModuleId) -> bool {
        if self.id_to_node.contains_key(&id) {
            return false;
        }
        let node = self.graph.add_node(id);
        self.id_to_node.insert(id, node);
        self.by_name.entry(id.name()).or_default().push(id);
        true
    }

    /// Add a tagged edge from consumer to producer.
    ///
    /// The same pair may be connected under several tags (an app can
    /// both classpath-depend on and embed the same library); an exact
    /// (from, to, tag) duplicate is dropped.
    pub fn add_edge(&mut self, from: ModuleId, to: ModuleId, tag: DepTag) {
        let (Some(&a), Some(&b)) = (self.id_to_node.get(&from), self.id_to_node.get(&to)) else {
            return;
        };
        let duplicate = self
            .graph
            .edges_connecting(a, b)
            .any(|edge| *edge.weight() == tag);
        if !duplicate {
            self.graph.add_edge(a, b, tag);
        }
    }

    pub fn contains(&self, id: ModuleId) -> bool {
        self.id_to_node.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All variants of a module name, in insertion order.
    pub fn variants_of(&self, name: Symbol) -> &[ModuleId] {
        self.by_name.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every variant in the graph, sorted by (name, variant).
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.graph.node_weights().copied().collect();
        ids.sort();
        ids
    }

    /// Direct dependencies of a variant, sorted for stable iteration.
    pub fn deps(&self, id: ModuleId) -> Vec<(ModuleId, DepTag)> {
        self.edges_in_direction(id, Direction::Outgoing)
    }

    /// Direct dependents of a variant, sorted for stable iteration.
    pub fn dependents(&self, id: ModuleId) -> Vec<(ModuleId, DepTag)> {
        self.edges_in_direction(id, Direction::Incoming)
    }

    /// Dependencies of `id` carrying a specific tag.
    pub fn deps_tagged(&self, id: ModuleId, tag: DepTag) -> Vec<ModuleId> {
        self.deps(id)
            .into_iter()
            .filter(|(_, t)| *t == tag)
            .map(|(dep, _)| dep)
            .collect()
    }

    fn edges_in_direction(&self, id: ModuleId, dir: Direction) -> Vec<(ModuleId, DepTag)> {
        let Some(&node) = self.id_to_node.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<(ModuleId, DepTag)> = self
            .graph
            .edges_directed(node, dir)
            .map(|edge| {
                let other = match dir {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (self.graph[other], *edge.weight())
            })
            .collect();
        out.sort();
        out
    }

    /// Variants on at least one cycle, sorted by (name, variant).
    pub fn cycle_members(&self) -> Vec<ModuleId> {
        let mut members = Vec::new();
        for scc in tarjan_scc(&self.graph) {
            let cyclic = scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&n| self.graph.edges_connecting(n, n).next().is_some());
            if cyclic {
                members.extend(scc.into_iter().map(|n| self.graph[n]));
            }
        }
        members.sort();
        members
    }

    /// Group variants into assembly waves.
    ///
    /// Wave 0 holds variants with no dependencies; wave n holds
    /// variants whose deepest dependency sits in wave n-1. Variants in
    /// one wave never depend on each other, so a wave can assemble in
    /// parallel. Cycle members (and anything downstream of them) are
    /// excluded and returned separately so that broken modules fail
    /// without blocking the rest of the population.
    pub fn assembly_waves(&self) -> AssemblyPlan {
        let cycle: HashSet<ModuleId> = self.cycle_members().into_iter().collect();

        // Kahn's algorithm over outgoing edges: a node is ready once
        // every producer it consumes has been placed in a wave. Edges
        // into cycle members count as satisfied, matching the rule
        // that a failed producer's outputs are simply absent.
        let mut remaining: HashMap<ModuleId, usize> = HashMap::new();
        for id in self.graph.node_weights() {
            if cycle.contains(id) {
                continue;
            }
            let pending = self
                .deps(*id)
                .into_iter()
                .filter(|(dep, _)| !cycle.contains(dep))
                .map(|(dep, _)| dep)
                .collect::<HashSet<_>>()
                .len();
            remaining.insert(*id, pending);
        }

        let mut waves: Vec<Vec<ModuleId>> = Vec::new();
        let mut placed: HashSet<ModuleId> = HashSet::new();
        loop {
            let mut ready: Vec<ModuleId> = remaining
                .iter()
                .filter(|(id, pending)| **pending == 0 && !placed.contains(*id))
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort();
            for id in &ready {
                placed.insert(*id);
                // A pair connected under several tags still counts as
                // one pending producer, so release each dependent once.
                let dependents: HashSet<ModuleId> = self
                    .dependents(*id)
                    .into_iter()
                    .map(|(dependent, _)| dependent)
                    .collect();
                for dependent in dependents {
                    if let Some(pending) = remaining.get_mut(&dependent) {
                        *pending = pending.saturating_sub(1);
                    }
                }
            }
            waves.push(ready);
        }

        let mut blocked = self.cycle_members();
        blocked.extend(
            remaining
                .keys()
                .filter(|id| !placed.contains(id))
                .copied(),
        );
        blocked.sort();
        blocked.dedup();

        AssemblyPlan { waves, blocked }
    }

    /// Flat assembly order: producers before consumers.
    pub fn assembly_order(&self) -> Vec<ModuleId> {
        self.assembly_waves()
            .waves
            .into_iter()
            .flatten()
            .collect()
    }

    /// Transitive dependencies of a variant (excluding itself), sorted.
    pub fn transitive_deps(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut seen: HashSet<ModuleId> = HashSet::new();
        let mut stack: Vec<ModuleId> = self.deps(id).into_iter().map(|(dep, _)| dep).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.deps(next).into_iter().map(|(dep, _)| dep));
            }
        }
        let mut out: Vec<ModuleId> = seen.into_iter().collect();
        out.sort();
        out
    }
}

/// Result of planning assembly over a possibly-cyclic graph.
#[derive(Debug)]
pub struct AssemblyPlan {
    /// Parallelizable waves, producers before consumers.
    pub waves: Vec<Vec<ModuleId>>,
    /// Variants that cannot be ordered because they sit on or behind a
    /// dependency cycle.
    pub blocked: Vec<ModuleId>,
}

impl AssemblyPlan {
    pub fn is_complete(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VariantKey;

    fn id(name: &str) -> ModuleId {
        ModuleId::new(Symbol::intern(name), VariantKey::empty())
    }

    fn graph_of(edges: &[(&str, &str, DepTag)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (from, to, _) in edges {
            graph.add_variant(id(from));
            graph.add_variant(id(to));
        }
        for (from, to, tag) in edges {
            graph.add_edge(id(from), id(to), *tag);
        }
        graph
    }

    #[test]
    fn test_add_and_query() {
        let graph = graph_of(&[
            ("app", "libcore", DepTag::Link),
            ("app", "libjni", DepTag::EmbeddedNative),
            ("libjni", "libcore", DepTag::Link),
        ]);

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.deps(id("app")).len(), 2);
        assert_eq!(graph.dependents(id("libcore")).len(), 2);
        assert_eq!(
            graph.deps_tagged(id("app"), DepTag::EmbeddedNative),
            vec![id("libjni")]
        );
    }

    #[test]
    fn test_duplicate_edges_collapse_per_tag() {
        let mut graph = ModuleGraph::new();
        graph.add_variant(id("a"));
        graph.add_variant(id("b"));
        graph.add_edge(id("a"), id("b"), DepTag::Link);
        graph.add_edge(id("a"), id("b"), DepTag::Link);
        graph.add_edge(id("a"), id("b"), DepTag::ClasspathOnly);

        assert_eq!(graph.deps(id("a")).len(), 2);
    }

    #[test]
    fn test_waves_put_producers_first() {
        let graph = graph_of(&[
            ("app", "libjni", DepTag::EmbeddedNative),
            ("libjni", "libcore", DepTag::Link),
            ("other", "libcore", DepTag::Link),
        ]);

        let plan = graph.assembly_waves();
        assert!(plan.is_complete());
        assert_eq!(plan.waves[0], vec![id("libcore")]);
        assert_eq!(plan.waves[1], vec![id("libjni"), id("other")]);
        assert_eq!(plan.waves[2], vec![id("app")]);

        let order = graph.assembly_order();
        let pos =
            |m: ModuleId| order.iter().position(|x| *x == m).unwrap();
        assert!(pos(id("libcore")) < pos(id("libjni")));
        assert!(pos(id("libjni")) < pos(id("app")));
    }

    #[test]
    fn test_waves_release_a_dual_tagged_producer_once() {
        // top reaches base under two tags; one placement of base must
        // not count twice, or top would jump ahead of helper.
        let graph = graph_of(&[
            ("top", "base", DepTag::Link),
            ("top", "base", DepTag::ClasspathOnly),
            ("top", "helper", DepTag::Link),
            ("helper", "base", DepTag::Link),
        ]);

        let plan = graph.assembly_waves();
        assert!(plan.is_complete());
        assert_eq!(
            plan.waves,
            vec![vec![id("base")], vec![id("helper")], vec![id("top")]]
        );
    }

    #[test]
    fn test_cycle_members_detected() {
        let graph = graph_of(&[
            ("a", "b", DepTag::Link),
            ("b", "c", DepTag::Link),
            ("c", "a", DepTag::Link),
            ("standalone", "a", DepTag::Link),
        ]);

        assert_eq!(graph.cycle_members(), vec![id("a"), id("b"), id("c")]);

        let plan = graph.assembly_waves();
        // standalone depends only on a cycle member; the absent-output
        // rule lets it assemble anyway.
        assert_eq!(plan.waves, vec![vec![id("standalone")]]);
        assert_eq!(plan.blocked, vec![id("a"), id("b"), id("c")]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let graph = graph_of(&[("selfish", "selfish", DepTag::Link)]);
        assert_eq!(graph.cycle_members(), vec![id("selfish")]);
    }

    #[test]
    fn test_transitive_deps() {
        let graph = graph_of(&[
            ("app", "libjni", DepTag::EmbeddedNative),
            ("libjni", "libcore", DepTag::Link),
            ("libcore", "libbase", DepTag::StaticLink),
        ]);

        assert_eq!(
            graph.transitive_deps(id("app")),
            vec![id("libbase"), id("libcore"), id("libjni")]
        );
        assert!(graph.transitive_deps(id("libbase")).is_empty());
    }
}
