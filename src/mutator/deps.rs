//! Dependency phases: emit tagged edge requests and bind them to
//! concrete variants.
//!
//! A request names its target module and the variation constraints the
//! producer must satisfy. Ordinary requests stay inside the consumer's
//! own tuple (the consumer's key is the baseline, phase-declared
//! constraints override per axis); far requests ignore the consumer's
//! key entirely and match their declared constraints alone. A
//! constraint axis binds only when the candidate carries that axis, so
//! axis-free modules (signing keys) satisfy any constraint set.

use std::collections::BTreeMap;

use crate::core::{
    Axis, BuildSettings, DepTag, LinkMode, ModuleId, ModuleKind, OsClass, Variant, VariantKey,
};
use crate::graph::GraphError;
use crate::util::Symbol;

/// An unresolved edge emitted by a dependency phase.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    /// Consuming variant.
    pub from: ModuleId,
    /// Target module name (not yet bound to a variant).
    pub target: Symbol,
    pub tag: DepTag,
    /// Axes the producer must agree on, beyond (for ordinary edges)
    /// the consumer's own tuple.
    pub constraints: VariantKey,
}

impl EdgeRequest {
    fn new(from: ModuleId, target: &str, tag: DepTag) -> EdgeRequest {
        EdgeRequest {
            from,
            target: Symbol::intern(target),
            tag,
            constraints: VariantKey::empty(),
        }
    }

    fn with_constraints(mut self, constraints: VariantKey) -> EdgeRequest {
        self.constraints = constraints;
        self
    }

    /// The full constraint set this request resolves under.
    pub fn effective_constraints(&self) -> VariantKey {
        if self.tag.is_far() {
            return self.constraints.clone();
        }
        let mut merged = self.from.variant().clone();
        for (axis, value) in self.constraints.iter() {
            merged.set(*axis, *value);
        }
        merged
    }
}

/// One edge-emitting phase.
pub trait DepPhase {
    fn name(&self) -> &'static str;

    fn requests(&self, variant: &Variant, settings: &BuildSettings) -> Vec<EdgeRequest>;
}

/// The fixed dependency phase order.
pub fn phases() -> Vec<Box<dyn DepPhase>> {
    vec![
        Box::new(DeclaredDeps),
        Box::new(EmbeddedNativeDeps),
        Box::new(HostToolDeps),
        Box::new(CertificateDeps),
    ]
}

/// Edges written out explicitly in the declaration: `deps`,
/// `static-deps`, and `classpath-libs`.
pub struct DeclaredDeps;

impl DepPhase for DeclaredDeps {
    fn name(&self) -> &'static str {
        "declared-deps"
    }

    fn requests(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<EdgeRequest> {
        let decl = &variant.decl;
        let mut out = Vec::new();
        for dep in &decl.deps {
            out.push(EdgeRequest::new(variant.id, dep, DepTag::Link));
        }
        for dep in &decl.static_deps {
            // Static linking consumes the producer's static flavor no
            // matter which flavor the consumer is.
            out.push(
                EdgeRequest::new(variant.id, dep, DepTag::StaticLink).with_constraints(
                    VariantKey::empty().with(Axis::Link, LinkMode::Static),
                ),
            );
        }
        for dep in &decl.classpath_libs {
            out.push(EdgeRequest::new(variant.id, dep, DepTag::ClasspathOnly));
        }
        out
    }
}

/// Far edges from an app to the shared device flavor of each native
/// library it packages, one per configured device arch.
pub struct EmbeddedNativeDeps;

impl DepPhase for EmbeddedNativeDeps {
    fn name(&self) -> &'static str {
        "embedded-native-deps"
    }

    fn requests(&self, variant: &Variant, settings: &BuildSettings) -> Vec<EdgeRequest> {
        let decl = &variant.decl;
        if decl.kind != ModuleKind::App || decl.embed_native_libs.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for lib in &decl.embed_native_libs {
            for arch in &settings.device_arches {
                out.push(
                    EdgeRequest::new(variant.id, lib, DepTag::EmbeddedNative).with_constraints(
                        VariantKey::empty()
                            .with(Axis::Os, OsClass::Device)
                            .with(Axis::Arch, *arch)
                            .with(Axis::Link, LinkMode::Shared),
                    ),
                );
            }
        }
        out
    }
}

/// Far edges to host-built tools, regardless of the consumer's own OS
/// class.
pub struct HostToolDeps;

impl DepPhase for HostToolDeps {
    fn name(&self) -> &'static str {
        "host-tool-deps"
    }

    fn requests(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<EdgeRequest> {
        variant
            .decl
            .host_tools
            .iter()
            .map(|tool| {
                EdgeRequest::new(variant.id, tool, DepTag::HostTool).with_constraints(
                    VariantKey::empty().with(Axis::Os, OsClass::Host),
                )
            })
            .collect()
    }
}

/// Edges from an app to the signing-key modules its certificate
/// properties reference by `:name`.
pub struct CertificateDeps;

impl DepPhase for CertificateDeps {
    fn name(&self) -> &'static str {
        "certificate-deps"
    }

    fn requests(&self, variant: &Variant, _settings: &BuildSettings) -> Vec<EdgeRequest> {
        let decl = &variant.decl;
        if decl.kind != ModuleKind::App {
            return Vec::new();
        }
        let mut out = Vec::new();
        if let Some(reference) = decl.certificate.as_deref().and_then(key_reference) {
            out.push(EdgeRequest::new(variant.id, reference, DepTag::Certificate));
        }
        for extra in &decl.additional_certificates {
            if let Some(reference) = key_reference(extra) {
                out.push(EdgeRequest::new(variant.id, reference, DepTag::Certificate));
            }
        }
        out
    }
}

/// `":name"` references a signing-key module; anything else is a file
/// stem resolved against the default key directory.
pub fn key_reference(certificate: &str) -> Option<&str> {
    certificate.strip_prefix(':')
}

/// Whether a candidate tuple satisfies a constraint set: every axis
/// both sides carry must agree; axes carried by one side only impose
/// nothing.
pub fn key_matches(candidate: &VariantKey, constraints: &VariantKey) -> bool {
    constraints.iter().all(|(axis, want)| {
        candidate.get(axis).map_or(true, |have| have == *want)
    })
}

/// Human-readable constraint set for error reports.
pub fn describe_constraints(key: &VariantKey) -> String {
    if key.is_empty() {
        return "unconstrained".to_string();
    }
    key.iter()
        .map(|(axis, value)| format!("{}={}", axis, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bind one request to exactly one variant of its target.
pub fn resolve_request(
    request: &EdgeRequest,
    by_name: &BTreeMap<Symbol, Vec<ModuleId>>,
) -> Result<ModuleId, GraphError> {
    let constraints = request.effective_constraints();
    let candidates = by_name
        .get(&request.target)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let matched: Vec<ModuleId> = candidates
        .iter()
        .filter(|id| key_matches(id.variant(), &constraints))
        .copied()
        .collect();

    match matched.as_slice() {
        [unique] => Ok(*unique),
        [] => Err(GraphError::MissingDependency {
            name: request.target.to_string(),
            tag: request.tag,
            constraints: describe_constraints(&constraints),
        }),
        many => Err(GraphError::AmbiguousDependency {
            name: request.target.to_string(),
            tag: request.tag,
            constraints: describe_constraints(&constraints),
            candidates: many.iter().map(|id| id.variant().render()).collect(),
        }),
    }
}

/// Run every dependency phase over a settled population snapshot.
pub fn run_dep_phases(population: &[Variant], settings: &BuildSettings) -> Vec<EdgeRequest> {
    let mut requests = Vec::new();
    for phase in phases() {
        let before = requests.len();
        for variant in population {
            requests.extend(phase.requests(variant, settings));
        }
        tracing::debug!(
            phase = phase.name(),
            emitted = requests.len() - before,
            "dependency phase done"
        );
    }
    requests
}
