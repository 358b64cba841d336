//! One full evaluation run: declarations in, generated build files out.
//!
//! `eval` drives the engine end to end. It loads a declaration file,
//! runs the mutator pipeline to settle the variant population and its
//! dependency graph, assembles build statements wave by wave over a
//! worker pool, then registers everything into a single [`ActionSet`]
//! and writes the generated files.
//!
//! Failure handling follows one rule throughout: a module that fails
//! produces errors and nothing else, and its siblings keep going. The
//! lone exception is a duplicate output claim, which makes the whole
//! graph untrustworthy; evaluation then halts before writing anything.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::actions::{
    aggregate_statements, emit, module_phonies, ActionSet, AssembledModule, Assembler,
    BuildStatement, ModuleOutputs,
};
use crate::core::{BuildSettings, DeclFile, ModuleDecl, ModuleId, Stage};
use crate::graph::{AssemblyPlan, ErrorRecord, ErrorSink, GraphError, ModuleGraph};
use crate::mutator::{self, PipelineOutput};
use crate::paths::{Layout, Observations};
use crate::util::diagnostic::Diagnostic;
use crate::util::Symbol;

/// Options for an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Declaration file to evaluate.
    pub decl_file: PathBuf,

    /// Source tree root. Defaults to the declaration file's directory.
    pub source_root: Option<PathBuf>,

    /// Root of the generated output tree.
    pub out_dir: PathBuf,

    /// Assembly worker threads. `None` lets the pool pick.
    pub jobs: Option<usize>,

    /// Write the generated files. Off for check-only runs.
    pub emit: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            decl_file: PathBuf::from("build.toml"),
            source_root: None,
            out_dir: PathBuf::from("out"),
            jobs: None,
            emit: true,
        }
    }
}

/// What an evaluation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    /// Modules in the declaration file.
    pub modules: usize,

    /// Variants after splitting.
    pub variants: usize,

    /// Registered build statements. Zero when evaluation halted.
    pub statements: usize,

    /// Install mapping entries across all published modules.
    pub installs: usize,

    /// Content digest of the registered statement graph.
    pub digest: Option<String>,

    /// Furthest stage each variant reached, keyed by display name.
    /// Declarations that never produced a variant appear under their
    /// bare name at [`Stage::Declared`].
    pub stages: BTreeMap<String, Stage>,

    /// Every error reported, in module-name order.
    pub errors: Vec<ErrorRecord>,

    /// Rendered diagnostics for terminal display, parallel to
    /// `errors`. Skipped in JSON output.
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,

    /// A fatal error halted evaluation before anything was written.
    pub halted: bool,
}

impl EvalReport {
    /// Whether any module failed. The process exit code keys off this,
    /// even when the run still wrote generated files.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Distinct modules that reported at least one error.
    pub fn failed_count(&self) -> usize {
        self.errors
            .iter()
            .map(|record| record.module.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Run a full evaluation.
pub fn eval(options: &EvalOptions) -> Result<EvalReport> {
    let file = DeclFile::load(&options.decl_file)?;
    let settings = file.settings.clone();
    let layout = layout_for(options, &settings);
    let decls = file.shared_modules();

    let mut errors = ErrorSink::new();
    let pipeline = mutator::run(&decls, &settings, &mut errors);
    let mut stages = seed_stages(&decls, &pipeline);

    let plan = pipeline.graph.assembly_waves();
    report_cycles(&pipeline.graph, &mut errors);

    let mut skip: BTreeSet<ModuleId> = pipeline.failed.clone();
    skip.extend(plan.blocked.iter().copied());

    let assembler = Assembler::new(&layout, &settings, &pipeline);
    let (assembled, published) = run_assembly(&assembler, &plan, &skip, options.jobs)?;

    let mut observations = Observations::new();
    let mut statements_by_id: BTreeMap<ModuleId, Vec<BuildStatement>> = BTreeMap::new();
    for module in assembled {
        let AssembledModule {
            id,
            statements,
            outputs,
            observations: probes,
            errors: module_errors,
        } = module;
        observations.merge(probes);
        for error in module_errors {
            errors.report(id.name(), error);
        }
        if outputs.is_some() {
            stages.insert(id.display_name(), Stage::Assembled);
            statements_by_id.insert(id, statements);
        }
    }

    // Registration runs in (name, variant) order after all waves have
    // settled, so collisions are detected deterministically no matter
    // how assembly was scheduled.
    let mut actions = ActionSet::new();
    let mut halted = !register_modules(&mut actions, &statements_by_id, &mut stages, &mut errors);

    if !halted {
        match aggregate_statements(&layout, &published) {
            Ok(aggregates) => {
                halted = !register_batch(&mut actions, aggregates, &mut errors);
            }
            Err(error) => {
                errors.report(Symbol::intern("aggregates"), error);
            }
        }
    }
    if !halted {
        halted = !register_batch(&mut actions, module_phonies(&published), &mut errors);
    }

    let digest = if halted {
        None
    } else {
        Some(emit::graph_digest(&actions))
    };

    if halted {
        tracing::warn!("fatal error; no build files will be written");
    } else if options.emit {
        emit::write_ninja(&layout.out_dir.join("build.ninja"), &actions)?;
        emit::write_statements(&layout.out_dir.join("build-statements.json"), &actions)?;
        emit::write_install_manifest(&layout.out_dir.join("install-manifest.json"), &published)?;
        emit::write_observations(&layout.out_dir.join("observations.json"), &observations)?;
        tracing::info!(
            statements = actions.len(),
            out = %layout.out_dir.display(),
            "wrote generated build files"
        );
    }

    let installs = published.values().map(|o| o.installs.len()).sum();
    let diagnostics = render_diagnostics(&errors);
    Ok(EvalReport {
        modules: file.modules.len(),
        variants: pipeline.variants.len(),
        statements: if halted { 0 } else { actions.len() },
        installs,
        digest,
        stages,
        errors: errors.records(),
        diagnostics,
        halted,
    })
}

fn render_diagnostics(errors: &ErrorSink) -> Vec<Diagnostic> {
    errors
        .iter()
        .flat_map(|(module, errs)| {
            errs.iter().map(move |error| {
                error
                    .to_diagnostic()
                    .with_context(format!("module `{}`", module))
            })
        })
        .collect()
}

fn layout_for(options: &EvalOptions, settings: &BuildSettings) -> Layout {
    let source_root = match &options.source_root {
        Some(root) => root.clone(),
        None => options
            .decl_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };
    Layout::new(source_root, options.out_dir.clone())
        .with_product(&settings.product)
        .with_host_os(&settings.host_os)
        .with_debug_install(settings.debug_install)
}

/// Initial stage map. Every settled variant has been through edge
/// resolution, so it rests at [`Stage::DepsResolved`] (a failed one
/// stays there, its errors in the sink); declarations that never made
/// it past validation appear under their bare name.
fn seed_stages(decls: &[Arc<ModuleDecl>], pipeline: &PipelineOutput) -> BTreeMap<String, Stage> {
    let mut stages = BTreeMap::new();
    for id in pipeline.variants.keys() {
        stages.insert(id.display_name(), Stage::DepsResolved);
    }
    for decl in decls {
        let name = Symbol::intern(&decl.name);
        if pipeline.graph.variants_of(name).is_empty() {
            stages.insert(decl.name.clone(), Stage::Declared);
        }
    }
    stages
}

/// Report every cycle member, each with the full member list so the
/// diagnostic reads the same from any participant.
fn report_cycles(graph: &ModuleGraph, errors: &mut ErrorSink) {
    let members = graph.cycle_members();
    if members.is_empty() {
        return;
    }
    let names: Vec<String> = members.iter().map(|id| id.display_name()).collect();
    for id in &members {
        errors.report(
            id.name(),
            GraphError::DependencyCycle {
                members: names.clone(),
            },
        );
    }
}

/// Assemble every unblocked variant, one wave at a time. Variants in a
/// wave run in parallel; outputs publish between waves so later waves
/// read a settled map.
fn run_assembly(
    assembler: &Assembler<'_>,
    plan: &AssemblyPlan,
    skip: &BTreeSet<ModuleId>,
    jobs: Option<usize>,
) -> Result<(Vec<AssembledModule>, BTreeMap<ModuleId, ModuleOutputs>)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("failed to start assembly worker pool")?;

    let mut assembled = Vec::new();
    let mut published: BTreeMap<ModuleId, ModuleOutputs> = BTreeMap::new();
    for wave in &plan.waves {
        let todo: Vec<ModuleId> = wave
            .iter()
            .filter(|id| !skip.contains(*id))
            .copied()
            .collect();
        let batch: Vec<AssembledModule> = pool.install(|| {
            todo.par_iter()
                .map(|id| assembler.assemble(*id, &published))
                .collect()
        });
        for module in &batch {
            if let Some(outputs) = &module.outputs {
                published.insert(module.id, outputs.clone());
            }
        }
        assembled.extend(batch);
    }
    Ok((assembled, published))
}

/// Register per-module statements in identity order, advancing each
/// fully-registered module to [`Stage::Published`]. Returns `false` on
/// the first fatal collision.
fn register_modules(
    actions: &mut ActionSet,
    statements_by_id: &BTreeMap<ModuleId, Vec<BuildStatement>>,
    stages: &mut BTreeMap<String, Stage>,
    errors: &mut ErrorSink,
) -> bool {
    for (id, statements) in statements_by_id {
        for statement in statements {
            if let Err(error) = actions.register(statement.clone()) {
                errors.report(id.name(), error);
                return false;
            }
        }
        stages.insert(id.display_name(), Stage::Published);
    }
    true
}

/// Register ownerless statements (aggregates, phony targets). Returns
/// `false` on the first fatal collision.
fn register_batch(
    actions: &mut ActionSet,
    statements: Vec<BuildStatement>,
    errors: &mut ErrorSink,
) -> bool {
    for statement in statements {
        let owner = statement_owner(&statement);
        if let Err(error) = actions.register(statement) {
            errors.report(owner, error);
            return false;
        }
    }
    true
}

fn statement_owner(statement: &BuildStatement) -> Symbol {
    match statement.module {
        Some(id) => id.name(),
        None => Symbol::intern(format!("<{}>", statement.rule)),
    }
}
