//! Per-variant build action assembly.
//!
//! Assembly runs once per finalized variant, after every dependency of
//! that variant has itself been assembled. It reads only the variant's
//! own declaration and the published outputs of its dependencies; a
//! dependency that failed publishes nothing and its outputs are simply
//! absent here, so one broken producer never cascades into consumer
//! errors of its own.

use std::collections::BTreeMap;

use crate::core::{
    Arch, Axis, BuildSettings, DepTag, LinkMode, ModuleDecl, ModuleId, ModuleKind, OsClass,
};
use crate::graph::GraphError;
use crate::mutator::PipelineOutput;
use crate::paths::{
    expand_sources, first_unique_paths, install_path, last_unique_paths, AnyPath, InstallSpec,
    Layout, ModuleScope, Observations, OutputPath, PhonyPath, SourcePath,
};
use crate::util::Symbol;

use super::statement::{BuildStatement, Rule};

/// Everything one variant publishes for its consumers and for
/// whole-graph aggregation.
#[derive(Debug, Clone, Default)]
pub struct ModuleOutputs {
    /// Primary artifact (jar, native library, or app package).
    pub artifact: Option<OutputPath>,
    /// Flag files exported to dependents: the module's own plus those
    /// folded in from its static dependencies, first occurrence wins.
    pub exported_flags: Vec<AnyPath>,
    /// Certificate pair published by signing-key modules.
    pub key_pair: Option<KeyPair>,
    /// Files staged into the install image.
    pub installs: Vec<InstallEntry>,
    /// Contribution to the boot image, if any.
    pub boot_jar: Option<OutputPath>,
}

/// A signing certificate pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: SourcePath,
    pub private_key: SourcePath,
}

/// One staged install: where a built artifact lands in the image.
#[derive(Debug, Clone)]
pub struct InstallEntry {
    pub source: AnyPath,
    pub dest: OutputPath,
}

/// The result of assembling one variant.
#[derive(Debug)]
pub struct AssembledModule {
    pub id: ModuleId,
    pub statements: Vec<BuildStatement>,
    /// `None` when assembly failed; nothing is published then.
    pub outputs: Option<ModuleOutputs>,
    /// Filesystem probes made during assembly. Kept even on failure so
    /// a later change on disk retriggers evaluation.
    pub observations: Observations,
    pub errors: Vec<GraphError>,
}

struct ModuleCtx<'a> {
    id: ModuleId,
    decl: &'a ModuleDecl,
    scope: ModuleScope<'a>,
    obs: Observations,
    statements: Vec<BuildStatement>,
    outputs: ModuleOutputs,
}

/// Assembles build statements for single variants.
pub struct Assembler<'a> {
    layout: &'a Layout,
    settings: &'a BuildSettings,
    pipeline: &'a PipelineOutput,
}

impl<'a> Assembler<'a> {
    pub fn new(
        layout: &'a Layout,
        settings: &'a BuildSettings,
        pipeline: &'a PipelineOutput,
    ) -> Assembler<'a> {
        Assembler {
            layout,
            settings,
            pipeline,
        }
    }

    /// Assemble one variant against already-published dependency
    /// outputs.
    pub fn assemble(
        &self,
        id: ModuleId,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> AssembledModule {
        let Some(variant) = self.pipeline.variant(id) else {
            return AssembledModule {
                id,
                statements: Vec::new(),
                outputs: None,
                observations: Observations::new(),
                errors: Vec::new(),
            };
        };
        let decl = variant.decl.as_ref();
        let mut cx = ModuleCtx {
            id,
            decl,
            scope: ModuleScope::new(self.layout, &decl.dir, &decl.name, id.variant().render()),
            obs: Observations::new(),
            statements: Vec::new(),
            outputs: ModuleOutputs::default(),
        };

        let result = match decl.kind {
            ModuleKind::JavaLibrary => self.assemble_java(&mut cx, published),
            ModuleKind::NativeLibrary => self.assemble_native(&mut cx, published),
            ModuleKind::App => self.assemble_app(&mut cx, published),
            ModuleKind::SigningKey => self.assemble_key(&mut cx),
        };

        match result {
            Ok(()) => {
                self.finish_installs(&mut cx);
                AssembledModule {
                    id,
                    statements: cx.statements,
                    outputs: Some(cx.outputs),
                    observations: cx.obs,
                    errors: Vec::new(),
                }
            }
            Err(err) => AssembledModule {
                id,
                statements: Vec::new(),
                outputs: None,
                observations: cx.obs,
                errors: vec![err],
            },
        }
    }

    fn assemble_java(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<(), GraphError> {
        let sources = expand_sources(self.layout, &mut cx.obs, &cx.decl.dir, &cx.decl.sources)?;
        self.warn_if_sourceless(cx, &sources);
        let flags = self.exported_flag_files(cx, published)?;
        let classpath = self.classpath_jars(cx, published);
        let tools = self.host_tool_artifacts(cx, published);

        let jar_name = format!("{}.jar", cx.decl.name);
        let jar = cx.scope.out(&[&jar_name])?;

        let mut statement = BuildStatement::new(
            Some(cx.id),
            Rule::Javac,
            format!("javac {}", cx.id.display_name()),
        )
        .inputs(sources.into_iter().map(AnyPath::from))
        .implicits(classpath.iter().cloned().map(AnyPath::from))
        .implicits(tools)
        .implicits(flags.iter().cloned())
        .output(jar.clone());
        if !classpath.is_empty() {
            statement = statement.arg("classpath", join_paths(&classpath, ":"));
        }
        if !flags.is_empty() {
            statement = statement.arg("flags", flag_args(&flags));
        }
        cx.statements.push(statement);

        let jar = jar.into_output();
        if cx.decl.boot_member && cx.id.variant().os() == Some(OsClass::Device) {
            cx.outputs.boot_jar = Some(jar.clone());
        }
        if cx.decl.installable() {
            let spec = match cx.id.variant().os() {
                Some(OsClass::Host) => InstallSpec::host(),
                _ => self.device_spec(cx),
            };
            self.add_install(cx, &spec, &["framework", &jar_name], jar.clone())?;
        }
        cx.outputs.artifact = Some(jar);
        cx.outputs.exported_flags = flags;
        Ok(())
    }

    fn assemble_native(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<(), GraphError> {
        let sources = expand_sources(self.layout, &mut cx.obs, &cx.decl.dir, &cx.decl.sources)?;
        self.warn_if_sourceless(cx, &sources);
        let flags = self.exported_flag_files(cx, published)?;
        let link = cx.id.variant().link().unwrap_or(LinkMode::Shared);
        let shared_libs = self.dep_artifacts(cx, published, DepTag::Link, ModuleKind::NativeLibrary);
        let static_libs =
            self.dep_artifacts(cx, published, DepTag::StaticLink, ModuleKind::NativeLibrary);
        let tools = self.host_tool_artifacts(cx, published);

        let file = match link {
            LinkMode::Shared => format!("{}.so", cx.decl.name),
            LinkMode::Static => format!("{}.a", cx.decl.name),
        };
        let artifact = cx.scope.out(&[&file])?;

        let mut statement = BuildStatement::new(
            Some(cx.id),
            Rule::Cc,
            format!("cc {}", cx.id.display_name()),
        )
        .inputs(sources.into_iter().map(AnyPath::from))
        .implicits(shared_libs.iter().cloned().map(AnyPath::from))
        .implicits(static_libs.iter().cloned().map(AnyPath::from))
        .implicits(tools)
        .implicits(flags.iter().cloned())
        .output(artifact.clone())
        .arg("mode", link.as_str());
        if self.is_sanitized(cx.id) {
            statement = statement.arg("sanitize", "address");
        }
        // A library listed under both `deps` and `static-deps` binds the
        // same static flavor twice; the link line keeps the last mention.
        let libs = last_unique_paths(
            shared_libs
                .iter()
                .chain(&static_libs)
                .cloned()
                .collect::<Vec<OutputPath>>(),
        );
        if !libs.is_empty() {
            statement = statement.arg("libs", join_paths(&libs, " "));
        }
        if !flags.is_empty() {
            statement = statement.arg("flags", flag_args(&flags));
        }
        cx.statements.push(statement);

        let artifact = artifact.into_output();
        if link == LinkMode::Shared && cx.decl.installable() {
            match cx.id.variant().os() {
                Some(OsClass::Host) => {
                    let spec = InstallSpec::host();
                    self.add_install(cx, &spec, &["lib", &file], artifact.clone())?;
                }
                _ => {
                    let spec = self.device_spec(cx);
                    let lib_dir = cx.id.variant().arch().unwrap_or(Arch::Common).lib_dir();
                    self.add_install(cx, &spec, &[lib_dir, &file], artifact.clone())?;
                }
            }
        }
        cx.outputs.artifact = Some(artifact);
        cx.outputs.exported_flags = flags;
        Ok(())
    }

    fn assemble_app(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<(), GraphError> {
        let sources = expand_sources(self.layout, &mut cx.obs, &cx.decl.dir, &cx.decl.sources)?;
        self.warn_if_sourceless(cx, &sources);
        let flags = self.exported_flag_files(cx, published)?;
        let classpath = self.classpath_jars(cx, published);
        let tools = self.host_tool_artifacts(cx, published);

        let classes_jar = cx.scope.out(&["classes.jar"])?;
        let mut compile = BuildStatement::new(
            Some(cx.id),
            Rule::Javac,
            format!("javac {}", cx.id.display_name()),
        )
        .inputs(sources.into_iter().map(AnyPath::from))
        .implicits(classpath.iter().cloned().map(AnyPath::from))
        .implicits(tools)
        .output(classes_jar.clone());
        if !classpath.is_empty() {
            compile = compile.arg("classpath", join_paths(&classpath, ":"));
        }
        cx.statements.push(compile);

        let dex = cx.scope.out(&["classes.dex"])?;
        let mut dex_statement = BuildStatement::new(
            Some(cx.id),
            Rule::Dex,
            format!("dex {}", cx.id.display_name()),
        )
        .input(classes_jar)
        .implicits(flags.iter().cloned())
        .output(dex.clone());
        if !flags.is_empty() {
            dex_statement = dex_statement.arg("flags", flag_args(&flags));
        }
        cx.statements.push(dex_statement);

        let jni_zip = self.package_native_libs(cx, published)?;

        let certificates = self.resolve_certificates(cx, published)?;
        let apk_name = format!("{}.apk", cx.decl.name);
        let apk = cx.scope.out(&[&apk_name])?;
        let mut package = BuildStatement::new(
            Some(cx.id),
            Rule::PackageApp,
            format!("package {}", cx.id.display_name()),
        )
        .input(dex);
        if let Some(zip) = jni_zip {
            package = package.input(zip);
        }
        for pair in &certificates {
            package = package
                .implicit(pair.public_key.clone())
                .implicit(pair.private_key.clone());
        }
        package = package
            .arg("certificates", certificate_args(&certificates))
            .output(apk.clone());
        cx.statements.push(package);

        let bundle = cx.scope.out(&["base.zip"])?;
        cx.statements.push(
            BuildStatement::new(
                Some(cx.id),
                Rule::Bundle,
                format!("bundle {}", cx.id.display_name()),
            )
            .input(apk.clone())
            .output(bundle),
        );

        let apk = apk.into_output();
        if cx.decl.installable() {
            let app_dir = if cx.decl.privileged { "priv-app" } else { "app" };
            let spec = self.device_spec(cx);
            self.add_install(cx, &spec, &[app_dir, &cx.decl.name, &apk_name], apk.clone())?;
        }
        cx.outputs.artifact = Some(apk);
        cx.outputs.exported_flags = flags;
        Ok(())
    }

    fn assemble_key(&self, cx: &mut ModuleCtx) -> Result<(), GraphError> {
        // validate() guarantees both fields are present.
        let public_file = cx.decl.public_key.clone().unwrap_or_default();
        let private_file = cx.decl.private_key.clone().unwrap_or_default();

        let public_stem = public_file.strip_suffix(".x509.pem").ok_or_else(|| {
            GraphError::PropertyValidation {
                problem: format!("`public-key` `{}` must end in `.x509.pem`", public_file),
            }
        })?;
        let private_stem = private_file.strip_suffix(".pk8").ok_or_else(|| {
            GraphError::PropertyValidation {
                problem: format!("`private-key` `{}` must end in `.pk8`", private_file),
            }
        })?;
        if public_stem != private_stem {
            return Err(GraphError::PropertyValidation {
                problem: format!(
                    "key pair stems differ: `{}` vs `{}`",
                    public_stem, private_stem
                ),
            });
        }

        let public_key = self.locate_key_file(cx, &public_file)?;
        let private_key = self.locate_key_file(cx, &private_file)?;

        if cx.decl.installable() {
            let spec = self.device_spec(cx);
            self.add_install(
                cx,
                &spec,
                &["etc", "security", &public_file],
                public_key.clone(),
            )?;
        }
        cx.outputs.key_pair = Some(KeyPair {
            public_key,
            private_key,
        });
        Ok(())
    }

    /// Look the file up in the configured key directory first, then
    /// fall back to the module's own directory.
    fn locate_key_file(&self, cx: &mut ModuleCtx, file: &str) -> Result<SourcePath, GraphError> {
        if let Some(found) = SourcePath::new_maybe_missing(
            self.layout,
            &mut cx.obs,
            &self.settings.default_key_dir,
            &[file],
        )? {
            return Ok(found);
        }
        Ok(SourcePath::new(
            self.layout,
            &mut cx.obs,
            &cx.decl.dir,
            &[file],
        )?)
    }

    /// Resolve the app's signing certificates, primary first.
    fn resolve_certificates(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<Vec<KeyPair>, GraphError> {
        let referenced: BTreeMap<Symbol, ModuleId> = self
            .pipeline
            .graph
            .deps_tagged(cx.id, DepTag::Certificate)
            .into_iter()
            .map(|dep| (dep.name(), dep))
            .collect();
        let lookup = |name: &str| -> Option<KeyPair> {
            referenced
                .get(&Symbol::intern(name))
                .and_then(|dep| published.get(dep))
                .and_then(|outputs| outputs.key_pair.clone())
        };

        let mut pairs: Vec<KeyPair> = Vec::new();
        match cx.decl.certificate.as_deref() {
            Some(reference) => match reference.strip_prefix(':') {
                Some(module) => pairs.extend(lookup(module)),
                None => pairs.push(self.stem_pair(cx, reference)?),
            },
            None => {
                let stem = self.settings.default_certificate.clone();
                pairs.push(self.stem_pair(cx, &stem)?);
            }
        }
        for extra in &cx.decl.additional_certificates {
            if let Some(module) = extra.strip_prefix(':') {
                pairs.extend(lookup(module));
            }
        }
        Ok(pairs)
    }

    /// A certificate pair named by file stem in the default key
    /// directory.
    fn stem_pair(&self, cx: &mut ModuleCtx, stem: &str) -> Result<KeyPair, GraphError> {
        let dir = self.settings.default_key_dir.clone();
        let public = format!("{}.x509.pem", stem);
        let private = format!("{}.pk8", stem);
        Ok(KeyPair {
            public_key: SourcePath::new(self.layout, &mut cx.obs, &dir, &[&public])?,
            private_key: SourcePath::new(self.layout, &mut cx.obs, &dir, &[&private])?,
        })
    }

    /// Zip the app's embedded native libraries, one ABI directory per
    /// device arch. Returns `None` when the app embeds nothing.
    fn package_native_libs(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<Option<AnyPath>, GraphError> {
        let mut entries: Vec<String> = Vec::new();
        let mut libs: Vec<OutputPath> = Vec::new();
        for dep in self.pipeline.graph.deps_tagged(cx.id, DepTag::EmbeddedNative) {
            let Some(artifact) = published.get(&dep).and_then(|o| o.artifact.clone()) else {
                continue;
            };
            let abi = dep
                .variant()
                .arch()
                .unwrap_or(Arch::Common)
                .abi();
            let file = artifact
                .rel()
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(format!("lib/{}/{}={}", abi, file, artifact.as_path().display()));
            libs.push(artifact);
        }
        if libs.is_empty() {
            return Ok(None);
        }

        let zip = cx.scope.out(&["jnilibs.zip"])?;
        cx.statements.push(
            BuildStatement::new(
                Some(cx.id),
                Rule::Zip,
                format!("jni libs {}", cx.id.display_name()),
            )
            .inputs(libs.into_iter().map(AnyPath::from))
            .arg("entries", entries.join(" "))
            .output(zip.clone()),
        );
        Ok(Some(zip.into()))
    }

    /// The module's own flag files plus those folded in from static
    /// dependencies, deduplicated keeping the first occurrence.
    fn exported_flag_files(
        &self,
        cx: &mut ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Result<Vec<AnyPath>, GraphError> {
        let mut flags: Vec<AnyPath> = Vec::new();
        for file in &cx.decl.exported_flags {
            let src = SourcePath::new(self.layout, &mut cx.obs, &cx.decl.dir, &[file])?;
            flags.push(src.into());
        }
        for dep in self.pipeline.graph.deps_tagged(cx.id, DepTag::StaticLink) {
            if let Some(dep_outputs) = published.get(&dep) {
                flags.extend(dep_outputs.exported_flags.iter().cloned());
            }
        }
        Ok(first_unique_paths(flags))
    }

    /// Jars contributed to the classpath by link and classpath-only
    /// dependencies.
    fn classpath_jars(
        &self,
        cx: &ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Vec<OutputPath> {
        let mut jars = Vec::new();
        for (dep, tag) in self.pipeline.graph.deps(cx.id) {
            if !matches!(tag, DepTag::Link | DepTag::ClasspathOnly) {
                continue;
            }
            if self.kind_of(dep) != Some(ModuleKind::JavaLibrary) {
                continue;
            }
            if let Some(artifact) = published.get(&dep).and_then(|o| o.artifact.clone()) {
                jars.push(artifact);
            }
        }
        // A library reachable under both link and classpath-only tags
        // contributes its jar once.
        first_unique_paths(jars)
    }

    /// Published artifacts of deps under one tag, filtered by kind.
    fn dep_artifacts(
        &self,
        cx: &ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
        tag: DepTag,
        kind: ModuleKind,
    ) -> Vec<OutputPath> {
        self.pipeline
            .graph
            .deps_tagged(cx.id, tag)
            .into_iter()
            .filter(|dep| self.kind_of(*dep) == Some(kind))
            .filter_map(|dep| published.get(&dep).and_then(|o| o.artifact.clone()))
            .collect()
    }

    fn host_tool_artifacts(
        &self,
        cx: &ModuleCtx,
        published: &BTreeMap<ModuleId, ModuleOutputs>,
    ) -> Vec<AnyPath> {
        self.pipeline
            .graph
            .deps_tagged(cx.id, DepTag::HostTool)
            .into_iter()
            .filter_map(|dep| published.get(&dep).and_then(|o| o.artifact.clone()))
            .map(AnyPath::from)
            .collect()
    }

    fn kind_of(&self, dep: ModuleId) -> Option<ModuleKind> {
        self.pipeline.variant(dep).map(|v| v.decl.kind)
    }

    fn is_sanitized(&self, id: ModuleId) -> bool {
        id.variant().get(&Axis::custom("sanitize")).is_some()
    }

    fn device_spec(&self, cx: &ModuleCtx) -> InstallSpec {
        let mut spec = InstallSpec::device();
        if cx.decl.vendor {
            spec = spec.vendor();
        }
        if self.is_sanitized(cx.id) {
            spec = spec.sanitized();
        }
        spec
    }

    fn add_install(
        &self,
        cx: &mut ModuleCtx,
        spec: &InstallSpec,
        parts: &[&str],
        source: impl Into<AnyPath>,
    ) -> Result<(), GraphError> {
        let dest = install_path(self.layout, spec, parts)?;
        cx.outputs.installs.push(InstallEntry {
            source: source.into(),
            dest,
        });
        Ok(())
    }

    fn finish_installs(&self, cx: &mut ModuleCtx) {
        let entries = cx.outputs.installs.clone();
        for entry in entries {
            cx.statements.push(
                BuildStatement::new(
                    Some(cx.id),
                    Rule::InstallCopy,
                    format!("install {}", entry.dest.rel().display()),
                )
                .input(entry.source)
                .output(entry.dest),
            );
        }
    }

    fn warn_if_sourceless(&self, cx: &ModuleCtx, sources: &[SourcePath]) {
        if sources.is_empty() && cx.decl.installable() {
            // TODO: stop treating installable zero-source modules as
            // buildable once declarations no longer rely on it.
            tracing::warn!(
                module = %cx.id.display_name(),
                "installable module has no sources; treating as buildable"
            );
        }
    }
}

/// Phony convenience targets, one per module name, spanning every
/// variant's artifact and install location.
pub fn module_phonies(published: &BTreeMap<ModuleId, ModuleOutputs>) -> Vec<BuildStatement> {
    let mut by_name: BTreeMap<Symbol, Vec<AnyPath>> = BTreeMap::new();
    for (id, outputs) in published {
        let mut paths: Vec<AnyPath> = Vec::new();
        if let Some(artifact) = &outputs.artifact {
            paths.push(artifact.clone().into());
        }
        for install in &outputs.installs {
            paths.push(install.dest.clone().into());
        }
        if !paths.is_empty() {
            by_name.entry(id.name()).or_default().extend(paths);
        }
    }
    by_name
        .into_iter()
        .map(|(name, inputs)| {
            BuildStatement::new(None, Rule::Phony, format!("phony {}", name))
                .inputs(inputs)
                .output(PhonyPath::new(name))
        })
        .collect()
}

fn join_paths(paths: &[OutputPath], separator: &str) -> String {
    paths
        .iter()
        .map(|p| p.as_path().display().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

fn flag_args(flags: &[AnyPath]) -> String {
    flags
        .iter()
        .map(|f| format!("@{}", f.render()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn certificate_args(pairs: &[KeyPair]) -> String {
    pairs
        .iter()
        .map(|p| {
            format!(
                "{} {}",
                p.public_key.as_path().display(),
                p.private_key.as_path().display()
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}
