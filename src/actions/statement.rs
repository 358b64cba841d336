//! Build statements and the unique-output action set.
//!
//! A statement is a request to the external executor: one rule
//! invocation with explicit inputs (the rule's `$in`), implicit inputs
//! (dependency-only), outputs, and free-form string arguments. The
//! core never runs anything; it only decides what to request.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::ModuleId;
use crate::graph::GraphError;
use crate::paths::AnyPath;

/// The closed set of rules statements may invoke.
///
/// The command templates are contracts with the external executor;
/// `$`-variables resolve to statement arguments at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    Javac,
    Dex,
    Zip,
    PackageApp,
    Bundle,
    Cc,
    InstallCopy,
    GenText,
    BootImage,
    Phony,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Javac => "javac",
            Rule::Dex => "dex",
            Rule::Zip => "zip",
            Rule::PackageApp => "package-app",
            Rule::Bundle => "bundle",
            Rule::Cc => "cc",
            Rule::InstallCopy => "install-copy",
            Rule::GenText => "gen-text",
            Rule::BootImage => "boot-image",
            Rule::Phony => "phony",
        }
    }

    /// Command template for the rule declaration. `Phony` is ninja's
    /// built-in and declares nothing.
    pub fn command(&self) -> &'static str {
        match self {
            Rule::Javac => "build-java -o $out $flags $classpath $in",
            Rule::Dex => "dexer -o $out $flags $in",
            Rule::Zip => "zipbuilder -o $out $entries",
            Rule::PackageApp => "apkbuilder -o $out --certs $certificates $in",
            Rule::Bundle => "bundlebuilder -o $out $in",
            Rule::Cc => "cc-wrapper --mode $mode -o $out $flags $in $libs",
            Rule::InstallCopy => "cp -f $in $out",
            Rule::GenText => "printf '%b' \"$content\" > $out",
            Rule::BootImage => "mkbootimage -o $out --members $members",
            Rule::Phony => "",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One rule invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BuildStatement {
    /// Owning module variant, or none for whole-graph aggregates.
    pub module: Option<ModuleId>,

    pub rule: Rule,

    /// One-line description for progress output.
    pub description: String,

    /// Explicit inputs (`$in`).
    pub inputs: Vec<AnyPath>,

    /// Implicit inputs: ordering and re-run dependencies that do not
    /// appear in `$in`.
    pub implicit: Vec<AnyPath>,

    /// Outputs this statement produces. Each must be globally unique.
    pub outputs: Vec<AnyPath>,

    /// Rule arguments.
    pub args: BTreeMap<String, String>,
}

impl BuildStatement {
    pub fn new(module: Option<ModuleId>, rule: Rule, description: impl Into<String>) -> Self {
        BuildStatement {
            module,
            rule,
            description: description.into(),
            inputs: Vec::new(),
            implicit: Vec::new(),
            outputs: Vec::new(),
            args: BTreeMap::new(),
        }
    }

    pub fn input(mut self, path: impl Into<AnyPath>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs(mut self, paths: impl IntoIterator<Item = AnyPath>) -> Self {
        self.inputs.extend(paths);
        self
    }

    pub fn implicit(mut self, path: impl Into<AnyPath>) -> Self {
        self.implicit.push(path.into());
        self
    }

    pub fn implicits(mut self, paths: impl IntoIterator<Item = AnyPath>) -> Self {
        self.implicit.extend(paths);
        self
    }

    pub fn output(mut self, path: impl Into<AnyPath>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    fn owner_name(&self) -> String {
        match self.module {
            Some(id) => id.display_name(),
            None => format!("<{}>", self.rule),
        }
    }
}

/// The whole-graph collection of statements, with the unique-output
/// invariant enforced at registration time.
///
/// A colliding output means the graph is non-deterministic, so the
/// error is fatal: the caller must halt before emitting anything.
#[derive(Debug, Default)]
pub struct ActionSet {
    statements: Vec<BuildStatement>,
    owners: BTreeMap<String, String>,
}

impl ActionSet {
    pub fn new() -> ActionSet {
        ActionSet::default()
    }

    /// Register one statement, claiming its outputs.
    pub fn register(&mut self, statement: BuildStatement) -> Result<(), GraphError> {
        let mut claiming: Vec<String> = Vec::new();
        for output in &statement.outputs {
            let rendered = output.render();
            let first = self
                .owners
                .get(&rendered)
                .cloned()
                .or_else(|| claiming.contains(&rendered).then(|| statement.owner_name()));
            if let Some(first) = first {
                return Err(GraphError::DuplicateOutput {
                    output: rendered,
                    first,
                    second: statement.owner_name(),
                });
            }
            claiming.push(rendered);
        }
        for rendered in claiming {
            self.owners.insert(rendered, statement.owner_name());
        }
        self.statements.push(statement);
        Ok(())
    }

    /// Register a batch, stopping at the first collision.
    pub fn register_all(
        &mut self,
        statements: impl IntoIterator<Item = BuildStatement>,
    ) -> Result<(), GraphError> {
        for statement in statements {
            self.register(statement)?;
        }
        Ok(())
    }

    pub fn statements(&self) -> &[BuildStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The rules actually used, sorted, for rule-declaration emission.
    pub fn rules_used(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.statements.iter().map(|s| s.rule).collect();
        rules.sort();
        rules.dedup();
        rules
    }
}
