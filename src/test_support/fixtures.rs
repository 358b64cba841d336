//! Test fixtures for common test scenarios.
//!
//! A [`ProjectFixture`] pairs a declaration file with the source files
//! it expects; `materialize` writes both under a fresh temp dir and
//! hands back paths and ready-made options for driving the engine.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::ops::EvalOptions;
use crate::paths::Layout;

/// A declaration file plus the source tree it expects.
#[derive(Debug, Clone, Default)]
pub struct ProjectFixture {
    /// Declaration file content (TOML).
    pub decls: String,

    /// Source files: path relative to the source root -> content.
    pub files: Vec<(String, String)>,
}

impl ProjectFixture {
    /// Create a fixture around a declaration file.
    pub fn new(decls: impl Into<String>) -> Self {
        ProjectFixture {
            decls: decls.into(),
            files: Vec::new(),
        }
    }

    /// Add a source file with content.
    pub fn file(mut self, rel: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((rel.into(), content.into()));
        self
    }

    /// Add a placeholder source file.
    pub fn touch(self, rel: impl Into<String>) -> Self {
        self.file(rel, "fixture")
    }

    /// Add the default signing material under the default key dir.
    pub fn with_test_key(self) -> Self {
        self.touch("build/keys/testkey.x509.pem")
            .touch("build/keys/testkey.pk8")
    }

    /// Write the declaration file and source tree under a fresh temp
    /// dir.
    pub fn materialize(&self) -> MaterializedProject {
        let tmp = TempDir::new().unwrap();
        let decl_file = tmp.path().join("build.toml");
        fs::write(&decl_file, &self.decls).unwrap();

        for (rel, content) in &self.files {
            let full = tmp.path().join(rel);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, content).unwrap();
        }

        MaterializedProject { tmp, decl_file }
    }
}

/// A fixture written to disk. Dropping it removes the whole tree.
#[derive(Debug)]
pub struct MaterializedProject {
    pub tmp: TempDir,
    pub decl_file: PathBuf,
}

impl MaterializedProject {
    /// The source root (also holds the declaration file).
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// The output directory evaluation writes under.
    pub fn out_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    /// A layout rooted at this fixture.
    pub fn layout(&self) -> Layout {
        Layout::new(self.root(), self.out_dir())
    }

    /// Eval options pointing at this fixture.
    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            decl_file: self.decl_file.clone(),
            source_root: Some(self.root().to_path_buf()),
            out_dir: self.out_dir(),
            jobs: Some(2),
            emit: true,
        }
    }
}

/// An installable app linking one java library, signed with the
/// default test key.
pub fn app_stack() -> ProjectFixture {
    ProjectFixture::new(
        r#"
        [settings]
        product = "blueprint"

        [[module]]
        name = "core-lib"
        kind = "java-library"
        dir = "java/core"
        sources = ["src/Core.java"]

        [[module]]
        name = "shell"
        kind = "app"
        dir = "apps/shell"
        sources = ["src/Shell.java"]
        deps = ["core-lib"]
        "#,
    )
    .touch("java/core/src/Core.java")
    .touch("apps/shell/src/Shell.java")
    .with_test_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_writes_tree() {
        let project = ProjectFixture::new("[settings]\nproduct = \"blueprint\"\n")
            .touch("java/core/src/Core.java")
            .materialize();

        assert!(project.decl_file.is_file());
        assert!(project.root().join("java/core/src/Core.java").is_file());
        assert_eq!(project.layout().source_root, project.root());
    }

    #[test]
    fn test_app_stack_is_complete() {
        let project = app_stack().materialize();
        assert!(project.root().join("build/keys/testkey.pk8").is_file());
        assert!(project.root().join("apps/shell/src/Shell.java").is_file());
    }
}
