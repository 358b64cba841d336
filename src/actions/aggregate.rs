//! Whole-graph aggregate actions.
//!
//! Aggregates run after every per-variant assembly has settled and
//! read only published outputs, so a contributor that failed is simply
//! not represented. Contributors are visited in lexical module-name
//! order, making aggregate content independent of assembly scheduling.
//! An aggregate with zero contributors emits nothing.

use std::collections::BTreeMap;

use crate::core::ModuleId;
use crate::graph::GraphError;
use crate::paths::{AnyPath, Layout, OutputPath};

use super::assemble::ModuleOutputs;
use super::statement::{BuildStatement, Rule};

/// Build the aggregate statements for a settled publication set.
pub fn aggregate_statements(
    layout: &Layout,
    published: &BTreeMap<ModuleId, ModuleOutputs>,
) -> Result<Vec<BuildStatement>, GraphError> {
    let mut statements = Vec::new();
    statements.extend(keys_manifest(layout, published)?);
    statements.extend(boot_image(layout, published)?);
    Ok(statements)
}

/// One line per installed signing key, in lexical name order.
fn keys_manifest(
    layout: &Layout,
    published: &BTreeMap<ModuleId, ModuleOutputs>,
) -> Result<Vec<BuildStatement>, GraphError> {
    let mut lines: Vec<String> = Vec::new();
    let mut key_files: Vec<AnyPath> = Vec::new();
    for (id, outputs) in published {
        let Some(pair) = &outputs.key_pair else {
            continue;
        };
        lines.push(format!(
            "name=\"{}\" public_key=\"{}\" private_key=\"{}\"",
            id.name(),
            pair.public_key,
            pair.private_key
        ));
        key_files.push(pair.public_key.clone().into());
        key_files.push(pair.private_key.clone().into());
    }
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let manifest = OutputPath::new(layout, &["keys", "installed-keys.txt"])?;
    // Records are joined with literal \n escapes so the ninja value
    // stays on one line; the gen-text rule expands them at write time.
    // Every record, the last included, is newline-terminated.
    Ok(vec![BuildStatement::new(
        None,
        Rule::GenText,
        "signing key manifest",
    )
    .implicits(key_files)
    .arg("content", format!("{}\\n", lines.join("\\n")))
    .output(manifest)])
}

/// The boot image over every boot-classpath member, plus one image per
/// additional member and an invocation record.
fn boot_image(
    layout: &Layout,
    published: &BTreeMap<ModuleId, ModuleOutputs>,
) -> Result<Vec<BuildStatement>, GraphError> {
    let members: Vec<(ModuleId, OutputPath)> = published
        .iter()
        .filter_map(|(id, outputs)| outputs.boot_jar.clone().map(|jar| (*id, jar)))
        .collect();
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let jar_paths: Vec<String> = members
        .iter()
        .map(|(_, jar)| jar.as_path().display().to_string())
        .collect();

    let mut image = BuildStatement::new(None, Rule::BootImage, "boot image")
        .implicits(members.iter().map(|(_, jar)| AnyPath::from(jar.clone())))
        .arg("members", jar_paths.join(" "))
        .output(OutputPath::new(layout, &["boot", "boot.img"])?);
    for (id, _) in members.iter().skip(1) {
        let file = format!("boot-{}.img", id.name());
        image = image.output(OutputPath::new(layout, &["boot", &file])?);
    }
    // The invocation record is a side output of the same statement, so
    // it shares the member-jar implicits and rebuilds with the image.
    image = image.output(OutputPath::new(layout, &["boot", "boot.invocation"])?);

    Ok(vec![image])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::assemble::KeyPair;
    use crate::core::VariantKey;
    use crate::paths::{Observations, SourcePath};
    use crate::util::Symbol;

    use std::fs;
    use tempfile::TempDir;

    fn layout_with(files: &[&str]) -> (TempDir, Layout) {
        let tmp = TempDir::new().unwrap();
        for file in files {
            let path = tmp.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"fixture").unwrap();
        }
        let layout = Layout::new(tmp.path(), "out");
        (tmp, layout)
    }

    fn src(layout: &Layout, dir: &str, file: &str) -> SourcePath {
        let mut obs = Observations::new();
        SourcePath::new(layout, &mut obs, dir, &[file]).unwrap()
    }

    fn id(name: &str) -> ModuleId {
        ModuleId::new(Symbol::intern(name), VariantKey::empty())
    }

    #[test]
    fn test_keys_manifest_orders_lexically() {
        let (_tmp, layout) = layout_with(&[
            "keys/zeta.x509.pem",
            "keys/zeta.pk8",
            "keys/alpha.x509.pem",
            "keys/alpha.pk8",
        ]);

        let mut published: BTreeMap<ModuleId, ModuleOutputs> = BTreeMap::new();
        for name in ["zeta-key", "alpha-key"] {
            let stem = name.strip_suffix("-key").unwrap();
            let mut outputs = ModuleOutputs::default();
            outputs.key_pair = Some(KeyPair {
                public_key: src(&layout, "keys", &format!("{}.x509.pem", stem)),
                private_key: src(&layout, "keys", &format!("{}.pk8", stem)),
            });
            published.insert(id(name), outputs);
        }

        let statements = aggregate_statements(&layout, &published).unwrap();
        assert_eq!(statements.len(), 1);
        let manifest = &statements[0];
        assert_eq!(manifest.outputs[0].render(), "out/keys/installed-keys.txt");
        assert_eq!(manifest.implicit.len(), 4);

        // Record separators are literal \n escapes, one per record,
        // the trailing one included.
        let content = &manifest.args["content"];
        assert!(!content.contains('\n'));
        assert!(content.ends_with("\\n"));
        let lines: Vec<&str> = content.split("\\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("name=\"alpha-key\""));
        assert!(lines[1].starts_with("name=\"zeta-key\""));
        assert!(lines[0].contains("public_key=\""));
        assert!(lines[0].contains("private_key=\""));
    }

    #[test]
    fn test_boot_image_outputs_per_member() {
        let (_tmp, layout) = layout_with(&[]);
        let mut published: BTreeMap<ModuleId, ModuleOutputs> = BTreeMap::new();
        for name in ["core-lib", "apex-lib"] {
            let mut outputs = ModuleOutputs::default();
            outputs.boot_jar =
                Some(OutputPath::new(&layout, &[&format!("{}.jar", name)]).unwrap());
            published.insert(id(name), outputs);
        }

        let statements = aggregate_statements(&layout, &published).unwrap();
        assert_eq!(statements.len(), 1);

        let image = &statements[0];
        assert_eq!(image.rule, Rule::BootImage);
        let outputs: Vec<String> = image.outputs.iter().map(AnyPath::render).collect();
        // apex-lib sorts first and owns the primary image; core-lib
        // gets its own. The invocation record rides on the same
        // statement so it rebuilds whenever a member jar changes.
        assert_eq!(
            outputs,
            vec![
                "out/boot/boot.img",
                "out/boot/boot-core-lib.img",
                "out/boot/boot.invocation",
            ]
        );
        assert_eq!(image.implicit.len(), 2);
        assert!(image.args["members"].contains("apex-lib.jar"));
        assert!(image.args["members"].contains("core-lib.jar"));
    }

    #[test]
    fn test_dropping_a_contributor_leaves_the_rest_intact() {
        let (_tmp, layout) = layout_with(&[
            "keys/alpha.x509.pem",
            "keys/alpha.pk8",
            "keys/mid.x509.pem",
            "keys/mid.pk8",
            "keys/zeta.x509.pem",
            "keys/zeta.pk8",
        ]);

        let mut published: BTreeMap<ModuleId, ModuleOutputs> = BTreeMap::new();
        for stem in ["alpha", "mid", "zeta"] {
            let mut outputs = ModuleOutputs::default();
            outputs.key_pair = Some(KeyPair {
                public_key: src(&layout, "keys", &format!("{}.x509.pem", stem)),
                private_key: src(&layout, "keys", &format!("{}.pk8", stem)),
            });
            published.insert(id(&format!("{}-key", stem)), outputs);
        }

        let full = aggregate_statements(&layout, &published).unwrap();
        published.remove(&id("mid-key"));
        let reduced = aggregate_statements(&layout, &published).unwrap();

        let records = |s: &BuildStatement| -> Vec<String> {
            s.args["content"]
                .split("\\n")
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect()
        };
        let full_lines = records(&full[0]);
        let reduced_lines = records(&reduced[0]);
        assert_eq!(full_lines.len(), 3);
        assert_eq!(reduced_lines.len(), 2);
        assert_eq!(reduced_lines[0], full_lines[0]);
        assert_eq!(reduced_lines[1], full_lines[2]);
    }

    #[test]
    fn test_empty_contributor_sets_emit_nothing() {
        let (_tmp, layout) = layout_with(&[]);
        let published: BTreeMap<ModuleId, ModuleOutputs> = BTreeMap::new();
        assert!(aggregate_statements(&layout, &published)
            .unwrap()
            .is_empty());
    }
}
