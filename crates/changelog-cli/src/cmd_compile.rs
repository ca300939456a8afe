use crate::source;
use anyhow::{Context, Result, bail};
use changelog::v1::ChangeLogTree;
use changelog_xml::{ChangeLogSerializer, XmlConfig};
use std::path::{Path, PathBuf};

pub fn run(
    src: PathBuf,
    classpath: Option<&str>,
    out: Option<PathBuf>,
    single_file: bool,
    config: XmlConfig,
) -> Result<()> {
    let path = source::resolve(&src, classpath)?;
    let tree = source::load(&path)?;
    let serializer = ChangeLogSerializer::new(config).context("Invalid output settings")?;

    match out {
        Some(dir) => {
            let files = compile_to_dir(&serializer, &tree, &dir, single_file)?;
            log::info!(
                "Compiled {} change-set(s) from {} into {} file(s)",
                tree.change_sets.len(),
                path.display(),
                files.len()
            );
            println!("Compiled successfully: {} file(s) in {}", files.len(), dir.display());
            Ok(())
        }
        None if single_file => {
            let xml = serializer
                .serialize_to_string(&tree)
                .with_context(|| format!("Failed to compile {}", path.display()))?;
            print!("{}", xml);
            Ok(())
        }
        None => bail!("--out is required unless --single-file is given"),
    }
}

fn compile_to_dir(
    serializer: &ChangeLogSerializer,
    tree: &ChangeLogTree,
    dir: &Path,
    single_file: bool,
) -> Result<Vec<PathBuf>> {
    serializer
        .serialize_to_dir(tree, dir, single_file)
        .with_context(|| format!("Failed to compile into {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use changelog::v1::ChangeSet;
    use tempfile::TempDir;

    fn write_tree(dir: &Path) -> PathBuf {
        let mut tree = ChangeLogTree::new("db/changelog.groovy");
        let people = tree.add_include(tree.root, "db/people.groovy");
        tree.add_change_set(tree.root, ChangeSet::new("1", "alex", "db/changelog.groovy"));
        tree.add_change_set(people, ChangeSet::new("2", "alex", "db/people.groovy"));
        let path = dir.join("tree.json");
        std::fs::write(&path, tree.to_json_pretty().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_run_multi_file() {
        let dir = TempDir::new().unwrap();
        let src = write_tree(dir.path());
        let out = dir.path().join("out");
        run(src, None, Some(out.clone()), false, XmlConfig::default()).unwrap();
        assert!(out.join("db/changelog.xml").is_file());
        assert!(out.join("db/people.xml").is_file());
    }

    #[test]
    fn test_run_single_file_into_dir() {
        let dir = TempDir::new().unwrap();
        let src = write_tree(dir.path());
        let out = dir.path().join("out");
        run(src, None, Some(out.clone()), true, XmlConfig::default()).unwrap();
        assert!(out.join("db/changelog.xml").is_file());
        assert!(!out.join("db/people.xml").exists());
    }

    #[test]
    fn test_run_requires_out_for_multi_file() {
        let dir = TempDir::new().unwrap();
        let src = write_tree(dir.path());
        let err = run(src, None, None, false, XmlConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--out"));
    }

    #[test]
    fn test_run_rejects_encoding() {
        let dir = TempDir::new().unwrap();
        let src = write_tree(dir.path());
        let config = XmlConfig::default().with_encoding("latin1");
        assert!(run(src, None, Some(dir.path().join("o")), false, config).is_err());
    }

    #[test]
    fn test_run_nonexistent_source() {
        assert!(
            run(
                PathBuf::from("/nonexistent/tree.json"),
                None,
                None,
                true,
                XmlConfig::default()
            )
            .is_err()
        );
    }
}
