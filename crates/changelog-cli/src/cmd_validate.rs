use crate::source;
use anyhow::Result;
use changelog::v1::ChangeLogTree;
use std::path::PathBuf;

pub fn run(src: PathBuf, classpath: Option<&str>) -> Result<()> {
    let path = source::resolve(&src, classpath)?;
    let tree = source::load(&path)?;
    for line in report(&tree) {
        println!("{}", line);
    }
    Ok(())
}

/// Summary lines for a structurally valid tree, anomalies last.
fn report(tree: &ChangeLogTree) -> Vec<String> {
    let mut lines = vec![format!(
        "Valid: {} change-log(s), {} change-set(s), {} parameter(s)",
        tree.nodes.len(),
        tree.change_sets.len(),
        tree.parameters.len()
    )];
    for (key, count) in tree.duplicate_change_sets() {
        log::warn!("Change-set {} is defined {} times", key, count);
        lines.push(format!("Duplicate change-set: {} ({} times)", key, count));
    }
    let orphans = tree.parameters.iter().filter(|p| p.owner.is_none()).count();
    if orphans > 0 {
        lines.push(format!(
            "Parameters without a declaring change-log (not written): {}",
            orphans
        ));
    }
    lines
}
