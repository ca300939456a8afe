use anyhow::{Context, Result, bail};
use changelog::v1::ChangeLogTree;
use std::path::{Path, PathBuf};

/// Find `src` as given, else under each root of `classpath`.
pub fn resolve(src: &Path, classpath: Option<&str>) -> Result<PathBuf> {
    if src.exists() {
        return Ok(src.to_path_buf());
    }
    let roots: Vec<PathBuf> = classpath
        .map(|cp| std::env::split_paths(cp).collect())
        .unwrap_or_default();
    for root in &roots {
        let candidate = root.join(src);
        if candidate.exists() {
            log::debug!("Resolved {} to {}", src.display(), candidate.display());
            return Ok(candidate);
        }
    }
    if roots.is_empty() {
        bail!("Change-log not found: {}", src.display());
    }
    bail!(
        "Change-log not found: {} (also searched {})",
        src.display(),
        roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Read and validate a change-log tree.
pub fn load(path: &Path) -> Result<ChangeLogTree> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    ChangeLogTree::from_json(&content).with_context(|| format!("Invalid change-log tree {:?}", path))
}
