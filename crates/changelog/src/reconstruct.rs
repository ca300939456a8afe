//! Partitioning of a change-log tree into output files.
//!
//! [`reconstruct`] walks the tree once, depth-first from the root, and
//! produces the ordered list of files to write, the content of each file,
//! and the map of change-sets whose logical path has to be written out
//! explicitly because they land in a file other than the one they were
//! authored in.

use crate::content::{ChangeLogChild, Include};
use crate::types::{ChangeLogTree, ChangeSetKey, NodeId, ParameterRef};
use std::collections::{HashMap, HashSet};

/// Change-sets whose logical file path must be annotated explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalPathOverrides {
    map: HashMap<ChangeSetKey, String>,
}

impl LogicalPathOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an override. A second insert for the same identity is
    /// reported and replaces the first.
    pub fn insert(&mut self, key: ChangeSetKey, path: impl Into<String>) {
        let path = path.into();
        if let Some(previous) = self.map.get(&key) {
            log::warn!(
                "Duplicate change-set identity {}: logical path '{}' replaced by '{}'",
                key,
                previous,
                path
            );
        }
        self.map.insert(key, path);
    }

    pub fn get(&self, key: &ChangeSetKey) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Look up by raw `id`/`author` strings, as read back from XML.
    pub fn lookup(&self, id: &str, author: &str) -> Option<&str> {
        self.get(&ChangeSetKey::new(id, author))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChangeSetKey, &str)> {
        self.map.iter().map(|(k, v)| (k, v.as_str()))
    }
}

/// Result of [`reconstruct`].
#[derive(Debug, Clone, Default)]
pub struct ChangeLogContent {
    /// Output files, in pre-order of first discovery. The root comes first.
    pub files: Vec<NodeId>,
    content: HashMap<NodeId, Vec<ChangeLogChild>>,
    pub overrides: LogicalPathOverrides,
}

impl ChangeLogContent {
    /// Content of one output file, in document order.
    pub fn content_of(&self, node: NodeId) -> &[ChangeLogChild] {
        self.content.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files paired with their content.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[ChangeLogChild])> {
        self.files.iter().map(|id| (*id, self.content_of(*id)))
    }
}

/// Decide the output files for `tree` and what goes into each.
///
/// With `single_file` every change-set and every owned parameter ends up
/// in the root's content. Otherwise change-sets defined by another node
/// are replaced by an include of that node's output file, and that node
/// becomes a file of its own.
pub fn reconstruct(tree: &ChangeLogTree, single_file: bool) -> ChangeLogContent {
    let mut walk = Walk {
        tree,
        single_file,
        visited: HashSet::new(),
        seen_keys: HashSet::new(),
        out: ChangeLogContent::default(),
    };
    walk.add_content(tree.root);
    walk.out
}

struct Walk<'a> {
    tree: &'a ChangeLogTree,
    single_file: bool,
    visited: HashSet<NodeId>,
    seen_keys: HashSet<ChangeSetKey>,
    out: ChangeLogContent,
}

impl Walk<'_> {
    fn add_content(&mut self, node_id: NodeId) {
        if !self.visited.insert(node_id) {
            return;
        }
        self.out.files.push(node_id);
        let tree = self.tree;
        let node = tree.node(node_id);
        let mut content = Vec::new();

        for (i, param) in tree.parameters.iter().enumerate() {
            let Some(owner) = param.owner else {
                continue;
            };
            if self.single_file || owner == node_id {
                content.push(ChangeLogChild::Property(ParameterRef(i)));
            }
        }

        // Global preconditions come after the properties and before any change-set.
        if node_id == tree.root
            && let Some(pre) = &node.preconditions
            && pre.is_present()
        {
            content.push(ChangeLogChild::Preconditions(node_id));
        }

        let logical_path = normalize_separators(node.logical_file_path());
        for &r in &node.change_sets {
            let cs = tree.change_set(r);
            let defining = cs.change_log.unwrap_or(node_id);
            if self.single_file || defining == node_id {
                let key = cs.key();
                if !self.seen_keys.insert(key.clone()) {
                    log::warn!("Change-set {} appears more than once", key);
                }
                let authored_in = normalize_separators(&cs.file_path);
                if authored_in != logical_path {
                    self.out.overrides.insert(key, authored_in);
                }
                content.push(ChangeLogChild::ChangeSet(r));
            } else if !self.visited.contains(&defining) {
                let included = tree.node(defining);
                let file = output_file_name(&included.physical_path);
                log::debug!("Including {} from {}", file, node.physical_path);
                content.push(ChangeLogChild::Include(Include {
                    file,
                    contexts: included.include_contexts.clone(),
                    labels: included.include_labels.clone(),
                }));
                self.add_content(defining);
            }
        }

        self.out.content.insert(node_id, content);
    }
}

/// A path with every `\\` separator replaced by `/`.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Output file name for a source path: separators become `/`, an
/// absolute root is dropped, and the extension is replaced by `.xml`
/// (or `.xml` is appended when the file name has none).
///
/// ```
/// use changelog::v1::output_file_name;
///
/// assert_eq!(output_file_name("db/people.groovy"), "db/people.xml");
/// assert_eq!(output_file_name("C:\\work\\db\\main.yaml"), "work/db/main.xml");
/// assert_eq!(output_file_name("/srv/changes"), "srv/changes.xml");
/// ```
pub fn output_file_name(physical_path: &str) -> String {
    let normalized = normalize_separators(physical_path);
    let relative = strip_root(&normalized);
    let name_start = relative.rfind('/').map(|i| i + 1).unwrap_or(0);
    match relative[name_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.xml", &relative[..name_start + dot]),
        _ => format!("{}.xml", relative),
    }
}

fn strip_root(path: &str) -> &str {
    let bytes = path.as_bytes();
    let without_drive = if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[2..]
    } else {
        path
    };
    without_drive.trim_start_matches('/')
}
