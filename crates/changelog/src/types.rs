use crate::error::{Result, TreeError};
use crate::serializable::SerializableObject;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ============================================================================
// Identities
// ============================================================================

/// Identity of a node within one [`ChangeLogTree`].
///
/// Nodes are compared by identity, never by value: two includes of files
/// with the same path are still two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a [`ChangeSet`] in [`ChangeLogTree::change_sets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSetRef(pub usize);

/// Index of a [`ChangeLogParameter`] in [`ChangeLogTree::parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterRef(pub usize);

/// The `(id, author)` pair identifying a change-set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetKey {
    pub id: String,
    pub author: String,
}

impl ChangeSetKey {
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for ChangeSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.id, self.author)
    }
}

// ============================================================================
// Tree
// ============================================================================

/// A parsed change-log: the root document plus every node reached through
/// includes, stored as an arena.
///
/// Change-sets, nodes and parameters refer to each other by index. A node
/// lists every change-set that runs as part of it, including those
/// pulled in from included nodes; each change-set records the node that
/// defines it in [`ChangeSet::change_log`].
///
/// # JSON shape
///
/// ```json
/// {
///   "root": 0,
///   "nodes": [
///     { "physical_path": "db/changelog.groovy", "change_sets": [0, 1] },
///     { "physical_path": "db/people.groovy", "parent": 0, "change_sets": [1] }
///   ],
///   "change_sets": [
///     { "id": "1", "author": "alex", "file_path": "db/changelog.groovy", "change_log": 0 },
///     { "id": "2", "author": "alex", "file_path": "db/people.groovy", "change_log": 1 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogTree {
    pub root: NodeId,
    pub nodes: Vec<ChangeLogNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_sets: Vec<ChangeSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ChangeLogParameter>,
}

/// One logical source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeLogNode {
    /// Storage location as given by the source.
    pub physical_path: String,
    /// Explicit logical identity; defaults to `physical_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_sets: Vec<ChangeSetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<PreconditionContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<String>,
    /// Context expression of the `include` that pulled this node in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_contexts: Option<String>,
    /// Label expression of the `include` that pulled this node in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_quoting_strategy: Option<ObjectQuotingStrategy>,
}

impl ChangeLogNode {
    pub fn new(physical_path: impl Into<String>) -> Self {
        Self {
            physical_path: physical_path.into(),
            ..Default::default()
        }
    }

    /// The logical identity: the explicit logical path, else the physical one.
    pub fn logical_file_path(&self) -> &str {
        self.logical_path.as_deref().unwrap_or(&self.physical_path)
    }
}

/// Quoting applied to database object names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectQuotingStrategy {
    #[default]
    Legacy,
    QuoteAllObjects,
    QuoteOnlyReservedWords,
}

impl fmt::Display for ObjectQuotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectQuotingStrategy::Legacy => "LEGACY",
            ObjectQuotingStrategy::QuoteAllObjects => "QUOTE_ALL_OBJECTS",
            ObjectQuotingStrategy::QuoteOnlyReservedWords => "QUOTE_ONLY_RESERVED_WORDS",
        })
    }
}

// ============================================================================
// Change-sets
// ============================================================================

/// One migration step.
///
/// # Builder API
///
/// ```
/// use changelog::v1::{ChangeSet, SerializableObject};
///
/// let cs = ChangeSet::new("1", "alex", "db/people.groovy")
///     .with_context("test")
///     .with_change(SerializableObject::new("createTable").with_attribute("tableName", "people"));
/// assert_eq!(cs.key().to_string(), "1::alex");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    /// Physical file the change-set was authored in.
    pub file_path: String,
    /// Defining node. `None` means local to whichever node lists it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_log: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbms: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_always: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_on_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<PreconditionContainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<SerializableObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<SerializableObject>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ChangeSet {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ChangeSetKey {
        ChangeSetKey::new(self.id.clone(), self.author.clone())
    }

    pub fn with_context(mut self, contexts: impl Into<String>) -> Self {
        self.contexts = Some(contexts.into());
        self
    }

    pub fn with_labels(mut self, labels: impl Into<String>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_change(mut self, change: SerializableObject) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_rollback(mut self, change: SerializableObject) -> Self {
        self.rollback.push(change);
        self
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A declared change-log parameter (`property` element).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogParameter {
    pub name: String,
    pub value: String,
    /// Declaring node. Parameters without one are never emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_databases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<String>,
    #[serde(default = "default_global")]
    pub global: bool,
}

fn default_global() -> bool {
    true
}

impl ChangeLogParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            owner: None,
            valid_databases: Vec::new(),
            labels: None,
            contexts: None,
            global: true,
        }
    }

    /// Mark the parameter as visible to its declaring file only.
    pub fn local(mut self) -> Self {
        self.global = false;
        self
    }
}

// ============================================================================
// Preconditions
// ============================================================================

/// What to do when a precondition check errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorOption {
    #[default]
    Halt,
    Continue,
    MarkRan,
    Warn,
}

/// What to do when a precondition check fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailOption {
    #[default]
    Halt,
    Continue,
    MarkRan,
    Warn,
}

/// How preconditions behave when generating SQL output instead of updating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnSqlOutput {
    #[default]
    Ignore,
    Test,
    Fail,
}

macro_rules! display_as_serde_name {
    ($ty:ty { $($variant:ident => $name:literal),* $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $name),*
                })
            }
        }
    };
}

display_as_serde_name!(ErrorOption { Halt => "HALT", Continue => "CONTINUE", MarkRan => "MARK_RAN", Warn => "WARN" });
display_as_serde_name!(FailOption { Halt => "HALT", Continue => "CONTINUE", MarkRan => "MARK_RAN", Warn => "WARN" });
display_as_serde_name!(OnSqlOutput { Ignore => "IGNORE", Test => "TEST", Fail => "FAIL" });

/// A `preConditions` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreconditionContainer {
    #[serde(default)]
    pub on_error: ErrorOption,
    #[serde(default)]
    pub on_fail: FailOption,
    #[serde(default)]
    pub on_sql_output: OnSqlOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<Precondition>,
}

/// A nested precondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    Container(PreconditionContainer),
    And(Vec<Precondition>),
    Or(Vec<Precondition>),
    Not(Vec<Precondition>),
    /// A concrete check such as `tableExists` or `dbms`.
    Check(SerializableObject),
}

impl PreconditionContainer {
    /// Whether this block says anything beyond the defaults
    /// (`onError=HALT`, `onFail=HALT`, `onSqlOutput=IGNORE`, no checks).
    pub fn is_present(&self) -> bool {
        if self.on_error != ErrorOption::Halt
            || self.on_fail != FailOption::Halt
            || self.on_sql_output != OnSqlOutput::Ignore
            || self.on_fail_message.is_some()
            || self.on_error_message.is_some()
        {
            return true;
        }
        self.nested.iter().any(|p| match p {
            Precondition::Container(c) => c.is_present(),
            _ => true,
        })
    }
}

// ============================================================================
// Tree construction and queries
// ============================================================================

impl ChangeLogTree {
    /// Create a tree holding only a root node.
    pub fn new(root_physical_path: impl Into<String>) -> Self {
        Self {
            root: NodeId(0),
            nodes: vec![ChangeLogNode::new(root_physical_path)],
            change_sets: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Parse a tree from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let tree: Self = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The node for `id`.
    ///
    /// Panics if `id` is not part of this tree; trees from outside should
    /// go through [`ChangeLogTree::validate`] first.
    pub fn node(&self, id: NodeId) -> &ChangeLogNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ChangeLogNode {
        &mut self.nodes[id.0]
    }

    pub fn root_node(&self) -> &ChangeLogNode {
        self.node(self.root)
    }

    pub fn change_set(&self, r: ChangeSetRef) -> &ChangeSet {
        &self.change_sets[r.0]
    }

    pub fn parameter(&self, r: ParameterRef) -> &ChangeLogParameter {
        &self.parameters[r.0]
    }

    /// Add a node included from `parent`.
    pub fn add_include(&mut self, parent: NodeId, physical_path: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ChangeLogNode {
            parent: Some(parent),
            ..ChangeLogNode::new(physical_path)
        });
        id
    }

    /// Add a change-set defined by `node`. It is listed in `node` and in
    /// every ancestor, the way an include pulls content upwards.
    pub fn add_change_set(&mut self, node: NodeId, mut change_set: ChangeSet) -> ChangeSetRef {
        let r = ChangeSetRef(self.change_sets.len());
        change_set.change_log = Some(node);
        self.change_sets.push(change_set);
        for ancestor in self.ancestors(node) {
            self.nodes[ancestor.0].change_sets.push(r);
        }
        r
    }

    /// List an existing change-set under `node` as well (and its ancestors).
    pub fn link_change_set(&mut self, node: NodeId, r: ChangeSetRef) {
        for ancestor in self.ancestors(node) {
            let list = &mut self.nodes[ancestor.0].change_sets;
            if !list.contains(&r) {
                list.push(r);
            }
        }
    }

    /// Declare a parameter, owned by `owner` when given.
    pub fn add_parameter(
        &mut self,
        owner: Option<NodeId>,
        mut parameter: ChangeLogParameter,
    ) -> ParameterRef {
        parameter.owner = owner;
        self.parameters.push(parameter);
        ParameterRef(self.parameters.len() - 1)
    }

    /// `node` followed by its parents up to the root.
    ///
    /// Stops early if the parent chain revisits a node.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if id.0 >= self.nodes.len() || !seen.insert(id) {
                break;
            }
            chain.push(id);
            current = self.nodes[id.0].parent;
        }
        chain
    }

    /// Context expression of a change-set combined with the contexts of
    /// every node above it, root first: `(root) AND (…) AND (own)`.
    ///
    /// Blank expressions are skipped; `None` when nothing remains.
    pub fn effective_contexts(&self, r: ChangeSetRef) -> Option<String> {
        let change_set = self.change_set(r);
        let mut contexts: Vec<&str> = Vec::new();
        push_context(&mut contexts, change_set.contexts.as_deref());
        if let Some(defining) = change_set.change_log {
            for id in self.ancestors(defining) {
                let node = self.node(id);
                push_context(&mut contexts, node.contexts.as_deref());
                push_context(&mut contexts, node.include_contexts.as_deref());
            }
        }
        if contexts.is_empty() {
            return None;
        }
        contexts.reverse();
        Some(
            contexts
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Change-set identities that occur more than once, with their counts.
    pub fn duplicate_change_sets(&self) -> Vec<(ChangeSetKey, usize)> {
        let mut counts: HashMap<ChangeSetKey, usize> = HashMap::new();
        for cs in &self.change_sets {
            *counts.entry(cs.key()).or_default() += 1;
        }
        let mut dups: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
        dups.sort();
        dups
    }

    /// Check that every index refers into the tree and that parent chains
    /// terminate.
    pub fn validate(&self) -> Result<()> {
        let n = self.nodes.len();
        if self.root.0 >= n {
            return Err(TreeError::MissingRoot(self.root));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let id = NodeId(i);
            if let Some(parent) = node.parent
                && parent.0 >= n
            {
                return Err(TreeError::DanglingNode {
                    node: id,
                    missing: parent,
                });
            }
            for r in &node.change_sets {
                if r.0 >= self.change_sets.len() {
                    return Err(TreeError::DanglingChangeSet { node: id, index: r.0 });
                }
            }
        }
        for cs in &self.change_sets {
            if let Some(defining) = cs.change_log
                && defining.0 >= n
            {
                return Err(TreeError::DanglingNode {
                    node: self.root,
                    missing: defining,
                });
            }
        }
        for p in &self.parameters {
            if let Some(owner) = p.owner
                && owner.0 >= n
            {
                return Err(TreeError::DanglingParameterOwner {
                    name: p.name.clone(),
                    missing: owner,
                });
            }
        }
        for i in 0..n {
            let mut current = self.nodes[i].parent;
            let mut steps = 0;
            while let Some(parent) = current {
                steps += 1;
                if steps > n {
                    return Err(TreeError::ParentCycle(NodeId(i)));
                }
                current = self.nodes[parent.0].parent;
            }
        }
        Ok(())
    }
}

fn push_context<'a>(contexts: &mut Vec<&'a str>, expr: Option<&'a str>) {
    if let Some(expr) = expr
        && !expr.trim().is_empty()
    {
        contexts.push(expr.trim());
    }
}
