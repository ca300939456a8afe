//! Content items of an output file.
//!
//! Each [`ChangeLogChild`] turns into the [`SerializableObject`] a renderer
//! writes: a `preConditions` block, a `property`, a `changeSet` or an
//! `include` marker.

use crate::serializable::{Field, FieldValue, SerializableObject, SerializationMode};
use crate::types::{
    ChangeLogTree, ChangeSetRef, ErrorOption, FailOption, NodeId, OnSqlOutput, ParameterRef,
    Precondition, PreconditionContainer,
};

/// One item of an output file's content list, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeLogChild {
    /// The precondition block declared by a node (root only).
    Preconditions(NodeId),
    Property(ParameterRef),
    ChangeSet(ChangeSetRef),
    Include(Include),
}

/// Marker pointing at another output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// Output file name, forward slashes only.
    pub file: String,
    pub contexts: Option<String>,
    pub labels: Option<String>,
}

impl ChangeLogChild {
    /// Render this item as a generic object, as seen from the file of
    /// `emitted_under`.
    pub fn to_serializable(&self, tree: &ChangeLogTree, emitted_under: NodeId) -> SerializableObject {
        match self {
            ChangeLogChild::Preconditions(node) => match &tree.node(*node).preconditions {
                Some(container) => preconditions_object(container),
                None => preconditions_object(&PreconditionContainer::default()),
            },
            ChangeLogChild::Property(r) => property_object(tree, *r),
            ChangeLogChild::ChangeSet(r) => change_set_object(tree, *r, emitted_under),
            ChangeLogChild::Include(include) => include_object(include),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn include_object(include: &Include) -> SerializableObject {
    let mut obj = SerializableObject::new("include").with_attribute("file", include.file.as_str());
    if let Some(ctx) = non_blank(include.contexts.as_deref()) {
        obj = obj.with_attribute("context", ctx);
    }
    if let Some(labels) = non_blank(include.labels.as_deref()) {
        obj = obj.with_attribute("labels", labels);
    }
    obj
}

fn property_object(tree: &ChangeLogTree, r: ParameterRef) -> SerializableObject {
    let param = tree.parameter(r);
    let mut obj = SerializableObject::new("property")
        .with_attribute("name", param.name.as_str())
        .with_attribute("value", param.value.as_str());
    if !param.valid_databases.is_empty() {
        obj = obj.with_attribute("dbms", param.valid_databases.join(","));
    }
    if let Some(labels) = non_blank(param.labels.as_deref()) {
        obj = obj.with_attribute("labels", labels);
    }
    if let Some(ctx) = non_blank(param.contexts.as_deref()) {
        obj = obj.with_attribute("context", ctx);
    }
    if !param.global {
        obj = obj.with_attribute("global", false);
    }
    obj
}

fn change_set_object(
    tree: &ChangeLogTree,
    r: ChangeSetRef,
    emitted_under: NodeId,
) -> SerializableObject {
    let cs = tree.change_set(r);
    let defining = cs.change_log.unwrap_or(emitted_under);

    let mut obj = SerializableObject::new("changeSet")
        .with_attribute("id", cs.id.as_str())
        .with_attribute("author", cs.author.as_str());

    let context = if defining == emitted_under {
        non_blank(cs.contexts.as_deref()).map(str::to_string)
    } else {
        tree.effective_contexts(r)
    };
    if let Some(ctx) = context {
        obj = obj.with_attribute("context", ctx);
    }
    if let Some(labels) = non_blank(cs.labels.as_deref()) {
        obj = obj.with_attribute("labels", labels);
    }
    if let Some(dbms) = non_blank(cs.dbms.as_deref()) {
        obj = obj.with_attribute("dbms", dbms);
    }
    if cs.run_always {
        obj = obj.with_attribute("runAlways", true);
    }
    if cs.run_on_change {
        obj = obj.with_attribute("runOnChange", true);
    }
    if let Some(fail) = cs.fail_on_error {
        obj = obj.with_attribute("failOnError", fail);
    }
    if let Some(comment) = non_blank(cs.comment.as_deref()) {
        obj = obj.with_nested("comment", comment);
    }
    if let Some(pre) = &cs.preconditions
        && pre.is_present()
    {
        obj = obj.with_object("preConditions", preconditions_object(pre));
    }
    for change in &cs.changes {
        obj = obj.with_object(change.name.clone(), change.clone());
    }
    if !cs.rollback.is_empty() {
        let mut rollback = SerializableObject::new("rollback");
        for change in &cs.rollback {
            rollback = rollback.with_object(change.name.clone(), change.clone());
        }
        obj = obj.with_object("rollback", rollback);
    }

    let base = match cs.change_log {
        Some(node) => tree.node(node).physical_path.as_str(),
        None => cs.file_path.as_str(),
    };
    obj.set_source_path(base);
    let identity = format!("{}::{}::{}", cs.file_path, cs.id, cs.author);
    set_identity(&mut obj, &identity);
    obj
}

fn set_identity(obj: &mut SerializableObject, identity: &str) {
    obj.identity = Some(identity.to_string());
    for field in &mut obj.fields {
        set_value_identity(&mut field.value, identity);
    }
}

fn set_value_identity(value: &mut FieldValue, identity: &str) {
    match value {
        FieldValue::Scalar(_) => {}
        FieldValue::Object(obj) => set_identity(obj, identity),
        FieldValue::List(items) | FieldValue::NestedList(items) => {
            items.iter_mut().for_each(|v| set_value_identity(v, identity))
        }
        FieldValue::Map(entries) => entries
            .iter_mut()
            .for_each(|(_, v)| set_value_identity(v, identity)),
    }
}

/// Render a `preConditions` block; attributes appear only when they
/// differ from the defaults.
pub fn preconditions_object(container: &PreconditionContainer) -> SerializableObject {
    let mut obj = SerializableObject::new("preConditions");
    if container.on_error != ErrorOption::Halt {
        obj = obj.with_attribute("onError", container.on_error.to_string());
    }
    if container.on_fail != FailOption::Halt {
        obj = obj.with_attribute("onFail", container.on_fail.to_string());
    }
    if container.on_sql_output != OnSqlOutput::Ignore {
        obj = obj.with_attribute("onSqlOutput", container.on_sql_output.to_string());
    }
    if let Some(msg) = &container.on_fail_message {
        obj = obj.with_attribute("onFailMessage", msg.as_str());
    }
    if let Some(msg) = &container.on_error_message {
        obj = obj.with_attribute("onErrorMessage", msg.as_str());
    }
    with_nested_preconditions(obj, &container.nested)
}

fn with_nested_preconditions(
    mut obj: SerializableObject,
    nested: &[Precondition],
) -> SerializableObject {
    for p in nested {
        let child = precondition_object(p);
        obj = obj.with_field(Field::new(
            child.name.clone(),
            SerializationMode::NestedElement,
            child,
        ));
    }
    obj
}

fn precondition_object(precondition: &Precondition) -> SerializableObject {
    match precondition {
        Precondition::Container(c) => preconditions_object(c),
        Precondition::And(items) => with_nested_preconditions(SerializableObject::new("and"), items),
        Precondition::Or(items) => with_nested_preconditions(SerializableObject::new("or"), items),
        Precondition::Not(items) => with_nested_preconditions(SerializableObject::new("not"), items),
        Precondition::Check(obj) => obj.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeLogParameter, ChangeSet};

    fn attr(obj: &SerializableObject, name: &str) -> Option<String> {
        obj.fields
            .iter()
            .find(|f| f.name == name && f.mode == SerializationMode::Attribute)
            .and_then(|f| f.value.as_scalar())
            .map(|s| s.to_string())
    }

    fn child_names(obj: &SerializableObject) -> Vec<&str> {
        obj.fields
            .iter()
            .filter(|f| f.mode == SerializationMode::NestedElement)
            .map(|f| f.name.as_str())
            .collect()
    }

    // ── change-sets ────────────────────────────────────────────────────

    #[test]
    fn test_change_set_attributes() {
        let mut tree = ChangeLogTree::new("db/changelog.xml");
        let mut cs = ChangeSet::new("1", "alex", "db/changelog.xml")
            .with_context("test")
            .with_labels("v1")
            .with_comment("first");
        cs.run_on_change = true;
        cs.fail_on_error = Some(false);
        let r = tree.add_change_set(tree.root, cs);

        let obj = ChangeLogChild::ChangeSet(r).to_serializable(&tree, tree.root);
        assert_eq!(obj.name, "changeSet");
        assert_eq!(attr(&obj, "id").as_deref(), Some("1"));
        assert_eq!(attr(&obj, "author").as_deref(), Some("alex"));
        assert_eq!(attr(&obj, "context").as_deref(), Some("test"));
        assert_eq!(attr(&obj, "labels").as_deref(), Some("v1"));
        assert_eq!(attr(&obj, "runOnChange").as_deref(), Some("true"));
        assert_eq!(attr(&obj, "failOnError").as_deref(), Some("false"));
        assert!(attr(&obj, "runAlways").is_none());
        assert!(attr(&obj, "logicalFilePath").is_none());
        assert_eq!(child_names(&obj), vec!["comment"]);
        assert_eq!(obj.identity.as_deref(), Some("db/changelog.xml::1::alex"));
    }

    #[test]
    fn test_change_set_context_composed_when_rehomed() {
        let mut tree = ChangeLogTree::new("db/changelog.xml");
        tree.node_mut(tree.root).contexts = Some("C".into());
        let child = tree.add_include(tree.root, "db/people.xml");
        tree.node_mut(child).contexts = Some("B".into());
        let r = tree.add_change_set(child, ChangeSet::new("1", "a", "db/people.xml").with_context("A"));

        let local = ChangeLogChild::ChangeSet(r).to_serializable(&tree, child);
        assert_eq!(attr(&local, "context").as_deref(), Some("A"));

        let rehomed = ChangeLogChild::ChangeSet(r).to_serializable(&tree, tree.root);
        assert_eq!(attr(&rehomed, "context").as_deref(), Some("(C) AND (B) AND (A)"));
    }

    #[test]
    fn test_change_set_without_contexts_omits_attribute() {
        let mut tree = ChangeLogTree::new("db/changelog.xml");
        let child = tree.add_include(tree.root, "db/people.xml");
        let r = tree.add_change_set(child, ChangeSet::new("1", "a", "db/people.xml"));
        let obj = ChangeLogChild::ChangeSet(r).to_serializable(&tree, tree.root);
        assert!(attr(&obj, "context").is_none());
    }

    #[test]
    fn test_change_set_changes_and_rollback() {
        let mut tree = ChangeLogTree::new("db/changelog.xml");
        let child = tree.add_include(tree.root, "db/sub/people.xml");
        let cs = ChangeSet::new("1", "a", "db/sub/people.xml")
            .with_change(
                SerializableObject::new("sqlFile")
                    .with_attribute("path", "init.sql")
                    .with_attribute("relativeToChangelogFile", true),
            )
            .with_rollback(SerializableObject::new("dropTable").with_attribute("tableName", "p"));
        let r = tree.add_change_set(child, cs);

        let obj = ChangeLogChild::ChangeSet(r).to_serializable(&tree, child);
        assert_eq!(child_names(&obj), vec!["sqlFile", "rollback"]);
        match &obj.field("sqlFile").map(|f| &f.value) {
            Some(FieldValue::Object(sql)) => {
                assert_eq!(sql.source_path.as_deref(), Some("db/sub/people.xml"));
                assert_eq!(sql.identity.as_deref(), Some("db/sub/people.xml::1::a"));
            }
            other => panic!("Expected sqlFile object, got {:?}", other),
        }
    }

    #[test]
    fn test_change_set_preconditions_only_when_present() {
        let mut tree = ChangeLogTree::new("a.xml");
        let mut cs = ChangeSet::new("1", "a", "a.xml");
        cs.preconditions = Some(PreconditionContainer::default());
        let r = tree.add_change_set(tree.root, cs);
        let obj = ChangeLogChild::ChangeSet(r).to_serializable(&tree, tree.root);
        assert!(child_names(&obj).is_empty());
    }

    // ── properties / includes ──────────────────────────────────────────

    #[test]
    fn test_property_shape() {
        let mut tree = ChangeLogTree::new("a.xml");
        let mut param = ChangeLogParameter::new("schema", "public").local();
        param.valid_databases = vec!["h2".into(), "postgresql".into()];
        param.contexts = Some("test".into());
        let p = tree.add_parameter(Some(tree.root), param);

        let obj = ChangeLogChild::Property(p).to_serializable(&tree, tree.root);
        assert_eq!(obj.name, "property");
        assert_eq!(attr(&obj, "name").as_deref(), Some("schema"));
        assert_eq!(attr(&obj, "value").as_deref(), Some("public"));
        assert_eq!(attr(&obj, "dbms").as_deref(), Some("h2,postgresql"));
        assert_eq!(attr(&obj, "context").as_deref(), Some("test"));
        assert_eq!(attr(&obj, "global").as_deref(), Some("false"));
        assert!(attr(&obj, "labels").is_none());
    }

    #[test]
    fn test_global_property_omits_flag() {
        let mut tree = ChangeLogTree::new("a.xml");
        let p = tree.add_parameter(Some(tree.root), ChangeLogParameter::new("x", "1"));
        let obj = ChangeLogChild::Property(p).to_serializable(&tree, tree.root);
        assert!(attr(&obj, "global").is_none());
    }

    #[test]
    fn test_include_shape() {
        let tree = ChangeLogTree::new("a.xml");
        let include = Include {
            file: "db/people.xml".into(),
            contexts: Some("prod".into()),
            labels: None,
        };
        let obj = ChangeLogChild::Include(include).to_serializable(&tree, tree.root);
        assert_eq!(obj.name, "include");
        assert_eq!(attr(&obj, "file").as_deref(), Some("db/people.xml"));
        assert_eq!(attr(&obj, "context").as_deref(), Some("prod"));
        assert!(attr(&obj, "labels").is_none());
    }

    // ── preconditions ──────────────────────────────────────────────────

    #[test]
    fn test_preconditions_object_non_default_only() {
        let container = PreconditionContainer {
            on_fail: FailOption::MarkRan,
            nested: vec![Precondition::Not(vec![Precondition::Check(
                SerializableObject::new("tableExists").with_attribute("tableName", "person"),
            )])],
            ..Default::default()
        };
        let obj = preconditions_object(&container);
        assert_eq!(obj.name, "preConditions");
        assert_eq!(attr(&obj, "onFail").as_deref(), Some("MARK_RAN"));
        assert!(attr(&obj, "onError").is_none());
        assert!(attr(&obj, "onSqlOutput").is_none());
        assert_eq!(child_names(&obj), vec!["not"]);
        match &obj.fields.last().map(|f| &f.value) {
            Some(FieldValue::Object(not)) => assert_eq!(child_names(not), vec!["tableExists"]),
            other => panic!("Expected not object, got {:?}", other),
        }
    }
}
