use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of the core change-log vocabulary (`databaseChangeLog`,
/// `changeSet`, `include`, `property`, …).
pub const STANDARD_CHANGELOG_NAMESPACE: &str = "http://www.liquibase.org/xml/ns/dbchangelog";

/// Namespace shared by change-log extensions that do not define their own.
pub const GENERIC_CHANGELOG_EXTENSION_NAMESPACE: &str =
    "http://www.liquibase.org/xml/ns/dbchangelog-ext";

fn standard_namespace() -> String {
    STANDARD_CHANGELOG_NAMESPACE.to_string()
}

/// How a field is rendered inside its owning element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationMode {
    /// A flat XML attribute on the owning element.
    #[default]
    Attribute,
    /// A child element wrapping the value (or one per list item).
    NestedElement,
    /// Character content of the owning element.
    Text,
}

/// A leaf value.
///
/// Untagged in JSON: `true`, `42`, `1.5` and `"text"` map to the variant
/// of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
}

impl Scalar {
    /// The value as a boolean, if it is one (`"true"`/`"false"` strings
    /// included, as parsers often hand flags over as text).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Scalar::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Decimal(d) => write!(f, "{}", d),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Decimal(value)
    }
}

/// The value held by a [`Field`].
///
/// `List` is flat repetition: each item is rendered with the field's mode,
/// in order. `NestedList` signals a nested object list: in
/// [`SerializationMode::NestedElement`] the items are additionally wrapped
/// in one element named after the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(Scalar),
    Object(Box<SerializableObject>),
    List(Vec<FieldValue>),
    NestedList(Vec<FieldValue>),
    /// Entries in insertion order.
    Map(Vec<(String, FieldValue)>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(value.into())
    }
}

impl From<SerializableObject> for FieldValue {
    fn from(value: SerializableObject) -> Self {
        FieldValue::Object(Box::new(value))
    }
}

/// One named, ordered field of a [`SerializableObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub mode: SerializationMode,
    pub value: FieldValue,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        mode: SerializationMode,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            mode,
            value: value.into(),
        }
    }

    /// Put the field in an explicit namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Any node of a serializable object graph: a change, a precondition, a
/// change-set, or anything else that renders to one XML element.
///
/// # JSON shape
///
/// ```json
/// {
///   "name": "sqlFile",
///   "fields": [
///     { "name": "path", "value": { "scalar": "sql/init.sql" } },
///     { "name": "relativeToChangelogFile", "value": { "scalar": true } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableObject {
    pub name: String,
    #[serde(default = "standard_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Physical file of the change-set that defines this object; base for
    /// relative-path rewrites.
    #[serde(skip)]
    pub source_path: Option<String>,
    /// Human-readable identity used in error messages (e.g. a change-set's
    /// `path::id::author`).
    #[serde(skip)]
    pub identity: Option<String>,
}

impl SerializableObject {
    /// Create an object in the standard change-log namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_namespace(STANDARD_CHANGELOG_NAMESPACE, name)
    }

    pub fn with_namespace(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            fields: Vec::new(),
            source_path: None,
            identity: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Add an attribute-mode field.
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.with_field(Field::new(
            name,
            SerializationMode::Attribute,
            FieldValue::Scalar(value.into()),
        ))
    }

    /// Add a nested-element field.
    pub fn with_nested(self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with_field(Field::new(name, SerializationMode::NestedElement, value))
    }

    /// Add a text-mode field.
    pub fn with_text(self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.with_field(Field::new(
            name,
            SerializationMode::Text,
            FieldValue::Scalar(value.into()),
        ))
    }

    /// Add a child object rendered as its own element.
    pub fn with_object(self, name: impl Into<String>, object: SerializableObject) -> Self {
        self.with_field(Field::new(name, SerializationMode::NestedElement, object))
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a scalar field value by name.
    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        self.field(name).and_then(|f| f.value.as_scalar())
    }

    /// Set the origin file on this object and every nested object.
    pub fn set_source_path(&mut self, path: &str) {
        self.source_path = Some(path.to_string());
        for field in &mut self.fields {
            set_value_source_path(&mut field.value, path);
        }
    }
}

fn set_value_source_path(value: &mut FieldValue, path: &str) {
    match value {
        FieldValue::Scalar(_) => {}
        FieldValue::Object(obj) => obj.set_source_path(path),
        FieldValue::List(items) | FieldValue::NestedList(items) => {
            for item in items {
                set_value_source_path(item, path);
            }
        }
        FieldValue::Map(entries) => {
            for (_, item) in entries {
                set_value_source_path(item, path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::from("abc").to_string(), "abc");
        assert_eq!(Scalar::from(true).to_string(), "true");
        assert_eq!(Scalar::from(42i64).to_string(), "42");
        assert_eq!(Scalar::from(1.5f64).to_string(), "1.5");
    }

    #[test]
    fn test_scalar_as_bool() {
        assert_eq!(Scalar::from(true).as_bool(), Some(true));
        assert_eq!(Scalar::from("FALSE").as_bool(), Some(false));
        assert_eq!(Scalar::from("yes").as_bool(), None);
        assert_eq!(Scalar::from(1i64).as_bool(), None);
    }

    #[test]
    fn test_scalar_untagged_json() {
        let values: Vec<Scalar> = serde_json::from_str(r#"[true, 7, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Bool(true),
                Scalar::Integer(7),
                Scalar::Decimal(2.5),
                Scalar::String("x".into())
            ]
        );
    }

    #[test]
    fn test_object_builder_keeps_order() {
        let obj = SerializableObject::new("createTable")
            .with_attribute("tableName", "person")
            .with_attribute("schemaName", "public")
            .with_text("remarks", "people");
        let names: Vec<_> = obj.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["tableName", "schemaName", "remarks"]);
        assert_eq!(obj.namespace, STANDARD_CHANGELOG_NAMESPACE);
        assert_eq!(obj.scalar("tableName"), Some(&Scalar::from("person")));
        assert!(obj.scalar("missing").is_none());
    }

    #[test]
    fn test_object_json_defaults_namespace() {
        let json = r#"{"name":"sql","fields":[{"name":"sql","mode":"text","value":{"scalar":"select 1"}}]}"#;
        let obj: SerializableObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.namespace, STANDARD_CHANGELOG_NAMESPACE);
        assert_eq!(obj.fields[0].mode, SerializationMode::Text);
        assert!(obj.source_path.is_none());
    }

    #[test]
    fn test_set_source_path_recurses() {
        let column = SerializableObject::new("column").with_attribute("name", "id");
        let mut obj = SerializableObject::new("createTable").with_field(Field::new(
            "columns",
            SerializationMode::NestedElement,
            FieldValue::List(vec![column.into()]),
        ));
        obj.set_source_path("db/changelog.xml");
        assert_eq!(obj.source_path.as_deref(), Some("db/changelog.xml"));
        match &obj.fields[0].value {
            FieldValue::List(items) => match &items[0] {
                FieldValue::Object(child) => {
                    assert_eq!(child.source_path.as_deref(), Some("db/changelog.xml"))
                }
                other => panic!("Expected object, got {:?}", other),
            },
            other => panic!("Expected list, got {:?}", other),
        }
    }
}
