//! Generic object serializer.
//!
//! Walks a [`SerializableObject`] graph and writes it through an
//! [`XmlWriter`]: attribute-mode scalars become attributes of the object's
//! element, everything else becomes child elements or character content,
//! in declared field order.

use crate::config::{XSI_NAMESPACE, XmlConfig};
use crate::error::{Result, XmlError};
use crate::writer::XmlWriter;
use changelog::v1::{
    Field, FieldValue, STANDARD_CHANGELOG_NAMESPACE, Scalar, SerializableObject,
    SerializationMode,
};
use std::io::Write;

/// Flag field that makes a path field relative to the change-log file.
pub const RELATIVE_TO_CHANGELOG_FILE: &str = "relativeToChangelogFile";

/// Declares that objects of one kind carry a file path which may be
/// relative to the defining change-log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePathRule {
    pub namespace: String,
    pub element: String,
    pub path_field: String,
    pub flag_field: String,
}

impl RelativePathRule {
    pub fn new(element: impl Into<String>, path_field: impl Into<String>) -> Self {
        Self {
            namespace: STANDARD_CHANGELOG_NAMESPACE.to_string(),
            element: element.into(),
            path_field: path_field.into(),
            flag_field: RELATIVE_TO_CHANGELOG_FILE.to_string(),
        }
    }

    fn applies_to(&self, obj: &SerializableObject) -> bool {
        obj.name == self.element && obj.namespace == self.namespace
    }
}

fn default_rules() -> Vec<RelativePathRule> {
    vec![
        RelativePathRule::new("loadData", "file"),
        RelativePathRule::new("loadUpdateData", "file"),
        RelativePathRule::new("sqlFile", "path"),
        RelativePathRule::new("createView", "path"),
        RelativePathRule::new("createProcedure", "path"),
    ]
}

/// Serializes generic objects as XML.
#[derive(Debug, Clone)]
pub struct ObjectSerializer {
    config: XmlConfig,
    rules: Vec<RelativePathRule>,
}

impl ObjectSerializer {
    /// Create a serializer with the built-in relative path rules.
    pub fn new(config: XmlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rules: default_rules(),
        })
    }

    pub fn config(&self) -> &XmlConfig {
        &self.config
    }

    /// Register another kind whose path field is relative to its
    /// change-log file when the flag field is true.
    pub fn with_rule(mut self, rule: RelativePathRule) -> Self {
        self.rules.retain(|r| !(r.element == rule.element && r.namespace == rule.namespace));
        self.rules.push(rule);
        self
    }

    /// Write a complete change-log document: declaration, a
    /// `databaseChangeLog` root and `elements` in order.
    pub fn write<W, I>(&self, elements: I, out: W) -> Result<W>
    where
        W: Write,
        I: IntoIterator<Item = SerializableObject>,
    {
        self.write_document(&SerializableObject::new("databaseChangeLog"), elements, out)
    }

    /// Like [`ObjectSerializer::write`] with the attribute fields of `root`
    /// written on the root element.
    pub fn write_document<W, I>(&self, root: &SerializableObject, elements: I, out: W) -> Result<W>
    where
        W: Write,
        I: IntoIterator<Item = SerializableObject>,
    {
        let mut writer = XmlWriter::new(out, &self.config);
        writer.start_document()?;
        for ns in &self.config.namespaces {
            writer.declare_prefix(&ns.prefix, &ns.uri)?;
        }
        writer.start_element(Some(&root.namespace), &root.name)?;
        let remaining = self.write_attributes(&mut writer, root)?;
        if let Some(locations) = self.config.schema_location() {
            writer.declare_prefix("xsi", XSI_NAMESPACE)?;
            writer.add_attribute_ns(XSI_NAMESPACE, "schemaLocation", &locations)?;
        }
        for field in remaining {
            self.write_field(&mut writer, root, field)?;
        }
        for element in elements {
            self.write_object(&mut writer, &element)?;
        }
        writer.end_element()?;
        writer.end_document()?;
        Ok(writer.into_inner())
    }

    /// Serialize one object as a standalone fragment, without declaration.
    pub fn serialize(&self, object: &SerializableObject, pretty: bool) -> Result<String> {
        let config = XmlConfig {
            indent: if pretty { self.config.indent.or(Some(4)) } else { None },
            xml_declaration: false,
            ..self.config.clone()
        };
        let mut writer = XmlWriter::new(Vec::new(), &config);
        writer.start_document()?;
        self.write_object(&mut writer, object)?;
        writer.end_document()?;
        let bytes = writer.into_inner();
        let text = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(text.trim_end().to_string())
    }

    /// Write one object as an element.
    pub fn write_object<W: Write>(
        &self,
        writer: &mut XmlWriter<W>,
        obj: &SerializableObject,
    ) -> Result<()> {
        writer.start_element(Some(&obj.namespace), &obj.name)?;
        let remaining = self.write_attributes(writer, obj)?;
        for field in remaining {
            self.write_field(writer, obj, field)?;
        }
        writer.end_element()
    }

    /// Write the attribute-mode scalar fields of `obj` and return the
    /// fields left for child content.
    fn write_attributes<'o, W: Write>(
        &self,
        writer: &mut XmlWriter<W>,
        obj: &'o SerializableObject,
    ) -> Result<Vec<&'o Field>> {
        let rule = self.rules.iter().find(|r| r.applies_to(obj));
        let relative = rule.is_some_and(|r| {
            obj.scalar(&r.flag_field)
                .and_then(Scalar::as_bool)
                .unwrap_or(false)
        });

        let mut remaining = Vec::new();
        for field in &obj.fields {
            let scalar = match (&field.mode, &field.value) {
                (SerializationMode::Attribute, FieldValue::Scalar(s)) => s,
                _ => {
                    remaining.push(field);
                    continue;
                }
            };
            let mut value = scalar.to_string();
            if let Some(rule) = rule {
                if field.name == rule.flag_field {
                    continue;
                }
                if relative
                    && field.name == rule.path_field
                    && let Some(base) = obj.source_path.as_deref()
                {
                    value = resolve_relative(base, &value);
                }
            } else if field.name == RELATIVE_TO_CHANGELOG_FILE && scalar.as_bool() == Some(false) {
                continue;
            }

            check_xml_chars(&value).map_err(|c| invalid(c, obj, &format!("on {}.{}", obj.name, field.name)))?;
            let ns = field.namespace.as_deref().unwrap_or(&obj.namespace);
            if ns == obj.namespace || ns == STANDARD_CHANGELOG_NAMESPACE {
                writer.add_attribute(&field.name, &value)?;
            } else {
                writer.add_attribute_ns(ns, &field.name, &value)?;
            }
        }
        Ok(remaining)
    }

    fn write_field<W: Write>(
        &self,
        writer: &mut XmlWriter<W>,
        owner: &SerializableObject,
        field: &Field,
    ) -> Result<()> {
        let ns = field.namespace.as_deref().unwrap_or(&owner.namespace);
        self.write_value(writer, owner, ns, &field.name, field.mode, &field.value)
    }

    fn write_value<W: Write>(
        &self,
        writer: &mut XmlWriter<W>,
        owner: &SerializableObject,
        ns: &str,
        name: &str,
        mode: SerializationMode,
        value: &FieldValue,
    ) -> Result<()> {
        match value {
            FieldValue::Object(obj) => self.write_object(writer, obj),
            FieldValue::List(items) => {
                for item in items {
                    self.write_value(writer, owner, ns, name, mode, item)?;
                }
                Ok(())
            }
            FieldValue::NestedList(items) if mode == SerializationMode::NestedElement => {
                writer.start_element(Some(ns), name)?;
                for item in items {
                    self.write_value(writer, owner, ns, name, mode, item)?;
                }
                writer.end_element()
            }
            FieldValue::NestedList(items) => {
                for item in items {
                    self.write_value(writer, owner, ns, name, mode, item)?;
                }
                Ok(())
            }
            FieldValue::Map(entries) => {
                for (key, entry) in entries {
                    writer.start_element(Some(ns), name)?;
                    if mode == SerializationMode::NestedElement {
                        self.write_value(writer, owner, ns, key, mode, entry)?;
                    } else {
                        check_xml_chars(key)
                            .map_err(|c| invalid(c, owner, &format!("on {}.name", name)))?;
                        writer.add_attribute("name", key)?;
                        self.write_map_value(writer, owner, ns, mode, entry)?;
                    }
                    writer.end_element()?;
                }
                Ok(())
            }
            FieldValue::Scalar(s) => match mode {
                SerializationMode::Text => {
                    let text = s.to_string();
                    check_xml_chars(&text).map_err(|c| {
                        invalid(c, owner, &format!("in text of {}.{}", owner.name, name))
                    })?;
                    writer.write_text(&text)
                }
                // Attribute-mode scalars reaching here sit inside a
                // collection; they get an element each.
                SerializationMode::NestedElement | SerializationMode::Attribute => {
                    let text = s.to_string();
                    check_xml_chars(&text)
                        .map_err(|c| invalid(c, owner, &format!("in {}.{}", owner.name, name)))?;
                    writer.start_element(Some(ns), name)?;
                    writer.write_text(&text)?;
                    writer.end_element()
                }
            },
        }
    }

    /// The `value` half of a name/value map entry.
    fn write_map_value<W: Write>(
        &self,
        writer: &mut XmlWriter<W>,
        owner: &SerializableObject,
        ns: &str,
        mode: SerializationMode,
        value: &FieldValue,
    ) -> Result<()> {
        match (mode, value) {
            (SerializationMode::Attribute, FieldValue::Scalar(s)) => {
                let text = s.to_string();
                check_xml_chars(&text).map_err(|c| invalid(c, owner, "on value"))?;
                writer.add_attribute("value", &text)
            }
            _ => self.write_value(writer, owner, ns, "value", mode, value),
        }
    }
}

fn invalid(character: char, obj: &SerializableObject, location: &str) -> XmlError {
    let context = match &obj.identity {
        Some(identity) => format!("{} in changeSet {}", location, identity),
        None => location.to_string(),
    };
    XmlError::InvalidCharacter { character, context }
}

/// Resolve `path` against the directory of `base`. A base without a
/// directory leaves the path unchanged.
pub fn resolve_relative(base: &str, path: &str) -> String {
    let base = base.replace('\\', "/");
    match base.rfind('/') {
        Some(i) => format!("{}/{}", &base[..i], path),
        None => path.to_string(),
    }
}

/// Fail on the first character that XML 1.1 does not allow in documents,
/// either at all or as a literal.
pub fn check_xml_chars(value: &str) -> std::result::Result<(), char> {
    match value.chars().find(|c| !is_xml11_char(*c)) {
        Some(c) => Err(c),
        None => Ok(()),
    }
}

fn is_xml11_char(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{8}'
            | '\u{B}'
            | '\u{C}'
            | '\u{E}'..='\u{1F}'
            | '\u{7F}'..='\u{84}'
            | '\u{86}'..='\u{9F}'
            | '\u{FFFE}'
            | '\u{FFFF}'
    )
}
