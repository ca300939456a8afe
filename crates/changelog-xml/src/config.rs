use crate::error::{Result, XmlError};
use changelog::v1::{GENERIC_CHANGELOG_EXTENSION_NAMESPACE, STANDARD_CHANGELOG_NAMESPACE};

/// Namespace of `xsi:schemaLocation`.
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const STANDARD_CHANGELOG_SCHEMA_URL: &str =
    "http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-latest.xsd";

pub const GENERIC_CHANGELOG_EXTENSION_SCHEMA_URL: &str =
    "http://www.liquibase.org/xml/ns/dbchangelog-ext/dbchangelog-ext.xsd";

/// A namespace known ahead of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDetails {
    /// Preferred prefix; empty for the default namespace.
    pub prefix: String,
    pub uri: String,
    /// Listed in `xsi:schemaLocation` when set.
    pub schema_url: Option<String>,
}

impl NamespaceDetails {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
            schema_url: None,
        }
    }

    pub fn with_schema_url(mut self, url: impl Into<String>) -> Self {
        self.schema_url = Some(url.into());
        self
    }
}

/// Output settings for one serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlConfig {
    /// Encoding named in the XML declaration.
    pub encoding: String,
    /// Spaces per nesting level, `None` for compact output.
    pub indent: Option<usize>,
    pub xml_declaration: bool,
    /// Emit `xmlns` attributes for the namespaces in use.
    pub namespace_declarations: bool,
    pub namespaces: Vec<NamespaceDetails>,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            encoding: "UTF-8".to_string(),
            indent: Some(4),
            xml_declaration: true,
            namespace_declarations: true,
            namespaces: vec![
                NamespaceDetails::new("", STANDARD_CHANGELOG_NAMESPACE)
                    .with_schema_url(STANDARD_CHANGELOG_SCHEMA_URL),
                NamespaceDetails::new("ext", GENERIC_CHANGELOG_EXTENSION_NAMESPACE)
                    .with_schema_url(GENERIC_CHANGELOG_EXTENSION_SCHEMA_URL),
            ],
        }
    }
}

impl XmlConfig {
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_xml_declaration(mut self, enabled: bool) -> Self {
        self.xml_declaration = enabled;
        self
    }

    pub fn with_namespace_declarations(mut self, enabled: bool) -> Self {
        self.namespace_declarations = enabled;
        self
    }

    /// Register another namespace. A later registration of the same URI
    /// replaces the earlier one.
    pub fn with_namespace(mut self, details: NamespaceDetails) -> Self {
        self.namespaces.retain(|n| n.uri != details.uri);
        self.namespaces.push(details);
        self
    }

    /// Reject encodings other than UTF-8; output bytes are always UTF-8.
    pub fn validate(&self) -> Result<()> {
        let normalized = self.encoding.to_ascii_lowercase().replace(['-', '_'], "");
        if normalized == "utf8" {
            Ok(())
        } else {
            Err(XmlError::UnsupportedEncoding(self.encoding.clone()))
        }
    }

    /// Registered prefix for `uri`.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|n| n.uri == uri)
            .map(|n| n.prefix.as_str())
    }

    /// `namespace schemaUrl` pairs of every registered namespace that has
    /// a schema, space-joined.
    pub fn schema_location(&self) -> Option<String> {
        let pairs: Vec<String> = self
            .namespaces
            .iter()
            .filter_map(|n| n.schema_url.as_ref().map(|url| format!("{} {}", n.uri, url)))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join(" "))
        }
    }
}
