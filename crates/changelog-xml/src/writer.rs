//! Namespace-aware streaming XML writer.
//!
//! [`XmlWriter`] keeps the start tag of the innermost element open until
//! something is written inside it, so attributes and namespace
//! declarations can still be added. Once text or a child element has been
//! written the tag is flushed and its attributes are frozen.

use crate::config::{NamespaceDetails, XmlConfig};
use crate::error::{Result, XmlError};
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use std::borrow::Cow;
use std::io::Write;

/// Where the writer is in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet.
    NoDocument,
    /// Document started, root element not yet opened.
    Prolog,
    /// An element is open and its start tag is still accepting attributes.
    StartTagOpen,
    /// Inside an element whose start tag has been flushed.
    Content,
    /// Root element closed.
    Epilog,
    /// `end_document` called.
    Closed,
}

#[derive(Debug)]
struct OpenElement {
    qname: String,
    scope_len: usize,
}

#[derive(Debug, Default)]
struct PendingTag {
    declarations: Vec<(String, String)>,
    attributes: Vec<(String, String)>,
}

pub struct XmlWriter<W: Write> {
    inner: Writer<W>,
    state: WriterState,
    stack: Vec<OpenElement>,
    /// `(prefix, uri)` bindings in scope, outermost first.
    bindings: Vec<(String, String)>,
    pending: Option<PendingTag>,
    queued: Vec<(String, String)>,
    well_known: Vec<NamespaceDetails>,
    encoding: String,
    xml_declaration: bool,
    namespace_declarations: bool,
    next_auto: usize,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W, config: &XmlConfig) -> Self {
        let inner = match config.indent {
            Some(n) if n > 0 => Writer::new_with_indent(out, b' ', n),
            _ => Writer::new(out),
        };
        Self {
            inner,
            state: WriterState::NoDocument,
            stack: Vec::new(),
            bindings: Vec::new(),
            pending: None,
            queued: Vec::new(),
            well_known: config.namespaces.clone(),
            encoding: config.encoding.clone(),
            xml_declaration: config.xml_declaration,
            namespace_declarations: config.namespace_declarations,
            next_auto: 1,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Nesting depth of the currently open element (0 outside the root).
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Begin the document, writing the XML declaration if configured.
    pub fn start_document(&mut self) -> Result<()> {
        if self.state != WriterState::NoDocument {
            return Err(self.misuse("start_document called twice"));
        }
        if self.xml_declaration {
            let decl = format!(
                "<?xml version=\"1.1\" encoding=\"{}\"?>\n",
                self.encoding
            );
            self.inner.get_mut().write_all(decl.as_bytes())?;
        }
        self.state = WriterState::Prolog;
        Ok(())
    }

    /// Bind `prefix` to `uri`. Applies to the open start tag if there is
    /// one, otherwise to the next element started.
    pub fn declare_prefix(&mut self, prefix: &str, uri: &str) -> Result<()> {
        match self.state {
            WriterState::StartTagOpen => {
                self.bind(prefix, uri);
                Ok(())
            }
            WriterState::Closed | WriterState::Epilog => {
                Err(self.misuse(&format!("cannot declare prefix '{}' after the root element", prefix)))
            }
            _ => {
                self.queued.push((prefix.to_string(), uri.to_string()));
                Ok(())
            }
        }
    }

    /// Open an element. The namespace prefix is taken from the bindings
    /// in scope, then from the well-known namespaces, then auto-assigned
    /// as `ns1`, `ns2`, …
    pub fn start_element(&mut self, namespace: Option<&str>, local_name: &str) -> Result<()> {
        match self.state {
            WriterState::NoDocument | WriterState::Epilog | WriterState::Closed => {
                return Err(self.misuse(&format!(
                    "cannot start element <{}> in state {:?}",
                    local_name, self.state
                )));
            }
            _ => {}
        }
        self.flush_pending()?;

        let scope_len = self.bindings.len();
        self.pending = Some(PendingTag::default());
        for (prefix, uri) in std::mem::take(&mut self.queued) {
            self.bind(&prefix, &uri);
        }

        let prefix = match namespace {
            Some(uri) => self.element_prefix(uri),
            None => {
                if self.lookup_prefix("").is_some_and(|uri| !uri.is_empty()) {
                    self.bind("", "");
                }
                String::new()
            }
        };
        let qname = qualify(&prefix, local_name);
        self.stack.push(OpenElement { qname, scope_len });
        self.state = WriterState::StartTagOpen;
        Ok(())
    }

    /// Add an unqualified (or already qualified) attribute to the open tag.
    pub fn add_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        if self.state != WriterState::StartTagOpen {
            return Err(self.misuse(&format!(
                "attribute '{}' added after the start tag was flushed",
                name
            )));
        }
        if let Some(tag) = self.pending.as_mut() {
            tag.attributes.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Add an attribute in `namespace`, declaring a prefix for it on the
    /// open tag when none is in scope.
    pub fn add_attribute_ns(&mut self, namespace: &str, local_name: &str, value: &str) -> Result<()> {
        if self.state != WriterState::StartTagOpen {
            return Err(self.misuse(&format!(
                "attribute '{}' added after the start tag was flushed",
                local_name
            )));
        }
        let prefix = self.attribute_prefix(namespace);
        self.add_attribute(&qualify(&prefix, local_name), value)
    }

    /// Write escaped character content into the open element.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            return Err(self.misuse("text outside of the root element"));
        }
        self.flush_pending()?;
        let escaped = escape(text).replace('\r', "&#13;");
        self.inner
            .write_event(Event::Text(BytesText::from_escaped(escaped)))?;
        Ok(())
    }

    /// Close the innermost element; an element with no content is written
    /// as an empty-element tag.
    pub fn end_element(&mut self) -> Result<()> {
        let Some(open) = self.stack.pop() else {
            return Err(self.misuse("end_element without an open element"));
        };
        if self.state == WriterState::StartTagOpen {
            let tag = self.pending.take().unwrap_or_default();
            let start = self.build_start(&open.qname, tag);
            self.inner.write_event(Event::Empty(start))?;
        } else {
            self.inner
                .write_event(Event::End(BytesEnd::new(open.qname.as_str())))?;
        }
        self.bindings.truncate(open.scope_len);
        self.state = if self.stack.is_empty() {
            WriterState::Epilog
        } else {
            WriterState::Content
        };
        Ok(())
    }

    /// Close every open element and flush the sink.
    pub fn end_document(&mut self) -> Result<()> {
        if matches!(self.state, WriterState::NoDocument | WriterState::Closed) {
            return Err(self.misuse(&format!("end_document in state {:?}", self.state)));
        }
        while !self.stack.is_empty() {
            self.end_element()?;
        }
        let out = self.inner.get_mut();
        out.write_all(b"\n")?;
        out.flush()?;
        self.state = WriterState::Closed;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    fn misuse(&self, message: &str) -> XmlError {
        XmlError::WriterState(message.to_string())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.state != WriterState::StartTagOpen {
            return Ok(());
        }
        let tag = self.pending.take().unwrap_or_default();
        let qname = match self.stack.last() {
            Some(open) => open.qname.clone(),
            None => return Err(self.misuse("open start tag without an element")),
        };
        let start = self.build_start(&qname, tag);
        self.inner.write_event(Event::Start(start))?;
        self.state = WriterState::Content;
        Ok(())
    }

    fn build_start(&self, qname: &str, tag: PendingTag) -> BytesStart<'static> {
        let mut start = BytesStart::new(qname.to_string());
        if self.namespace_declarations {
            for (prefix, uri) in &tag.declarations {
                let key = if prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{}", prefix)
                };
                push_escaped(&mut start, &key, uri);
            }
        }
        for (name, value) in &tag.attributes {
            push_escaped(&mut start, name, value);
        }
        start
    }

    fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }

    fn bind(&mut self, prefix: &str, uri: &str) {
        if self.lookup_prefix(prefix) == Some(uri) {
            return;
        }
        self.bindings.push((prefix.to_string(), uri.to_string()));
        if let Some(tag) = self.pending.as_mut() {
            tag.declarations.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// A prefix currently bound to `uri`, not shadowed by an inner binding.
    fn bound_prefix(&self, uri: &str, allow_default: bool) -> Option<String> {
        self.bindings
            .iter()
            .rev()
            .filter(|(p, u)| u == uri && (allow_default || !p.is_empty()))
            .find(|(p, _)| self.lookup_prefix(p) == Some(uri))
            .map(|(p, _)| p.clone())
    }

    fn element_prefix(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.bound_prefix(uri, true) {
            return prefix;
        }
        let prefix = self.fresh_prefix(uri, true);
        self.bind(&prefix, uri);
        prefix
    }

    fn attribute_prefix(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.bound_prefix(uri, false) {
            return prefix;
        }
        let prefix = self.fresh_prefix(uri, false);
        self.bind(&prefix, uri);
        prefix
    }

    fn fresh_prefix(&mut self, uri: &str, allow_default: bool) -> String {
        let preferred = self
            .well_known
            .iter()
            .find(|n| n.uri == uri)
            .map(|n| n.prefix.clone());
        if let Some(prefix) = preferred
            && (allow_default || !prefix.is_empty())
            && self.lookup_prefix(&prefix).is_none()
        {
            return prefix;
        }
        loop {
            let candidate = format!("ns{}", self.next_auto);
            self.next_auto += 1;
            if self.lookup_prefix(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

/// Escape an attribute value so a parser reads it back unchanged: markup
/// characters as entities, and tab, newline and carriage return as
/// character references (attribute value normalization would otherwise
/// turn them into spaces).
pub(crate) fn escape_attribute(value: &str) -> String {
    escape(value)
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}

/// Append `name="value"` to `start`, escaped with [`escape_attribute`].
pub(crate) fn push_escaped(start: &mut BytesStart<'_>, name: &str, value: &str) {
    start.push_attribute(Attribute {
        key: QName(name.as_bytes()),
        value: Cow::Owned(escape_attribute(value).into_bytes()),
    });
}

fn qualify(prefix: &str, local_name: &str) -> String {
    if prefix.is_empty() {
        local_name.to_string()
    } else {
        format!("{}:{}", prefix, local_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changelog::v1::STANDARD_CHANGELOG_NAMESPACE;

    fn render(config: &XmlConfig, body: impl FnOnce(&mut XmlWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut w = XmlWriter::new(Vec::new(), config);
        w.start_document().unwrap();
        body(&mut w).unwrap();
        w.end_document().unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    // ── documents ──────────────────────────────────────────────────────

    #[test]
    fn test_declaration_and_default_namespace() {
        let xml = render(&XmlConfig::default(), |w| {
            w.start_element(Some(STANDARD_CHANGELOG_NAMESPACE), "databaseChangeLog")?;
            w.start_element(Some(STANDARD_CHANGELOG_NAMESPACE), "changeSet")?;
            w.add_attribute("id", "1")?;
            w.add_attribute("author", "alex")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(
            xml,
            "<?xml version=\"1.1\" encoding=\"UTF-8\"?>\n\
             <databaseChangeLog xmlns=\"http://www.liquibase.org/xml/ns/dbchangelog\">\n    \
             <changeSet id=\"1\" author=\"alex\"/>\n\
             </databaseChangeLog>\n"
        );
    }

    #[test]
    fn test_compact_without_declaration() {
        let config = XmlConfig::default()
            .with_indent(None)
            .with_xml_declaration(false);
        let xml = render(&config, |w| {
            w.start_element(None, "root")?;
            w.start_element(None, "a")?;
            w.write_text("x < y & z")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(xml, "<root><a>x &lt; y &amp; z</a></root>\n");
    }

    #[test]
    fn test_namespace_declarations_suppressed() {
        let config = XmlConfig::default()
            .with_namespace_declarations(false)
            .with_xml_declaration(false);
        let xml = render(&config, |w| {
            w.start_element(Some(STANDARD_CHANGELOG_NAMESPACE), "databaseChangeLog")?;
            w.end_element()
        });
        assert_eq!(xml, "<databaseChangeLog/>\n");
    }

    #[test]
    fn test_whitespace_in_values_survives_reparse() {
        let config = XmlConfig::default().with_indent(None).with_xml_declaration(false);
        let xml = render(&config, |w| {
            w.start_element(None, "addColumn")?;
            w.add_attribute("remarks", "line1\nline2\tz\r<\"")?;
            w.write_text("a\r\nb")?;
            w.end_element()
        });
        assert_eq!(
            xml,
            "<addColumn remarks=\"line1&#10;line2&#9;z&#13;&lt;&quot;\">a&#13;\nb</addColumn>\n"
        );

        let mut reader = quick_xml::Reader::from_str(&xml);
        let mut remarks = None;
        let mut text = None;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => {
                    let attr = e.try_get_attribute("remarks").unwrap().unwrap();
                    remarks = Some(attr.unescape_value().unwrap().into_owned());
                }
                Event::Text(t) if text.is_none() => {
                    text = Some(t.unescape().unwrap().into_owned())
                }
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(remarks.as_deref(), Some("line1\nline2\tz\r<\""));
        assert_eq!(text.as_deref(), Some("a\r\nb"));
    }

    // ── prefixes ───────────────────────────────────────────────────────

    #[test]
    fn test_auto_prefixes() {
        let config = XmlConfig::default().with_xml_declaration(false).with_indent(None);
        let xml = render(&config, |w| {
            w.start_element(Some(STANDARD_CHANGELOG_NAMESPACE), "databaseChangeLog")?;
            w.start_element(Some("urn:one"), "a")?;
            w.end_element()?;
            w.start_element(Some("urn:two"), "b")?;
            w.start_element(Some("urn:two"), "c")?;
            w.end_element()?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(
            xml,
            "<databaseChangeLog xmlns=\"http://www.liquibase.org/xml/ns/dbchangelog\">\
             <ns1:a xmlns:ns1=\"urn:one\"/>\
             <ns2:b xmlns:ns2=\"urn:two\"><ns2:c/></ns2:b>\
             </databaseChangeLog>\n"
        );
    }

    #[test]
    fn test_declared_prefix_wins() {
        let config = XmlConfig::default().with_xml_declaration(false).with_indent(None);
        let xml = render(&config, |w| {
            w.declare_prefix("x", "urn:x")?;
            w.start_element(None, "root")?;
            w.start_element(Some("urn:x"), "item")?;
            w.add_attribute_ns("urn:x", "flag", "1")?;
            w.end_element()?;
            w.end_element()
        });
        assert_eq!(xml, "<root xmlns:x=\"urn:x\"><x:item x:flag=\"1\"/></root>\n");
    }

    #[test]
    fn test_well_known_prefix_used() {
        let config = XmlConfig::default().with_xml_declaration(false).with_indent(None);
        let xml = render(&config, |w| {
            w.start_element(Some(STANDARD_CHANGELOG_NAMESPACE), "databaseChangeLog")?;
            w.start_element(
                Some(changelog::v1::GENERIC_CHANGELOG_EXTENSION_NAMESPACE),
                "custom",
            )?;
            w.end_element()?;
            w.end_element()
        });
        assert!(xml.contains(
            "<ext:custom xmlns:ext=\"http://www.liquibase.org/xml/ns/dbchangelog-ext\"/>"
        ));
    }

    // ── state machine ──────────────────────────────────────────────────

    #[test]
    fn test_attribute_after_child_fails() {
        let mut w = XmlWriter::new(Vec::new(), &XmlConfig::default());
        w.start_document().unwrap();
        w.start_element(None, "root").unwrap();
        w.start_element(None, "child").unwrap();
        w.end_element().unwrap();
        assert_eq!(w.state(), WriterState::Content);
        assert!(matches!(
            w.add_attribute("late", "1"),
            Err(XmlError::WriterState(_))
        ));
    }

    #[test]
    fn test_attribute_after_text_fails() {
        let mut w = XmlWriter::new(Vec::new(), &XmlConfig::default());
        w.start_document().unwrap();
        w.start_element(None, "root").unwrap();
        w.write_text("t").unwrap();
        assert!(w.add_attribute("late", "1").is_err());
    }

    #[test]
    fn test_element_before_document_fails() {
        let mut w = XmlWriter::new(Vec::new(), &XmlConfig::default());
        assert!(w.start_element(None, "root").is_err());
        assert_eq!(w.state(), WriterState::NoDocument);
    }

    #[test]
    fn test_second_root_fails() {
        let mut w = XmlWriter::new(Vec::new(), &XmlConfig::default());
        w.start_document().unwrap();
        w.start_element(None, "root").unwrap();
        w.end_element().unwrap();
        assert_eq!(w.state(), WriterState::Epilog);
        assert!(w.start_element(None, "again").is_err());
        assert!(w.end_element().is_err());
    }

    #[test]
    fn test_end_document_closes_open_elements() {
        let config = XmlConfig::default().with_xml_declaration(false).with_indent(None);
        let mut w = XmlWriter::new(Vec::new(), &config);
        w.start_document().unwrap();
        w.start_element(None, "a").unwrap();
        w.start_element(None, "b").unwrap();
        w.write_text("t").unwrap();
        w.end_document().unwrap();
        assert_eq!(w.state(), WriterState::Closed);
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "<a><b>t</b></a>\n");
    }
}
