//! Second pass over rendered change-log XML.
//!
//! The filter re-reads one file's bytes as XML events and copies them to
//! the output, adding `logicalFilePath` (and the change-log `context`) to
//! the root element and `logicalFilePath` to re-homed change-sets. Values
//! already present are never replaced; a mismatch is only reported.

use crate::error::Result;
use crate::writer::push_escaped;
use changelog::v1::{
    ChangeLogTree, LogicalPathOverrides, NodeId, STANDARD_CHANGELOG_NAMESPACE, normalize_separators,
};
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use std::io::{BufRead, Write};

const EVENT_BUFFER_SIZE: usize = 8 * 1024;

const LOGICAL_FILE_PATH: &str = "logicalFilePath";

pub struct AttributesFilter<'a> {
    logical_path: String,
    contexts: Option<String>,
    overrides: &'a LogicalPathOverrides,
}

impl<'a> AttributesFilter<'a> {
    pub fn new(
        logical_path: impl Into<String>,
        contexts: Option<String>,
        overrides: &'a LogicalPathOverrides,
    ) -> Self {
        Self {
            logical_path: logical_path.into(),
            contexts: contexts.filter(|c| !c.trim().is_empty()),
            overrides,
        }
    }

    /// Filter for the output file of `node`.
    pub fn for_node(tree: &ChangeLogTree, node: NodeId, overrides: &'a LogicalPathOverrides) -> Self {
        let n = tree.node(node);
        Self::new(
            normalize_separators(n.logical_file_path()),
            n.contexts.clone(),
            overrides,
        )
    }

    /// Copy `input` to `out`, rewriting root and change-set attributes.
    ///
    /// Events are read one at a time into a single reused buffer. External
    /// entities are never resolved; a DOCTYPE is copied through untouched.
    pub fn apply<R: BufRead, W: Write>(&self, input: R, out: W) -> Result<W> {
        let mut reader = NsReader::from_reader(input);
        let mut writer = Writer::new(out);
        let mut buf = Vec::with_capacity(EVENT_BUFFER_SIZE);
        let mut depth = 0usize;

        loop {
            buf.clear();
            let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
            let standard = matches!(
                ns,
                ResolveResult::Bound(Namespace(uri)) if uri == STANDARD_CHANGELOG_NAMESPACE.as_bytes()
            );
            match event {
                Event::Eof => break,
                Event::Start(mut e) => {
                    self.rewrite(&mut e, depth == 0, standard)?;
                    depth += 1;
                    writer.write_event(Event::Start(e))?;
                }
                Event::Empty(mut e) => {
                    self.rewrite(&mut e, depth == 0, standard)?;
                    writer.write_event(Event::Empty(e))?;
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    writer.write_event(Event::End(e))?;
                }
                other => writer.write_event(other)?,
            }
        }

        let mut out = writer.into_inner();
        out.flush()?;
        Ok(out)
    }

    fn rewrite(&self, e: &mut BytesStart<'_>, is_root: bool, standard: bool) -> Result<()> {
        if !standard {
            return Ok(());
        }
        let (change_log, change_set) = {
            let local = e.local_name();
            (
                local.as_ref() == b"databaseChangeLog",
                local.as_ref() == b"changeSet",
            )
        };
        if is_root && change_log {
            self.rewrite_root(e)
        } else if change_set {
            self.rewrite_change_set(e)
        } else {
            Ok(())
        }
    }

    fn rewrite_root(&self, e: &mut BytesStart<'_>) -> Result<()> {
        match attribute_value(e, LOGICAL_FILE_PATH)? {
            None => push_escaped(e, LOGICAL_FILE_PATH, &self.logical_path),
            Some(existing) if existing != self.logical_path => log::warn!(
                "Change-log declares logicalFilePath '{}' but is written as '{}'; keeping the declared value",
                existing,
                self.logical_path
            ),
            Some(_) => {}
        }

        if let Some(contexts) = &self.contexts {
            let existing = match attribute_value(e, "context")? {
                Some(v) => Some(v),
                None => attribute_value(e, "contexts")?,
            };
            match existing {
                None => push_escaped(e, "context", contexts),
                Some(existing) if existing != *contexts => log::warn!(
                    "Change-log declares context '{}' but its contexts are '{}'; keeping the declared value",
                    existing,
                    contexts
                ),
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn rewrite_change_set(&self, e: &mut BytesStart<'_>) -> Result<()> {
        let (Some(id), Some(author)) = (attribute_value(e, "id")?, attribute_value(e, "author")?)
        else {
            return Ok(());
        };
        let Some(path) = self.overrides.lookup(&id, &author) else {
            return Ok(());
        };
        match attribute_value(e, LOGICAL_FILE_PATH)? {
            None => push_escaped(e, LOGICAL_FILE_PATH, path),
            Some(existing) if existing != path => log::warn!(
                "Change-set {}::{} declares logicalFilePath '{}' but was authored in '{}'; keeping the declared value",
                id,
                author,
                existing,
                path
            ),
            Some(_) => {}
        }
        Ok(())
    }
}

fn attribute_value(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
