use crate::config::XmlConfig;
use crate::error::{Result, XmlError};
use crate::filter::AttributesFilter;
use crate::serialize::ObjectSerializer;
use changelog::v1::{
    ChangeLogContent, ChangeLogTree, NodeId, ObjectQuotingStrategy, SerializableObject,
    output_file_name, reconstruct,
};
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use tempfile::NamedTempFile;

/// Size of the chunks handed from the renderer to the filter.
const PIPE_CHUNK_SIZE: usize = 8 * 1024;
/// Chunks in flight before the renderer blocks.
const PIPE_DEPTH: usize = 4;

/// Writes change-log trees as XML.
///
/// Every file goes through two passes: the content is rendered by the
/// [`ObjectSerializer`], then the [`AttributesFilter`] adds the logical
/// paths and contexts computed by [`reconstruct`].
///
/// # Example
///
/// ```
/// use changelog::v1::{ChangeLogTree, ChangeSet};
/// use changelog_xml::{ChangeLogSerializer, XmlConfig};
///
/// let mut tree = ChangeLogTree::new("db/changelog.groovy");
/// let people = tree.add_include(tree.root, "db/people.groovy");
/// tree.add_change_set(people, ChangeSet::new("1", "alex", "db/people.groovy"));
///
/// let xml = ChangeLogSerializer::new(XmlConfig::default())
///     .unwrap()
///     .serialize_to_string(&tree)
///     .unwrap();
/// assert!(xml.contains("logicalFilePath=\"db/changelog.groovy\""));
/// assert!(xml.contains("<changeSet id=\"1\" author=\"alex\" logicalFilePath=\"db/people.groovy\"/>"));
/// ```
#[derive(Debug, Clone)]
pub struct ChangeLogSerializer {
    serializer: ObjectSerializer,
}

impl ChangeLogSerializer {
    pub fn new(config: XmlConfig) -> Result<Self> {
        Ok(Self {
            serializer: ObjectSerializer::new(config)?,
        })
    }

    pub fn from_serializer(serializer: ObjectSerializer) -> Self {
        Self { serializer }
    }

    pub fn object_serializer(&self) -> &ObjectSerializer {
        &self.serializer
    }

    /// Write one file per reached change-log (or a single file) under
    /// `out_dir`. Returns the files written, root first.
    ///
    /// Each file is rendered into a temporary file next to its target and
    /// only renamed into place once complete.
    pub fn serialize_to_dir(
        &self,
        tree: &ChangeLogTree,
        out_dir: &Path,
        single_file: bool,
    ) -> Result<Vec<PathBuf>> {
        tree.validate()?;
        let content = reconstruct(tree, single_file);
        let mut written = Vec::with_capacity(content.files.len());
        for &node in &content.files {
            let target = out_dir.join(output_file_name(&tree.node(node).physical_path));
            let parent = match target.parent() {
                Some(p) => p.to_path_buf(),
                None => out_dir.to_path_buf(),
            };
            fs::create_dir_all(&parent)?;

            let tmp = NamedTempFile::new_in(&parent)?;
            let mut out = self.write_file(tree, node, &content, BufWriter::new(tmp))?;
            out.flush()?;
            let tmp = out.into_inner().map_err(|e| e.into_error())?;
            tmp.persist(&target).map_err(|e| XmlError::Io(e.error))?;

            log::debug!("Wrote {}", target.display());
            written.push(target);
        }
        Ok(written)
    }

    /// Render the whole tree flattened into one document.
    pub fn serialize_to_string(&self, tree: &ChangeLogTree) -> Result<String> {
        tree.validate()?;
        let content = reconstruct(tree, true);
        let bytes = self.write_file(tree, tree.root, &content, Vec::new())?;
        String::from_utf8(bytes)
            .map_err(|e| XmlError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Render the output file of `node` into `out`.
    ///
    /// The first pass runs on a scoped thread and streams its output to
    /// the filter through a bounded channel, so at most a few chunks of
    /// the document are in memory at once. A render error takes
    /// precedence over the filter error it causes.
    pub fn write_file<W: Write>(
        &self,
        tree: &ChangeLogTree,
        node: NodeId,
        content: &ChangeLogContent,
        out: W,
    ) -> Result<W> {
        let filter = AttributesFilter::for_node(tree, node, &content.overrides);
        let (tx, rx) = mpsc::sync_channel(PIPE_DEPTH);
        thread::scope(|scope| {
            let renderer = scope.spawn(move || {
                let sink = BufWriter::with_capacity(PIPE_CHUNK_SIZE, ChunkSender(tx));
                self.render(tree, node, content, sink).map(drop)
            });
            let filtered = filter.apply(BufReader::new(ChunkReceiver::new(rx)), out);
            let rendered = match renderer.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            match (rendered, filtered) {
                // The renderer only sees a closed pipe; the filter knows why.
                (Err(XmlError::Io(_)), Err(e)) => Err(e),
                (Err(e), _) => Err(e),
                (Ok(()), filtered) => filtered,
            }
        })
    }

    /// First pass: the file content without logical paths.
    fn render<S: Write>(
        &self,
        tree: &ChangeLogTree,
        node: NodeId,
        content: &ChangeLogContent,
        sink: S,
    ) -> Result<S> {
        let mut root = SerializableObject::new("databaseChangeLog");
        if let Some(strategy) = tree.node(node).object_quoting_strategy
            && strategy != ObjectQuotingStrategy::Legacy
        {
            root = root.with_attribute("objectQuotingStrategy", strategy.to_string());
        }
        let elements = content
            .content_of(node)
            .iter()
            .map(|child| child.to_serializable(tree, node));
        self.serializer.write_document(&root, elements, sink)
    }
}

/// Writing half of the render-to-filter pipe.
struct ChunkSender(SyncSender<Vec<u8>>);

impl Write for ChunkSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "filter stopped reading"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading half of the pipe; end of input once the sender is dropped.
struct ChunkReceiver {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChunkReceiver {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChunkReceiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
