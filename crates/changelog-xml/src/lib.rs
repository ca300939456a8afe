//! XML output for change-log trees.
//!
//! Four layers, leaves first:
//!
//! - [`XmlWriter`]: streaming, namespace-aware writer with deferred start
//!   tags (attributes can be added until content is written)
//! - [`ObjectSerializer`]: writes any [`SerializableObject`] graph by
//!   field serialization mode, rejecting characters XML 1.1 forbids
//! - [`AttributesFilter`]: streaming second pass that adds
//!   `logicalFilePath`/`context` attributes without touching anything else
//! - [`ChangeLogSerializer`]: reconstructs the output layout and writes
//!   every file through the two passes above
//!
//! # Example
//!
//! ```
//! use changelog::v1::{ChangeLogTree, ChangeSet};
//! use changelog_xml::{ChangeLogSerializer, XmlConfig};
//!
//! let mut tree = ChangeLogTree::new("db/changelog.groovy");
//! let people = tree.add_include(tree.root, "db/people.groovy");
//! tree.add_change_set(people, ChangeSet::new("1", "alex", "db/people.groovy"));
//!
//! let out = tempfile::tempdir().unwrap();
//! let files = ChangeLogSerializer::new(XmlConfig::default())
//!     .unwrap()
//!     .serialize_to_dir(&tree, out.path(), false)
//!     .unwrap();
//! assert_eq!(files.len(), 2);
//! assert!(files[1].ends_with("db/people.xml"));
//! ```
//!
//! [`SerializableObject`]: changelog::v1::SerializableObject

mod compile;
mod config;
mod error;
mod filter;
mod serialize;
mod writer;

pub use compile::ChangeLogSerializer;
pub use config::{
    GENERIC_CHANGELOG_EXTENSION_SCHEMA_URL, NamespaceDetails, STANDARD_CHANGELOG_SCHEMA_URL,
    XSI_NAMESPACE, XmlConfig,
};
pub use error::{Result, XmlError};
pub use filter::AttributesFilter;
pub use serialize::{
    ObjectSerializer, RELATIVE_TO_CHANGELOG_FILE, RelativePathRule, check_xml_chars,
    resolve_relative,
};
pub use writer::{WriterState, XmlWriter};
