#![doc = include_str!("../README.md")]

mod content;
mod error;
mod reconstruct;
mod serializable;
mod types;

pub use error::{Result, TreeError};

pub mod v1 {
    //! Versioned public API for change-log trees and their reconstruction.
    //!
    //! # Tree
    //!
    //! The in-memory change-log handed over by a parser:
    //!
    //! - [`ChangeLogTree`]: arena of nodes, change-sets and parameters
    //! - [`ChangeLogNode`]: one source document
    //! - [`ChangeSet`]: one migration step, keyed by [`ChangeSetKey`]
    //! - [`ChangeLogParameter`]: a declared `property`
    //! - [`PreconditionContainer`], [`Precondition`]: guards
    //!
    //! # Generic objects
    //!
    //! Anything that renders to one XML element:
    //!
    //! - [`SerializableObject`], [`Field`], [`FieldValue`], [`Scalar`]
    //! - [`SerializationMode`]: attribute, nested element or text
    //!
    //! # Reconstruction
    //!
    //! - [`reconstruct`]: split a tree into output files
    //! - [`ChangeLogContent`]: the files, their content and the
    //!   [`LogicalPathOverrides`]
    //! - [`ChangeLogChild`]: one content item
    //!
    //! # Example: re-home an included change-set into a single file
    //!
    //! ```
    //! use changelog::v1::*;
    //!
    //! let mut tree = ChangeLogTree::new("db/changelog.xml");
    //! let people = tree.add_include(tree.root, "db/people.groovy");
    //! tree.add_change_set(tree.root, ChangeSet::new("1", "alex", "db/changelog.xml"));
    //! tree.add_change_set(
    //!     people,
    //!     ChangeSet::new("2", "alex", "db/people.groovy").with_change(
    //!         SerializableObject::new("createTable").with_attribute("tableName", "person"),
    //!     ),
    //! );
    //!
    //! let multi = reconstruct(&tree, false);
    //! assert_eq!(multi.files.len(), 2);
    //! assert!(multi.overrides.is_empty());
    //!
    //! let single = reconstruct(&tree, true);
    //! assert_eq!(single.files, vec![tree.root]);
    //! assert_eq!(single.overrides.lookup("2", "alex"), Some("db/people.groovy"));
    //! ```

    pub use crate::content::{ChangeLogChild, Include, preconditions_object};
    pub use crate::reconstruct::{
        ChangeLogContent, LogicalPathOverrides, normalize_separators, output_file_name, reconstruct,
    };
    pub use crate::serializable::{
        Field, FieldValue, GENERIC_CHANGELOG_EXTENSION_NAMESPACE, STANDARD_CHANGELOG_NAMESPACE,
        Scalar, SerializableObject, SerializationMode,
    };
    pub use crate::types::{
        ChangeLogNode, ChangeLogParameter, ChangeLogTree, ChangeSet, ChangeSetKey, ChangeSetRef,
        ErrorOption, FailOption, NodeId, ObjectQuotingStrategy, OnSqlOutput, ParameterRef,
        Precondition, PreconditionContainer,
    };
}
