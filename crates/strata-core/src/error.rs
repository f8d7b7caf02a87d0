//! Error types for the layer tree engine.

use std::fmt;
use std::path::PathBuf;

use crate::node::NodeId;

/// Result type alias for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors returned by tree queries and mutators.
///
/// Neither variant is fatal. Ids routinely go stale across async gaps, so
/// callers treat both as "reject the operation and keep the current tree".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// The operation addressed an id that is not in the tree.
    #[error("Layer node '{0}' not found")]
    NotFound(NodeId),

    /// The operation is well-formed but not allowed on this tree.
    #[error("Invalid mutation: {0}")]
    InvalidMutation(#[from] InvalidMutation),
}

impl TreeError {
    /// Create a not-found error.
    pub fn not_found(id: impl Into<NodeId>) -> Self {
        Self::NotFound(id.into())
    }

    /// Returns `true` if this error is [`TreeError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Reasons a mutation is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidMutation {
    /// Opacity only exists on leaves.
    #[error("opacity cannot be set on group '{0}'")]
    OpacityOnGroup(NodeId),

    /// The destination lies inside the subtree being moved.
    #[error("cannot move '{moved}' into its own subtree at '{target}'")]
    Cycle {
        /// Node being moved.
        moved: NodeId,
        /// Requested destination parent.
        target: NodeId,
    },

    /// A reorder did not list every current child exactly once.
    #[error("child order for {parent} is not a permutation: {missing} missing, {unknown} unknown")]
    IncompletePermutation {
        /// Addressed parent.
        parent: ParentLabel,
        /// Current children absent from the order.
        missing: usize,
        /// Listed ids that are not current children, or repeats.
        unknown: usize,
    },

    /// The addressed node exists but cannot hold children.
    #[error("'{0}' is not a group")]
    NotAGroup(NodeId),

    /// Two nodes would share an id.
    #[error("duplicate layer id '{0}'")]
    DuplicateId(NodeId),

    /// An insertion index past the end of the sibling list.
    #[error("index {index} is out of range for {len} siblings")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Sibling count at the destination.
        len: usize,
    },

    /// Display names must not be blank.
    #[error("layer name must not be empty")]
    EmptyName,
}

/// Display helper naming a parent, with `None` meaning the root list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLabel(pub Option<NodeId>);

impl fmt::Display for ParentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "group '{id}'"),
            None => f.write_str("the root list"),
        }
    }
}

/// Result type alias for preference storage.
pub type PrefsResult<T> = std::result::Result<T, PrefsError>;

/// Errors from reading or writing the preference file.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    /// File I/O error.
    #[error("Failed to access preferences '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse failure.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization failure.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// No per-user configuration directory could be determined.
    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

impl PrefsError {
    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = TreeError::not_found("roads");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Layer node 'roads' not found");
    }

    #[test]
    fn test_invalid_mutation_wraps() {
        let err: TreeError = InvalidMutation::OpacityOnGroup(NodeId::from("basemaps")).into();
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Invalid mutation: opacity cannot be set on group 'basemaps'"
        );
    }

    #[test]
    fn test_parent_label() {
        let err = InvalidMutation::IncompletePermutation {
            parent: ParentLabel(None),
            missing: 1,
            unknown: 0,
        };
        assert_eq!(
            err.to_string(),
            "child order for the root list is not a permutation: 1 missing, 0 unknown"
        );
    }
}
