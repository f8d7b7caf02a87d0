//! Logging and debugging facilities for the layer tree engine.
//!
//! This module provides:
//! - Target names for filtering `tracing` output by subsystem
//! - Debug visualization for layer trees
//!
//! # Tracing Integration
//!
//! Strata uses the `tracing` crate for instrumentation. To see logs, install
//! a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("strata_core::drag=debug,strata_sync=debug")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`LayerTreeDebug`] to print a tree:
//!
//! ```
//! use strata_core::logging::{LayerTreeDebug, TreeFormatOptions, TreeStyle};
//! use strata_core::{LayerNode, LayerTree};
//!
//! let tree = LayerTree::from_roots(vec![
//!     LayerNode::group("base", "Base maps", vec![LayerNode::raster("osm", "OSM")]),
//! ]).unwrap();
//!
//! let text = LayerTreeDebug::with_options(TreeFormatOptions {
//!     style: TreeStyle::Ascii,
//!     ..TreeFormatOptions::minimal()
//! })
//! .format(&tree);
//! assert_eq!(text, "Base maps\n+-- OSM\n");
//! ```

use std::fmt::Write as FmtWrite;

use crate::node::{LayerNode, NodeKind};
use crate::tree::LayerTree;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Tree model target.
    pub const TREE: &str = "strata_core::tree";
    /// Visibility and opacity propagation target.
    pub const VISIBILITY: &str = "strata_core::visibility";
    /// Flattening adapter target.
    pub const FLATTEN: &str = "strata_core::flatten";
    /// Drag reorder engine target.
    pub const DRAG: &str = "strata_core::drag";
    /// Selection/expansion store target.
    pub const SELECTION: &str = "strata_core::selection";
    /// Preference persistence target.
    pub const PREFS: &str = "strata_core::prefs";
    /// Signal emission target.
    pub const SIGNAL: &str = "strata_core::signal";
    /// Sync coordinator target.
    pub const COORDINATOR: &str = "strata_sync::coordinator";
    /// HTTP layer service target.
    pub const HTTP: &str = "strata_sync::http";
    /// Session target.
    pub const SESSION: &str = "strata_sync::session";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show node types.
    pub show_types: bool,
    /// Whether to show leaf visibility and opacity.
    pub show_state: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_types: true,
            show_state: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_state: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_types: false,
            show_state: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing layer trees.
#[derive(Debug, Clone, Default)]
pub struct LayerTreeDebug {
    options: TreeFormatOptions,
}

impl LayerTreeDebug {
    /// Create a new debug visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format every root and its subtree.
    pub fn format(&self, tree: &LayerTree) -> String {
        let mut output = String::new();
        if tree.roots().is_empty() {
            output.push_str("(empty)\n");
        }
        let count = tree.roots().len();
        for (i, root) in tree.roots().iter().enumerate() {
            self.format_into(root, 0, i + 1 == count, &mut output);
        }
        output
    }

    /// Format a single subtree.
    pub fn format_subtree(&self, node: &LayerNode) -> String {
        let mut output = String::new();
        self.format_into(node, 0, true, &mut output);
        output
    }

    fn format_into(&self, node: &LayerNode, depth: usize, is_last: bool, output: &mut String) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(if node.name.is_empty() { "(unnamed)" } else { &node.name });

        // Writing into a String cannot fail.
        if self.options.show_ids {
            let _ = write!(output, " [{}]", node.id);
        }
        if self.options.show_types {
            let _ = write!(output, " ({})", node.node_type());
        }
        if self.options.show_state {
            if let NodeKind::Layer(props) = &node.kind {
                let _ = write!(
                    output,
                    " {} {:.2}",
                    if props.visible { "on" } else { "off" },
                    props.opacity
                );
            }
        }
        output.push('\n');

        let children = node.children();
        for (i, child) in children.iter().enumerate() {
            self.format_into(child, depth + 1, i + 1 == children.len(), output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            for _ in 0..self.options.indent_size {
                prefix.push(' ');
            }
        }
        prefix.push_str(if is_last && self.options.style != TreeStyle::Ascii {
            last
        } else {
            corner
        });
        prefix.push(' ');
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LayerTree {
        LayerTree::from_roots(vec![
            LayerNode::group(
                "base",
                "Base",
                vec![
                    LayerNode::raster("osm", "OSM"),
                    LayerNode::raster("sat", "Satellite").with_visible(false),
                ],
            ),
            LayerNode::raster("roads", "Roads"),
        ])
        .unwrap()
    }

    #[test]
    fn test_format_unicode_with_ids() {
        let text = LayerTreeDebug::new().format(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Base [base] (group)");
        assert_eq!(lines[1], "\u{251c}\u{2500}\u{2500} OSM [osm] (raster)");
        assert_eq!(lines[2], "\u{2514}\u{2500}\u{2500} Satellite [sat] (raster)");
        assert_eq!(lines[3], "Roads [roads] (raster)");
    }

    #[test]
    fn test_format_state_and_depth_limit() {
        let debug = LayerTreeDebug::with_options(TreeFormatOptions {
            max_depth: Some(0),
            ..TreeFormatOptions::detailed()
        });
        let text = debug.format(&sample());
        assert_eq!(text, "Base [base] (group)\nRoads [roads] (raster) on 1.00\n");
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(LayerTreeDebug::new().format(&LayerTree::new()), "(empty)\n");
    }
}
