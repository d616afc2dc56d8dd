//! Document model for docweave: a tree of elements with attributes and text.
//!
//! This crate provides:
//! - [`Document`], [`Element`], [`Node`] — the tree, parsed from and written as XML
//! - [`ElementPath`] — the path expressions used by extraction rules and selectors
//! - [`stream_elements`] — materialize only matching subtrees of a large file

mod path;
mod reader;
mod stream;
mod tree;

pub use path::{ElementPath, PathNode};
pub use reader::{element_from_start, read_element_body};
pub use stream::stream_elements;
pub use tree::{Document, Element, Node};
