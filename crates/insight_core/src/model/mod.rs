//! Host program-structure abstraction.
//!
//! The engine never owns the program-structure model; the host IDE does. It
//! is consumed through two narrow capabilities: "given a file, produce its
//! element tree; given an element, resolve its declaration or find its
//! usages". Element handles are owned by the host and can be invalidated at
//! any time, so holders re-validate through [`StructureModel::is_valid`]
//! immediately before use.

mod lexical;

pub use lexical::LexicalModel;

use crate::error::Result;
use crate::types::CodeFile;

/// A lightweight handle to one syntax element inside a file.
///
/// Potentially stale from the moment it is produced; never dereferenced
/// directly, only handed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Element {
    /// File the element was discovered in.
    pub file: String,
    /// Host-unique key (stable for the element's lifetime).
    pub key: String,
    /// Simple name (identifier text).
    pub name: String,
    /// Element kind.
    pub kind: ElementKind,
    /// 1-based line of the element's first occurrence.
    pub line: u32,
}

/// Kind of syntax element, as coarse as the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementKind {
    /// A named declaration (searchable for usages).
    Declaration,
    /// A reference-bearing element (resolvable to a declaration).
    Reference,
}

/// A resolved source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// File containing the location.
    pub file: String,
    /// 1-based line.
    pub line: u32,
}

/// Structure queries over the host's live element tree.
pub trait StructureModel: Send + Sync {
    /// Returns the flattened element tree of `path`, exhaustively.
    ///
    /// An unknown path yields an empty tree, not an error.
    fn element_tree(&self, path: &str) -> Result<Vec<Element>>;

    /// Resolves a reference-bearing element to its declaration site.
    ///
    /// Returns `None` for elements that do not resolve (including
    /// declarations themselves when the host models them that way).
    fn resolve_reference(&self, element: &Element) -> Result<Option<Location>>;

    /// Finds every usage of a named declaration, project-wide.
    ///
    /// Returns an empty list for elements that are not searchable
    /// declarations.
    fn find_usages(&self, element: &Element) -> Result<Vec<Location>>;

    /// Whether the element handle is still valid in the host's current
    /// structure. Holders call this immediately before acting on a handle
    /// captured earlier.
    fn is_valid(&self, element: &Element) -> bool;
}

/// File-level queries over the host's project.
pub trait ProjectHost: Send + Sync {
    /// Every project file, in a stable order.
    fn files(&self) -> Vec<String>;

    /// Reads the file's current text; `None` when the path no longer
    /// resolves to a live project file.
    fn read(&self, path: &str) -> Option<CodeFile>;

    /// Whether the path lies inside the project's content roots.
    fn contains(&self, path: &str) -> bool;
}

/// Full host capability the engine components consume.
pub trait HostModel: StructureModel + ProjectHost {}

impl<T: StructureModel + ProjectHost> HostModel for T {}
