//! Shared type definitions for the pypack crate
//!
//! This module contains the types that flow between the resolver, the
//! synthesizer and the assembler, so that none of them has to depend on
//! another's internals.

use std::{
    hash::BuildHasherDefault,
    path::{Path, PathBuf},
};

use rustc_hash::FxHasher;

/// Insertion-ordered map with the fast rustc hasher.
pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Insertion-ordered set with the fast rustc hasher.
pub type FxIndexSet<T> = indexmap::IndexSet<T, BuildHasherDefault<FxHasher>>;

/// File name of the dependency manifest inside a library or package directory.
pub const MANIFEST_FILE: &str = "pack.list";

/// File name of the main entry inside a main library.
pub const MAIN_ENTRY_FILE: &str = "__main__.py";

/// File name of a package initializer.
pub const INITIALIZER_FILE: &str = "__init__.py";

/// Extension of plain module files.
pub const SOURCE_EXTENSION: &str = "py";

/// Shape of a resolved unit on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A single `<name>.py` file
    Plain,

    /// A `<name>/` directory whose `__init__.py` is the unit's body.
    /// Composite units can hold nested units.
    Composite,
}

impl UnitKind {
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Composite)
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "module"),
            Self::Composite => write!(f, "package"),
        }
    }
}

/// A resolved source item destined to become one bundled module
#[derive(Debug, Clone)]
pub struct Unit {
    /// Dotted name, unique within one bundling run
    pub qualified_name: String,
    pub kind: UnitKind,
    /// Name of the module this unit is attached to, `None` for top-level units
    pub parent: Option<String>,
    /// Body executed inside the module namespace
    pub source: String,
    /// Where the body was read from; `None` for synthesized namespaces
    pub origin: Option<PathBuf>,
}

impl Unit {
    /// Create an empty composite unit standing in for a namespace that has
    /// no initializer of its own.
    pub fn namespace(qualified_name: &str) -> Self {
        Self {
            qualified_name: qualified_name.to_owned(),
            kind: UnitKind::Composite,
            parent: crate::naming::parent_name(qualified_name).map(str::to_owned),
            source: String::new(),
            origin: None,
        }
    }

    /// Two units define the same module when everything that ends up in the
    /// generated fragments matches. The origin path is not compared: the same
    /// library reached through two search roots is still one module.
    pub fn same_definition(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
            && self.kind == other.kind
            && self.parent == other.parent
            && self.source == other.source
    }

    pub fn origin_display(&self) -> String {
        self.origin
            .as_deref()
            .map_or_else(|| "<namespace>".to_owned(), |p: &Path| p.display().to_string())
    }
}
