//! Dependency graph construction
//!
//! Walks manifests recursively and turns every entry into units. Each call
//! returns a fresh ordered map that the caller merges into its own; a name
//! reached twice must resolve to the same definition both times.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::{
    error::BundleError,
    manifest::{Manifest, ManifestEntry, read_source},
    naming::{ancestors, parent_name, qualify},
    resolver::{EntryResolver, ResolvedEntry},
    types::{FxIndexMap, FxIndexSet, Unit},
};

/// Outcome of resolving a main library
#[derive(Debug)]
pub struct Resolution {
    /// Units keyed by qualified name, in emission order
    pub units: FxIndexMap<String, Unit>,
    /// Bare names of every library that contributed units, main library first
    pub libraries: FxIndexSet<String>,
}

/// Builds the unit map for a main library
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    resolver: EntryResolver<'a>,
    product: Option<&'a str>,
    /// Manifests currently being expanded, keyed by enclosing name and directory
    in_progress: Vec<(String, PathBuf)>,
    libraries: FxIndexSet<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(roots: &'a [PathBuf], product: Option<&'a str>) -> Self {
        Self {
            resolver: EntryResolver::new(roots),
            product,
            in_progress: Vec::new(),
            libraries: FxIndexSet::default(),
        }
    }

    /// Namespace the units of library `name` are qualified under
    pub fn library_namespace(&self, name: &str) -> String {
        match self.product {
            Some(product) => format!("{product}.{name}"),
            None => name.to_owned(),
        }
    }

    /// Resolve everything the manifest of the library in `library_dir` needs.
    pub fn build(
        mut self,
        library_dir: &Path,
        library_name: &str,
        manifest: &Manifest,
    ) -> Result<Resolution> {
        self.libraries.insert(library_name.to_owned());
        let namespace = self.library_namespace(library_name);

        let units = self.expand(library_dir, &namespace, manifest)?;
        debug!(
            "Resolved {} units from {} libraries",
            units.len(),
            self.libraries.len()
        );

        Ok(Resolution {
            units: add_implicit_namespaces(&units),
            libraries: self.libraries,
        })
    }

    /// Expand one manifest, refusing to re-enter a manifest that is still
    /// being expanded further up the stack.
    fn expand(
        &mut self,
        dir: &Path,
        namespace: &str,
        manifest: &Manifest,
    ) -> Result<FxIndexMap<String, Unit>> {
        let key = (namespace.to_owned(), canonicalize_path(dir));
        if self.in_progress.contains(&key) {
            let mut chain: Vec<String> = self
                .in_progress
                .iter()
                .map(|(name, _)| name.clone())
                .collect();
            chain.push(key.0);
            return Err(BundleError::CircularReference { chain }.into());
        }

        self.in_progress.push(key);
        let result = self.expand_entries(dir, namespace, manifest);
        self.in_progress.pop();
        result
    }

    fn expand_entries(
        &mut self,
        dir: &Path,
        namespace: &str,
        manifest: &Manifest,
    ) -> Result<FxIndexMap<String, Unit>> {
        let mut units = FxIndexMap::default();

        for entry in &manifest.entries {
            match self.resolver.resolve(dir, entry, namespace)? {
                ResolvedEntry::Library {
                    name,
                    dir: library_dir,
                } => {
                    debug!("Packing library `{name}` for `{namespace}`");
                    self.libraries.insert(name.clone());
                    let library_manifest = Manifest::load(&library_dir)?;
                    let library_namespace = self.library_namespace(&name);
                    let library_units = self
                        .expand(&library_dir, &library_namespace, &library_manifest)
                        .with_context(|| format!("while packing library `{name}`"))?;
                    merge_units(&mut units, library_units)?;
                }
                ResolvedEntry::Unit(found) => {
                    let local_name = entry.as_local_name().unwrap_or(".");
                    let qualified_name = qualify(namespace, local_name);
                    let source = read_source(&found.source_path)?;

                    // A package may list its own children
                    let nested_dir = found
                        .package_dir
                        .as_deref()
                        .filter(|package_dir| Manifest::exists_in(package_dir));
                    if let Some(package_dir) = nested_dir {
                        if *entry != ManifestEntry::SelfReference {
                            let package_manifest = Manifest::load(package_dir)?;
                            let children = self
                                .expand(package_dir, &qualified_name, &package_manifest)
                                .with_context(|| {
                                    format!("while packing package `{qualified_name}`")
                                })?;
                            merge_units(&mut units, children)?;
                        }
                    }

                    let unit = Unit {
                        parent: parent_name(&qualified_name).map(str::to_owned),
                        qualified_name,
                        kind: found.kind,
                        source,
                        origin: Some(found.source_path),
                    };
                    insert_unit(&mut units, unit)?;
                }
            }
        }

        Ok(units)
    }
}

/// Merge `incoming` into `units`, keeping the first position of every name.
pub fn merge_units(
    units: &mut FxIndexMap<String, Unit>,
    incoming: FxIndexMap<String, Unit>,
) -> Result<()> {
    for (_, unit) in incoming {
        insert_unit(units, unit)?;
    }
    Ok(())
}

/// Insert a unit, accepting a repeat only when it is the same definition.
pub fn insert_unit(units: &mut FxIndexMap<String, Unit>, unit: Unit) -> Result<()> {
    match units.get(&unit.qualified_name) {
        Some(existing) if !existing.same_definition(&unit) => {
            Err(BundleError::ConflictingDefinition {
                name: unit.qualified_name.clone(),
                first: existing.origin_display(),
                second: unit.origin_display(),
            }
            .into())
        }
        Some(_) => {
            debug!("`{}` reached again with identical content", unit.qualified_name);
            Ok(())
        }
        None => {
            units.insert(unit.qualified_name.clone(), unit);
            Ok(())
        }
    }
}

/// Give every parent that has no unit of its own an empty namespace module,
/// placed right before its first descendant.
pub fn add_implicit_namespaces(units: &FxIndexMap<String, Unit>) -> FxIndexMap<String, Unit> {
    let mut ordered = FxIndexMap::default();
    for (name, unit) in units {
        for ancestor in ancestors(name) {
            if !units.contains_key(ancestor) && !ordered.contains_key(ancestor) {
                debug!("Adding namespace module `{ancestor}`");
                ordered.insert(ancestor.to_owned(), Unit::namespace(ancestor));
            }
        }
        ordered.insert(name.clone(), unit.clone());
    }
    ordered
}

/// Canonicalize a path, handling errors gracefully
fn canonicalize_path(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) => {
            // Log warning but don't fail - return the original path
            warn!("Failed to canonicalize path {}: {}", path.display(), e);
            path.to_path_buf()
        }
    }
}
