use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};

use crate::{
    error::BundleError,
    locator::locate_library,
    manifest::ManifestEntry,
    types::{INITIALIZER_FILE, SOURCE_EXTENSION, UnitKind},
};

/// A manifest entry found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedEntry {
    Unit(ResolvedUnit),
    /// An external library and its directory
    Library { name: String, dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    pub kind: UnitKind,
    /// File holding the unit's body
    pub source_path: PathBuf,
    /// Package directory for composite units
    pub package_dir: Option<PathBuf>,
}

/// Resolves manifest entries against a directory and the library search roots
#[derive(Debug)]
pub struct EntryResolver<'a> {
    roots: &'a [PathBuf],
}

impl<'a> EntryResolver<'a> {
    pub fn new(roots: &'a [PathBuf]) -> Self {
        Self { roots }
    }

    /// Resolve one entry of the manifest found in `base_dir`.
    ///
    /// `enclosing` names the library or package owning the manifest and only
    /// appears in error messages.
    pub fn resolve(
        &self,
        base_dir: &Path,
        entry: &ManifestEntry,
        enclosing: &str,
    ) -> Result<ResolvedEntry> {
        match entry {
            ManifestEntry::External(name) => {
                let dir = locate_library(name, false, self.roots)?;
                Ok(ResolvedEntry::Library {
                    name: name.clone(),
                    dir,
                })
            }
            ManifestEntry::SelfReference => {
                let init_path = base_dir.join(INITIALIZER_FILE);
                if init_path.is_file() {
                    return Ok(ResolvedEntry::Unit(ResolvedUnit {
                        kind: UnitKind::Composite,
                        source_path: init_path,
                        package_dir: Some(base_dir.to_path_buf()),
                    }));
                }
                Err(not_found(entry, enclosing))
            }
            ManifestEntry::Local { segments, .. } => {
                let target_path = segments
                    .iter()
                    .fold(base_dir.to_path_buf(), |path, part| path.join(part));
                resolve_local(&target_path)
                    .map(ResolvedEntry::Unit)
                    .ok_or_else(|| not_found(entry, enclosing))
            }
        }
    }
}

/// Check the plain module candidate, then the package candidate.
fn resolve_local(target_path: &Path) -> Option<ResolvedUnit> {
    // 1. Check for module file (.py)
    let py_path = target_path.with_extension(SOURCE_EXTENSION);
    if py_path.is_file() {
        if target_path.join(INITIALIZER_FILE).is_file() {
            warn!(
                "Both {} and a package directory exist, using the module file",
                py_path.display()
            );
        }
        debug!("Resolved module file {}", py_path.display());
        return Some(ResolvedUnit {
            kind: UnitKind::Plain,
            source_path: py_path,
            package_dir: None,
        });
    }

    // 2. Check for package (__init__.py)
    let init_path = target_path.join(INITIALIZER_FILE);
    if init_path.is_file() {
        debug!("Resolved package {}", target_path.display());
        return Some(ResolvedUnit {
            kind: UnitKind::Composite,
            source_path: init_path,
            package_dir: Some(target_path.to_path_buf()),
        });
    }

    None
}

fn not_found(entry: &ManifestEntry, enclosing: &str) -> anyhow::Error {
    BundleError::EntryNotFound {
        entry: entry.to_string(),
        enclosing: enclosing.to_owned(),
    }
    .into()
}
