//! Bundling pipeline
//!
//! locate main library → read manifest and main entry → resolve units →
//! synthesize descriptors → assemble the final script. Any failure aborts the
//! whole run; nothing is produced partially.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    assembler::ScriptAssembler,
    config::Config,
    descriptor::Synthesizer,
    dialect::Dialect,
    graph_builder::GraphBuilder,
    import_rewriter::ImportRewriter,
    insertion::InsertionPoint,
    locator::locate_library,
    manifest::{Manifest, read_source},
    naming::validate_identifier,
    types::{MAIN_ENTRY_FILE, MANIFEST_FILE},
};

#[derive(Debug)]
pub struct BundleOrchestrator {
    config: Config,
}

impl BundleOrchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bundle main library `library`, found along the configured search roots.
    pub fn bundle_library(&self, library: &str) -> Result<String> {
        validate_identifier(library, "library")?;
        let library_dir = locate_library(library, true, &self.config.search_roots)?;

        let manifest = Manifest::load(&library_dir)?;
        if self.config.strict_self_reference {
            manifest.require_self_reference()?;
        }
        let main_entry = read_source(&library_dir.join(MAIN_ENTRY_FILE))?;

        self.bundle_with(
            &library_dir,
            library,
            &manifest,
            &main_entry,
            &self.config.search_roots,
        )
    }

    /// Bundle a single script. Its directory acts as the main library and the
    /// directory above it is searched for libraries before the configured roots.
    pub fn bundle_script(&self, input: &Path) -> Result<String> {
        let library_dir = input
            .parent()
            .map(|dir| {
                if dir.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    dir
                }
            })
            .ok_or_else(|| anyhow!("{} has no parent directory", input.display()))?;
        let library_dir = library_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", library_dir.display()))?;
        let library = library_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                anyhow!("cannot derive a library name from {}", library_dir.display())
            })?
            .to_owned();
        validate_identifier(&library, "library")?;

        let manifest = if Manifest::exists_in(&library_dir) {
            Manifest::load(&library_dir)?
        } else {
            Manifest {
                path: library_dir.join(MANIFEST_FILE),
                entries: Vec::new(),
            }
        };
        if self.config.strict_self_reference {
            manifest.require_self_reference()?;
        }
        let main_entry = read_source(input)?;

        let mut roots: Vec<PathBuf> = library_dir
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .collect();
        roots.extend(self.config.search_roots.iter().cloned());

        self.bundle_with(&library_dir, &library, &manifest, &main_entry, &roots)
    }

    fn bundle_with(
        &self,
        library_dir: &Path,
        library: &str,
        manifest: &Manifest,
        main_entry: &str,
        roots: &[PathBuf],
    ) -> Result<String> {
        let product = self.config.product.as_deref();
        if let Some(product) = product {
            validate_identifier(product, "product")?;
        }

        let resolution = GraphBuilder::new(roots, product)
            .build(library_dir, library, manifest)?;

        let rewriter =
            product.map(|product| ImportRewriter::new(product, resolution.libraries.clone()));
        let descriptors = Synthesizer::new(self.config.dialect, rewriter.as_ref())
            .synthesize_all(&resolution.units);

        let insertion = InsertionPoint::new(self.config.marker.as_deref(), self.config.fallback);
        let script = ScriptAssembler::new(self.config.dialect, insertion)
            .with_isolation_token(self.config.isolation_token)
            .with_rewriter(rewriter.as_ref())
            .assemble(main_entry, &descriptors);

        info!(
            "Bundled `{library}` with {} modules for Python {}",
            descriptors.len(),
            self.config.dialect
        );
        Ok(script)
    }
}

/// Bundle a main library with default settings.
pub fn bundle(dialect: Dialect, library: &str, search_roots: &[PathBuf]) -> Result<String> {
    let config = Config {
        dialect,
        search_roots: search_roots.to_vec(),
        ..Config::default()
    };
    BundleOrchestrator::new(config).bundle_library(library)
}
