//! Library lookup along the ordered search roots

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, trace};

use crate::{
    error::BundleError,
    types::{MAIN_ENTRY_FILE, MANIFEST_FILE},
};

/// Find the directory of library `name`.
///
/// Roots are tried in order and the first `root/name` holding a manifest wins.
/// When `require_main_entry` is set the candidate must also hold `__main__.py`;
/// a candidate lacking it is skipped, not fatal.
pub fn locate_library(
    name: &str,
    require_main_entry: bool,
    roots: &[PathBuf],
) -> Result<PathBuf> {
    for root in roots {
        let candidate = root.join(name);
        if is_library_dir(&candidate, require_main_entry) {
            debug!("Located library `{name}` at {}", candidate.display());
            return Ok(candidate);
        }
        trace!("Library `{name}` not in {}", root.display());
    }

    Err(BundleError::LibraryNotFound {
        name: name.to_owned(),
        manifest: MANIFEST_FILE,
    }
    .into())
}

fn is_library_dir(candidate: &Path, require_main_entry: bool) -> bool {
    candidate.join(MANIFEST_FILE).is_file()
        && (!require_main_entry || candidate.join(MAIN_ENTRY_FILE).is_file())
}
