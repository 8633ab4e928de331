//! Manifest reading
//!
//! A manifest (`pack.list`) is a plain list of entries, one per line. Blank
//! lines are dropped and surrounding whitespace is trimmed; there is no comment
//! or escape syntax. An entry starting with `.` is local to the directory the
//! manifest lives in, anything else names an external library.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::{
    error::BundleError,
    naming::{validate_dotted, validate_identifier},
    types::MANIFEST_FILE,
};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// One line of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// `.`: the enclosing library's own initializer
    SelfReference,

    /// `.a.b.c`: a unit below the manifest's directory
    Local {
        /// Entry as written, used for qualification and messages
        raw: String,
        segments: Vec<String>,
    },

    /// `name`: another library found through the search roots
    External(String),
}

impl ManifestEntry {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw == "." {
            return Ok(Self::SelfReference);
        }

        let Some(local) = raw.strip_prefix('.') else {
            validate_identifier(raw, "library")?;
            return Ok(Self::External(raw.to_owned()));
        };

        let dotted = local.strip_suffix('.').unwrap_or(local);
        validate_dotted(dotted, "module")?;
        Ok(Self::Local {
            raw: raw.to_owned(),
            segments: dotted.split('.').map(str::to_owned).collect(),
        })
    }

    /// Text used when qualifying the entry against its enclosing name
    pub fn as_local_name(&self) -> Option<&str> {
        match self {
            Self::SelfReference => Some("."),
            Self::Local { raw, .. } => Some(raw),
            Self::External(_) => None,
        }
    }
}

impl std::fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfReference => write!(f, "."),
            Self::Local { raw, .. } => write!(f, "{raw}"),
            Self::External(name) => write!(f, "{name}"),
        }
    }
}

/// A parsed manifest together with where it came from
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load the manifest of `dir`.
    ///
    /// A self-reference is only accepted as the final entry, so that a
    /// package initializer always runs after the units it declares.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let lines = read_manifest(&path)?;

        let entries = lines
            .iter()
            .map(|line| {
                ManifestEntry::parse(line)
                    .with_context(|| format!("invalid entry `{line}` in {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        let misplaced = entries
            .iter()
            .rev()
            .skip(1)
            .any(|entry| *entry == ManifestEntry::SelfReference);
        if misplaced {
            return Err(BundleError::MalformedManifest {
                path,
                reason: "self-reference `.` must be the final entry".to_owned(),
            }
            .into());
        }

        debug!("Loaded {} entries from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    /// Whether `dir` carries a manifest at all
    pub fn exists_in(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).is_file()
    }

    /// Require the root initializer convention: the last entry is `.`.
    pub fn require_self_reference(&self) -> Result<()> {
        if self.entries.last() == Some(&ManifestEntry::SelfReference) {
            return Ok(());
        }
        Err(BundleError::MalformedManifest {
            path: self.path.clone(),
            reason: "final entry must self-reference (`.`)".to_owned(),
        }
        .into())
    }
}

/// Read a manifest file into its non-empty, trimmed lines.
pub fn read_manifest(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    Ok(parse_lines(text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&text)))
}

/// Split on any line ending, trim, and drop blank lines.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read a Python source file.
///
/// Invalid UTF-8 is replaced rather than rejected; the runtime would refuse
/// such a file anyway, but the bundle should still be producible. A leading
/// byte-order mark is dropped: Python only accepts it at the very start of a
/// file, and embedded sources never start there.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read source {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(
                "{} is not valid UTF-8, invalid sequences will be replaced",
                path.display()
            );
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };
    Ok(strip_byte_order_mark(text))
}

fn strip_byte_order_mark(mut text: String) -> String {
    if text.starts_with(BYTE_ORDER_MARK) {
        text.drain(..BYTE_ORDER_MARK.len_utf8());
    }
    text
}
