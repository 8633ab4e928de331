//! Qualified name assembly
//!
//! A unit's qualified name is the enclosing library (or package) name joined
//! with the unit's manifest entry. Both halves may carry a trailing `.` to mark
//! a namespace segment; the separator is normalized so that names never contain
//! `..` or end with `.`.

use anyhow::Result;
use ruff_python_stdlib::{identifiers::is_identifier, keyword::is_keyword};

use crate::error::BundleError;

/// Join the enclosing name with a local manifest entry.
///
/// `qualify("pkg", ".sub.leaf")` is `pkg.sub.leaf`, `qualify("pkg.", ".")` is `pkg`.
pub fn qualify(enclosing: &str, entry: &str) -> String {
    let mut name = strip_trailing_separator(enclosing).to_owned();
    name.push_str(strip_trailing_separator(entry));
    name
}

fn strip_trailing_separator(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// The package a unit declares itself part of (`__package__`).
///
/// A composite unit is its own package; a plain unit belongs to the name minus
/// its last segment, or to no package at all when it is top-level.
pub fn declaring_package(qualified_name: &str, composite: bool) -> &str {
    if composite {
        return qualified_name;
    }
    parent_name(qualified_name).unwrap_or("")
}

/// Name of the module a unit gets attached to
pub fn parent_name(qualified_name: &str) -> Option<&str> {
    split_parent(qualified_name).map(|(parent, _)| parent)
}

/// Split `a.b.c` into (`a.b`, `c`). Top-level names have no parent.
pub fn split_parent(qualified_name: &str) -> Option<(&str, &str)> {
    qualified_name.rsplit_once('.')
}

/// Every proper ancestor of a name, outermost first: `a.b.c` yields `a`, `a.b`.
pub fn ancestors(qualified_name: &str) -> impl Iterator<Item = &str> {
    qualified_name
        .match_indices('.')
        .map(move |(idx, _)| &qualified_name[..idx])
}

/// Check that `name` can be used as a single Python name segment.
pub fn validate_identifier(name: &str, what: &'static str) -> Result<()> {
    if is_identifier(name) && !is_keyword(name) {
        return Ok(());
    }
    Err(BundleError::InvalidIdentifier {
        name: name.to_owned(),
        what,
    }
    .into())
}

/// Check every segment of a dotted name.
pub fn validate_dotted(name: &str, what: &'static str) -> Result<()> {
    for segment in name.split('.') {
        if !is_identifier(segment) || is_keyword(segment) {
            return Err(BundleError::InvalidIdentifier {
                name: name.to_owned(),
                what,
            }
            .into());
        }
    }
    Ok(())
}
