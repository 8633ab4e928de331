//! Product namespacing of top-level imports
//!
//! When a bundle is built under a product name `P`, every bundled library `L`
//! lives at `P.L`. Plain top-level imports of such libraries are rewritten so
//! they resolve to the bundled copy and never to a same-named module that
//! happens to be installed next to the bundle:
//!
//! - `import L` becomes `from P import L`
//! - `import L.x as a` becomes `import P.L.x as a`
//! - `from L.x import y` becomes `from P.L.x import y`
//!
//! Only module-level statements are touched. Parsing is error tolerant so that
//! sources the parser does not fully understand still get their imports
//! rewritten.

use std::borrow::Cow;

use log::trace;
use ruff_python_ast::{Alias, PySourceType, Stmt, StmtImport, StmtImportFrom};
use ruff_python_parser::parse_unchecked_source;
use ruff_text_size::{Ranged, TextRange};

use crate::types::FxIndexSet;

#[derive(Debug, Clone)]
pub struct ImportRewriter {
    product: String,
    libraries: FxIndexSet<String>,
}

impl ImportRewriter {
    pub fn new(product: &str, libraries: FxIndexSet<String>) -> Self {
        Self {
            product: product.to_owned(),
            libraries,
        }
    }

    fn is_bundled(&self, dotted: &str) -> bool {
        let top_level = dotted.split('.').next().unwrap_or(dotted);
        self.libraries.contains(top_level)
    }

    /// Rewrite the top-level imports of `source`, borrowing when nothing changes.
    pub fn rewrite<'s>(&self, source: &'s str) -> Cow<'s, str> {
        let parsed = parse_unchecked_source(source, PySourceType::Python);

        let mut edits: Vec<(TextRange, String)> = Vec::new();
        for stmt in &parsed.syntax().body {
            let edit = match stmt {
                Stmt::Import(import) => self.rewrite_import(source, import),
                Stmt::ImportFrom(import_from) => self.rewrite_import_from(import_from),
                _ => None,
            };
            edits.extend(edit);
        }

        if edits.is_empty() {
            return Cow::Borrowed(source);
        }

        let mut rewritten = source.to_owned();
        for (range, replacement) in edits.into_iter().rev() {
            trace!("Rewriting `{}` to `{replacement}`", &source[range]);
            let span = usize::from(range.start())..usize::from(range.end());
            rewritten.replace_range(span, &replacement);
        }
        Cow::Owned(rewritten)
    }

    fn rewrite_import(&self, source: &str, import: &StmtImport) -> Option<(TextRange, String)> {
        if !import
            .names
            .iter()
            .any(|alias| self.is_bundled(alias.name.as_str()))
        {
            return None;
        }

        let mut untouched: Vec<&str> = Vec::new();
        let mut statements: Vec<String> = Vec::new();
        for alias in &import.names {
            if self.is_bundled(alias.name.as_str()) {
                statements.push(self.rewrite_alias(alias));
            } else {
                untouched.push(&source[alias.range()]);
            }
        }
        if !untouched.is_empty() {
            statements.insert(0, format!("import {}", untouched.join(", ")));
        }

        Some((import.range(), statements.join("; ")))
    }

    fn rewrite_alias(&self, alias: &Alias) -> String {
        let name = alias.name.as_str();
        match &alias.asname {
            Some(asname) => format!("import {}.{name} as {}", self.product, asname.as_str()),
            None => {
                let top_level = name.split('.').next().unwrap_or(name);
                if top_level == name {
                    format!("from {} import {name}", self.product)
                } else {
                    // `import L.x` loads `L.x` and binds `L`
                    format!(
                        "import {product}.{name}; from {product} import {top_level}",
                        product = self.product
                    )
                }
            }
        }
    }

    fn rewrite_import_from(&self, import_from: &StmtImportFrom) -> Option<(TextRange, String)> {
        if import_from.level != 0 {
            return None;
        }
        let module = import_from.module.as_ref()?;
        if !self.is_bundled(module.as_str()) {
            return None;
        }
        Some((module.range(), format!("{}.{}", self.product, module.as_str())))
    }
}
