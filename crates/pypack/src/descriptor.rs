//! Module descriptor synthesis
//!
//! Every unit turns into three fragments:
//!
//! - `alloc` creates the module object and registers it in `sys.modules`
//! - `link` attaches the module to its parent so `parent.child` resolves
//! - `load` executes the unit's body inside the module's namespace
//!
//! The assembler emits all allocs, then all links, then all loads, so a body
//! may refer to any other bundled module at top level.

use cow_utils::CowUtils;
use log::trace;

use crate::{
    dialect::{Dialect, quote},
    import_rewriter::ImportRewriter,
    naming::split_parent,
    types::{FxIndexMap, Unit},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub alloc: String,
    /// Empty for top-level modules
    pub link: String,
    /// Empty for synthesized namespaces, which have no body
    pub load: String,
}

/// Escape text for embedding between `'''` delimiters.
///
/// Backslashes are escaped before quotes; the other order would double the
/// backslash inserted in front of each quote.
pub fn escape_for_literal(text: &str) -> String {
    let escaped = text.cow_replace('\\', "\\\\");
    let escaped = escaped.cow_replace('\'', "\\'");
    escaped.into_owned()
}

/// Attach a module to its parent. Identical across dialects.
pub fn render_link(qualified_name: &str) -> String {
    match split_parent(qualified_name) {
        Some((parent, local_name)) => format!(
            "setattr(sys.modules[{}], {}, sys.modules[{}])",
            quote(parent),
            quote(local_name),
            quote(qualified_name)
        ),
        None => String::new(),
    }
}

/// Turns units into descriptors for one dialect
#[derive(Debug)]
pub struct Synthesizer<'a> {
    dialect: Dialect,
    rewriter: Option<&'a ImportRewriter>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(dialect: Dialect, rewriter: Option<&'a ImportRewriter>) -> Self {
        Self { dialect, rewriter }
    }

    pub fn synthesize(&self, unit: &Unit) -> ModuleDescriptor {
        let load = if unit.origin.is_some() {
            let body = match self.rewriter {
                Some(rewriter) => rewriter.rewrite(&unit.source),
                None => unit.source.as_str().into(),
            };
            self.dialect.render_load(unit, &escape_for_literal(&body))
        } else {
            String::new()
        };

        trace!(
            "Synthesized {} `{}` from {}",
            unit.kind,
            unit.qualified_name,
            unit.origin_display()
        );
        ModuleDescriptor {
            alloc: self.dialect.render_alloc(unit),
            link: render_link(&unit.qualified_name),
            load,
        }
    }

    /// Synthesize every unit, keeping the resolution order.
    pub fn synthesize_all(
        &self,
        units: &FxIndexMap<String, Unit>,
    ) -> FxIndexMap<String, ModuleDescriptor> {
        units
            .iter()
            .map(|(name, unit)| (name.clone(), self.synthesize(unit)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{FxIndexSet, UnitKind};

    /// Undo escaping the way Python reads a non-raw `'''` literal, for the two
    /// sequences the escaper produces.
    fn python_unescape(literal: &str) -> String {
        let mut out = String::new();
        let mut chars = literal.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn plain_unit(name: &str, source: &str) -> Unit {
        Unit {
            qualified_name: name.to_owned(),
            kind: UnitKind::Plain,
            parent: crate::naming::parent_name(name).map(str::to_owned),
            source: source.to_owned(),
            origin: Some(PathBuf::from("unit.py")),
        }
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape_for_literal(r"a\b"), r"a\\b");
        assert_eq!(escape_for_literal("it's"), r"it\'s");
        assert_eq!(escape_for_literal(r"\'"), r"\\\'");
        assert_eq!(escape_for_literal("plain"), "plain");
    }

    #[test]
    fn test_escape_round_trips_adversarial_input() {
        let inputs = [
            "x = '''nested'''\n",
            "path = 'C:\\\\temp\\\\new'\n",
            "s = \"\\n\" + '\\''\n",
            "ends with a backslash \\",
            "ends with a quote '",
            "nul \0 byte",
            "non-ascii \u{fffd} ü ✓",
            "\\\\\\'''",
        ];
        for input in inputs {
            let escaped = escape_for_literal(input);
            assert!(
                !escaped.contains("'''"),
                "escaped text must not close the literal: {escaped}"
            );
            assert_eq!(python_unescape(&escaped), input);
        }
    }

    #[test]
    fn test_link_fragment() {
        assert_eq!(
            render_link("pkg.sub.leaf"),
            "setattr(sys.modules[\"pkg.sub\"], \"leaf\", sys.modules[\"pkg.sub.leaf\"])"
        );
        assert_eq!(render_link("pkg"), "");
    }

    #[test]
    fn test_link_is_dialect_independent() {
        let unit = plain_unit("pkg.leaf", "x = 1\n");
        let legacy = Synthesizer::new(Dialect::Legacy, None).synthesize(&unit);
        let modern = Synthesizer::new(Dialect::Modern, None).synthesize(&unit);
        assert_eq!(legacy.link, modern.link);
        assert_ne!(legacy.alloc, modern.alloc);
        assert_ne!(legacy.load, modern.load);
    }

    #[test]
    fn test_load_embeds_escaped_source() {
        let unit = plain_unit("pkg.leaf", "print('leaf')\n");
        let descriptor = Synthesizer::new(Dialect::Modern, None).synthesize(&unit);
        assert_eq!(
            descriptor.load,
            "exec('''print(\\'leaf\\')\n''', sys.modules[\"pkg.leaf\"].__dict__)"
        );
    }

    #[test]
    fn test_namespace_has_no_load() {
        let descriptor =
            Synthesizer::new(Dialect::Modern, None).synthesize(&Unit::namespace("pkg.sub"));
        assert!(descriptor.load.is_empty());
        assert!(descriptor.alloc.contains("is_package=True"));
        assert!(!descriptor.link.is_empty());
    }

    #[test]
    fn test_empty_initializer_still_loads() {
        let mut unit = plain_unit("pkg", "");
        unit.kind = UnitKind::Composite;
        let descriptor = Synthesizer::new(Dialect::Modern, None).synthesize(&unit);
        assert_eq!(descriptor.load, "exec('''''', sys.modules[\"pkg\"].__dict__)");
    }

    #[test]
    fn test_rewriter_applies_before_escaping() {
        let mut libraries = FxIndexSet::default();
        libraries.insert("shared".to_owned());
        let rewriter = ImportRewriter::new("product", libraries);

        let unit = plain_unit("product.app.a", "import shared\n");
        let descriptor = Synthesizer::new(Dialect::Modern, Some(&rewriter)).synthesize(&unit);
        assert!(descriptor.load.starts_with("exec('''from product import shared\n'''"));
    }
}
