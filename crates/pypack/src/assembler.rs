//! Final script assembly
//!
//! Splices the generated preamble into the main entry. The preamble holds the
//! dialect header followed by three blocks, always in this order: every
//! allocation, every link, every load. A module body may touch any other
//! bundled module at top level, so all modules must exist and be attached to
//! their parents before the first body runs.

use std::borrow::Cow;

use log::debug;

use crate::{
    descriptor::ModuleDescriptor,
    dialect::Dialect,
    import_rewriter::ImportRewriter,
    insertion::{InsertionPoint, MainScript, is_encoding_declaration},
    types::FxIndexMap,
};

/// Declares a value unique to the running interpreter, so that bundles nested
/// inside other bundles can tell their symbols apart.
pub const ISOLATION_TOKEN: &str =
    "import uuid\n__pack_isolation_token = \"packed_\" + uuid.uuid4().hex + \"_\"";

/// Source encoding comment for outputs Python 2 would otherwise read as ASCII
pub const ENCODING_DECLARATION: &str = "# -*- coding: utf-8 -*-";

#[derive(Debug)]
pub struct ScriptAssembler<'a> {
    dialect: Dialect,
    isolation_token: bool,
    insertion: InsertionPoint,
    rewriter: Option<&'a ImportRewriter>,
}

impl<'a> ScriptAssembler<'a> {
    pub fn new(dialect: Dialect, insertion: InsertionPoint) -> Self {
        Self {
            dialect,
            isolation_token: true,
            insertion,
            rewriter: None,
        }
    }

    #[must_use]
    pub fn with_isolation_token(mut self, enabled: bool) -> Self {
        self.isolation_token = enabled;
        self
    }

    #[must_use]
    pub fn with_rewriter(mut self, rewriter: Option<&'a ImportRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Produce the bundled script.
    ///
    /// Without descriptors there is nothing to embed and the main entry is
    /// returned untouched, which makes re-bundling a bundle a no-op.
    pub fn assemble(
        &self,
        main_entry: &str,
        descriptors: &FxIndexMap<String, ModuleDescriptor>,
    ) -> String {
        if descriptors.is_empty() {
            debug!("No modules to embed, main entry is kept as is");
            return main_entry.to_owned();
        }

        let main_entry: Cow<'_, str> = match self.rewriter {
            Some(rewriter) => rewriter.rewrite(main_entry),
            None => Cow::Borrowed(main_entry),
        };

        let script = MainScript::new(&main_entry);
        let index = self.insertion.locate(&script);
        debug!("Inserting {} modules at line {index}", descriptors.len());

        let preamble = self.render_preamble(descriptors);
        let mut lines = script.into_lines();
        lines.insert(index.min(lines.len()), &preamble);
        let output = lines.join("\n");

        match self.dialect {
            Dialect::Legacy => declare_utf8_encoding(output),
            Dialect::Modern => output,
        }
    }

    /// Header and the alloc, link and load blocks, without the main entry.
    pub fn render_preamble(&self, descriptors: &FxIndexMap<String, ModuleDescriptor>) -> String {
        let allocs = join_non_empty(descriptors.values().map(|d| d.alloc.as_str()), "\n");
        let links = join_non_empty(descriptors.values().map(|d| d.link.as_str()), "\n");
        let loads = join_non_empty(descriptors.values().map(|d| d.load.as_str()), "\n\n");

        let blocks = join_non_empty(
            [
                self.dialect.header(),
                allocs.as_str(),
                links.as_str(),
                loads.as_str(),
            ]
            .into_iter(),
            "\n\n",
        );

        let mut preamble = String::new();
        if self.isolation_token {
            preamble.push_str(ISOLATION_TOKEN);
            preamble.push('\n');
        }
        preamble.push('\n');
        preamble.push_str(&blocks);
        preamble.push('\n');
        preamble
    }
}

/// Declare UTF-8 in the first two lines of a non-ASCII script.
///
/// Declarations inside embedded sources end up in string literals and no
/// longer count, so the bundle needs its own. It goes after a shebang.
fn declare_utf8_encoding(script: String) -> String {
    if script.is_ascii() {
        return script;
    }
    let mut leading = script.lines().take(2);
    let first = leading.next();
    let second = leading.next();
    if first.into_iter().chain(second).any(is_encoding_declaration) {
        return script;
    }

    let split = if first.is_some_and(|line| line.starts_with("#!")) {
        script.find('\n').map_or(script.len(), |index| index + 1)
    } else {
        0
    };
    let (head, tail) = script.split_at(split);

    let mut declared = String::with_capacity(script.len() + ENCODING_DECLARATION.len() + 2);
    declared.push_str(head);
    if !head.is_empty() && !head.ends_with('\n') {
        declared.push('\n');
    }
    declared.push_str(ENCODING_DECLARATION);
    declared.push('\n');
    declared.push_str(tail);
    declared
}

fn join_non_empty<'s>(parts: impl Iterator<Item = &'s str>, separator: &str) -> String {
    parts
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::insertion::Fallback;

    fn descriptor(alloc: &str, link: &str, load: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            alloc: alloc.to_owned(),
            link: link.to_owned(),
            load: load.to_owned(),
        }
    }

    fn sample() -> FxIndexMap<String, ModuleDescriptor> {
        let mut descriptors = FxIndexMap::default();
        descriptors.insert("app".to_owned(), descriptor("ALLOC app", "", ""));
        descriptors.insert(
            "app.a".to_owned(),
            descriptor("ALLOC app.a", "LINK app.a", "LOAD app.a"),
        );
        descriptors.insert(
            "app.b".to_owned(),
            descriptor("ALLOC app.b", "LINK app.b", "LOAD app.b"),
        );
        descriptors
    }

    #[test]
    fn test_blocks_are_ordered() {
        let assembler = ScriptAssembler::new(Dialect::Modern, InsertionPoint::default())
            .with_isolation_token(false);
        let output = assembler.assemble("import os\nprint('main')\n", &sample());
        assert_eq!(
            output,
            "\nimport sys, importlib.util\n\n\
             ALLOC app\nALLOC app.a\nALLOC app.b\n\n\
             LINK app.a\nLINK app.b\n\n\
             LOAD app.a\n\nLOAD app.b\n\n\
             import os\nprint('main')\n"
        );
    }

    #[test]
    fn test_isolation_token_leads_the_preamble() {
        let assembler = ScriptAssembler::new(Dialect::Legacy, InsertionPoint::default());
        let output = assembler.assemble("print('main')\n", &sample());
        assert!(output.starts_with(ISOLATION_TOKEN));
        assert!(output.contains("\nimport sys, imp\n"));
        assert!(output.ends_with("\nprint('main')\n"));
    }

    #[test]
    fn test_preamble_after_main_code_with_end_fallback() {
        let assembler =
            ScriptAssembler::new(Dialect::Modern, InsertionPoint::new(None, Fallback::End))
                .with_isolation_token(false);
        let output = assembler.assemble("print('main')\n", &sample());
        assert!(output.starts_with("print('main')\n\nimport sys, importlib.util"));
        assert!(output.ends_with("LOAD app.b\n\n"));
    }

    #[test]
    fn test_empty_bundle_keeps_main_entry() {
        let assembler = ScriptAssembler::new(Dialect::Modern, InsertionPoint::default());
        let main = "import os\r\nprint('main')\r\n";
        assert_eq!(assembler.assemble(main, &FxIndexMap::default()), main);
    }

    #[test]
    fn test_main_entry_imports_are_rewritten() {
        let mut libraries = crate::types::FxIndexSet::default();
        libraries.insert("app".to_owned());
        let rewriter = ImportRewriter::new("product", libraries);

        let assembler = ScriptAssembler::new(Dialect::Modern, InsertionPoint::default())
            .with_isolation_token(false)
            .with_rewriter(Some(&rewriter));
        let output = assembler.assemble("import app\napp.run()\n", &sample());
        assert!(output.ends_with("\nfrom product import app\napp.run()\n"));
    }

    #[test]
    fn test_legacy_non_ascii_output_declares_encoding() {
        let assembler = ScriptAssembler::new(Dialect::Legacy, InsertionPoint::default())
            .with_isolation_token(false);
        let output = assembler.assemble("import app\nprint('héllo')\n", &sample());
        assert!(output.starts_with("# -*- coding: utf-8 -*-\n\nimport sys, imp\n"));

        let output = assembler.assemble("#!/usr/bin/env python\nimport app\n# é\n", &sample());
        assert!(output.starts_with("#!/usr/bin/env python\n# -*- coding: utf-8 -*-\n\n"));
    }

    #[test]
    fn test_existing_encoding_declaration_is_kept() {
        let assembler = ScriptAssembler::new(Dialect::Legacy, InsertionPoint::default())
            .with_isolation_token(false);
        let main = "#!/usr/bin/env python\n# coding: utf-8\nimport app\nprint('héllo')\n";
        let output = assembler.assemble(main, &sample());
        assert_eq!(output.matches("coding").count(), 1);
        assert!(output.starts_with("#!/usr/bin/env python\n# coding: utf-8\n\nimport sys, imp"));
    }

    #[test]
    fn test_encoding_declaration_only_where_needed() {
        let legacy = ScriptAssembler::new(Dialect::Legacy, InsertionPoint::default())
            .with_isolation_token(false);
        assert!(legacy.assemble("import app\n", &sample()).starts_with("\nimport sys, imp"));

        let modern = ScriptAssembler::new(Dialect::Modern, InsertionPoint::default())
            .with_isolation_token(false);
        let output = modern.assemble("import app\nprint('héllo')\n", &sample());
        assert!(!output.contains("coding"));
    }
}
