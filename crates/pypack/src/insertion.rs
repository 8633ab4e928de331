//! Where the generated preamble goes in the main entry
//!
//! Strategies are tried in order and the first one that finds a line wins:
//! the first top-level import, then an explicit marker comment, then the
//! configured fallback (start or end of file). New markers or formats can be
//! added as further strategies without touching the synthesizer.

use clap::ValueEnum;
use ruff_python_ast::{PySourceType, Stmt};
use ruff_python_parser::parse_unchecked_source;
use ruff_text_size::Ranged;
use serde::Deserialize;

/// Line-oriented view of the main entry with its import layout precomputed
#[derive(Debug)]
pub struct MainScript<'s> {
    lines: Vec<&'s str>,
    /// Line of the first top-level import that is not a `__future__` import
    first_import: Option<usize>,
    /// Line right after the last top-level `__future__` import
    after_future_imports: Option<usize>,
}

impl<'s> MainScript<'s> {
    pub fn new(text: &'s str) -> Self {
        let lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        let parsed = parse_unchecked_source(text, PySourceType::Python);
        let line_of = |offset: usize| text[..offset].matches('\n').count();

        let mut first_import = None;
        let mut after_future_imports = None;
        for stmt in &parsed.syntax().body {
            let is_future = match stmt {
                Stmt::ImportFrom(import_from) => {
                    import_from.level == 0
                        && import_from
                            .module
                            .as_ref()
                            .is_some_and(|module| module.as_str() == "__future__")
                }
                Stmt::Import(_) => false,
                _ => continue,
            };
            if is_future {
                after_future_imports = Some(line_of(usize::from(stmt.end())) + 1);
            } else if first_import.is_none() {
                first_import = Some(line_of(usize::from(stmt.start())));
            }
        }

        Self {
            lines,
            first_import,
            after_future_imports,
        }
    }

    pub fn lines(&self) -> &[&'s str] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<&'s str> {
        self.lines
    }

    /// First line where code may be placed: after a shebang, an encoding
    /// declaration and any `__future__` imports.
    fn first_code_line(&self) -> usize {
        let header_comments = self
            .lines
            .iter()
            .take(2)
            .take_while(|line| line.starts_with("#!") || is_encoding_declaration(line))
            .count();
        self.after_future_imports
            .map_or(header_comments, |line| line.max(header_comments))
    }
}

/// Whether `line` is a PEP 263 source encoding comment
pub(crate) fn is_encoding_declaration(line: &str) -> bool {
    line.starts_with('#') && line.contains("coding") && (line.contains(':') || line.contains('='))
}

/// One way of choosing the insertion line
pub trait InsertionStrategy: std::fmt::Debug {
    fn locate(&self, script: &MainScript<'_>) -> Option<usize>;
}

/// Right before the first top-level import
#[derive(Debug, Clone, Copy)]
pub struct FirstImport;

impl InsertionStrategy for FirstImport {
    fn locate(&self, script: &MainScript<'_>) -> Option<usize> {
        script.first_import
    }
}

/// Right before a line consisting of the marker comment
#[derive(Debug, Clone)]
pub struct MarkerComment(pub String);

impl InsertionStrategy for MarkerComment {
    fn locate(&self, script: &MainScript<'_>) -> Option<usize> {
        script
            .lines
            .iter()
            .position(|line| line.trim() == self.0)
    }
}

/// Placement used when no import or marker is found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// First line that may hold code
    #[default]
    Start,
    /// After the last line
    End,
}

impl InsertionStrategy for Fallback {
    fn locate(&self, script: &MainScript<'_>) -> Option<usize> {
        match self {
            Self::Start => Some(script.first_code_line()),
            Self::End => {
                let len = script.lines.len();
                // Keep a trailing newline at the very end of the output
                if script.lines.last().is_some_and(|line| line.is_empty()) {
                    Some(len - 1)
                } else {
                    Some(len)
                }
            }
        }
    }
}

/// Ordered chain of strategies
#[derive(Debug)]
pub struct InsertionPoint {
    strategies: Vec<Box<dyn InsertionStrategy>>,
}

impl InsertionPoint {
    pub fn new(marker: Option<&str>, fallback: Fallback) -> Self {
        let mut strategies: Vec<Box<dyn InsertionStrategy>> = vec![Box::new(FirstImport)];
        if let Some(marker) = marker {
            strategies.push(Box::new(MarkerComment(marker.trim().to_owned())));
        }
        strategies.push(Box::new(fallback));
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn InsertionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Line index the preamble is inserted before
    pub fn locate(&self, script: &MainScript<'_>) -> usize {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.locate(script))
            .unwrap_or(0)
    }
}

impl Default for InsertionPoint {
    fn default() -> Self {
        Self::new(None, Fallback::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locate(text: &str, marker: Option<&str>, fallback: Fallback) -> usize {
        InsertionPoint::new(marker, fallback).locate(&MainScript::new(text))
    }

    #[test]
    fn test_first_import_wins() {
        let text = "\"\"\"Doc.\"\"\"\n# pack: here\nimport os\nfrom app import a\n";
        assert_eq!(locate(text, Some("# pack: here"), Fallback::Start), 2);
    }

    #[test]
    fn test_from_import_counts_as_import() {
        let text = "x = 1\nfrom app import a\n";
        assert_eq!(locate(text, None, Fallback::Start), 1);
    }

    #[test]
    fn test_future_imports_are_skipped() {
        let text = "from __future__ import print_function\nimport sys\n";
        assert_eq!(locate(text, None, Fallback::Start), 1);

        let text = "from __future__ import annotations\nprint('hi')\n";
        assert_eq!(locate(text, None, Fallback::Start), 1);
    }

    #[test]
    fn test_nested_imports_do_not_count() {
        let text = "def main():\n    import os\n\n# pack: here\nmain()\n";
        assert_eq!(locate(text, Some("# pack: here"), Fallback::Start), 3);
    }

    #[test]
    fn test_import_inside_string_does_not_count() {
        let text = "HELP = '''\nimport nothing\n'''\nprint(HELP)\n";
        assert_eq!(locate(text, None, Fallback::End), 4);
    }

    #[test]
    fn test_fallback_start_skips_shebang_and_encoding() {
        let text = "#!/usr/bin/env python\n# -*- coding: utf-8 -*-\nprint('hi')\n";
        assert_eq!(locate(text, None, Fallback::Start), 2);
        assert_eq!(locate("print('hi')", None, Fallback::Start), 0);
    }

    #[test]
    fn test_fallback_end() {
        assert_eq!(locate("print('hi')\n", None, Fallback::End), 1);
        assert_eq!(locate("print('hi')", None, Fallback::End), 1);
    }

    #[test]
    fn test_crlf_lines() {
        let script = MainScript::new("x = 1\r\nimport os\r\n");
        assert_eq!(script.lines(), &["x = 1", "import os", ""]);
        assert_eq!(InsertionPoint::default().locate(&script), 1);
    }

    #[test]
    fn test_custom_strategy_chain() {
        let point = InsertionPoint::with_strategies(vec![
            Box::new(MarkerComment("# here".to_owned())),
            Box::new(FirstImport),
        ]);
        let script = MainScript::new("import os\n# here\n");
        assert_eq!(point.locate(&script), 1);
    }
}
