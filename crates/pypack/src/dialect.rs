//! Code shapes for the supported runtime dialects
//!
//! The dialect is picked once per run and decides how a module object is
//! allocated and how its body is executed. Linking a module to its parent is
//! the same in every dialect and lives in the descriptor module.

use std::{fmt::Write, str::FromStr};

use serde::Deserialize;

use crate::{error::BundleError, naming::declaring_package, types::Unit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Dialect {
    /// Python 2.7: `imp.new_module` and the `exec ... in ...` statement
    Legacy,
    /// Python 3.5+: `importlib.util` module specs and the `exec()` builtin
    #[default]
    Modern,
}

impl Dialect {
    /// Import line announcing the runtime facilities the fragments rely on
    pub fn header(self) -> &'static str {
        match self {
            Self::Legacy => "import sys, imp",
            Self::Modern => "import sys, importlib.util",
        }
    }

    /// Create the module object and register it in `sys.modules`.
    pub fn render_alloc(self, unit: &Unit) -> String {
        let name = quote(&unit.qualified_name);
        let composite = unit.kind.is_composite();
        match self {
            Self::Legacy => {
                let mut code = format!("sys.modules[{name}] = imp.new_module({name})");
                let _ = write!(code, "\nsys.modules[{name}].__name__ = {name}");
                let _ = write!(
                    code,
                    "\nsys.modules[{name}].__package__ = {}",
                    quote(declaring_package(&unit.qualified_name, composite))
                );
                if composite {
                    let _ = write!(code, "\nsys.modules[{name}].__path__ = []");
                }
                code
            }
            Self::Modern => format!(
                "sys.modules[{name}] = importlib.util.module_from_spec(\
                 importlib.util.spec_from_loader({name}, loader=None, is_package={}))",
                if composite { "True" } else { "None" }
            ),
        }
    }

    /// Execute `literal` (an already escaped body) in the module's namespace.
    pub fn render_load(self, unit: &Unit, literal: &str) -> String {
        let name = quote(&unit.qualified_name);
        match self {
            Self::Legacy => format!("exec '''{literal}''' in sys.modules[{name}].__dict__"),
            Self::Modern => format!("exec('''{literal}''', sys.modules[{name}].__dict__)"),
        }
    }
}

impl FromStr for Dialect {
    type Err = BundleError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "2.7" | "legacy" => Ok(Self::Legacy),
            "3.5" | "modern" => Ok(Self::Modern),
            _ => Err(BundleError::UnsupportedDialect(token.to_owned())),
        }
    }
}

impl TryFrom<String> for Dialect {
    type Error = BundleError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        token.parse()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "2.7"),
            Self::Modern => write!(f, "3.5"),
        }
    }
}

/// Render a module name as a double-quoted Python string literal.
///
/// Names are validated identifiers joined by dots, so no escaping is needed.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}
