//! Configuration
//!
//! Settings are layered, later layers overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. the user config file (`<config dir>/pypack/pypack.toml`)
//! 3. `pypack.toml` in the working directory
//! 4. a file passed with `--config`
//! 5. command-line arguments, applied by the caller
//!
//! Search roots from `PYPACK_PATH` are added after the configured ones.

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::{debug, warn};
use serde::Deserialize;

use crate::{dialect::Dialect, insertion::Fallback, types::FxIndexSet};

pub const CONFIG_FILE: &str = "pypack.toml";
pub const SEARCH_PATH_ENV: &str = "PYPACK_PATH";
pub const DEFAULT_MARKER: &str = "# pypack: modules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directories searched for libraries, in priority order
    pub search_roots: Vec<PathBuf>,
    pub dialect: Dialect,
    /// Namespace every bundled library is nested under
    pub product: Option<String>,
    pub isolation_token: bool,
    /// Comment line marking the insertion point when the main entry has no imports
    pub marker: Option<String>,
    pub fallback: Fallback,
    /// Require the main library's manifest to end with the `.` self-reference
    pub strict_self_reference: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            dialect: Dialect::default(),
            product: None,
            isolation_token: true,
            marker: Some(DEFAULT_MARKER.to_owned()),
            fallback: Fallback::default(),
            strict_self_reference: false,
        }
    }
}

/// One configuration file; unset keys leave the current value alone
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    search_roots: Option<Vec<PathBuf>>,
    dialect: Option<Dialect>,
    product: Option<String>,
    isolation_token: Option<bool>,
    marker: Option<String>,
    fallback: Option<Fallback>,
    strict_self_reference: Option<bool>,
}

impl Config {
    /// Load the layered configuration for a run started in `cwd`.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let env_path = std::env::var_os(SEARCH_PATH_ENV);
        Self::load_layers(
            user_config_path().as_deref(),
            explicit,
            cwd,
            env_path.as_deref(),
        )
    }

    /// Same as [`Config::load`] with the user config file and the
    /// `PYPACK_PATH` value passed explicitly
    pub fn load_layers(
        user_config: Option<&Path>,
        explicit: Option<&Path>,
        cwd: &Path,
        search_path: Option<&OsStr>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config) = user_config {
            if user_config.is_file() {
                config.merge_file(user_config)?;
            }
        }

        let project_config = cwd.join(CONFIG_FILE);
        if project_config.is_file() {
            config.merge_file(&project_config)?;
        }

        if let Some(path) = explicit {
            config.merge_file(path)?;
        }

        if let Some(search_path) = search_path {
            config.add_search_path(search_path);
        }

        Ok(config)
    }

    /// Apply one TOML file on top of the current values.
    ///
    /// Relative search roots are taken relative to the file's directory.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!("Applying config {}", path.display());

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(roots) = file.search_roots {
            self.search_roots = roots.into_iter().map(|root| base.join(root)).collect();
        }
        if let Some(dialect) = file.dialect {
            self.dialect = dialect;
        }
        if file.product.is_some() {
            self.product = file.product;
        }
        if let Some(isolation_token) = file.isolation_token {
            self.isolation_token = isolation_token;
        }
        if let Some(marker) = file.marker {
            self.marker = (!marker.trim().is_empty()).then_some(marker);
        }
        if let Some(fallback) = file.fallback {
            self.fallback = fallback;
        }
        if let Some(strict) = file.strict_self_reference {
            self.strict_self_reference = strict;
        }
        Ok(())
    }

    /// Append the directories of an OS path list, skipping missing ones.
    pub fn add_search_path(&mut self, search_path: &OsStr) {
        for dir in std::env::split_paths(search_path) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            if !dir.is_dir() {
                warn!("Ignoring {SEARCH_PATH_ENV} entry {}: not a directory", dir.display());
                continue;
            }
            self.search_roots.push(dir);
        }
        self.dedup_search_roots();
    }

    /// Put `roots` in front of the configured roots.
    pub fn prepend_search_roots(&mut self, roots: impl IntoIterator<Item = PathBuf>) {
        let mut combined: Vec<PathBuf> = roots.into_iter().collect();
        combined.append(&mut self.search_roots);
        self.search_roots = combined;
        self.dedup_search_roots();
    }

    fn dedup_search_roots(&mut self) {
        let unique: FxIndexSet<PathBuf> = self.search_roots.drain(..).collect();
        self.search_roots = unique.into_iter().collect();
    }
}

fn user_config_path() -> Option<PathBuf> {
    match choose_base_strategy() {
        Ok(strategy) => Some(strategy.config_dir().join("pypack").join(CONFIG_FILE)),
        Err(err) => {
            debug!("No user config directory: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dialect, Dialect::Modern);
        assert!(config.isolation_token);
        assert_eq!(config.marker.as_deref(), Some(DEFAULT_MARKER));
        assert_eq!(config.fallback, Fallback::Start);
    }

    #[test]
    fn test_project_config_and_explicit_file_layering() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let cwd = temp_dir.path();
        fs::write(
            cwd.join(CONFIG_FILE),
            "dialect = \"2.7\"\nsearch-roots = [\"libs\"]\nisolation-token = false\n",
        )?;
        let explicit = cwd.join("override.toml");
        fs::write(&explicit, "dialect = \"modern\"\nfallback = \"end\"\nmarker = \"\"\n")?;

        let config = Config::load_layers(None, Some(&explicit), cwd, None)?;
        assert_eq!(config.dialect, Dialect::Modern);
        assert_eq!(config.search_roots, vec![cwd.join("libs")]);
        assert!(!config.isolation_token);
        assert_eq!(config.fallback, Fallback::End);
        assert_eq!(config.marker, None);
        Ok(())
    }

    #[test]
    fn test_user_config_is_the_lowest_file_layer() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let user_dir = temp_dir.path().join("user");
        let cwd = temp_dir.path().join("project");
        fs::create_dir_all(&user_dir)?;
        fs::create_dir_all(&cwd)?;

        let user_config = user_dir.join(CONFIG_FILE);
        fs::write(
            &user_config,
            "dialect = \"legacy\"\nproduct = \"suite\"\nsearch-roots = [\"libs\"]\n",
        )?;
        fs::write(cwd.join(CONFIG_FILE), "dialect = \"modern\"\n")?;

        let config = Config::load_layers(Some(&user_config), None, &cwd, None)?;
        assert_eq!(config.dialect, Dialect::Modern);
        assert_eq!(config.product.as_deref(), Some("suite"));
        assert_eq!(config.search_roots, vec![user_dir.join("libs")]);

        // A missing user config is not an error
        let missing = user_dir.join("missing.toml");
        let config = Config::load_layers(Some(&missing), None, &cwd, None)?;
        assert_eq!(config.product, None);
        Ok(())
    }

    #[test]
    fn test_unknown_dialect_in_config_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "dialect = \"3.12\"\n")?;

        let err = Config::default().merge_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported dialect `3.12`"));
        Ok(())
    }

    #[test]
    fn test_unknown_keys_are_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "roots = []\n")?;
        assert!(Config::default().merge_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_search_path_env_is_appended() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        fs::create_dir_all(&first)?;
        fs::create_dir_all(&second)?;

        let missing = temp_dir.path().join("missing");
        let search_path: OsString = std::env::join_paths([&first, &missing, &second])?;
        let mut config = Config {
            search_roots: vec![second.clone()],
            ..Default::default()
        };
        config.add_search_path(&search_path);
        assert_eq!(config.search_roots, vec![second.clone(), first.clone()]);

        config.prepend_search_roots([first.clone()]);
        assert_eq!(config.search_roots, vec![first, second]);
        Ok(())
    }
}
