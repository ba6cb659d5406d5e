//! Event filtering
//!
//! Decides which change events are noise before they reach the scheduler.
//! Sources, checked in order:
//! 1. Built-in rules (VCS metadata, build output, editor temp files)
//! 2. `.reactorignore` in the watch root (gitignore syntax, optional)
//! 3. Patterns from configuration (gitignore syntax)

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Name of the per-root ignore file
pub const IGNORE_FILE: &str = ".reactorignore";

/// Directories whose contents never trigger reactions
const BUILTIN_DIRS: &[&str] = &[".git", ".jj", ".hg", ".svn", "target", "node_modules", "__pycache__"];

/// Compiled ignore rules for one watch root
pub struct IgnoreRules {
    /// Watch root; patterns are relative to it
    root: PathBuf,

    /// Rules from `.reactorignore`
    ignore_file: Option<Gitignore>,

    /// Rules from `IgnoreConfig::patterns`
    patterns: Option<Gitignore>,

    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Compile rules for `root`
    pub fn load(root: &Path, config: IgnoreConfig) -> Result<Self> {
        let mut rules = Self {
            root: root.to_path_buf(),
            ignore_file: None,
            patterns: None,
            config,
        };

        rules.reload()?;
        Ok(rules)
    }

    /// Rules that only apply the built-in filters
    pub fn builtin(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ignore_file: None,
            patterns: None,
            config: IgnoreConfig {
                use_ignore_file: false,
                patterns: Vec::new(),
                ..IgnoreConfig::default()
            },
        }
    }

    /// Recompile from disk and configuration
    ///
    /// Call after `.reactorignore` itself changes.
    pub fn reload(&mut self) -> Result<()> {
        self.ignore_file = None;
        if self.config.use_ignore_file {
            let path = self.root.join(IGNORE_FILE);
            if path.exists() {
                let mut builder = GitignoreBuilder::new(&self.root);
                if let Some(err) = builder.add(&path) {
                    return Err(err).with_context(|| format!("Failed to parse {}", path.display()));
                }
                self.ignore_file = Some(builder.build()?);
            }
        }

        self.patterns = None;
        if !self.config.patterns.is_empty() {
            let mut builder = GitignoreBuilder::new(&self.root);
            for pattern in &self.config.patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
            }
            self.patterns = Some(builder.build()?);
        }

        Ok(())
    }

    /// Check whether an event for `path` should be dropped
    ///
    /// `path` may be absolute (under the root) or relative to the root.
    /// Absolute paths outside the root only see the built-in rules.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()
        } else {
            Some(path)
        };

        if self.config.builtin && is_builtin_ignored(relative.unwrap_or(path)) {
            return true;
        }

        let Some(relative) = relative else {
            return false;
        };

        // Events name files; directory-only patterns still match via parents
        [&self.ignore_file, &self.patterns]
            .into_iter()
            .flatten()
            .any(|rules| rules.matched_path_or_any_parents(relative, false).is_ignore())
    }

    /// Number of active rule sources
    pub fn active_sources(&self) -> usize {
        usize::from(self.config.builtin)
            + usize::from(self.ignore_file.is_some())
            + usize::from(self.patterns.is_some())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Built-in VCS/build directories and editor temp files
fn is_builtin_ignored(path: &Path) -> bool {
    let in_builtin_dir = path.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .map_or(false, |name| BUILTIN_DIRS.contains(&name)),
        _ => false,
    });

    in_builtin_dir || is_editor_temp(path)
}

/// Vim, Emacs, JetBrains and OS droppings
fn is_editor_temp(path: &Path) -> bool {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    // Vim swap files
    if [".swp", ".swo", ".swx"].iter().any(|ext| filename.ends_with(ext)) {
        return true;
    }

    // Backups (foo~), Emacs auto-save (#foo#) and lock files (.#foo)
    if filename.ends_with('~')
        || (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
        || filename.starts_with(".#")
    {
        return true;
    }

    // JetBrains safe-write temporaries
    if filename.ends_with("___jb_tmp___") || filename.ends_with("___jb_old___") {
        return true;
    }

    filename == ".DS_Store" || filename.starts_with("._") || filename == "Thumbs.db"
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Apply built-in rules (default: true)
    pub builtin: bool,

    /// Read `.reactorignore` from the watch root (default: true)
    pub use_ignore_file: bool,

    /// Additional gitignore-style patterns
    pub patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            use_ignore_file: true,
            patterns: Vec::new(),
        }
    }
}
