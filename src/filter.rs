//! Blacklist-based path filtering.
//!
//! Each dissolution mode has its own blacklist: a list of case-insensitive
//! keyword substrings, optional glob patterns, and optional regex rules
//! scoped to files, directories, or both. A candidate whose full path or
//! base name matches any of them is skipped before the engine ever touches
//! it.
//!
//! # Store format
//!
//! The blacklist store is TOML, one table per mode:
//!
//! ```toml
//! [nested]
//! keywords = ["#keep", "backup"]
//!
//! [archive]
//! keywords = ["原版"]
//! patterns = ["**/raw/**"]
//!
//! [[archive.rules]]
//! expression = '^\d{4}-\d{2}$'
//! item_kind = "dir"
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while loading or persisting the blacklist store.
#[derive(Debug, Clone)]
pub enum FilterError {
    /// Store file not found at an explicitly given path.
    StoreNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    StoreInvalid(String),
    /// Invalid glob pattern in the store.
    InvalidGlobPattern(String),
    /// Invalid regex pattern with the compile error reason.
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error reading or writing the store.
    Io(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::StoreNotFound(path) => {
                write!(f, "Blacklist store not found: {}", path.display())
            }
            FilterError::StoreInvalid(msg) => write!(f, "Invalid blacklist store: {}", msg),
            FilterError::InvalidGlobPattern(pattern) => {
                write!(f, "Invalid glob pattern '{}'", pattern)
            }
            FilterError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
            FilterError::Io(msg) => write!(f, "IO error on blacklist store: {}", msg),
        }
    }
}

impl std::error::Error for FilterError {}

/// Which item kind a pattern rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Dir,
    #[default]
    Both,
}

impl ItemKind {
    fn applies_to(self, is_dir: bool) -> bool {
        match self {
            ItemKind::File => !is_dir,
            ItemKind::Dir => is_dir,
            ItemKind::Both => true,
        }
    }
}

/// A regex rule scoped to an item kind. Expressions are compiled once at
/// load time, never re-parsed per path check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub expression: String,
    #[serde(default)]
    pub item_kind: ItemKind,
}

/// The raw, serializable rules for one mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeRules {
    /// Case-insensitive substrings matched against the full path and the
    /// base name.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Glob patterns matched against the full path.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regex rules matched against the base name.
    #[serde(default)]
    pub rules: Vec<PatternRule>,
}

/// One mode's rules with globs and regexes pre-compiled.
struct CompiledModeRules {
    keywords: Vec<String>,
    patterns: Vec<Pattern>,
    rules: Vec<(Regex, ItemKind)>,
}

impl CompiledModeRules {
    fn compile(rules: &ModeRules) -> Result<Self, FilterError> {
        let patterns = rules
            .patterns
            .iter()
            .map(|p| Pattern::new(p).map_err(|_| FilterError::InvalidGlobPattern(p.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let compiled_rules = rules
            .rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.expression)
                    .map(|re| (re, rule.item_kind))
                    .map_err(|e| FilterError::InvalidRegexPattern {
                        pattern: rule.expression.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keywords: rules.keywords.iter().map(|k| k.to_lowercase()).collect(),
            patterns,
            rules: compiled_rules,
        })
    }
}

/// Result of filtering a batch of candidate paths.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Paths that passed every rule, in input order.
    pub valid: Vec<PathBuf>,
    /// Paths rejected by any rule, in input order.
    pub skipped: Vec<PathBuf>,
    /// Skipped paths grouped by the keyword or pattern that matched them.
    pub skipped_by_keyword: HashMap<String, Vec<PathBuf>>,
}

/// Mode-keyed blacklist with a TOML backing store.
pub struct PathFilter {
    store_path: PathBuf,
    modes: HashMap<String, ModeRules>,
    compiled: HashMap<String, CompiledModeRules>,
}

impl PathFilter {
    /// Loads the blacklist store, with fallback to an empty one.
    ///
    /// Lookup order:
    /// 1. the explicitly given path (an error if unreadable)
    /// 2. `.shelftidy.toml` in the current directory
    /// 3. `~/.config/shelftidy/filters.toml`
    /// 4. an empty store, persisted to `.shelftidy.toml` on first mutation
    pub fn load(store_path: Option<&Path>) -> Result<Self, FilterError> {
        if let Some(path) = store_path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(".shelftidy.toml");
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_store = PathBuf::from(home)
                .join(".config")
                .join("shelftidy")
                .join("filters.toml");
            if home_store.exists() {
                return Self::load_from_file(&home_store);
            }
        }

        Self::from_rules(local, HashMap::new())
    }

    /// Loads the store from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, FilterError> {
        if !path.exists() {
            return Err(FilterError::StoreNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| FilterError::Io(e.to_string()))?;
        let modes: HashMap<String, ModeRules> =
            toml::from_str(&content).map_err(|e| FilterError::StoreInvalid(e.to_string()))?;

        Self::from_rules(path.to_path_buf(), modes)
    }

    /// Builds a filter from in-memory rules, compiling every pattern.
    pub fn from_rules(
        store_path: PathBuf,
        modes: HashMap<String, ModeRules>,
    ) -> Result<Self, FilterError> {
        let compiled = modes
            .iter()
            .map(|(mode, rules)| CompiledModeRules::compile(rules).map(|c| (mode.clone(), c)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            store_path,
            modes,
            compiled,
        })
    }

    /// The keywords configured for a mode.
    pub fn keywords(&self, mode: &str) -> &[String] {
        self.modes
            .get(mode)
            .map(|rules| rules.keywords.as_slice())
            .unwrap_or(&[])
    }

    /// Checks a single path against a mode's blacklist.
    ///
    /// Returns the keyword or pattern text that matched, or `None` when the
    /// path is clean. Unknown modes have no rules and never match.
    pub fn matched_keyword(&self, path: &Path, is_dir: bool, mode: &str) -> Option<String> {
        let compiled = self.compiled.get(mode)?;

        let path_str = path.to_string_lossy().to_lowercase();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        for keyword in &compiled.keywords {
            if path_str.contains(keyword.as_str()) || name.contains(keyword.as_str()) {
                return Some(keyword.clone());
            }
        }

        for pattern in &compiled.patterns {
            if pattern.matches_path(path) {
                return Some(pattern.as_str().to_string());
            }
        }

        for (regex, kind) in &compiled.rules {
            if kind.applies_to(is_dir) && regex.is_match(&name) {
                return Some(regex.as_str().to_string());
            }
        }

        None
    }

    /// Filters candidate paths for a mode, splitting them into valid and
    /// skipped with the skips grouped by matching keyword.
    pub fn filter(&self, paths: &[PathBuf], mode: &str) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for path in paths {
            match self.matched_keyword(path, path.is_dir(), mode) {
                Some(keyword) => {
                    outcome.skipped.push(path.clone());
                    outcome
                        .skipped_by_keyword
                        .entry(keyword)
                        .or_default()
                        .push(path.clone());
                }
                None => outcome.valid.push(path.clone()),
            }
        }

        outcome
    }

    /// Adds a keyword to a mode's blacklist and persists the store.
    ///
    /// Returns `false` when the keyword was already present (the store is
    /// left untouched in that case).
    pub fn add_keyword(&mut self, mode: &str, keyword: &str) -> Result<bool, FilterError> {
        let rules = self.modes.entry(mode.to_string()).or_default();
        if rules.keywords.iter().any(|k| k == keyword) {
            return Ok(false);
        }

        rules.keywords.push(keyword.to_string());
        self.recompile(mode)?;
        self.persist()?;
        Ok(true)
    }

    /// Removes a keyword from a mode's blacklist and persists the store.
    ///
    /// Returns `false` when the keyword was not present.
    pub fn remove_keyword(&mut self, mode: &str, keyword: &str) -> Result<bool, FilterError> {
        let Some(rules) = self.modes.get_mut(mode) else {
            return Ok(false);
        };

        let before = rules.keywords.len();
        rules.keywords.retain(|k| k != keyword);
        if rules.keywords.len() == before {
            return Ok(false);
        }

        self.recompile(mode)?;
        self.persist()?;
        Ok(true)
    }

    fn recompile(&mut self, mode: &str) -> Result<(), FilterError> {
        if let Some(rules) = self.modes.get(mode) {
            self.compiled
                .insert(mode.to_string(), CompiledModeRules::compile(rules)?);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), FilterError> {
        let content = toml::to_string_pretty(&self.modes)
            .map_err(|e| FilterError::StoreInvalid(e.to_string()))?;

        if let Some(parent) = self.store_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| FilterError::Io(e.to_string()))?;
        }

        fs::write(&self.store_path, content).map_err(|e| FilterError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter_with(mode: &str, rules: ModeRules) -> PathFilter {
        let mut modes = HashMap::new();
        modes.insert(mode.to_string(), rules);
        PathFilter::from_rules(PathBuf::from("unused.toml"), modes)
            .expect("Failed to compile rules")
    }

    #[test]
    fn test_keyword_matches_path_and_name() {
        let filter = filter_with(
            "archive",
            ModeRules {
                keywords: vec!["backup".to_string()],
                ..Default::default()
            },
        );

        assert!(
            filter
                .matched_keyword(Path::new("/library/Backup/vol1"), true, "archive")
                .is_some()
        );
        assert!(
            filter
                .matched_keyword(Path::new("/library/series/my_BACKUP"), true, "archive")
                .is_some()
        );
        assert!(
            filter
                .matched_keyword(Path::new("/library/series/vol1"), true, "archive")
                .is_none()
        );
    }

    #[test]
    fn test_unknown_mode_never_matches() {
        let filter = filter_with(
            "archive",
            ModeRules {
                keywords: vec!["backup".to_string()],
                ..Default::default()
            },
        );

        assert!(
            filter
                .matched_keyword(Path::new("/library/backup"), true, "nested")
                .is_none()
        );
    }

    #[test]
    fn test_filter_groups_skips_by_keyword() {
        let filter = filter_with(
            "media",
            ModeRules {
                keywords: vec!["raw".to_string(), "tmp".to_string()],
                ..Default::default()
            },
        );

        let paths = vec![
            PathBuf::from("/lib/raw/a"),
            PathBuf::from("/lib/clean/b"),
            PathBuf::from("/lib/tmp/c"),
            PathBuf::from("/lib/raw/d"),
        ];
        let outcome = filter.filter(&paths, "media");

        assert_eq!(outcome.valid, vec![PathBuf::from("/lib/clean/b")]);
        assert_eq!(outcome.skipped.len(), 3);
        assert_eq!(outcome.skipped_by_keyword["raw"].len(), 2);
        assert_eq!(outcome.skipped_by_keyword["tmp"].len(), 1);
    }

    #[test]
    fn test_pattern_rule_respects_item_kind() {
        let filter = filter_with(
            "direct",
            ModeRules {
                rules: vec![PatternRule {
                    expression: r"^\d{4}-\d{2}$".to_string(),
                    item_kind: ItemKind::Dir,
                }],
                ..Default::default()
            },
        );

        assert!(
            filter
                .matched_keyword(Path::new("/lib/2024-01"), true, "direct")
                .is_some()
        );
        // Same name as a file does not match a dir-scoped rule.
        assert!(
            filter
                .matched_keyword(Path::new("/lib/2024-01"), false, "direct")
                .is_none()
        );
    }

    #[test]
    fn test_invalid_regex_is_rejected_at_load() {
        let mut modes = HashMap::new();
        modes.insert(
            "direct".to_string(),
            ModeRules {
                rules: vec![PatternRule {
                    expression: "[invalid(".to_string(),
                    item_kind: ItemKind::Both,
                }],
                ..Default::default()
            },
        );

        let result = PathFilter::from_rules(PathBuf::from("unused.toml"), modes);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_keyword_persists_and_rejects_duplicates() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = temp_dir.path().join("filters.toml");

        let mut filter =
            PathFilter::from_rules(store.clone(), HashMap::new()).expect("Failed to build filter");

        assert!(filter.add_keyword("archive", "backup").expect("add failed"));
        assert!(!filter.add_keyword("archive", "backup").expect("add failed"));
        assert!(store.exists());

        // A fresh load sees the persisted keyword.
        let reloaded = PathFilter::load(Some(&store)).expect("Failed to reload store");
        assert_eq!(reloaded.keywords("archive"), ["backup".to_string()]);
    }

    #[test]
    fn test_remove_keyword_persists() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = temp_dir.path().join("filters.toml");

        let mut filter =
            PathFilter::from_rules(store.clone(), HashMap::new()).expect("Failed to build filter");
        filter.add_keyword("media", "raw").expect("add failed");

        assert!(filter.remove_keyword("media", "raw").expect("remove failed"));
        assert!(!filter.remove_keyword("media", "raw").expect("remove failed"));

        let reloaded = PathFilter::load(Some(&store)).expect("Failed to reload store");
        assert!(reloaded.keywords("media").is_empty());
    }
}
