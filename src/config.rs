// ⚙️ Settings - limits and paths for the parse pipeline
// JSON file (optional) → environment overrides → defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_PARSE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Uploads above this size are rejected before extraction
    pub max_document_bytes: usize,

    /// Wall-clock budget for a single parse
    pub parse_timeout_secs: u64,

    pub database_path: PathBuf,

    /// Optional JSON rule file replacing the built-in categorization rules
    pub rules_path: Option<PathBuf>,

    /// Bank codes that must not be parsed at all
    pub disabled_banks: Vec<String>,

    /// Balance check: differences below this are treated as balanced
    pub summary_tolerance: f64,

    /// Balance check: differences at or above this are major
    pub summary_major_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            parse_timeout_secs: DEFAULT_PARSE_TIMEOUT_SECS,
            database_path: PathBuf::from("statements.db"),
            rules_path: None,
            disabled_banks: Vec::new(),
            summary_tolerance: 0.01,
            summary_major_threshold: 10.0,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse settings JSON")
    }

    /// Load from `path` when given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `STATEMENT_*` overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STATEMENT_MAX_BYTES") {
            self.max_document_bytes = v
                .trim()
                .parse()
                .with_context(|| format!("STATEMENT_MAX_BYTES is not a number: {}", v))?;
        }
        if let Some(v) = lookup("STATEMENT_PARSE_TIMEOUT_SECS") {
            self.parse_timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("STATEMENT_PARSE_TIMEOUT_SECS is not a number: {}", v))?;
        }
        if let Some(v) = lookup("STATEMENT_DB_PATH") {
            self.database_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn is_bank_disabled(&self, code: &str) -> bool {
        self.disabled_banks
            .iter()
            .any(|b| b.trim().eq_ignore_ascii_case(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.max_document_bytes, 25 * 1024 * 1024);
        assert_eq!(s.parse_timeout_secs, 60);
        assert!(s.disabled_banks.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"parse_timeout_secs": 5, "disabled_banks": ["ICICI"]}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.parse_timeout_secs, 5);
        assert_eq!(s.max_document_bytes, DEFAULT_MAX_DOCUMENT_BYTES);
        assert!(s.is_bank_disabled("icici"));
        assert!(!s.is_bank_disabled("hdfc"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STATEMENT_MAX_BYTES", "1024"),
            ("STATEMENT_DB_PATH", "/tmp/x.db"),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        s.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(s.max_document_bytes, 1024);
        assert_eq!(s.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(s.parse_timeout_secs, DEFAULT_PARSE_TIMEOUT_SECS);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut s = Settings::default();
        let result =
            s.apply_env(|k| (k == "STATEMENT_PARSE_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert!(result.is_err());
    }
}
